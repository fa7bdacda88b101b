use log::{debug, error, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{timeout, Instant};

use crate::config::CoreConfig;
use crate::platforms::{AlwaysReachable, ChatClient, ConnectError, Reachability};
use crate::types::{AccessLevel, Event, EventKind, Notification};

pub mod arguments;
pub mod autosave;
pub mod commands;
pub mod context;
pub mod core_commands;
pub mod custom_commands;
pub mod emotes;
pub mod escalation;
pub mod moderation;
pub mod moderation_commands;
pub mod outbound;
pub mod pattern_matching;
pub mod queue;
pub mod recent;
pub mod scheduler;
pub mod shutdown;
pub mod users;

use commands::{CommandRegistry, DispatchOutcome, Invocation};
use context::BotContext;
use moderation::Rule;
use outbound::{OutboundAction, OutputModes};
use queue::EventReceiver;
use scheduler::TaskScheduler;
use shutdown::ShutdownSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Joining,
    Connected,
    Reconnecting,
}

/// Who the bot logs in as and where it sits
#[derive(Debug, Clone)]
pub struct Credentials {
    pub channel: String,
    pub username: String,
    pub token: String,
}

/// Conditions that stop the event loop for good
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("login failed: {0}")]
    LoginFailed(String),
}

/// The event core: owns the queue consumer, the connection state machine and the
/// context every handler runs against.
pub struct ChatBot {
    config: CoreConfig,
    credentials: Credentials,
    client: Box<dyn ChatClient>,
    reachability: Arc<dyn Reachability>,
    ctx: BotContext,
    registry: CommandRegistry,
    events: EventReceiver,
    scheduler: TaskScheduler,
    shutdown: ShutdownSignal,
    state: ConnectionState,
    last_inbound: Instant,
    last_heartbeat: Instant,
    last_tick: Instant,
}

impl ChatBot {
    pub fn new(
        config: CoreConfig,
        credentials: Credentials,
        client: Box<dyn ChatClient>,
        ctx: BotContext,
        events: EventReceiver,
        scheduler: TaskScheduler,
    ) -> Self {
        let now = Instant::now();
        Self {
            config,
            credentials,
            client,
            reachability: Arc::new(AlwaysReachable),
            ctx,
            registry: CommandRegistry::new(),
            events,
            scheduler,
            shutdown: ShutdownSignal::new(),
            state: ConnectionState::Disconnected,
            last_inbound: now,
            last_heartbeat: now,
            last_tick: now,
        }
    }

    pub fn with_reachability(mut self, reachability: Arc<dyn Reachability>) -> Self {
        self.reachability = reachability;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn register_command<F>(&mut self, names: &[&str], access: AccessLevel, handler: F) -> anyhow::Result<()>
    where
        F: Fn(&mut BotContext, &mut Invocation) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.register(names, access, handler)
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.ctx.subscribe()
    }

    pub fn output_modes(&self) -> Arc<OutputModes> {
        self.ctx.chat.modes().clone()
    }

    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut BotContext {
        &mut self.ctx
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Run until shutdown is requested or login is rejected. Shutdown housekeeping
    /// runs in both cases.
    pub async fn run(&mut self) -> Result<(), CoreError> {
        info!(target: "core", "Starting chat bot for #{} on {}", self.credentials.channel, self.client.platform_name());
        self.ctx.custom_commands.set_reserved(self.registry.names());

        let result = self.run_loop().await;
        if let Err(e) = &result {
            error!(target: "core", "Stopping: {}", e);
        }
        self.finish().await;
        result
    }

    async fn run_loop(&mut self) -> Result<(), CoreError> {
        while !self.shutdown.is_triggered() {
            if self.state == ConnectionState::Connected {
                self.pump().await;
            } else if !self.establish().await? {
                break;
            }
        }
        Ok(())
    }

    /// Connect and join, retrying until it works. Ok(false) means shutdown interrupted it.
    async fn establish(&mut self) -> Result<bool, CoreError> {
        loop {
            self.state = ConnectionState::Connecting;

            while !self.reachability.is_reachable().await {
                warn!(target: "core", "Chat network unreachable, checking again in {:?}", self.config.reachability_interval());
                if self.shutdown.sleep(self.config.reachability_interval()).await {
                    return Ok(false);
                }
            }
            if self.shutdown.is_triggered() {
                return Ok(false);
            }

            info!(target: "core", "Connecting to {} as {}", self.client.platform_name(), self.credentials.username);
            let connected = self
                .client
                .connect(&self.credentials.channel, &self.credentials.username, &self.credentials.token)
                .await;

            let failure = match connected {
                Ok(()) => {
                    self.state = ConnectionState::Joining;
                    match self.client.join(&self.credentials.channel).await {
                        Ok(()) => {
                            let now = Instant::now();
                            self.state = ConnectionState::Connected;
                            self.last_inbound = now;
                            self.last_heartbeat = now;
                            info!(target: "core", "Connected to #{}", self.credentials.channel);
                            self.ctx.notify(Notification::Connected);
                            return Ok(true);
                        }
                        Err(e) => e,
                    }
                }
                Err(ConnectError::LoginFailed(reason)) => {
                    self.state = ConnectionState::Disconnected;
                    return Err(CoreError::LoginFailed(reason));
                }
                Err(ConnectError::Failed(e)) => e,
            };

            warn!(
                target: "core",
                "Connection attempt failed: {:#}, retrying in {:?}", failure, self.config.retry_delay()
            );
            self.client.disconnect().await;
            self.state = ConnectionState::Disconnected;
            if self.shutdown.sleep(self.config.retry_delay()).await {
                return Ok(false);
            }
        }
    }

    /// One wait-drain-flush cycle while connected
    async fn pump(&mut self) {
        let poll_interval = self.config.poll_interval();
        tokio::select! {
            received = timeout(poll_interval, self.events.recv()) => match received {
                Ok(Some(event)) => self.handle_event(event),
                Ok(None) => {
                    debug!(target: "core", "All event producers are gone");
                    self.shutdown.sleep(poll_interval).await;
                }
                Err(_) => {}
            },
            _ = self.shutdown.wait() => {}
        }

        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
        self.flush().await;
        self.periodic().await;
    }

    /// Tick, heartbeat and idle checks
    async fn periodic(&mut self) {
        let now = Instant::now();

        let elapsed = now - self.last_tick;
        if elapsed >= self.config.tick_interval() {
            self.last_tick = now;
            self.ctx.notify(Notification::Tick(elapsed));
        }

        if self.state != ConnectionState::Connected {
            return;
        }

        if now - self.last_inbound >= self.config.idle_timeout() {
            warn!(
                target: "core",
                "Nothing received for {:?}, reconnecting", now - self.last_inbound
            );
            self.state = ConnectionState::Reconnecting;
            self.client.disconnect().await;
            self.ctx.notify(Notification::Disconnected);
        } else if now - self.last_inbound.max(self.last_heartbeat) >= self.config.heartbeat_interval() {
            debug!(target: "core", "Sending heartbeat");
            self.last_heartbeat = now;
            if let Err(e) = self.client.heartbeat().await {
                warn!(target: "core", "Heartbeat failed: {:#}", e);
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        self.last_inbound = Instant::now();

        match event.kind {
            EventKind::Message { sender, text } => {
                let user = self.ctx.users.resolve(&sender).clone();
                let outcome = if text.trim_start().starts_with('!') {
                    self.registry.dispatch(&mut self.ctx, &user, text.trim_start())
                } else {
                    DispatchOutcome::NotACommand
                };
                // only commands that actually ran skip the rule chain
                if outcome != DispatchOutcome::Handled {
                    self.ctx.moderation.check_message(&mut self.ctx.chat, &user, &text);
                }
            }
            EventKind::Action { sender, text } => {
                let user = self.ctx.users.resolve(&sender).clone();
                let verdict = self.ctx.moderation.check_action(&mut self.ctx.chat, &user, &text);
                if verdict.rule() == Some(Rule::FakeSubscription) {
                    self.ctx.notify(Notification::FakeSubscription { user: user.name });
                }
            }
            EventKind::ChatClear { user } => {
                debug!(target: "core", "Chat cleared for {}", user.as_deref().unwrap_or("everyone"));
                self.ctx.notify(Notification::ChatCleared { user });
            }
            EventKind::ModeratorChanged { user, is_mod } => {
                self.ctx.users.get_or_create(&user).moderator = is_mod;
                self.ctx.notify(Notification::ModeratorChanged { user, is_mod });
            }
            EventKind::Subscribed { user } => {
                self.ctx.users.get_or_create(&user).subscriber = true;
                info!(target: "core", "{} subscribed", user);
                self.ctx.notify(Notification::Subscribed { user });
            }
            EventKind::Followed { user } => {
                info!(target: "core", "{} followed", user);
                self.ctx.notify(Notification::Followed { user });
            }
            EventKind::ViewerCountChanged { count } => {
                self.ctx.stream.viewers = count;
                self.ctx.notify(Notification::ViewerCountChanged { count });
            }
            EventKind::StreamOnline { title, game } => {
                self.ctx.stream.live = true;
                self.ctx.stream.title = title.clone();
                self.ctx.stream.game = game.clone();
                self.ctx.moderation.on_stream_state_changed(Instant::now());
                self.ctx.notify(Notification::StreamOnline { title, game });
            }
            EventKind::StreamOffline => {
                self.ctx.stream.live = false;
                self.ctx.stream.viewers = 0;
                self.ctx.moderation.on_stream_state_changed(Instant::now());
                self.ctx.notify(Notification::StreamOffline);
            }
            EventKind::Pong => debug!(target: "core", "Heartbeat acknowledged"),
        }
    }

    /// Hand queued outbound actions to the chat client
    async fn flush(&mut self) {
        for action in self.ctx.chat.take() {
            let sent = match &action {
                OutboundAction::Message(text) => self.client.send_message(text).await,
                OutboundAction::Timeout { user, seconds } => self.client.timeout(user, *seconds).await,
                OutboundAction::Ban { user } => self.client.ban(user).await,
            };
            if let Err(e) = sent {
                warn!(target: "core", "Failed to deliver {:?}: {:#}", action, e);
            }
        }
    }

    async fn finish(&mut self) {
        info!(target: "core", "Shutting down...");
        self.ctx.notify(Notification::BeginShutdown);

        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
        if self.state == ConnectionState::Connected {
            self.flush().await;
        } else {
            let dropped = self.ctx.chat.take();
            if !dropped.is_empty() {
                warn!(target: "core", "Dropping {} outbound actions, not connected", dropped.len());
            }
        }

        self.client.disconnect().await;
        if self.state == ConnectionState::Connected {
            self.ctx.notify(Notification::Disconnected);
        }
        self.state = ConnectionState::Disconnected;

        self.scheduler.shutdown().await;
        self.ctx.notify(Notification::EndShutdown);
        info!(target: "core", "Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::context::testing::{test_context, TestContext};
    use crate::bot::queue::{event_queue, EventSender};
    use crate::types::Sender;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Duration;

    #[derive(Default)]
    struct MockClient {
        log: Arc<Mutex<Vec<String>>>,
        connect_results: VecDeque<Result<(), ConnectError>>,
        /// When set, heartbeats are answered with a Pong event
        pong: Option<EventSender>,
    }

    #[async_trait]
    impl ChatClient for MockClient {
        async fn connect(&mut self, channel: &str, username: &str, _token: &str) -> Result<(), ConnectError> {
            self.log.lock().push(format!("connect:{}:{}", channel, username));
            self.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn join(&mut self, channel: &str) -> anyhow::Result<()> {
            self.log.lock().push(format!("join:{}", channel));
            Ok(())
        }

        async fn disconnect(&mut self) {
            self.log.lock().push("disconnect".into());
        }

        async fn send_message(&mut self, text: &str) -> anyhow::Result<()> {
            self.log.lock().push(format!("say:{}", text));
            Ok(())
        }

        async fn timeout(&mut self, user: &str, seconds: u64) -> anyhow::Result<()> {
            self.log.lock().push(format!("timeout:{}:{}", user, seconds));
            Ok(())
        }

        async fn ban(&mut self, user: &str) -> anyhow::Result<()> {
            self.log.lock().push(format!("ban:{}", user));
            Ok(())
        }

        async fn heartbeat(&mut self) -> anyhow::Result<()> {
            self.log.lock().push("heartbeat".into());
            if let Some(events) = &self.pong {
                events.send(EventKind::Pong);
            }
            Ok(())
        }

        fn platform_name(&self) -> &str {
            "mock"
        }
    }

    struct FlakyNetwork {
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl Reachability for FlakyNetwork {
        async fn is_reachable(&self) -> bool {
            self.failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
        }
    }

    struct Harness {
        bot: ChatBot,
        events: EventSender,
        log: Arc<Mutex<Vec<String>>>,
        notifications: broadcast::Receiver<Notification>,
        _dir: tempfile::TempDir,
    }

    fn harness(mut client: MockClient, answer_heartbeats: bool) -> Harness {
        let TestContext { ctx, notifications, dir } = test_context("streamer");
        let (events, receiver) = event_queue();
        if answer_heartbeats {
            client.pong = Some(events.clone());
        }
        let log = client.log.clone();
        let credentials = Credentials {
            channel: "streamer".into(),
            username: "modbot".into(),
            token: "oauth:token".into(),
        };
        let bot = ChatBot::new(
            CoreConfig::default(),
            credentials,
            Box::new(client),
            ctx,
            receiver,
            TaskScheduler::start(),
        );
        Harness {
            bot,
            events,
            log,
            notifications,
            _dir: dir,
        }
    }

    fn stop_after(bot: &ChatBot, after: Duration) {
        let shutdown = bot.shutdown_signal();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            shutdown.trigger();
        });
    }

    fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    fn message(name: &str, text: &str) -> EventKind {
        EventKind::Message {
            sender: Sender::named(name),
            text: text.into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_failure_is_fatal() {
        let client = MockClient {
            connect_results: VecDeque::from([Err(ConnectError::LoginFailed("Login authentication failed".into()))]),
            ..Default::default()
        };
        let mut h = harness(client, false);

        let result = h.bot.run().await;
        assert_eq!(result, Err(CoreError::LoginFailed("Login authentication failed".into())));

        let log = h.log.lock().clone();
        assert_eq!(log.iter().filter(|l| l.starts_with("connect")).count(), 1);
        let notifications = drain(&mut h.notifications);
        assert!(!notifications.contains(&Notification::Connected));
        assert_eq!(notifications.last(), Some(&Notification::EndShutdown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let client = MockClient {
            connect_results: VecDeque::from([Err(anyhow::anyhow!("connection refused").into())]),
            ..Default::default()
        };
        let mut h = harness(client, false);
        stop_after(&h.bot, Duration::from_secs(15));

        assert_eq!(h.bot.run().await, Ok(()));
        let log = h.log.lock().clone();
        assert_eq!(log.iter().filter(|l| l.starts_with("connect")).count(), 2);
        assert!(log.contains(&"join:streamer".to_string()));
        let connected = drain(&mut h.notifications)
            .into_iter()
            .filter(|n| *n == Notification::Connected)
            .count();
        assert_eq!(connected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_reachability() {
        let mut h = harness(MockClient::default(), false);
        let network = Arc::new(FlakyNetwork {
            failures_left: AtomicUsize::new(2),
        });
        h.bot = h.bot.with_reachability(network);

        let started = Instant::now();
        let shutdown = h.bot.shutdown_signal();
        let log = h.log.clone();
        tokio::spawn(async move {
            while !log.lock().iter().any(|l| l.starts_with("join")) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            shutdown.trigger();
        });

        h.bot.run().await.unwrap();
        // two failed reachability checks at the default 5s interval
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_routes_commands_and_moderation() {
        let mut h = harness(MockClient::default(), false);
        h.bot
            .register_command(&["ping"], AccessLevel::Normal, |ctx, _inv| {
                ctx.chat.send_response("pong");
                Ok(())
            })
            .unwrap();

        h.events.send(message("viewer", "!ping"));
        h.events.send(message("viewer", "visit example.com"));
        h.events.send(message("viewer", "!nosuchcommand"));
        stop_after(&h.bot, Duration::from_secs(1));
        h.bot.run().await.unwrap();

        let log = h.log.lock().clone();
        assert!(log.contains(&"say:pong".to_string()), "{:?}", log);
        assert!(log.contains(&"timeout:viewer:1".to_string()), "{:?}", log);
        assert!(h.bot.context().users.get("viewer").is_some());

        let notifications = drain(&mut h.notifications);
        assert!(notifications.iter().any(|n| matches!(n, Notification::UnknownCommand { name, .. } if name == "nosuchcommand")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_and_denied_commands_are_moderated() {
        let mut h = harness(MockClient::default(), false);
        h.bot
            .register_command(&["secret"], AccessLevel::Mod, |ctx, _inv| {
                ctx.chat.send_response("mods only");
                Ok(())
            })
            .unwrap();
        h.bot.context().moderation.lists().banlist.add("scam.com").unwrap();

        h.events.send(message("spammer", "!x buy followers at scam.com"));
        h.events.send(message("sneaky", "!secret buy followers at scam.com"));
        h.events.send(message("spammer2", "buy followers at scam.com"));
        stop_after(&h.bot, Duration::from_secs(1));
        h.bot.run().await.unwrap();

        let log = h.log.lock().clone();
        let bans: Vec<_> = log.iter().filter(|l| l.starts_with("ban:")).cloned().collect();
        assert_eq!(bans, vec!["ban:spammer", "ban:sneaky", "ban:spammer2"]);
        assert!(!log.contains(&"say:mods only".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_events_update_context() {
        let mut h = harness(MockClient::default(), false);
        h.events.send(EventKind::StreamOnline {
            title: "Speedruns".into(),
            game: "Celeste".into(),
        });
        h.events.send(EventKind::ViewerCountChanged { count: 42 });
        h.events.send(EventKind::ModeratorChanged {
            user: "helper".into(),
            is_mod: true,
        });
        h.events.send(EventKind::Action {
            sender: Sender::named("faker"),
            text: "just subscribed!".into(),
        });
        stop_after(&h.bot, Duration::from_secs(1));
        h.bot.run().await.unwrap();

        let ctx = h.bot.context();
        assert!(ctx.stream.live);
        assert_eq!(ctx.stream.viewers, 42);
        assert_eq!(ctx.stream.game, "Celeste");
        assert!(ctx.users.get("helper").unwrap().moderator);

        let notifications = drain(&mut h.notifications);
        assert!(notifications.contains(&Notification::ViewerCountChanged { count: 42 }));
        assert!(notifications.contains(&Notification::FakeSubscription { user: "faker".into() }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_connection_reconnects() {
        let mut h = harness(MockClient::default(), false);
        stop_after(&h.bot, Duration::from_secs(70));
        h.bot.run().await.unwrap();

        let log = h.log.lock().clone();
        assert_eq!(log.iter().filter(|l| l.starts_with("connect")).count(), 2, "{:?}", log);
        assert!(log.iter().filter(|l| *l == "heartbeat").count() >= 2, "{:?}", log);

        let notifications: Vec<_> = drain(&mut h.notifications)
            .into_iter()
            .filter(|n| !matches!(n, Notification::Tick(_)))
            .collect();
        assert_eq!(
            notifications[..3],
            [Notification::Connected, Notification::Disconnected, Notification::Connected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_heartbeats_keep_connection() {
        let mut h = harness(MockClient::default(), true);
        stop_after(&h.bot, Duration::from_secs(130));
        h.bot.run().await.unwrap();

        let log = h.log.lock().clone();
        assert_eq!(log.iter().filter(|l| l.starts_with("connect")).count(), 1, "{:?}", log);
        assert!(log.iter().filter(|l| *l == "heartbeat").count() >= 5, "{:?}", log);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_and_shutdown_order() {
        let mut h = harness(MockClient::default(), false);
        stop_after(&h.bot, Duration::from_secs(12));
        h.bot.run().await.unwrap();

        let notifications = drain(&mut h.notifications);
        let ticks = notifications.iter().filter(|n| matches!(n, Notification::Tick(_))).count();
        assert_eq!(ticks, 2);
        assert!(notifications.iter().all(|n| match n {
            Notification::Tick(elapsed) => *elapsed >= Duration::from_secs(5),
            _ => true,
        }));

        let tail = &notifications[notifications.len() - 3..];
        assert_eq!(
            tail,
            [Notification::BeginShutdown, Notification::Disconnected, Notification::EndShutdown]
        );
        assert_eq!(h.log.lock().last().map(String::as_str), Some("disconnect"));
        assert_eq!(h.bot.state(), ConnectionState::Disconnected);
    }
}
