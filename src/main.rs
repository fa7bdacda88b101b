use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

use modbot::bot::{core_commands, moderation_commands};
use modbot::platforms::helix::HelixStatusSource;
use modbot::platforms::poller::StatusPoller;
use modbot::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("Starting modbot v{}", modbot::VERSION);

    let config_path = PathBuf::from(env::var("MODBOT_CONFIG").unwrap_or_else(|_| "modbot.toml".to_string()));
    let config = BotConfig::load(&config_path).await?;
    config.twitch.validate().context("Twitch credentials are incomplete")?;

    let shutdown = ShutdownSignal::new();
    shutdown.install_signal_handlers();

    let scheduler = TaskScheduler::start();
    let (events, receiver) = event_queue();

    // Persistent state, loaded in the background and flushed by the scheduler
    let regulars = AutosaveStore::open("regulars", config.storage.file("regulars.txt"), &scheduler);
    let commands = AutosaveStore::open("commands", config.storage.file("commands.txt"), &scheduler);
    let lists = ModerationLists::open(&config.storage, &scheduler);

    let moderation = ModerationEngine::new(
        config.moderation.clone(),
        lists,
        Arc::new(StaticEmoteCatalog::with_global_defaults()),
    )?;

    let (notifications, _) = broadcast::channel(256);
    let ctx = BotContext::new(
        UserRegistry::new(&config.twitch.channel).with_regulars(regulars),
        Outbound::new(OutputModes::new()),
        moderation,
        CustomCommands::new(commands),
        notifications,
    );

    let client = TwitchClient::new(&config.twitch, events.clone());
    let credentials = Credentials {
        channel: config.twitch.channel.clone(),
        username: config.twitch.username.clone(),
        token: config.twitch.oauth_token.clone(),
    };

    let mut bot = ChatBot::new(config.core.clone(), credentials, Box::new(client), ctx, receiver, scheduler)
        .with_reachability(Arc::new(TcpReachability::new(&config.twitch.reachability_address)))
        .with_shutdown(shutdown.clone());

    core_commands::register(bot.registry_mut())?;
    moderation_commands::register(bot.registry_mut())?;
    CustomCommands::register(bot.registry_mut())?;

    let poller = if config.poller.enabled {
        let source = HelixStatusSource::new(&config.poller, &config.twitch.oauth_token);
        let poller = StatusPoller::new(Arc::new(source), &config.twitch.channel, events, config.poller.poll_interval());
        Some(poller.spawn(shutdown.clone()))
    } else {
        info!("Stream status polling disabled");
        None
    };

    let mut notifications = bot.subscribe();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(Notification::Tick(_)) => {}
                Ok(Notification::EndShutdown) => break,
                Ok(notification) => debug!("Notification: {:?}", notification),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Notification listener lagged by {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let result = bot.run().await;

    // The poller also stops on its own when the event loop goes away
    shutdown.trigger();
    if let Some(handle) = poller {
        if let Err(e) = handle.await {
            warn!("Status poller ended abnormally: {}", e);
        }
    }

    match result {
        Ok(()) => {
            info!("modbot stopped");
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            Err(e.into())
        }
    }
}
