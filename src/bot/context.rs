// src/bot/context.rs - State owned by the event loop and handed to every handler

use log::debug;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::bot::custom_commands::CustomCommands;
use crate::bot::moderation::ModerationEngine;
use crate::bot::outbound::Outbound;
use crate::bot::users::UserRegistry;
use crate::types::Notification;

/// Last known stream status as reported by the poller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    pub live: bool,
    pub viewers: u32,
    pub title: String,
    pub game: String,
}

/// Everything command handlers and moderation touch.
///
/// Lives on the event loop task only, so none of it is locked.
pub struct BotContext {
    pub channel: String,
    pub started_at: Instant,
    pub users: UserRegistry,
    pub chat: Outbound,
    pub moderation: ModerationEngine,
    pub custom_commands: CustomCommands,
    pub stream: StreamState,
    notifications: broadcast::Sender<Notification>,
}

impl BotContext {
    pub fn new(
        users: UserRegistry,
        chat: Outbound,
        moderation: ModerationEngine,
        custom_commands: CustomCommands,
        notifications: broadcast::Sender<Notification>,
    ) -> Self {
        Self {
            channel: users.channel().to_string(),
            started_at: Instant::now(),
            users,
            chat,
            moderation,
            custom_commands,
            stream: StreamState::default(),
            notifications,
        }
    }

    /// Broadcast to host subscribers; having none is fine
    pub fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            debug!(target: "core", "No notification subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::bot::autosave::AutosaveStore;
    use crate::bot::emotes::StaticEmoteCatalog;
    use crate::bot::moderation::ModerationLists;
    use crate::bot::outbound::OutputModes;
    use crate::config::ModerationConfig;
    use std::sync::Arc;

    /// A context backed by a temporary directory, for handler tests
    pub struct TestContext {
        pub ctx: BotContext,
        pub notifications: broadcast::Receiver<Notification>,
        pub dir: tempfile::TempDir,
    }

    pub fn test_context(channel: &str) -> TestContext {
        let dir = tempfile::tempdir().unwrap();
        let regulars = AutosaveStore::new("regulars", dir.path().join("regulars.txt"));
        let users = UserRegistry::new(channel).with_regulars(regulars);
        let moderation = ModerationEngine::new(
            ModerationConfig::default(),
            ModerationLists::unscheduled(dir.path()),
            Arc::new(StaticEmoteCatalog::with_global_defaults()),
        )
        .unwrap();
        let custom_commands = CustomCommands::new(AutosaveStore::new("commands", dir.path().join("commands.txt")));
        let (tx, rx) = broadcast::channel(64);

        TestContext {
            ctx: BotContext::new(users, Outbound::new(OutputModes::new()), moderation, custom_commands, tx),
            notifications: rx,
            dir,
        }
    }
}
