//! # modbot
//!
//! A chat moderation and automation bot for a single live-stream channel.
//!
//! ## Features
//!
//! - **Single-consumer event core**: network and polling tasks only enqueue; one loop
//!   dispatches commands and runs moderation in arrival order
//! - **Reconnect state machine**: reachability probing, heartbeats and idle reconnects,
//!   with login failures surfaced as a fatal error
//! - **Access-controlled commands**: aliases, typed argument parsing and user-defined
//!   text commands
//! - **Moderation engine**: ordered rule chain with escalating timeouts that decay over time
//! - **Autosave**: plain-text lists flushed in the background by a periodic task scheduler
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modbot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BotConfig::load(std::path::Path::new("modbot.toml")).await?;
//!     let scheduler = TaskScheduler::start();
//!     let (events, receiver) = event_queue();
//!
//!     let lists = ModerationLists::open(&config.storage, &scheduler);
//!     let moderation = ModerationEngine::new(
//!         config.moderation.clone(),
//!         lists,
//!         std::sync::Arc::new(StaticEmoteCatalog::with_global_defaults()),
//!     )?;
//!     let commands = AutosaveStore::open("commands", config.storage.file("commands.txt"), &scheduler);
//!     let (notifications, _) = tokio::sync::broadcast::channel(256);
//!     let ctx = BotContext::new(
//!         UserRegistry::new(&config.twitch.channel),
//!         Outbound::new(OutputModes::new()),
//!         moderation,
//!         CustomCommands::new(commands),
//!         notifications,
//!     );
//!
//!     let client = TwitchClient::new(&config.twitch, events);
//!     let credentials = Credentials {
//!         channel: config.twitch.channel.clone(),
//!         username: config.twitch.username.clone(),
//!         token: config.twitch.oauth_token.clone(),
//!     };
//!     let mut bot = ChatBot::new(config.core.clone(), credentials, Box::new(client), ctx, receiver, scheduler);
//!     bot.register_command(&["hello"], AccessLevel::Normal, |ctx, inv| {
//!         ctx.chat.send_response(format!("Hello {}!", inv.user.name));
//!         Ok(())
//!     })?;
//!
//!     bot.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod platforms;
pub mod types;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::autosave::{AutosaveStore, Record};
    pub use crate::bot::commands::{CommandRegistry, DispatchOutcome, Invocation};
    pub use crate::bot::context::BotContext;
    pub use crate::bot::custom_commands::CustomCommands;
    pub use crate::bot::emotes::{EmoteCatalog, StaticEmoteCatalog};
    pub use crate::bot::moderation::{ModerationEngine, ModerationLists, Verdict};
    pub use crate::bot::outbound::{Outbound, OutputModes};
    pub use crate::bot::queue::{event_queue, EventSender};
    pub use crate::bot::scheduler::{PeriodicTask, TaskScheduler};
    pub use crate::bot::shutdown::ShutdownSignal;
    pub use crate::bot::users::UserRegistry;
    pub use crate::bot::{ChatBot, ConnectionState, CoreError, Credentials};
    pub use crate::config::BotConfig;
    pub use crate::platforms::{
        twitch::TwitchClient, AlwaysReachable, ChatClient, ConnectError, Reachability, TcpReachability,
    };
    pub use crate::types::{AccessLevel, Event, EventKind, Notification, User};
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
