// src/types/mod.rs - Shared data model for the event core, commands and moderation

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Ordered privilege tier used to gate command execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    Normal,
    Regular,
    Subscriber,
    Mod,
    Streamer,
}

impl Default for AccessLevel {
    fn default() -> Self {
        AccessLevel::Normal
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" | "everyone" | "n" => Ok(AccessLevel::Normal),
            "regular" | "reg" | "r" => Ok(AccessLevel::Regular),
            "subscriber" | "sub" | "s" => Ok(AccessLevel::Subscriber),
            "mod" | "moderator" | "m" => Ok(AccessLevel::Mod),
            "streamer" | "owner" | "broadcaster" => Ok(AccessLevel::Streamer),
            other => Err(format!("unknown access level '{}'", other)),
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessLevel::Normal => "normal",
            AccessLevel::Regular => "regular",
            AccessLevel::Subscriber => "sub",
            AccessLevel::Mod => "mod",
            AccessLevel::Streamer => "streamer",
        };
        f.write_str(name)
    }
}

/// A chat participant. Identity is the lowercase name; role flags change over time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub id: u64,
    pub moderator: bool,
    pub subscriber: bool,
    pub turbo: bool,
    pub regular: bool,
    pub streamer: bool,
    pub emote_sets: Vec<u32>,
}

impl User {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            id: 0,
            moderator: false,
            subscriber: false,
            turbo: false,
            regular: false,
            streamer: false,
            emote_sets: Vec::new(),
        }
    }

    /// Highest tier granted by the user's current flags
    pub fn access_level(&self) -> AccessLevel {
        if self.streamer {
            AccessLevel::Streamer
        } else if self.moderator {
            AccessLevel::Mod
        } else if self.subscriber {
            AccessLevel::Subscriber
        } else if self.regular {
            AccessLevel::Regular
        } else {
            AccessLevel::Normal
        }
    }

    pub fn has_access(&self, required: AccessLevel) -> bool {
        self.access_level() >= required
    }
}

/// Identity and role tags attached by a collaborator to an inbound event.
///
/// Flags left as `None` were not present on the wire and leave the
/// registered user's current value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    pub name: String,
    pub id: Option<u64>,
    pub moderator: Option<bool>,
    pub subscriber: Option<bool>,
    pub turbo: Option<bool>,
    pub emote_sets: Option<Vec<u32>>,
}

impl Sender {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            ..Default::default()
        }
    }
}

/// Inbound event as queued by collaborator tasks
#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Message { sender: Sender, text: String },
    Action { sender: Sender, text: String },
    ChatClear { user: Option<String> },
    ModeratorChanged { user: String, is_mod: bool },
    Subscribed { user: String },
    Followed { user: String },
    ViewerCountChanged { count: u32 },
    StreamOnline { title: String, game: String },
    StreamOffline,
    /// Reply to a heartbeat; only refreshes liveness
    Pong,
}

/// Host-visible notifications broadcast by the event core
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Connected,
    Disconnected,
    Tick(Duration),
    BeginShutdown,
    EndShutdown,
    ChatCleared { user: Option<String> },
    ModeratorChanged { user: String, is_mod: bool },
    Subscribed { user: String },
    Followed { user: String },
    ViewerCountChanged { count: u32 },
    StreamOnline { title: String, game: String },
    StreamOffline,
    UnknownCommand { user: String, name: String, args: String },
    CommandDenied { user: String, name: String },
    FakeSubscription { user: String },
}
