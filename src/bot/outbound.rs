// src/bot/outbound.rs - Outbound chat actions and the modes that gate them

use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Host-togglable output gates. All default to off.
///
/// - `silent`: no bot-authored chat output at all
/// - `quiet`: no informational responses; enforcement messages still go out
/// - `passive`: no timeouts or bans; moderation only observes
#[derive(Debug, Default)]
pub struct OutputModes {
    silent: AtomicBool,
    quiet: AtomicBool,
    passive: AtomicBool,
}

impl OutputModes {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_silent(&self) -> bool {
        self.silent.load(Ordering::Relaxed)
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet.load(Ordering::Relaxed)
    }

    pub fn is_passive(&self) -> bool {
        self.passive.load(Ordering::Relaxed)
    }

    pub fn set_silent(&self, on: bool) {
        self.silent.store(on, Ordering::Relaxed);
        info!(target: "core", "Silent mode {}", if on { "enabled" } else { "disabled" });
    }

    pub fn set_quiet(&self, on: bool) {
        self.quiet.store(on, Ordering::Relaxed);
        info!(target: "core", "Quiet mode {}", if on { "enabled" } else { "disabled" });
    }

    pub fn set_passive(&self, on: bool) {
        self.passive.store(on, Ordering::Relaxed);
        info!(target: "core", "Passive mode {}", if on { "enabled" } else { "disabled" });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    Message(String),
    Timeout { user: String, seconds: u64 },
    Ban { user: String },
}

/// Actions produced on the event loop, flushed to the chat client after each batch
pub struct Outbound {
    modes: Arc<OutputModes>,
    pending: Vec<OutboundAction>,
}

impl Outbound {
    pub fn new(modes: Arc<OutputModes>) -> Self {
        Self {
            modes,
            pending: Vec::new(),
        }
    }

    pub fn modes(&self) -> &Arc<OutputModes> {
        &self.modes
    }

    /// Bot-authored chat text such as enforcement notices. Suppressed only in silent mode.
    pub fn send_message(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if self.modes.is_silent() {
            debug!(target: "core", "Silent, dropping message: {}", text);
            return false;
        }
        self.pending.push(OutboundAction::Message(text));
        true
    }

    /// Informational reply to a command. Suppressed in silent and quiet mode.
    pub fn send_response(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if self.modes.is_quiet() {
            debug!(target: "core", "Quiet, dropping response: {}", text);
            return false;
        }
        self.send_message(text)
    }

    pub fn timeout(&mut self, user: &str, seconds: u64) -> bool {
        if self.modes.is_passive() {
            info!(target: "core", "Passive, not timing out {} for {}s", user, seconds);
            return false;
        }
        self.pending.push(OutboundAction::Timeout {
            user: user.to_string(),
            seconds,
        });
        true
    }

    pub fn ban(&mut self, user: &str) -> bool {
        if self.modes.is_passive() {
            info!(target: "core", "Passive, not banning {}", user);
            return false;
        }
        self.pending.push(OutboundAction::Ban { user: user.to_string() });
        true
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Take every queued action, oldest first
    pub fn take(&mut self) -> Vec<OutboundAction> {
        std::mem::take(&mut self.pending)
    }
}
