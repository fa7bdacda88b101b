// src/bot/escalation.rs - Repeat-offender bookkeeping and the timeout escalation table

use tokio::time::{Duration, Instant};

/// One offense is forgiven per full period without a new one
pub const DECAY_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Minimum gap between public warnings to the same user
pub const WARNING_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// A one-second timeout: deletes the message without really punishing
pub const SOFT_CLEAR_SECONDS: u64 = 1;

/// Timeout length for the Nth offense inside the decay window
pub fn escalation_duration(count: u32) -> u64 {
    match count {
        0..=2 => SOFT_CLEAR_SECONDS,
        3 => 300,
        4 => 600,
        _ => 28_800,
    }
}

/// Per-user offense history
#[derive(Debug, Clone)]
pub struct TimeoutRecord {
    pub count: u32,
    pub last_timeout: Instant,
    pub last_warning: Option<Instant>,
}

impl TimeoutRecord {
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            last_timeout: now,
            last_warning: None,
        }
    }

    /// Count after decay: minus one for every full period since the last timeout, floored at zero
    pub fn effective_count(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.last_timeout);
        let periods = elapsed.as_secs() / DECAY_PERIOD.as_secs();
        let periods = u32::try_from(periods).unwrap_or(u32::MAX);
        self.count.saturating_sub(periods)
    }

    /// Register a new offense and return the resulting count
    pub fn record_offense(&mut self, now: Instant) -> u32 {
        self.count = self.effective_count(now) + 1;
        self.last_timeout = now;
        self.count
    }

    /// Whether a public warning may be sent now; claims the slot when it may
    pub fn should_message(&mut self, now: Instant) -> bool {
        match self.last_warning {
            Some(at) if now.saturating_duration_since(at) < WARNING_COOLDOWN => false,
            _ => {
                self.last_warning = Some(now);
                true
            }
        }
    }
}

/// Human-readable duration for chat notices
pub fn describe_duration(seconds: u64) -> String {
    if seconds >= 3600 && seconds % 3600 == 0 {
        format!("{}h", seconds / 3600)
    } else if seconds >= 60 && seconds % 60 == 0 {
        format!("{}m", seconds / 60)
    } else {
        format!("{}s", seconds)
    }
}
