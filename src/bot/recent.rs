// src/bot/recent.rs - Fixed-size history of recent clean messages

use std::collections::VecDeque;

use crate::types::User;

pub const RECENT_CAPACITY: usize = 32;

/// Circular buffer of (user, lowercased text); the newest entry replaces the oldest
#[derive(Debug)]
pub struct RecentMessageRing {
    entries: VecDeque<(User, String)>,
    capacity: usize,
}

impl Default for RecentMessageRing {
    fn default() -> Self {
        Self::with_capacity(RECENT_CAPACITY)
    }
}

impl RecentMessageRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, user: User, text: &str) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((user, text.to_lowercase()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(User, String)> {
        self.entries.iter()
    }

    /// Remove every entry containing `needle` (case-insensitive) and return
    /// the distinct users who wrote them, in first-seen order
    pub fn drain_matching(&mut self, needle: &str) -> Vec<User> {
        let needle = needle.to_lowercase();
        let mut users: Vec<User> = Vec::new();

        self.entries.retain(|(user, text)| {
            if !text.contains(&needle) {
                return true;
            }
            if !users.iter().any(|seen| seen.name == user.name) {
                users.push(user.clone());
            }
            false
        });

        users
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
