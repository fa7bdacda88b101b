// src/bot/users.rs - Lazily populated registry of chat participants

use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

use crate::bot::autosave::AutosaveStore;
use crate::types::{Sender, User};

/// Every user seen this session, keyed by lowercase name.
///
/// Only the event loop touches the registry, so it carries no locking of its own.
/// The regulars list is shared with the autosave task and lives in an `AutosaveStore`.
pub struct UserRegistry {
    channel: String,
    users: HashMap<String, User>,
    regulars: Option<Arc<AutosaveStore<()>>>,
}

impl UserRegistry {
    pub fn new(channel: &str) -> Self {
        Self {
            channel: channel.trim_start_matches('#').to_lowercase(),
            users: HashMap::new(),
            regulars: None,
        }
    }

    pub fn with_regulars(mut self, regulars: Arc<AutosaveStore<()>>) -> Self {
        self.regulars = Some(regulars);
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn get(&self, name: &str) -> Option<&User> {
        self.users.get(&name.to_lowercase())
    }

    /// Look a user up, creating it on first sighting
    pub fn get_or_create(&mut self, name: &str) -> &mut User {
        let key = name.to_lowercase();
        let is_regular = self.is_regular(&key);
        let channel = &self.channel;
        let user = self.users.entry(key).or_insert_with_key(|key| {
            debug!(target: "core", "New user '{}'", key);
            let mut user = User::new(key);
            user.streamer = key == channel;
            user
        });
        user.regular = is_regular;
        user
    }

    /// Register or refresh a user from the tags attached to an inbound event
    pub fn resolve(&mut self, sender: &Sender) -> &User {
        let user = self.get_or_create(&sender.name);
        if let Some(id) = sender.id {
            user.id = id;
        }
        if let Some(moderator) = sender.moderator {
            user.moderator = moderator;
        }
        if let Some(subscriber) = sender.subscriber {
            user.subscriber = subscriber;
        }
        if let Some(turbo) = sender.turbo {
            user.turbo = turbo;
        }
        if let Some(sets) = &sender.emote_sets {
            user.emote_sets = sets.clone();
        }
        user
    }

    pub fn is_regular(&self, name: &str) -> bool {
        self.regulars
            .as_ref()
            .map_or(false, |regulars| regulars.contains(&name.to_lowercase()))
    }

    /// Add or remove a name from the persisted regulars list. Returns whether anything changed.
    pub fn set_regular(&mut self, name: &str, regular: bool) -> bool {
        let key = name.to_lowercase();
        let changed = match &self.regulars {
            Some(regulars) if regular => regulars.set(&key, ()).is_none(),
            Some(regulars) => regulars.remove(&key).is_some(),
            None => false,
        };
        if let Some(user) = self.users.get_mut(&key) {
            user.regular = self.regulars.is_some() && regular;
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
