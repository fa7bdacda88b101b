// src/bot/emotes.rs - Emote lookup used by the emote-spam check

use std::collections::{HashMap, HashSet};

/// Emote set every user has access to
pub const GLOBAL_EMOTE_SET: u32 = 0;

/// Source of emote names, keyed by emote set
pub trait EmoteCatalog: Send + Sync {
    /// Whether `text` uses more than `max` emotes available to a user with `emote_sets`
    fn too_many_symbols(&self, text: &str, max: usize, emote_sets: &[u32]) -> bool;
}

/// In-memory catalog
#[derive(Debug, Default, Clone)]
pub struct StaticEmoteCatalog {
    sets: HashMap<u32, HashSet<String>>,
}

impl StaticEmoteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with common global emotes and text smileys
    pub fn with_global_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.add_set(
            GLOBAL_EMOTE_SET,
            [
                ":)", ":(", ":D", ":P", ":o", ":O", ";)", "<3", "B)", "R)", ":/", ":|",
                "Kappa", "Keepo", "PogChamp", "LUL", "BibleThump", "ResidentSleeper",
                "Kreygasm", "4Head", "DansGame", "FailFish", "NotLikeThis", "SeemsGood",
                "VoHiYo", "WutFace", "CoolCat", "HeyGuys", "BabyRage", "TriHard",
            ],
        );
        catalog
    }

    pub fn add_set<I, S>(&mut self, set: u32, emotes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sets
            .entry(set)
            .or_default()
            .extend(emotes.into_iter().map(Into::into));
    }

    fn is_emote(&self, token: &str, emote_sets: &[u32]) -> bool {
        std::iter::once(&GLOBAL_EMOTE_SET)
            .chain(emote_sets.iter())
            .filter_map(|set| self.sets.get(set))
            .any(|emotes| emotes.contains(token))
    }

    pub fn count_emotes(&self, text: &str, emote_sets: &[u32]) -> usize {
        text.split_whitespace()
            .filter(|token| self.is_emote(token, emote_sets))
            .count()
    }
}

impl EmoteCatalog for StaticEmoteCatalog {
    fn too_many_symbols(&self, text: &str, max: usize, emote_sets: &[u32]) -> bool {
        self.count_emotes(text, emote_sets) > max
    }
}
