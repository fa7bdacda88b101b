// src/bot/moderation.rs - Per-message rule chain with escalating timeouts

use anyhow::Result;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::time::Instant;

use crate::bot::autosave::AutosaveStore;
use crate::bot::emotes::EmoteCatalog;
use crate::bot::escalation::{describe_duration, escalation_duration, TimeoutRecord, SOFT_CLEAR_SECONDS};
use crate::bot::outbound::Outbound;
use crate::bot::pattern_matching::{PatternList, UrlExtractor};
use crate::bot::recent::RecentMessageRing;
use crate::bot::scheduler::TaskScheduler;
use crate::config::{ModerationConfig, StorageConfig};
use crate::types::{AccessLevel, User};

const FAKE_SUB_PHRASE: &str = "just subscribed";

/// Non-ASCII symbols accepted by the character check
const ALLOWED_SYMBOLS: &[char] = &['€', '£', '¥', '¢', '°', '©', '®', '™', '♥', '❤', '☺', '♪', '♫', '•'];

/// Why a message was enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    SpamPhrase,
    BannedUrl,
    Link,
    BannedWord,
    Symbols,
    Caps,
    Emotes,
    Length,
    FakeSubscription,
    Purge,
}

impl Rule {
    /// Phrase used in the public warning
    pub fn reason(&self) -> &'static str {
        match self {
            Rule::SpamPhrase => "that phrase is not allowed",
            Rule::BannedUrl => "that link is banned",
            Rule::Link => "please ask a moderator before posting links",
            Rule::BannedWord => "watch your language",
            Rule::Symbols => "please don't use special characters",
            Rule::Caps => "please don't use so many caps",
            Rule::Emotes => "please don't spam emotes",
            Rule::Length => "your message is too long",
            Rule::FakeSubscription => "nice try, fake subscriptions are not allowed",
            Rule::Purge => "purged",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rule::SpamPhrase => "spam phrase",
            Rule::BannedUrl => "banned url",
            Rule::Link => "link",
            Rule::BannedWord => "banned word",
            Rule::Symbols => "symbols",
            Rule::Caps => "caps",
            Rule::Emotes => "emotes",
            Rule::Length => "length",
            Rule::FakeSubscription => "fake subscription",
            Rule::Purge => "purge",
        };
        f.write_str(name)
    }
}

/// Outcome of checking one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Moderators and the streamer are never checked
    Exempt,
    Clean,
    TimedOut { rule: Rule, seconds: u64 },
    Banned { rule: Rule },
}

impl Verdict {
    pub fn is_enforced(&self) -> bool {
        matches!(self, Verdict::TimedOut { .. } | Verdict::Banned { .. })
    }

    pub fn rule(&self) -> Option<Rule> {
        match self {
            Verdict::TimedOut { rule, .. } | Verdict::Banned { rule } => Some(*rule),
            _ => None,
        }
    }
}

/// Rule switches that operators can flip from chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleToggle {
    Links,
    Words,
    Symbols,
    Caps,
    Emotes,
    Length,
    FakeSubscriptions,
}

/// How a timeout is announced in chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announce {
    Default,
    Custom(String),
    Silent,
}

/// A phrase that is punished on sight, outside the escalation table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpamPhrase {
    phrase: String,
    pub ban: bool,
    pub duration: u64,
}

impl SpamPhrase {
    pub fn new(phrase: &str, ban: bool, duration: u64) -> Self {
        Self {
            phrase: phrase.trim().to_lowercase(),
            ban,
            duration,
        }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }
}

/// Persisted allow/deny lists used by the engine
pub struct ModerationLists {
    /// Users who may always post links
    pub link_allowed: Arc<AutosaveStore<()>>,
    /// Users who may never post links
    pub link_denied: Arc<AutosaveStore<()>>,
    pub whitelist: PatternList,
    pub blacklist: PatternList,
    pub banlist: PatternList,
    pub words: PatternList,
}

impl ModerationLists {
    /// Open every list under the data directory, registered for autosave
    pub fn open(storage: &StorageConfig, scheduler: &TaskScheduler) -> Self {
        let store = |name: &str| -> Arc<AutosaveStore<()>> {
            AutosaveStore::open(name, storage.file(&format!("{}.txt", name)), scheduler)
        };
        Self::from_stores(store)
    }

    /// Lists that start empty and are only written when saved explicitly
    pub fn unscheduled(dir: &Path) -> Self {
        let store = |name: &str| -> Arc<AutosaveStore<()>> { AutosaveStore::new(name, dir.join(format!("{}.txt", name))) };
        Self::from_stores(store)
    }

    fn from_stores(store: impl Fn(&str) -> Arc<AutosaveStore<()>>) -> Self {
        Self {
            link_allowed: store("link_allowed"),
            link_denied: store("link_denied"),
            whitelist: PatternList::new("whitelist", store("whitelist"), true),
            blacklist: PatternList::new("blacklist", store("blacklist"), true),
            banlist: PatternList::new("banlist", store("banlist"), true),
            words: PatternList::new("banned_words", store("banned_words"), false),
        }
    }
}

pub struct ModerationEngine {
    settings: ModerationConfig,
    emotes: Arc<dyn EmoteCatalog>,
    urls: UrlExtractor,
    lists: ModerationLists,
    timeouts: HashMap<String, TimeoutRecord>,
    permits: HashSet<String>,
    recent: RecentMessageRing,
    spam_phrase: Option<SpamPhrase>,
}

impl ModerationEngine {
    pub fn new(settings: ModerationConfig, lists: ModerationLists, emotes: Arc<dyn EmoteCatalog>) -> Result<Self> {
        let spam_phrase = settings
            .spam_phrase
            .as_deref()
            .filter(|phrase| !phrase.trim().is_empty())
            .map(|phrase| SpamPhrase::new(phrase, settings.spam_phrase_ban, settings.spam_phrase_duration));

        Ok(Self {
            settings,
            emotes,
            urls: UrlExtractor::new()?,
            lists,
            timeouts: HashMap::new(),
            permits: HashSet::new(),
            recent: RecentMessageRing::default(),
            spam_phrase,
        })
    }

    pub fn settings(&self) -> &ModerationConfig {
        &self.settings
    }

    pub fn lists(&self) -> &ModerationLists {
        &self.lists
    }

    pub fn lists_mut(&mut self) -> &mut ModerationLists {
        &mut self.lists
    }

    pub fn recent(&self) -> &RecentMessageRing {
        &self.recent
    }

    pub fn spam_phrase(&self) -> Option<&SpamPhrase> {
        self.spam_phrase.as_ref()
    }

    pub fn set_spam_phrase(&mut self, spam: Option<SpamPhrase>) {
        match &spam {
            Some(spam) => info!(
                target: "moderation",
                "Spam phrase set to '{}' ({})", spam.phrase,
                if spam.ban { "ban".to_string() } else { format!("timeout {}s", spam.duration) }
            ),
            None => info!(target: "moderation", "Spam phrase cleared"),
        }
        self.spam_phrase = spam;
    }

    pub fn set_mode(&mut self, toggle: RuleToggle, enabled: bool) {
        let flag = match toggle {
            RuleToggle::Links => &mut self.settings.links,
            RuleToggle::Words => &mut self.settings.words,
            RuleToggle::Symbols => &mut self.settings.symbols,
            RuleToggle::Caps => &mut self.settings.caps,
            RuleToggle::Emotes => &mut self.settings.emotes,
            RuleToggle::Length => &mut self.settings.length,
            RuleToggle::FakeSubscriptions => &mut self.settings.fake_subscriptions,
        };
        *flag = enabled;
        info!(target: "moderation", "{:?} check {}", toggle, if enabled { "enabled" } else { "disabled" });
    }

    pub fn mode(&self, toggle: RuleToggle) -> bool {
        match toggle {
            RuleToggle::Links => self.settings.links,
            RuleToggle::Words => self.settings.words,
            RuleToggle::Symbols => self.settings.symbols,
            RuleToggle::Caps => self.settings.caps,
            RuleToggle::Emotes => self.settings.emotes,
            RuleToggle::Length => self.settings.length,
            RuleToggle::FakeSubscriptions => self.settings.fake_subscriptions,
        }
    }

    /// Allow `name` to post links exactly once
    pub fn permit(&mut self, name: &str) {
        self.permits.insert(name.to_lowercase());
    }

    pub fn has_permit(&self, name: &str) -> bool {
        self.permits.contains(&name.to_lowercase())
    }

    pub fn set_link_allowed(&self, name: &str, allowed: bool) {
        let name = name.to_lowercase();
        if allowed {
            self.lists.link_denied.remove(&name);
            self.lists.link_allowed.set(&name, ());
        } else {
            self.lists.link_allowed.remove(&name);
        }
    }

    pub fn set_link_denied(&self, name: &str, denied: bool) {
        let name = name.to_lowercase();
        if denied {
            self.lists.link_allowed.remove(&name);
            self.lists.link_denied.set(&name, ());
        } else {
            self.lists.link_denied.remove(&name);
        }
    }

    fn is_link_restricted(&self, user: &User) -> bool {
        self.lists.link_denied.contains(&user.name)
            || (!self.lists.link_allowed.contains(&user.name) && user.access_level() < AccessLevel::Regular)
    }

    /// Current decayed offense count
    pub fn offense_count(&self, name: &str, now: Instant) -> u32 {
        self.timeouts
            .get(&name.to_lowercase())
            .map_or(0, |record| record.effective_count(now))
    }

    pub fn tracked_offenders(&self) -> usize {
        self.timeouts.len()
    }

    pub fn check_message(&mut self, chat: &mut Outbound, user: &User, text: &str) -> Verdict {
        self.check_message_at(chat, user, text, Instant::now())
    }

    /// Run the rule chain; the first rule that matches is enforced and the rest are skipped
    pub fn check_message_at(&mut self, chat: &mut Outbound, user: &User, text: &str, now: Instant) -> Verdict {
        if user.access_level() >= AccessLevel::Mod {
            return Verdict::Exempt;
        }

        if let Some(spam) = &self.spam_phrase {
            if text.to_lowercase().contains(spam.phrase.as_str()) {
                info!(target: "moderation", "{} used the spam phrase '{}'", user.name, spam.phrase);
                if spam.ban {
                    chat.ban(&user.name);
                    return Verdict::Banned { rule: Rule::SpamPhrase };
                }
                chat.timeout(&user.name, spam.duration);
                return Verdict::TimedOut {
                    rule: Rule::SpamPhrase,
                    seconds: spam.duration,
                };
            }
        }

        let urls = self.urls.extract(text);
        if !urls.is_empty() {
            let banlist = &mut self.lists.banlist;
            if urls.iter().any(|url| banlist.matches_any(&url.full)) {
                info!(target: "moderation", "Banning {} for a banned link", user.name);
                chat.ban(&user.name);
                return Verdict::Banned { rule: Rule::BannedUrl };
            }

            if self.settings.links && self.is_link_restricted(user) {
                let whitelist = &mut self.lists.whitelist;
                let any_allowed = urls.iter().any(|url| whitelist.matches_any(&url.full));
                let blacklist = &mut self.lists.blacklist;
                let any_blocked = urls.iter().any(|url| blacklist.matches_any(&url.full));

                if !any_allowed || any_blocked {
                    if self.permits.remove(&user.name) {
                        info!(target: "moderation", "{} used their link permit", user.name);
                    } else {
                        debug!(target: "moderation", "Link from {}: {}", user.name, urls[0].domain);
                        return self.timeout_user(chat, &user.name, Rule::Link, SOFT_CLEAR_SECONDS, Announce::Default, now);
                    }
                }
            }
        }

        if self.settings.words {
            if let Some(word) = self.lists.words.first_match(text) {
                let (min_duration, announce) = match self.settings.banned_word_timeout {
                    Some(seconds) => {
                        let message = self
                            .settings
                            .banned_word_response
                            .replace("{user}", &user.name)
                            .replace("{word}", &word);
                        (seconds, Announce::Custom(message))
                    }
                    None => (SOFT_CLEAR_SECONDS, Announce::Default),
                };
                return self.timeout_user(chat, &user.name, Rule::BannedWord, min_duration, announce, now);
            }
        }

        let rule = if self.settings.symbols && has_disallowed_chars(text, self.settings.allow_korean) {
            Some(Rule::Symbols)
        } else if self.settings.caps && self.too_many_caps(text) {
            Some(Rule::Caps)
        } else if self.settings.emotes
            && self.emotes.too_many_symbols(text, self.settings.max_emotes, &user.emote_sets)
        {
            Some(Rule::Emotes)
        } else if self.settings.length && text.chars().count() > self.length_limit(user) {
            Some(Rule::Length)
        } else {
            None
        };

        match rule {
            Some(rule) => self.timeout_user(chat, &user.name, rule, SOFT_CLEAR_SECONDS, Announce::Default, now),
            None => {
                self.recent.push(user.clone(), text);
                Verdict::Clean
            }
        }
    }

    pub fn check_action(&mut self, chat: &mut Outbound, user: &User, text: &str) -> Verdict {
        self.check_action_at(chat, user, text, Instant::now())
    }

    /// `/me` messages: fake subscription notices first, then the normal chain
    pub fn check_action_at(&mut self, chat: &mut Outbound, user: &User, text: &str, now: Instant) -> Verdict {
        if user.access_level() >= AccessLevel::Mod {
            return Verdict::Exempt;
        }

        if self.settings.fake_subscriptions && is_fake_subscription(text) {
            info!(target: "moderation", "{} posted a fake subscription notice", user.name);
            return self.timeout_user(chat, &user.name, Rule::FakeSubscription, SOFT_CLEAR_SECONDS, Announce::Default, now);
        }

        self.check_message_at(chat, user, text, now)
    }

    fn too_many_caps(&self, text: &str) -> bool {
        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        if letters < self.settings.caps_min_letters || letters == 0 {
            return false;
        }
        let upper = text.chars().filter(|c| c.is_uppercase()).count();
        upper * 100 > self.settings.caps_max_percent as usize * letters
    }

    fn length_limit(&self, user: &User) -> usize {
        if user.access_level() >= AccessLevel::Regular {
            self.settings.max_length_privileged
        } else {
            self.settings.max_length
        }
    }

    /// Apply the escalation table to `name` and queue the timeout plus any warning
    pub fn timeout_user(
        &mut self,
        chat: &mut Outbound,
        name: &str,
        rule: Rule,
        min_duration: u64,
        announce: Announce,
        now: Instant,
    ) -> Verdict {
        let record = self
            .timeouts
            .entry(name.to_string())
            .or_insert_with(|| TimeoutRecord::new(now));
        let count = record.record_offense(now);
        let seconds = escalation_duration(count).max(min_duration);

        let warning = match announce {
            Announce::Silent => None,
            Announce::Custom(text) => Some(text),
            Announce::Default => {
                let outcome = if seconds <= SOFT_CLEAR_SECONDS {
                    "warning".to_string()
                } else {
                    format!("timeout: {}", describe_duration(seconds))
                };
                Some(format!("{}, {} ({})", name, rule.reason(), outcome))
            }
        };
        info!(target: "moderation", "{} offense #{} ({}), timeout {}s", name, count, rule, seconds);

        // in passive mode nothing was enforced, so nothing is announced
        if !chat.timeout(name, seconds) {
            return Verdict::TimedOut { rule, seconds };
        }
        if let Some(text) = warning.filter(|_| record.should_message(now)) {
            chat.send_message(text);
        }

        Verdict::TimedOut { rule, seconds }
    }

    /// Time out everyone whose recent messages contain `needle`. Returns the affected names.
    pub fn purge_recent(&mut self, chat: &mut Outbound, needle: &str, min_duration: u64) -> Vec<String> {
        let now = Instant::now();
        let users = self.recent.drain_matching(needle);
        let mut purged = Vec::new();
        for user in users.into_iter().filter(|u| u.access_level() < AccessLevel::Mod) {
            self.timeout_user(chat, &user.name, Rule::Purge, min_duration, Announce::Silent, now);
            purged.push(user.name);
        }
        info!(target: "moderation", "Purged {} users matching '{}'", purged.len(), needle);
        purged
    }

    /// Ban everyone whose recent messages contain `needle`. Returns the affected names.
    pub fn ban_recent(&mut self, chat: &mut Outbound, needle: &str) -> Vec<String> {
        let users = self.recent.drain_matching(needle);
        let mut banned = Vec::new();
        for user in users.into_iter().filter(|u| u.access_level() < AccessLevel::Mod) {
            chat.ban(&user.name);
            banned.push(user.name);
        }
        info!(target: "moderation", "Banned {} users matching '{}'", banned.len(), needle);
        banned
    }

    /// Forget offenders whose count has fully decayed
    pub fn on_stream_state_changed(&mut self, now: Instant) {
        let before = self.timeouts.len();
        self.timeouts.retain(|_, record| record.effective_count(now) > 0);
        debug!(
            target: "moderation",
            "Dropped {} decayed timeout records, {} remain", before - self.timeouts.len(), self.timeouts.len()
        );
    }
}

/// Anything outside ASCII, General Punctuation, a few named symbols and
/// (optionally) Hangul
pub fn has_disallowed_chars(text: &str, allow_korean: bool) -> bool {
    text.chars().any(|c| !is_allowed_char(c, allow_korean))
}

fn is_allowed_char(c: char, allow_korean: bool) -> bool {
    if c.is_ascii() || ('\u{2000}'..='\u{206F}').contains(&c) || ALLOWED_SYMBOLS.contains(&c) {
        return true;
    }
    allow_korean
        && (('\u{1100}'..='\u{11FF}').contains(&c)
            || ('\u{3130}'..='\u{318F}').contains(&c)
            || ('\u{AC00}'..='\u{D7AF}').contains(&c))
}

/// Length within one of "just subscribed" and starting with it, case-insensitively
pub fn is_fake_subscription(text: &str) -> bool {
    let trimmed = text.trim();
    let length = trimmed.chars().count();
    let expected = FAKE_SUB_PHRASE.len();
    (length == expected || length == expected + 1) && trimmed.to_lowercase().starts_with(FAKE_SUB_PHRASE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::emotes::StaticEmoteCatalog;
    use crate::bot::outbound::{OutboundAction, OutputModes};
    use tokio::time::Duration;

    struct Fixture {
        engine: ModerationEngine,
        chat: Outbound,
        _dir: tempfile::TempDir,
    }

    fn fixture_with(settings: ModerationConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let lists = ModerationLists::unscheduled(dir.path());
        let engine = ModerationEngine::new(settings, lists, Arc::new(StaticEmoteCatalog::with_global_defaults())).unwrap();
        Fixture {
            engine,
            chat: Outbound::new(OutputModes::new()),
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ModerationConfig::default())
    }

    fn viewer(name: &str) -> User {
        User::new(name)
    }

    fn timeouts(actions: &[OutboundAction]) -> Vec<(String, u64)> {
        actions
            .iter()
            .filter_map(|action| match action {
                OutboundAction::Timeout { user, seconds } => Some((user.clone(), *seconds)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_clean_message_goes_to_recent() {
        let mut f = fixture();
        let verdict = f.engine.check_message(&mut f.chat, &viewer("alice"), "Hello Everyone");
        assert_eq!(verdict, Verdict::Clean);
        assert!(!f.chat.has_pending());
        assert_eq!(f.engine.recent().iter().next().unwrap().1, "hello everyone");
    }

    #[test]
    fn test_moderators_and_streamer_are_exempt() {
        let mut f = fixture();
        let mut moderator = viewer("mod");
        moderator.moderator = true;
        let mut streamer = viewer("owner");
        streamer.streamer = true;

        for user in [&moderator, &streamer] {
            let verdict = f.engine.check_message(&mut f.chat, user, "VISIT WWW.SPAM.COM NOW!!!!!!");
            assert_eq!(verdict, Verdict::Exempt);
        }
        assert!(!f.chat.has_pending());
        assert!(f.engine.recent().is_empty());
    }

    #[test]
    fn test_escalation_through_engine() {
        let mut f = fixture();
        let start = Instant::now();
        let user = viewer("spammer");

        let seconds: Vec<u64> = (0..5)
            .map(|i| {
                let now = start + Duration::from_secs(i * 10);
                match f.engine.check_message_at(&mut f.chat, &user, "ALL CAPS ALL THE TIME", now) {
                    Verdict::TimedOut { rule: Rule::Caps, seconds } => seconds,
                    other => panic!("unexpected verdict {:?}", other),
                }
            })
            .collect();
        assert_eq!(seconds, vec![1, 1, 300, 600, 28_800]);

        let actions = f.chat.take();
        assert_eq!(timeouts(&actions).len(), 5);
        // the public warning goes out once per cooldown window
        let messages: Vec<&OutboundAction> = actions.iter().filter(|a| matches!(a, OutboundAction::Message(_))).collect();
        assert_eq!(messages, vec![&OutboundAction::Message("spammer, please don't use so many caps (warning)".into())]);
    }

    #[test]
    fn test_banned_word_wins_over_caps() {
        let mut f = fixture();
        f.engine.lists().words.add("darn").unwrap();

        let verdict = f.engine.check_message(&mut f.chat, &viewer("bob"), "DARN THIS WHOLE THING TO HECK");
        assert_eq!(verdict, Verdict::TimedOut { rule: Rule::BannedWord, seconds: 1 });
        assert_eq!(timeouts(&f.chat.take()), vec![("bob".to_string(), 1)]);
        assert_eq!(f.engine.offense_count("bob", Instant::now()), 1);
    }

    #[test]
    fn test_banned_word_fixed_timeout_and_response() {
        let mut settings = ModerationConfig::default();
        settings.banned_word_timeout = Some(120);
        let mut f = fixture_with(settings);
        f.engine.lists().words.add(r"fr[e3]{2}\s*stuff").unwrap();

        let verdict = f.engine.check_message(&mut f.chat, &viewer("bob"), "get fr33 stuff here");
        assert_eq!(verdict, Verdict::TimedOut { rule: Rule::BannedWord, seconds: 120 });
        assert_eq!(
            f.chat.take(),
            vec![
                OutboundAction::Timeout { user: "bob".into(), seconds: 120 },
                OutboundAction::Message("bob, \"fr33 stuff\" is not allowed here".into()),
            ]
        );
    }

    #[test]
    fn test_links_cleared_until_linkmode_off() {
        let mut f = fixture();
        let user = viewer("newbie");

        let verdict = f.engine.check_message(&mut f.chat, &user, "look at example.com");
        assert_eq!(verdict, Verdict::TimedOut { rule: Rule::Link, seconds: 1 });

        f.engine.set_mode(RuleToggle::Links, false);
        f.chat.take();
        let verdict = f.engine.check_message(&mut f.chat, &user, "look at example.com");
        assert_eq!(verdict, Verdict::Clean);
        assert!(!f.chat.has_pending());
    }

    #[test]
    fn test_permit_allows_exactly_one_link() {
        let mut f = fixture();
        let user = viewer("somename");
        f.engine.permit("SomeName");

        assert_eq!(f.engine.check_message(&mut f.chat, &user, "my clip: clips.twitch.tv/abc"), Verdict::Clean);
        assert!(!f.engine.has_permit("somename"));

        let verdict = f.engine.check_message(&mut f.chat, &user, "another: clips.twitch.tv/def");
        assert_eq!(verdict, Verdict::TimedOut { rule: Rule::Link, seconds: 1 });
    }

    #[test]
    fn test_whitelist_and_blacklist() {
        let mut f = fixture();
        f.engine.lists().whitelist.add("http://twitch.tv").unwrap();
        f.engine.lists().blacklist.add("twitch.tv/badstream").unwrap();
        let user = viewer("viewer");

        assert_eq!(f.engine.check_message(&mut f.chat, &user, "come to twitch.tv/goodstream"), Verdict::Clean);
        let verdict = f.engine.check_message(&mut f.chat, &user, "come to https://twitch.tv/badstream");
        assert_eq!(verdict, Verdict::TimedOut { rule: Rule::Link, seconds: 1 });
    }

    #[test]
    fn test_privileged_users_post_links_unless_denied() {
        let mut f = fixture();
        let mut sub = viewer("subby");
        sub.subscriber = true;

        assert_eq!(f.engine.check_message(&mut f.chat, &sub, "see example.com"), Verdict::Clean);

        f.engine.set_link_denied("subby", true);
        assert!(f.engine.check_message(&mut f.chat, &sub, "see example.com").is_enforced());

        f.engine.set_link_allowed("newbie", true);
        assert_eq!(f.engine.check_message(&mut f.chat, &viewer("newbie"), "see example.com"), Verdict::Clean);
    }

    #[test]
    fn test_banlist_bans_even_with_linkmode_off() {
        let mut f = fixture();
        f.engine.lists().banlist.add(r"free-?followers\.\w+").unwrap();
        f.engine.set_mode(RuleToggle::Links, false);

        let verdict = f.engine.check_message(&mut f.chat, &viewer("bot123"), "get free-followers.com/now");
        assert_eq!(verdict, Verdict::Banned { rule: Rule::BannedUrl });
        assert_eq!(f.chat.take(), vec![OutboundAction::Ban { user: "bot123".into() }]);
    }

    #[test]
    fn test_spam_phrase_bypasses_escalation() {
        let mut f = fixture();
        f.engine.set_spam_phrase(Some(SpamPhrase::new("Buy Followers", false, 600)));

        let verdict = f.engine.check_message(&mut f.chat, &viewer("seller"), "hey BUY FOLLOWERS cheap");
        assert_eq!(verdict, Verdict::TimedOut { rule: Rule::SpamPhrase, seconds: 600 });
        assert_eq!(f.engine.offense_count("seller", Instant::now()), 0);

        f.engine.set_spam_phrase(Some(SpamPhrase::new("buy followers", true, 0)));
        let verdict = f.engine.check_message(&mut f.chat, &viewer("seller2"), "buy followers");
        assert_eq!(verdict, Verdict::Banned { rule: Rule::SpamPhrase });
    }

    #[test]
    fn test_disallowed_characters() {
        assert!(!has_disallowed_chars("plain text… with “quotes” €5", false));
        assert!(has_disallowed_chars("héllo", false));
        assert!(has_disallowed_chars("안녕하세요", false));
        assert!(!has_disallowed_chars("안녕하세요", true));

        let mut f = fixture();
        let verdict = f.engine.check_message(&mut f.chat, &viewer("zalgo"), "ｗｉｄｅ text");
        assert_eq!(verdict, Verdict::TimedOut { rule: Rule::Symbols, seconds: 1 });
    }

    #[test]
    fn test_caps_needs_minimum_letters() {
        let mut f = fixture();
        assert_eq!(f.engine.check_message(&mut f.chat, &viewer("a"), "OK LOL GG"), Verdict::Clean);
        assert_eq!(f.engine.check_message(&mut f.chat, &viewer("b"), "Hello There General Kenobi"), Verdict::Clean);
        assert!(f.engine.check_message(&mut f.chat, &viewer("c"), "WHAT IS GOING ON HERE").is_enforced());
    }

    #[test]
    fn test_emote_limit() {
        let mut f = fixture();
        let spam = "Kappa ".repeat(9);
        let verdict = f.engine.check_message(&mut f.chat, &viewer("emoter"), &spam);
        assert_eq!(verdict, Verdict::TimedOut { rule: Rule::Emotes, seconds: 1 });
        assert_eq!(f.engine.check_message(&mut f.chat, &viewer("ok"), &"Kappa ".repeat(8)), Verdict::Clean);
    }

    #[test]
    fn test_length_limit_per_audience() {
        let mut f = fixture();
        let long = "a".repeat(301);
        assert_eq!(
            f.engine.check_message(&mut f.chat, &viewer("talker"), &long),
            Verdict::TimedOut { rule: Rule::Length, seconds: 1 }
        );

        let mut regular = viewer("regular");
        regular.regular = true;
        assert_eq!(f.engine.check_message(&mut f.chat, &regular, &long), Verdict::Clean);
    }

    #[test]
    fn test_fake_subscription_detection() {
        assert!(is_fake_subscription("just subscribed"));
        assert!(is_fake_subscription("  Just Subscribed!  "));
        assert!(!is_fake_subscription("just subscribed for 3 months"));
        assert!(!is_fake_subscription("I just subscribed"));

        let mut f = fixture();
        let verdict = f.engine.check_action(&mut f.chat, &viewer("faker"), "just subscribed!");
        assert_eq!(verdict, Verdict::TimedOut { rule: Rule::FakeSubscription, seconds: 1 });

        f.engine.set_mode(RuleToggle::FakeSubscriptions, false);
        assert_eq!(f.engine.check_action(&mut f.chat, &viewer("faker2"), "just subscribed!"), Verdict::Clean);
    }

    #[test]
    fn test_purge_recent_is_silent_and_uses_floor() {
        let mut f = fixture();
        f.engine.check_message(&mut f.chat, &viewer("spammer"), "join my discord server");
        f.engine.check_message(&mut f.chat, &viewer("viewer"), "nice play");
        f.engine.check_message(&mut f.chat, &viewer("other"), "Discord link pls");

        let purged = f.engine.purge_recent(&mut f.chat, "discord", 60);
        assert_eq!(purged, vec!["spammer".to_string(), "other".to_string()]);
        assert_eq!(
            f.chat.take(),
            vec![
                OutboundAction::Timeout { user: "spammer".into(), seconds: 60 },
                OutboundAction::Timeout { user: "other".into(), seconds: 60 },
            ]
        );
        assert_eq!(f.engine.recent().len(), 1);

        f.engine.check_message(&mut f.chat, &viewer("bot"), "free followers");
        assert_eq!(f.engine.ban_recent(&mut f.chat, "FOLLOWERS"), vec!["bot".to_string()]);
    }

    #[test]
    fn test_stream_state_change_drops_decayed_records() {
        let mut f = fixture();
        let start = Instant::now();
        f.engine.timeout_user(&mut f.chat, "old", Rule::Caps, 1, Announce::Silent, start);
        f.engine.timeout_user(&mut f.chat, "recent", Rule::Caps, 1, Announce::Silent, start + Duration::from_secs(20 * 60));
        assert_eq!(f.engine.tracked_offenders(), 2);

        f.engine.on_stream_state_changed(start + Duration::from_secs(25 * 60));
        assert_eq!(f.engine.tracked_offenders(), 1);
        assert_eq!(f.engine.offense_count("recent", start + Duration::from_secs(25 * 60)), 1);
    }

    #[test]
    fn test_passive_mode_still_tracks_offenses() {
        let mut f = fixture();
        f.chat.modes().set_passive(true);

        let verdict = f.engine.check_message(&mut f.chat, &viewer("loud"), "STOP SHOUTING AT ME PLEASE");
        assert!(verdict.is_enforced());
        assert!(f.chat.take().is_empty());
        assert_eq!(f.engine.offense_count("loud", Instant::now()), 1);

        // a repeat offense in passive mode does not announce an 8h timeout either
        for _ in 0..4 {
            f.engine.check_message(&mut f.chat, &viewer("loud"), "STOP SHOUTING AT ME PLEASE");
        }
        assert_eq!(f.engine.offense_count("loud", Instant::now()), 5);
        assert!(f.chat.take().is_empty());

        f.chat.modes().set_passive(false);
        f.engine.check_message(&mut f.chat, &viewer("loud"), "STOP SHOUTING AT ME PLEASE");
        let actions = f.chat.take();
        assert_eq!(timeouts(&actions).len(), 1);
        assert!(actions.iter().any(|a| matches!(a, OutboundAction::Message(text) if text.contains("timeout: 8h"))));
    }
}
