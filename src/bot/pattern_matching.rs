// src/bot/pattern_matching.rs - Literal/regex rule matchers, persisted pattern lists and URL extraction

use anyhow::{Context, Result};
use log::{debug, warn};
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

use crate::bot::autosave::AutosaveStore;

/// Characters that mark a configured pattern as a regular expression. `.` is left out
/// so that plain domains like `example.com` stay literal.
const REGEX_META: &[char] = &['\\', '^', '$', '*', '+', '?', '(', ')', '[', ']', '{', '}', '|'];

/// Top-level domains and extensions a host must end in to be treated as a URL
const KNOWN_TLDS: &[&str] = &[
    "com", "net", "org", "edu", "gov", "mil", "int", "info", "biz", "name", "pro", "tv", "gg",
    "io", "co", "me", "ly", "be", "to", "cc", "ws", "fm", "am", "in", "us", "uk", "ca", "au",
    "nz", "de", "fr", "nl", "it", "es", "pl", "se", "no", "fi", "dk", "ch", "at", "ru", "ua",
    "br", "ar", "mx", "jp", "kr", "cn", "tw", "eu", "xyz", "tk", "app", "dev", "live",
    "stream", "online", "site", "club", "link", "shop", "store", "gl",
];

/// A single configured rule: a case-insensitive substring or a compiled regex
#[derive(Debug, Clone)]
pub enum RuleMatcher {
    Literal(String),
    Regex(Regex),
}

impl RuleMatcher {
    pub fn looks_like_regex(pattern: &str) -> bool {
        pattern.contains(REGEX_META)
    }

    pub fn parse(pattern: &str) -> Result<Self, regex::Error> {
        if Self::looks_like_regex(pattern) {
            let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
            Ok(RuleMatcher::Regex(regex))
        } else {
            Ok(RuleMatcher::Literal(pattern.to_lowercase()))
        }
    }

    /// The matched portion of `text`, if any
    pub fn find(&self, text: &str) -> Option<String> {
        match self {
            RuleMatcher::Literal(needle) => {
                if text.to_lowercase().contains(needle.as_str()) {
                    Some(needle.clone())
                } else {
                    None
                }
            }
            RuleMatcher::Regex(regex) => regex.find(text).map(|m| m.as_str().to_string()),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            RuleMatcher::Literal(needle) => text.to_lowercase().contains(needle.as_str()),
            RuleMatcher::Regex(regex) => regex.is_match(text),
        }
    }
}

/// Drop a leading `http://` or `https://` so patterns and URLs compare scheme-less
pub fn strip_scheme(text: &str) -> &str {
    for scheme in ["https://", "http://"] {
        if let Some(prefix) = text.get(..scheme.len()) {
            if prefix.eq_ignore_ascii_case(scheme) {
                return &text[scheme.len()..];
            }
        }
    }
    text
}

/// An operator-editable list of rules backed by an autosave store (one pattern per line).
///
/// Matchers are compiled lazily and rebuilt whenever the store changes, which also
/// picks up the store's background initial load.
pub struct PatternList {
    name: String,
    store: Arc<AutosaveStore<()>>,
    url_patterns: bool,
    compiled: Vec<(String, RuleMatcher)>,
    compiled_generation: Option<u64>,
}

impl PatternList {
    /// `url_patterns` lists normalize away a leading scheme on both sides
    pub fn new(name: &str, store: Arc<AutosaveStore<()>>, url_patterns: bool) -> Self {
        Self {
            name: name.to_string(),
            store,
            url_patterns,
            compiled: Vec::new(),
            compiled_generation: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<AutosaveStore<()>> {
        &self.store
    }

    fn normalize<'a>(&self, pattern: &'a str) -> &'a str {
        let pattern = pattern.trim();
        if self.url_patterns {
            strip_scheme(pattern)
        } else {
            pattern
        }
    }

    fn refresh(&mut self) {
        let generation = self.store.generation();
        if self.compiled_generation == Some(generation) {
            return;
        }

        self.compiled.clear();
        for pattern in self.store.keys() {
            match RuleMatcher::parse(&pattern) {
                Ok(matcher) => self.compiled.push((pattern, matcher)),
                Err(e) => warn!(
                    target: "moderation",
                    "Skipping invalid pattern '{}' in {}: {}", pattern, self.name, e
                ),
            }
        }
        self.compiled_generation = Some(generation);
        debug!(target: "moderation", "Compiled {} patterns for {}", self.compiled.len(), self.name);
    }

    /// Matched text of the first rule that hits
    pub fn first_match(&mut self, text: &str) -> Option<String> {
        self.refresh();
        let subject = self.normalize(text).to_string();
        self.compiled.iter().find_map(|(_, matcher)| matcher.find(&subject))
    }

    pub fn matches_any(&mut self, text: &str) -> bool {
        self.refresh();
        let subject = self.normalize(text).to_string();
        self.compiled.iter().any(|(_, matcher)| matcher.is_match(&subject))
    }

    /// Validate and store a pattern, returning the normalized form
    pub fn add(&self, pattern: &str) -> Result<String> {
        let pattern = self.normalize(pattern).to_string();
        if pattern.is_empty() {
            anyhow::bail!("empty pattern");
        }
        RuleMatcher::parse(&pattern).with_context(|| format!("invalid pattern '{}'", pattern))?;
        self.store.set(&pattern, ());
        Ok(pattern)
    }

    pub fn remove(&self, pattern: &str) -> bool {
        self.store.remove(self.normalize(pattern)).is_some()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.store.contains(self.normalize(pattern))
    }

    pub fn patterns(&self) -> Vec<String> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// A URL found in chat text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundUrl {
    /// The URL as written
    pub full: String,
    /// Lowercased host without a leading `www.`
    pub domain: String,
}

/// Finds URLs: a dot-separated host ending in a known TLD, with optional scheme, port and path
pub struct UrlExtractor {
    regex: Regex,
}

impl UrlExtractor {
    pub fn new() -> Result<Self> {
        let pattern = format!(
            r"(?i)\b(?:(?:https?|ftp)://)?((?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+(?:{}))\b(?::\d{{1,5}})?(?:/\S*)?",
            KNOWN_TLDS.join("|")
        );
        let regex = Regex::new(&pattern).context("Failed to compile URL pattern")?;
        Ok(Self { regex })
    }

    pub fn extract(&self, text: &str) -> Vec<FoundUrl> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| {
                let full = caps.get(0)?.as_str().to_string();
                let host = caps.get(1)?.as_str().to_lowercase();
                let domain = host.strip_prefix("www.").unwrap_or(&host).to_string();
                Some(FoundUrl { full, domain })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(url_patterns: bool) -> PatternList {
        let dir = std::env::temp_dir().join("modbot-pattern-tests");
        PatternList::new("test", AutosaveStore::new("test", dir.join("unused.txt")), url_patterns)
    }

    #[test]
    fn test_extracts_www_url_with_path() {
        let urls = UrlExtractor::new().unwrap().extract("check out www.example.com/page?x=1");
        assert_eq!(
            urls,
            vec![FoundUrl {
                full: "www.example.com/page?x=1".to_string(),
                domain: "example.com".to_string(),
            }]
        );
    }

    #[test]
    fn test_extracts_scheme_and_multiple_urls() {
        let urls = UrlExtractor::new()
            .unwrap()
            .extract("see https://Clips.Twitch.tv/abc and bit.ly/xyz");
        let domains: Vec<&str> = urls.iter().map(|u| u.domain.as_str()).collect();
        assert_eq!(domains, vec!["clips.twitch.tv", "bit.ly"]);
        assert_eq!(urls[0].full, "https://Clips.Twitch.tv/abc");
    }

    #[test]
    fn test_ignores_non_urls() {
        let extractor = UrlExtractor::new().unwrap();
        assert!(extractor.extract("hello there, how are you?").is_empty());
        assert!(extractor.extract("version 1.2.3 is out").is_empty());
        assert!(extractor.extract("wait...what").is_empty());
        assert!(extractor.extract("my file.exe broke").is_empty());
    }

    #[test]
    fn test_regex_classification() {
        assert!(!RuleMatcher::looks_like_regex("example.com"));
        assert!(RuleMatcher::looks_like_regex("bad(word)?"));
        assert!(matches!(RuleMatcher::parse("Word").unwrap(), RuleMatcher::Literal(ref s) if s == "word"));
        assert!(matches!(RuleMatcher::parse("w[o0]rd").unwrap(), RuleMatcher::Regex(_)));
    }

    #[test]
    fn test_matchers_are_case_insensitive() {
        let literal = RuleMatcher::parse("BadWord").unwrap();
        assert_eq!(literal.find("this has a BADWORD in it").as_deref(), Some("badword"));

        let regex = RuleMatcher::parse(r"b[a4]d\s?word").unwrap();
        assert_eq!(regex.find("a B4D WORD here").as_deref(), Some("B4D WORD"));
        assert!(!regex.is_match("good word"));
    }

    #[test]
    fn test_invalid_regex_is_skipped() {
        let mut words = list(false);
        words.store().set("(unclosed", ());
        words.store().set("spam", ());

        assert!(words.matches_any("no SPAM please"));
        assert_eq!(words.first_match("(unclosed"), None);
    }

    #[test]
    fn test_add_rejects_invalid_regex() {
        let words = list(false);
        assert!(words.add("[oops").is_err());
        assert!(words.is_empty());
    }

    #[test]
    fn test_url_patterns_strip_scheme() {
        let mut whitelist = list(true);
        assert_eq!(whitelist.add("http://Example.com").unwrap(), "Example.com");
        assert!(whitelist.contains("https://Example.com"));

        assert!(whitelist.matches_any("https://www.example.com/page"));
        assert!(!whitelist.matches_any("other.net"));

        assert!(whitelist.remove("http://Example.com"));
        assert!(!whitelist.matches_any("example.com"));
    }

    #[test]
    fn test_compiled_cache_follows_store() {
        let mut words = list(false);
        assert!(!words.matches_any("kappa"));

        words.add("kappa").unwrap();
        assert!(words.matches_any("KAPPA"));

        words.remove("kappa");
        assert!(!words.matches_any("kappa"));
    }
}
