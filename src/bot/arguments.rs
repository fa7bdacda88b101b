// src/bot/arguments.rs - Cursor-based parser for command argument strings

use crate::bot::users::UserRegistry;
use crate::types::{AccessLevel, User};

/// Parses `-flag -name=value positional words and a remainder`.
///
/// A leading run of tokens starting with `-` or `/` are flags; the first token that
/// does not start with either begins the positional region. Getters consume
/// positional input from a cursor. Failures never panic: they record a sticky
/// usage message in [`ArgumentParser::error`] and return a fallback.
#[derive(Debug, Clone)]
pub struct ArgumentParser {
    text: String,
    flags: Vec<(String, Option<String>)>,
    positional_start: usize,
    cursor: usize,
    error: Option<String>,
}

impl ArgumentParser {
    pub fn new(raw: &str) -> Self {
        let text = raw.trim().to_string();
        let mut flags = Vec::new();
        let mut cursor = 0;

        loop {
            cursor = skip_whitespace(&text, cursor);
            let rest = &text[cursor..];
            if !(rest.starts_with('-') || rest.starts_with('/')) {
                break;
            }

            let token_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            let token = &rest[1..token_end];
            let (name, value) = match token.find('=') {
                Some(eq) => (&token[..eq], Some(token[eq + 1..].to_string())),
                None => (token, None),
            };
            flags.push((name.to_lowercase(), value));
            cursor += token_end;
        }

        Self {
            text,
            flags,
            positional_start: cursor,
            cursor,
            error: None,
        }
    }

    /// First usage error recorded since construction or the last `reset`
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    fn set_error(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    fn flag_entry(&self, name: &str) -> Option<&Option<String>> {
        let name = name.to_lowercase();
        self.flags.iter().find(|(flag, _)| *flag == name).map(|(_, value)| value)
    }

    pub fn get_flag(&self, name: &str) -> bool {
        self.flag_entry(name).is_some()
    }

    /// Raw value of a `-name=value` flag
    pub fn get_flag_value(&self, name: &str) -> Option<&str> {
        self.flag_entry(name).and_then(|value| value.as_deref())
    }

    pub fn get_int_flag(&mut self, name: &str, default: i64, required: bool) -> i64 {
        match self.flag_entry(name).cloned() {
            None => {
                if required {
                    self.set_error(format!("expected -{}=<number>", name));
                }
                default
            }
            Some(None) => {
                self.set_error(format!("expected -{}=<number>", name));
                default
            }
            Some(Some(value)) => match value.parse::<i64>() {
                Ok(number) => number,
                Err(_) => {
                    self.set_error(format!("expected -{}=<number>, got '{}'", name, value));
                    default
                }
            },
        }
    }

    pub fn get_access_flag(&mut self, name: &str, default: AccessLevel, required: bool) -> AccessLevel {
        let usage = format!("expected -{}=<normal|regular|sub|mod|streamer>", name);
        match self.flag_entry(name).cloned() {
            None => {
                if required {
                    self.set_error(usage);
                }
                default
            }
            Some(None) => {
                self.set_error(usage);
                default
            }
            Some(Some(value)) => match value.parse::<AccessLevel>() {
                Ok(level) => level,
                Err(_) => {
                    self.set_error(usage);
                    default
                }
            },
        }
    }

    /// Next whitespace-delimited word, if any
    pub fn get_one_word(&mut self) -> Option<String> {
        let start = skip_whitespace(&self.text, self.cursor);
        let rest = &self.text[start..];
        if rest.is_empty() {
            self.cursor = start;
            return None;
        }

        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let word = rest[..end].to_string();
        self.cursor = skip_whitespace(&self.text, start + end);
        Some(word)
    }

    pub fn get_int(&mut self) -> Option<i64> {
        match self.get_one_word() {
            Some(word) => match word.parse::<i64>() {
                Ok(number) => Some(number),
                Err(_) => {
                    self.set_error(format!("expected a number, got '{}'", word));
                    None
                }
            },
            None => {
                self.set_error("expected a number".to_string());
                None
            }
        }
    }

    /// Next word as a lowercase user name, with a leading `@` dropped
    pub fn get_user_name(&mut self) -> Option<String> {
        match self.get_one_word() {
            Some(word) => {
                let name = word.trim_start_matches('@').to_lowercase();
                if name.is_empty() || name.contains(char::is_whitespace) {
                    self.set_error(format!("'{}' is not a valid user name", word));
                    None
                } else {
                    Some(name)
                }
            }
            None => {
                self.set_error("expected a user name".to_string());
                None
            }
        }
    }

    /// Next word resolved against the user registry
    pub fn get_user(&mut self, users: &mut UserRegistry) -> Option<User> {
        self.get_user_name().map(|name| users.get_or_create(&name).clone())
    }

    /// Everything left, trimmed. Consumes the rest of the input.
    pub fn get_string(&mut self) -> String {
        let rest = self.text[self.cursor..].trim().to_string();
        self.cursor = self.text.len();
        rest
    }

    /// Remaining positional input without consuming it
    pub fn peek_rest(&self) -> &str {
        self.text[self.cursor..].trim()
    }

    pub fn is_exhausted(&self) -> bool {
        self.peek_rest().is_empty()
    }

    /// Rewind to the start of the positional region and clear any error
    pub fn reset(&mut self) {
        self.cursor = self.positional_start;
        self.error = None;
    }
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    let rest = &text[from..];
    from + (rest.len() - rest.trim_start().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_full_syntax(raw: &str) {
        let mut users = UserRegistry::new("channel");
        let mut args = ArgumentParser::new(raw);

        assert!(args.get_flag("flag"));
        assert!(!args.get_flag("missing"));
        assert_eq!(args.get_int_flag("int", 0, true), 123);
        assert_eq!(args.get_access_flag("ul", AccessLevel::Normal, false), AccessLevel::Mod);
        assert_eq!(args.get_user(&mut users).unwrap().name, "username");
        assert_eq!(args.get_int(), Some(1234));
        assert_eq!(args.get_string(), "the remainder");
        assert!(args.error().is_none(), "unexpected error: {:?}", args.error());
    }

    #[test]
    fn test_full_syntax() {
        check_full_syntax("-flag -int=123 -ul=mod UserName 1234 the remainder");
    }

    #[test]
    fn test_full_syntax_with_surrounding_whitespace() {
        check_full_syntax("   -flag   -int=123 -ul=mod   UserName   1234   the remainder   ");
    }

    #[test]
    fn test_slash_flags() {
        let mut args = ArgumentParser::new("/ban /duration=60 rest of it");
        assert!(args.get_flag("ban"));
        assert_eq!(args.get_int_flag("duration", 0, false), 60);
        assert_eq!(args.get_string(), "rest of it");
    }

    #[test]
    fn test_flags_stop_at_first_positional() {
        let mut args = ArgumentParser::new("-a word -b");
        assert!(args.get_flag("a"));
        assert!(!args.get_flag("b"));
        assert_eq!(args.get_one_word().as_deref(), Some("word"));
        assert_eq!(args.get_string(), "-b");
    }

    #[test]
    fn test_missing_values_use_defaults() {
        let mut args = ArgumentParser::new("");
        assert_eq!(args.get_int_flag("duration", 600, false), 600);
        assert_eq!(args.get_access_flag("ul", AccessLevel::Subscriber, false), AccessLevel::Subscriber);
        assert!(args.error().is_none());
        assert_eq!(args.get_one_word(), None);
        assert_eq!(args.get_string(), "");
    }

    #[test]
    fn test_errors_are_sticky() {
        let mut args = ArgumentParser::new("-int=abc notanumber");
        assert_eq!(args.get_int_flag("int", 5, false), 5);
        assert_eq!(args.error(), Some("expected -int=<number>, got 'abc'"));

        assert_eq!(args.get_int(), None);
        // the first message is kept
        assert_eq!(args.error(), Some("expected -int=<number>, got 'abc'"));
    }

    #[test]
    fn test_required_flag_missing() {
        let mut args = ArgumentParser::new("text");
        args.get_access_flag("ul", AccessLevel::Normal, true);
        assert!(args.error().unwrap().starts_with("expected -ul="));
    }

    #[test]
    fn test_get_int_without_input() {
        let mut args = ArgumentParser::new("-x");
        assert_eq!(args.get_int(), None);
        assert_eq!(args.error(), Some("expected a number"));
    }

    #[test]
    fn test_user_name_strips_at_sign() {
        let mut args = ArgumentParser::new("@SomeName");
        assert_eq!(args.get_user_name().as_deref(), Some("somename"));
        assert!(args.get_user_name().is_none());
        assert_eq!(args.error(), Some("expected a user name"));
    }

    #[test]
    fn test_reset_rewinds_to_positional_region() {
        let mut args = ArgumentParser::new("-ul=sub hello world");
        assert_eq!(args.get_one_word().as_deref(), Some("hello"));
        assert_eq!(args.get_int(), None);
        assert!(args.has_error());

        args.reset();
        assert!(!args.has_error());
        assert_eq!(args.get_one_word().as_deref(), Some("hello"));
        assert_eq!(args.get_string(), "world");
        assert_eq!(args.get_access_flag("ul", AccessLevel::Normal, true), AccessLevel::Subscriber);
    }
}
