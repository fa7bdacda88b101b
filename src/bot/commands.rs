// src/bot/commands.rs - Access-controlled command registry and dispatch

use anyhow::Result;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::bot::arguments::ArgumentParser;
use crate::bot::context::BotContext;
use crate::types::{AccessLevel, Notification, User};

/// A registered command body. Runs synchronously on the event loop.
pub type CommandHandler = Arc<dyn Fn(&mut BotContext, &mut Invocation) -> Result<()> + Send + Sync>;

/// Called for `!name` when no command by that name is registered.
/// Returns true if the listener answered it.
pub type UnknownCommandListener = Arc<dyn Fn(&mut BotContext, &User, &str, &str) -> bool + Send + Sync>;

/// One call of a command
pub struct Invocation {
    pub user: User,
    /// Name as typed, lowercased (may be an alias)
    pub name: String,
    /// Level the command was registered with
    pub access: AccessLevel,
    pub args: ArgumentParser,
}

impl Invocation {
    /// Gate sub-behaviour of a command on a higher level than the command itself
    pub fn has_access(&self, level: AccessLevel) -> bool {
        self.user.has_access(level)
    }

    /// Reply with the argument parser's error and the expected usage
    pub fn usage(&self, ctx: &mut BotContext, usage: &str) {
        let reason = self.args.error().unwrap_or("missing arguments");
        ctx.chat.send_response(format!("{}: {} (usage: !{} {})", self.user.name, reason, self.name, usage));
    }
}

struct Command {
    names: Vec<String>,
    access: AccessLevel,
    handler: CommandHandler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    Denied,
    Unknown,
    NotACommand,
}

/// Static table from command name (and aliases) to access level and handler
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<Command>>,
    unknown_listeners: Vec<UnknownCommandListener>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under one or more names. Names are case-insensitive and
    /// may be given with or without the leading `!`.
    pub fn register<F>(&mut self, names: &[&str], access: AccessLevel, handler: F) -> Result<()>
    where
        F: Fn(&mut BotContext, &mut Invocation) -> Result<()> + Send + Sync + 'static,
    {
        let names: Vec<String> = names
            .iter()
            .map(|name| name.trim().trim_start_matches('!').to_lowercase())
            .collect();

        if names.is_empty() || names.iter().any(|name| name.is_empty()) {
            anyhow::bail!("Command names must not be empty");
        }
        if let Some(taken) = names.iter().find(|name| self.commands.contains_key(*name)) {
            anyhow::bail!("Command '!{}' is already registered", taken);
        }

        let command = Arc::new(Command {
            names: names.clone(),
            access,
            handler: Arc::new(handler),
        });
        for name in &names {
            self.commands.insert(name.clone(), command.clone());
        }

        info!(target: "commands", "Registered command: !{} ({})", names.join(", !"), access);
        Ok(())
    }

    pub fn on_unknown_command<F>(&mut self, listener: F)
    where
        F: Fn(&mut BotContext, &User, &str, &str) -> bool + Send + Sync + 'static,
    {
        self.unknown_listeners.push(Arc::new(listener));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(&name.trim_start_matches('!').to_lowercase())
    }

    pub fn access_for(&self, name: &str) -> Option<AccessLevel> {
        self.commands
            .get(&name.trim_start_matches('!').to_lowercase())
            .map(|command| command.access)
    }

    /// Every registered name and alias, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }

    /// Split `raw` at its first `!` into a lowercased name and the argument text
    pub fn parse(raw: &str) -> Option<(String, &str)> {
        let start = raw.find('!')? + 1;
        let rest = &raw[start..];
        let name_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let name = rest[..name_end].to_lowercase();
        if name.is_empty() {
            return None;
        }
        Some((name, rest[name_end..].trim()))
    }

    pub fn dispatch(&self, ctx: &mut BotContext, user: &User, raw: &str) -> DispatchOutcome {
        let (name, args) = match Self::parse(raw) {
            Some(parsed) => parsed,
            None => return DispatchOutcome::NotACommand,
        };

        let command = match self.commands.get(&name) {
            Some(command) => command.clone(),
            None => {
                debug!(target: "commands", "Unknown command !{} from {}", name, user.name);
                for listener in &self.unknown_listeners {
                    if listener(ctx, user, &name, args) {
                        break;
                    }
                }
                ctx.notify(Notification::UnknownCommand {
                    user: user.name.clone(),
                    name,
                    args: args.to_string(),
                });
                return DispatchOutcome::Unknown;
            }
        };

        if !user.has_access(command.access) {
            debug!(
                target: "commands",
                "{} ({}) denied !{} (requires {})", user.name, user.access_level(), name, command.access
            );
            ctx.notify(Notification::CommandDenied {
                user: user.name.clone(),
                name,
            });
            return DispatchOutcome::Denied;
        }

        debug!(target: "commands", "Executing !{} for {} ({})", name, user.name, command.names[0]);
        let mut invocation = Invocation {
            user: user.clone(),
            name: name.clone(),
            access: command.access,
            args: ArgumentParser::new(args),
        };
        if let Err(e) = (command.handler)(ctx, &mut invocation) {
            warn!(target: "commands", "Command !{} failed for {}: {:#}", name, user.name, e);
        }
        DispatchOutcome::Handled
    }
}

/// `on`/`off` style switch argument
pub fn parse_switch(word: &str) -> Option<bool> {
    match word.to_lowercase().as_str() {
        "on" | "true" | "yes" | "enable" | "1" => Some(true),
        "off" | "false" | "no" | "disable" | "0" => Some(false),
        _ => None,
    }
}
