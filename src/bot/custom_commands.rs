// src/bot/custom_commands.rs - Operator-defined text commands persisted as `<level> <name> <text>`

use anyhow::Result;
use log::{debug, info};
use std::collections::HashSet;
use std::sync::Arc;

use crate::bot::autosave::{AutosaveStore, Record};
use crate::bot::commands::{CommandRegistry, Invocation};
use crate::bot::context::BotContext;
use crate::types::{AccessLevel, User};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomCommand {
    pub access: AccessLevel,
    pub text: String,
}

impl Record for CustomCommand {
    fn encode(key: &str, value: &Self) -> String {
        format!("{} {} {}", value.access, key, value.text)
    }

    fn decode(line: &str) -> Option<(String, Self)> {
        let mut parts = line.trim().splitn(3, ' ');
        let access = parts.next()?.parse::<AccessLevel>().ok()?;
        let name = parts.next()?.trim().to_lowercase();
        let text = parts.next()?.trim().to_string();
        if name.is_empty() || text.is_empty() {
            return None;
        }
        Some((name, CustomCommand { access, text }))
    }
}

/// The user-defined command table
pub struct CustomCommands {
    store: Arc<AutosaveStore<CustomCommand>>,
    reserved: HashSet<String>,
}

impl CustomCommands {
    pub fn new(store: Arc<AutosaveStore<CustomCommand>>) -> Self {
        Self {
            store,
            reserved: HashSet::new(),
        }
    }

    /// Names of built-in commands, which custom commands may not shadow
    pub fn set_reserved(&mut self, names: impl IntoIterator<Item = String>) {
        self.reserved = names.into_iter().collect();
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(&normalize_name(name))
    }

    pub fn get(&self, name: &str) -> Option<CustomCommand> {
        self.store.get(&normalize_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.store.contains(&normalize_name(name))
    }

    /// Create or replace a command. Returns true if it replaced an existing one.
    pub fn define(&self, name: &str, access: AccessLevel, text: &str) -> Result<bool> {
        let name = normalize_name(name);
        if name.is_empty() || name.contains(char::is_whitespace) {
            anyhow::bail!("invalid command name");
        }
        if self.reserved.contains(&name) {
            anyhow::bail!("!{} is a built-in command", name);
        }
        let text = text.trim();
        if text.is_empty() {
            anyhow::bail!("command text must not be empty");
        }

        let previous = self.store.set(
            &name,
            CustomCommand {
                access,
                text: text.to_string(),
            },
        );
        info!(target: "commands", "Defined custom command !{} ({})", name, access);
        Ok(previous.is_some())
    }

    pub fn remove(&self, name: &str) -> bool {
        self.store.remove(&normalize_name(name)).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.store.keys()
    }

    /// Expanded response for `user`, or None if there is no such command or access is too low
    pub fn respond(&self, user: &User, channel: &str, name: &str, args: &str) -> Option<String> {
        let command = self.get(name)?;
        if !user.has_access(command.access) {
            debug!(target: "commands", "{} lacks access for custom command !{}", user.name, name);
            return None;
        }
        Some(expand(&command.text, user, channel, args))
    }

    /// Register `!addcom`, `!editcom`, `!delcom` and the unknown-command hook
    pub fn register(registry: &mut CommandRegistry) -> Result<()> {
        registry.register(&["addcom"], AccessLevel::Mod, add_command)?;
        registry.register(&["editcom"], AccessLevel::Mod, edit_command)?;
        registry.register(&["delcom"], AccessLevel::Mod, delete_command)?;

        registry.on_unknown_command(|ctx, user, name, args| {
            match ctx.custom_commands.respond(user, &ctx.channel, name, args) {
                Some(response) => {
                    ctx.chat.send_response(response);
                    true
                }
                None => false,
            }
        });
        Ok(())
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().trim_start_matches('!').to_lowercase()
}

/// Substitute `$(user)`, `$(channel)` and `$(args)`
pub fn expand(text: &str, user: &User, channel: &str, args: &str) -> String {
    text.replace("$(user)", &user.name)
        .replace("$(channel)", channel)
        .replace("$(args)", args)
}

const ADD_USAGE: &str = "[-ul=<level>] <name> <text>";

/// `!addcom [-ul=<level>] <name> <text>`
fn add_command(ctx: &mut BotContext, inv: &mut Invocation) -> Result<()> {
    let access = inv.args.get_access_flag("ul", AccessLevel::Normal, false);
    let name = inv.args.get_one_word();
    let text = inv.args.get_string();

    let name = match name {
        Some(name) if !inv.args.has_error() && !text.is_empty() => name,
        _ => {
            inv.usage(ctx, ADD_USAGE);
            return Ok(());
        }
    };

    match ctx.custom_commands.define(&name, access, &text) {
        Ok(true) => ctx.chat.send_response(format!("✏️ Command !{} updated", normalize_name(&name))),
        Ok(false) => ctx.chat.send_response(format!("✅ Command !{} added", normalize_name(&name))),
        Err(e) => ctx.chat.send_response(format!("❌ {}", e)),
    };
    Ok(())
}

/// `!editcom` takes the same arguments as `!addcom` but requires the command to exist
fn edit_command(ctx: &mut BotContext, inv: &mut Invocation) -> Result<()> {
    let name = match inv.args.get_one_word() {
        Some(name) => name,
        None => {
            inv.usage(ctx, ADD_USAGE);
            return Ok(());
        }
    };

    if !ctx.custom_commands.contains(&name) {
        ctx.chat.send_response(format!("❌ No custom command named !{}", normalize_name(&name)));
        return Ok(());
    }

    inv.args.reset();
    add_command(ctx, inv)
}

/// `!delcom <name>`
fn delete_command(ctx: &mut BotContext, inv: &mut Invocation) -> Result<()> {
    let name = match inv.args.get_one_word() {
        Some(name) => name,
        None => {
            inv.usage(ctx, "<name>");
            return Ok(());
        }
    };

    if ctx.custom_commands.remove(&name) {
        ctx.chat.send_response(format!("🗑️ Command !{} removed", normalize_name(&name)));
    } else {
        ctx.chat.send_response(format!("❌ No custom command named !{}", normalize_name(&name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::commands::DispatchOutcome;
    use crate::bot::context::testing::test_context;
    use crate::bot::outbound::OutboundAction;

    fn moderator() -> User {
        let mut user = User::new("modperson");
        user.moderator = true;
        user
    }

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry.register(&["modbot"], AccessLevel::Normal, |_, _| Ok(())).unwrap();
        CustomCommands::register(&mut registry).unwrap();
        registry
    }

    fn messages(actions: Vec<OutboundAction>) -> Vec<String> {
        actions
            .into_iter()
            .filter_map(|a| match a {
                OutboundAction::Message(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_record_format() {
        let command = CustomCommand {
            access: AccessLevel::Subscriber,
            text: "hello $(user) and welcome".to_string(),
        };
        let line = CustomCommand::encode("greet", &command);
        assert_eq!(line, "sub greet hello $(user) and welcome");
        assert_eq!(CustomCommand::decode(&line), Some(("greet".to_string(), command)));

        assert_eq!(CustomCommand::decode("bogus greet hi"), None);
        assert_eq!(CustomCommand::decode("mod lonely"), None);
    }

    #[test]
    fn test_add_use_edit_delete() {
        let mut t = test_context("streamer");
        let registry = registry();
        t.ctx.custom_commands.set_reserved(registry.names());
        let viewer = User::new("viewer");

        registry.dispatch(&mut t.ctx, &moderator(), "!addcom !discord Join us, $(user)! $(args)");
        assert_eq!(messages(t.ctx.chat.take()), vec!["✅ Command !discord added"]);

        assert_eq!(registry.dispatch(&mut t.ctx, &viewer, "!discord now"), DispatchOutcome::Unknown);
        assert_eq!(messages(t.ctx.chat.take()), vec!["Join us, viewer! now"]);

        registry.dispatch(&mut t.ctx, &moderator(), "!editcom -ul=sub discord Subs only in #$(channel)");
        assert_eq!(messages(t.ctx.chat.take()), vec!["✏️ Command !discord updated"]);
        assert_eq!(t.ctx.custom_commands.get("discord").unwrap().access, AccessLevel::Subscriber);

        registry.dispatch(&mut t.ctx, &viewer, "!discord");
        assert!(!t.ctx.chat.has_pending());

        let mut sub = User::new("subscriber");
        sub.subscriber = true;
        registry.dispatch(&mut t.ctx, &sub, "!discord");
        assert_eq!(messages(t.ctx.chat.take()), vec!["Subs only in #streamer"]);

        registry.dispatch(&mut t.ctx, &moderator(), "!delcom discord");
        assert_eq!(messages(t.ctx.chat.take()), vec!["🗑️ Command !discord removed"]);
        assert!(!t.ctx.custom_commands.contains("discord"));
    }

    #[test]
    fn test_editcom_requires_existing_command() {
        let mut t = test_context("streamer");
        let registry = registry();
        registry.dispatch(&mut t.ctx, &moderator(), "!editcom nothing some text");
        assert_eq!(messages(t.ctx.chat.take()), vec!["❌ No custom command named !nothing"]);
        assert!(!t.ctx.custom_commands.contains("nothing"));
    }

    #[test]
    fn test_builtins_cannot_be_shadowed() {
        let mut t = test_context("streamer");
        let registry = registry();
        t.ctx.custom_commands.set_reserved(registry.names());

        registry.dispatch(&mut t.ctx, &moderator(), "!addcom modbot gotcha");
        assert_eq!(messages(t.ctx.chat.take()), vec!["❌ !modbot is a built-in command"]);
    }

    #[test]
    fn test_addcom_usage_errors() {
        let mut t = test_context("streamer");
        let registry = registry();

        registry.dispatch(&mut t.ctx, &moderator(), "!addcom -ul=king cmd text");
        registry.dispatch(&mut t.ctx, &moderator(), "!addcom lonely");
        let replies = messages(t.ctx.chat.take());
        assert_eq!(replies.len(), 2);
        assert!(replies[0].contains("expected -ul="), "{}", replies[0]);
        assert!(replies[1].contains("missing arguments"), "{}", replies[1]);
        assert!(t.ctx.custom_commands.names().is_empty());
    }

    #[test]
    fn test_normal_users_cannot_add() {
        let mut t = test_context("streamer");
        let registry = registry();
        let outcome = registry.dispatch(&mut t.ctx, &User::new("viewer"), "!addcom x y");
        assert_eq!(outcome, DispatchOutcome::Denied);
        assert!(t.ctx.custom_commands.names().is_empty());
    }
}
