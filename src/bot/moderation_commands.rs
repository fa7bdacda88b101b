// src/bot/moderation_commands.rs - Chat commands for operating the moderation engine

use anyhow::Result;
use log::info;

use crate::bot::commands::{parse_switch, CommandRegistry, Invocation};
use crate::bot::context::BotContext;
use crate::bot::moderation::{RuleToggle, SpamPhrase};
use crate::bot::pattern_matching::PatternList;
use crate::types::AccessLevel;

/// Which pattern list a list command edits
#[derive(Debug, Clone, Copy)]
enum ListKind {
    Whitelist,
    Blacklist,
    Banlist,
    Words,
}

impl ListKind {
    fn list<'a>(&self, ctx: &'a BotContext) -> &'a PatternList {
        let lists = ctx.moderation.lists();
        match self {
            ListKind::Whitelist => &lists.whitelist,
            ListKind::Blacklist => &lists.blacklist,
            ListKind::Banlist => &lists.banlist,
            ListKind::Words => &lists.words,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ListKind::Whitelist => "link whitelist",
            ListKind::Blacklist => "link blacklist",
            ListKind::Banlist => "link banlist",
            ListKind::Words => "banned words",
        }
    }
}

const MODES: &[(&str, RuleToggle)] = &[
    ("linkmode", RuleToggle::Links),
    ("wordmode", RuleToggle::Words),
    ("symbolmode", RuleToggle::Symbols),
    ("capsmode", RuleToggle::Caps),
    ("emotemode", RuleToggle::Emotes),
    ("lengthmode", RuleToggle::Length),
    ("fakesubmode", RuleToggle::FakeSubscriptions),
];

/// Register every moderation operator command
pub fn register(registry: &mut CommandRegistry) -> Result<()> {
    registry.register(&["permit"], AccessLevel::Mod, permit)?;
    registry.register(&["linkallow"], AccessLevel::Mod, |ctx, inv| link_user(ctx, inv, true))?;
    registry.register(&["linkdeny"], AccessLevel::Mod, |ctx, inv| link_user(ctx, inv, false))?;

    for (name, kind) in [
        ("whitelist", ListKind::Whitelist),
        ("blacklist", ListKind::Blacklist),
        ("banlist", ListKind::Banlist),
        ("badword", ListKind::Words),
    ] {
        registry.register(&[name], AccessLevel::Mod, move |ctx, inv| edit_list(ctx, inv, kind))?;
    }

    for &(name, toggle) in MODES {
        registry.register(&[name], AccessLevel::Mod, move |ctx, inv| set_mode(ctx, inv, toggle))?;
    }

    registry.register(&["spamphrase"], AccessLevel::Mod, spam_phrase)?;
    registry.register(&["purge"], AccessLevel::Mod, purge)?;
    registry.register(&["purgeban"], AccessLevel::Mod, purge_ban)?;
    Ok(())
}

/// `!permit <user>`
fn permit(ctx: &mut BotContext, inv: &mut Invocation) -> Result<()> {
    let target = match inv.args.get_user_name() {
        Some(name) => name,
        None => {
            inv.usage(ctx, "<user>");
            return Ok(());
        }
    };

    ctx.moderation.permit(&target);
    info!(target: "moderation", "{} permitted {} to post one link", inv.user.name, target);
    ctx.chat.send_response(format!("{}, you may post one link", target));
    Ok(())
}

/// `!linkallow [-remove] <user>` and `!linkdeny [-remove] <user>`
fn link_user(ctx: &mut BotContext, inv: &mut Invocation, allow: bool) -> Result<()> {
    let remove = inv.args.get_flag("remove");
    let target = match inv.args.get_user_name() {
        Some(name) => name,
        None => {
            inv.usage(ctx, "[-remove] <user>");
            return Ok(());
        }
    };

    let list = if allow { "link allow list" } else { "link deny list" };
    if allow {
        ctx.moderation.set_link_allowed(&target, !remove);
    } else {
        ctx.moderation.set_link_denied(&target, !remove);
    }

    let response = if remove {
        format!("🗑️ {} removed from the {}", target, list)
    } else {
        format!("✅ {} added to the {}", target, list)
    };
    ctx.chat.send_response(response);
    Ok(())
}

/// `!whitelist|!blacklist|!banlist|!badword [-remove] <pattern>`; without a pattern lists the entries
fn edit_list(ctx: &mut BotContext, inv: &mut Invocation, kind: ListKind) -> Result<()> {
    let remove = inv.args.get_flag("remove");
    let pattern = inv.args.get_string();

    if pattern.is_empty() {
        if remove {
            inv.usage(ctx, "[-remove] <pattern>");
            return Ok(());
        }
        let entries = kind.list(ctx).patterns();
        let response = if entries.is_empty() {
            format!("The {} is empty", kind.label())
        } else {
            format!("{} ({}): {}", kind.label(), entries.len(), entries.join(", "))
        };
        ctx.chat.send_response(response);
        return Ok(());
    }

    let response = if remove {
        if kind.list(ctx).remove(&pattern) {
            format!("🗑️ Removed '{}' from the {}", pattern, kind.label())
        } else {
            format!("❌ '{}' is not in the {}", pattern, kind.label())
        }
    } else {
        match kind.list(ctx).add(&pattern) {
            Ok(stored) => format!("✅ Added '{}' to the {}", stored, kind.label()),
            Err(e) => format!("❌ {:#}", e),
        }
    };
    ctx.chat.send_response(response);
    Ok(())
}

/// `!<rule>mode on|off`; without an argument reports the current state
fn set_mode(ctx: &mut BotContext, inv: &mut Invocation, toggle: RuleToggle) -> Result<()> {
    let word = inv.args.get_one_word();
    let enabled = match word.as_deref().map(parse_switch) {
        None => {
            let state = if ctx.moderation.mode(toggle) { "on" } else { "off" };
            ctx.chat.send_response(format!("!{} is {}", inv.name, state));
            return Ok(());
        }
        Some(Some(enabled)) => enabled,
        Some(None) => {
            inv.usage(ctx, "on|off");
            return Ok(());
        }
    };

    ctx.moderation.set_mode(toggle, enabled);
    ctx.chat.send_response(format!("!{} {}", inv.name, if enabled { "on" } else { "off" }));
    Ok(())
}

/// `!spamphrase [-ban] [-duration=<secs>] <phrase>` or `!spamphrase -clear`
fn spam_phrase(ctx: &mut BotContext, inv: &mut Invocation) -> Result<()> {
    if inv.args.get_flag("clear") {
        ctx.moderation.set_spam_phrase(None);
        ctx.chat.send_response("Spam phrase cleared");
        return Ok(());
    }

    let ban = inv.args.get_flag("ban");
    let default_duration = ctx.moderation.settings().spam_phrase_duration as i64;
    let duration = inv.args.get_int_flag("duration", default_duration, false);
    let phrase = inv.args.get_string();

    if phrase.is_empty() {
        let response = match ctx.moderation.spam_phrase() {
            Some(spam) => format!("Spam phrase is '{}'", spam.phrase()),
            None => "No spam phrase set".to_string(),
        };
        ctx.chat.send_response(response);
        return Ok(());
    }
    if inv.args.has_error() || duration <= 0 {
        inv.usage(ctx, "[-ban] [-duration=<secs>] <phrase> | -clear");
        return Ok(());
    }

    let spam = SpamPhrase::new(&phrase, ban, duration as u64);
    let response = if ban {
        format!("Users saying '{}' will be banned", spam.phrase())
    } else {
        format!("Users saying '{}' will be timed out for {}s", spam.phrase(), spam.duration)
    };
    ctx.moderation.set_spam_phrase(Some(spam));
    ctx.chat.send_response(response);
    Ok(())
}

/// `!purge [-duration=<secs>] <text>`
fn purge(ctx: &mut BotContext, inv: &mut Invocation) -> Result<()> {
    let duration = inv.args.get_int_flag("duration", 1, false);
    let needle = inv.args.get_string();
    if needle.is_empty() || inv.args.has_error() || duration <= 0 {
        inv.usage(ctx, "[-duration=<secs>] <text>");
        return Ok(());
    }

    let purged = ctx.moderation.purge_recent(&mut ctx.chat, &needle, duration as u64);
    ctx.chat.send_response(format!("Purged {} users", purged.len()));
    Ok(())
}

/// `!purgeban <text>`
fn purge_ban(ctx: &mut BotContext, inv: &mut Invocation) -> Result<()> {
    let needle = inv.args.get_string();
    if needle.is_empty() {
        inv.usage(ctx, "<text>");
        return Ok(());
    }

    let banned = ctx.moderation.ban_recent(&mut ctx.chat, &needle);
    ctx.chat.send_response(format!("Banned {} users", banned.len()));
    Ok(())
}
