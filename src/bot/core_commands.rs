// src/bot/core_commands.rs - Built-in commands for output modes, regulars and status

use anyhow::Result;
use log::info;

use crate::bot::commands::{parse_switch, CommandRegistry, Invocation};
use crate::bot::context::BotContext;
use crate::bot::outbound::OutputModes;
use crate::types::AccessLevel;

#[derive(Debug, Clone, Copy)]
enum OutputMode {
    Silent,
    Quiet,
    Passive,
}

impl OutputMode {
    fn get(&self, modes: &OutputModes) -> bool {
        match self {
            OutputMode::Silent => modes.is_silent(),
            OutputMode::Quiet => modes.is_quiet(),
            OutputMode::Passive => modes.is_passive(),
        }
    }

    fn set(&self, modes: &OutputModes, on: bool) {
        match self {
            OutputMode::Silent => modes.set_silent(on),
            OutputMode::Quiet => modes.set_quiet(on),
            OutputMode::Passive => modes.set_passive(on),
        }
    }
}

pub fn register(registry: &mut CommandRegistry) -> Result<()> {
    for (name, mode) in [
        ("silent", OutputMode::Silent),
        ("quiet", OutputMode::Quiet),
        ("passive", OutputMode::Passive),
    ] {
        registry.register(&[name], AccessLevel::Mod, move |ctx, inv| output_mode(ctx, inv, mode))?;
    }
    registry.register(&["regular"], AccessLevel::Mod, regular)?;
    registry.register(&["modbot", "bot"], AccessLevel::Normal, status)?;
    Ok(())
}

/// `!silent|!quiet|!passive [on|off]`
fn output_mode(ctx: &mut BotContext, inv: &mut Invocation, mode: OutputMode) -> Result<()> {
    let modes = ctx.chat.modes().clone();
    match inv.args.get_one_word() {
        None => {
            let state = if mode.get(&modes) { "on" } else { "off" };
            ctx.chat.send_response(format!("{} mode is {}", inv.name, state));
        }
        Some(word) => match parse_switch(&word) {
            Some(on) => {
                // announce before going silent, and after leaving it
                if on {
                    ctx.chat.send_response(format!("{} mode on", inv.name));
                    mode.set(&modes, true);
                } else {
                    mode.set(&modes, false);
                    ctx.chat.send_response(format!("{} mode off", inv.name));
                }
                info!(target: "core", "{} set {} mode {}", inv.user.name, inv.name, if on { "on" } else { "off" });
            }
            None => inv.usage(ctx, "[on|off]"),
        },
    }
    Ok(())
}

/// `!regular [-remove] <user>`
fn regular(ctx: &mut BotContext, inv: &mut Invocation) -> Result<()> {
    let remove = inv.args.get_flag("remove");
    let target = match inv.args.get_user_name() {
        Some(name) => name,
        None => {
            inv.usage(ctx, "[-remove] <user>");
            return Ok(());
        }
    };

    let changed = ctx.users.set_regular(&target, !remove);
    let response = match (remove, changed) {
        (false, true) => format!("✅ {} is now a regular", target),
        (false, false) => format!("{} is already a regular", target),
        (true, true) => format!("🗑️ {} is no longer a regular", target),
        (true, false) => format!("{} is not a regular", target),
    };
    ctx.chat.send_response(response);
    Ok(())
}

/// `!modbot`: version and uptime
fn status(ctx: &mut BotContext, _inv: &mut Invocation) -> Result<()> {
    let uptime = ctx.started_at.elapsed().as_secs();
    let stream = if ctx.stream.live {
        format!("live with {} viewers", ctx.stream.viewers)
    } else {
        "offline".to_string()
    };
    ctx.chat.send_response(format!(
        "modbot v{} | up {}h {}m | #{} is {}",
        env!("CARGO_PKG_VERSION"),
        uptime / 3600,
        (uptime % 3600) / 60,
        ctx.channel,
        stream
    ));
    Ok(())
}
