use anyhow::Result;
use warden_access::format_handles;

use super::{render_help, CommandContext, CommandServices};
use crate::group_admin::AdminStatus;
use crate::menu::MenuView;
use crate::replies;

pub(super) async fn help(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    ctx.reply(render_help(&services.config.prefix)).await
}

pub(super) async fn menu(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    let group_id = ctx.group()?;
    let view = MenuView::from_arg(ctx.first_arg());
    services
        .menu
        .send(group_id, view, &ctx.message.key)
        .await
}

pub(super) async fn ping(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    ctx.reply(services.config.ping_response.clone()).await
}

pub(super) async fn auth(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    let group_id = ctx.group()?;
    let Some(sender) = ctx.sender.as_ref() else {
        return ctx.reply(replies::CANNOT_VERIFY_ADMIN).await;
    };
    if services.store.list_allowlist().is_empty() {
        return ctx.reply(replies::ALLOWLIST_NOT_CONFIGURED).await;
    }

    let mut lines = vec![
        "🔐 Permission status".to_string(),
        String::new(),
        format!("Account: {}", sender.handle),
        format!(
            "Allowlisted: {}",
            if ctx.is_allowlisted { "yes ✅" } else { "no ❌" }
        ),
    ];
    if services.config.require_caller_admin {
        let admin = match services.admin.get_admin_status(group_id, &sender.handle).await {
            AdminStatus::Admin => "yes ✅",
            AdminStatus::NotAdmin => "no ❌",
            AdminStatus::Unknown => "could not verify",
        };
        lines.push(format!("Group admin: {admin}"));
    }
    lines.push(String::new());
    lines.push(if ctx.is_allowlisted {
        "You can use protected commands.".to_string()
    } else {
        replies::NOT_ALLOWLISTED.to_string()
    });
    ctx.reply(lines.join("\n")).await
}

pub(super) async fn targets(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    let prefix = &services.config.prefix;
    let mut lines = vec!["🎯 Targets".to_string(), String::new()];
    match ctx.target_source {
        Some(source) if !ctx.targets.is_empty() => {
            lines.push(format!(
                "Resolved {} {}: {}",
                replies::members(ctx.targets.len()),
                source.label(),
                format_handles(&ctx.targets, 5)
            ));
        }
        _ => lines.push("No target resolved from this message.".to_string()),
    }
    lines.extend([
        String::new(),
        "Targets are picked in this order:".to_string(),
        format!("1. Mentions: {prefix}kick @member"),
        format!("2. A reply: answer a message with {prefix}kick"),
        format!("3. Phone numbers: {prefix}kick +15551234567"),
    ]);
    ctx.reply(lines.join("\n")).await
}
