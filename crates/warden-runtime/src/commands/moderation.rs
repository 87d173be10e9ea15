use anyhow::Result;
use warden_store::{ModerationFlag, Store, MAX_WELCOME_TEMPLATE_CHARS};

use super::{CommandContext, CommandId, CommandServices};
use crate::parse::parse_on_off;
use crate::replies::on_off;

const FILTER_LIST_LIMIT: usize = 30;
const MAX_PHRASE_CHARS: usize = 200;
const WELCOME_PREVIEW_CHARS: usize = 900;

/// Current moderation settings of a group as a short status block.
pub(crate) fn render_rules(store: &Store, group_id: &str) -> String {
    let settings = store.get_moderation(group_id);
    [
        "📜 Group rules".to_string(),
        String::new(),
        format!("• Links: {}", on_off(settings.anti_link)),
        format!("• Images: {}", on_off(settings.anti_image)),
        format!("• Stickers: {}", on_off(settings.anti_sticker)),
        format!(
            "• Banned phrases: {} ({})",
            on_off(settings.filter_enabled),
            settings.banned_words.len()
        ),
        String::new(),
        "Exemptions".to_string(),
        format!("• Allowlisted members: {}", on_off(settings.exempt_allowlisted)),
        format!("• Group admins: {}", on_off(settings.exempt_admins)),
    ]
    .join("\n")
}

/// Text after the command prefix and the first `skip` whitespace-separated
/// tokens, line breaks kept.
fn trailing_text<'a>(text: &'a str, prefix: &str, skip: usize) -> &'a str {
    let trimmed = text.trim_start();
    let mut rest = trimmed.strip_prefix(prefix).unwrap_or(trimmed).trim_start();
    for _ in 0..skip {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = rest[end..].trim_start();
    }
    rest.trim_end()
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out = text.chars().take(limit).collect::<String>();
    out.push('…');
    out
}

pub(super) async fn rules(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    let group_id = ctx.group()?;
    ctx.reply(render_rules(&services.store, group_id)).await
}

pub(super) async fn toggle(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    let group_id = ctx.group()?;
    let (flag, label) = match ctx.definition.id {
        CommandId::AntiLink => (ModerationFlag::AntiLink, "Anti-link"),
        CommandId::AntiImage => (ModerationFlag::AntiImage, "Anti-image"),
        _ => (ModerationFlag::AntiSticker, "Anti-sticker"),
    };
    let Some(value) = parse_on_off(ctx.first_arg()) else {
        let current = services.store.get_moderation(group_id).flag(flag);
        return ctx
            .reply(format!(
                "{label} is {}.\nUsage: {}{} on|off",
                on_off(current),
                services.config.prefix,
                ctx.definition.name
            ))
            .await;
    };

    let outcome = services
        .store
        .set_moderation_flag(group_id, flag, value)
        .await?;
    tracing::info!(
        group = group_id,
        flag = flag.as_str(),
        value,
        changed = outcome.changed,
        "moderation flag updated"
    );
    let state = if value { "enabled" } else { "disabled" };
    let text = match (outcome.changed, value) {
        (true, true) => format!("✅ {label} enabled."),
        (true, false) => format!("❌ {label} disabled."),
        (false, _) => format!("{label} was already {state}."),
    };
    ctx.reply(text).await
}

pub(super) async fn filter(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    let group_id = ctx.group()?;
    let prefix = &services.config.prefix;
    let usage = format!(
        "Usage:\n{prefix}filter on|off\n{prefix}filter add <phrase>\n{prefix}filter remove <phrase>\n{prefix}filter list"
    );
    let subcommand = ctx.first_arg().to_lowercase();

    match subcommand.as_str() {
        "add" => {
            let phrase = trailing_text(ctx.message.text(), prefix, 2);
            if phrase.is_empty() {
                return ctx.reply(usage).await;
            }
            if phrase.chars().count() > MAX_PHRASE_CHARS {
                return ctx
                    .reply(format!(
                        "That phrase is too long (maximum {MAX_PHRASE_CHARS} characters)."
                    ))
                    .await;
            }
            let outcome = services.store.add_banned_word(group_id, phrase).await?;
            if outcome.added == 0 {
                return ctx.reply("That phrase is already in the list.").await;
            }
            tracing::info!(group = group_id, total = outcome.total, "banned phrase added");
            let mut text = format!("✅ Phrase added ({} in the list).", outcome.total);
            if !services.store.get_moderation(group_id).filter_enabled {
                text.push_str(&format!("\nThe filter is off. Turn it on with {prefix}filter on."));
            }
            ctx.reply(text).await
        }
        "remove" | "del" | "delete" => {
            let phrase = trailing_text(ctx.message.text(), prefix, 2);
            if phrase.is_empty() {
                return ctx.reply(usage).await;
            }
            let outcome = services.store.remove_banned_word(group_id, phrase).await?;
            if outcome.removed == 0 {
                return ctx.reply("That phrase is not in the list.").await;
            }
            tracing::info!(group = group_id, total = outcome.total, "banned phrase removed");
            ctx.reply(format!("🗑️ Phrase removed ({} left).", outcome.total))
                .await
        }
        "list" => {
            let words = services.store.list_banned_words(group_id);
            if words.is_empty() {
                return ctx.reply("No banned phrases yet.").await;
            }
            let mut lines = vec![format!("🚫 Banned phrases ({})", words.len()), String::new()];
            lines.extend(
                words
                    .iter()
                    .take(FILTER_LIST_LIMIT)
                    .enumerate()
                    .map(|(index, word)| format!("{}. {word}", index + 1)),
            );
            if words.len() > FILTER_LIST_LIMIT {
                lines.push(format!("... (+{})", words.len() - FILTER_LIST_LIMIT));
            }
            ctx.reply(lines.join("\n")).await
        }
        other => {
            let Some(value) = parse_on_off(other) else {
                let settings = services.store.get_moderation(group_id);
                return ctx
                    .reply(format!(
                        "Filter is {} with {} phrases.\n\n{usage}",
                        on_off(settings.filter_enabled),
                        settings.banned_words.len()
                    ))
                    .await;
            };
            let outcome = services
                .store
                .set_moderation_flag(group_id, ModerationFlag::FilterEnabled, value)
                .await?;
            tracing::info!(group = group_id, value, changed = outcome.changed, "filter toggled");
            ctx.reply(format!("Filter is now {}.", on_off(value))).await
        }
    }
}

pub(super) async fn exempt(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    let group_id = ctx.group()?;
    let prefix = &services.config.prefix;
    let kind = ctx.first_arg().to_lowercase();
    let flag = match kind.as_str() {
        "allowlist" | "allowlisted" | "allowed" => Some(ModerationFlag::ExemptAllowlisted),
        "admins" | "admin" | "groupadmins" | "groupadmin" => Some(ModerationFlag::ExemptAdmins),
        _ => None,
    };
    let value = ctx.args.get(1).and_then(|raw| parse_on_off(raw));
    let (Some(flag), Some(value)) = (flag, value) else {
        let settings = services.store.get_moderation(group_id);
        return ctx
            .reply(format!(
                "Exemptions\n• Allowlisted members: {}\n• Group admins: {}\n\nUsage: {prefix}exempt allowlist|admins on|off",
                on_off(settings.exempt_allowlisted),
                on_off(settings.exempt_admins)
            ))
            .await;
    };

    services
        .store
        .set_moderation_flag(group_id, flag, value)
        .await?;
    tracing::info!(group = group_id, flag = flag.as_str(), value, "exemption updated");
    let who = match flag {
        ModerationFlag::ExemptAdmins => "Group admins",
        _ => "Allowlisted members",
    };
    let text = if value {
        format!("✅ {who} are now exempt from moderation.")
    } else {
        format!("❌ {who} are no longer exempt from moderation.")
    };
    ctx.reply(text).await
}

pub(super) async fn welcome(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    let group_id = ctx.group()?;
    let prefix = &services.config.prefix;
    let subcommand = ctx.first_arg().to_lowercase();

    if subcommand == "set" {
        let template = trailing_text(ctx.message.text(), prefix, 2).replace("\\n", "\n");
        if template.trim().is_empty() {
            return ctx
                .reply(format!(
                    "Usage: {prefix}welcome set <text>\nPlaceholders: {{user}} {{group}} {{rules}}"
                ))
                .await;
        }
        if template.chars().count() > MAX_WELCOME_TEMPLATE_CHARS {
            return ctx
                .reply(format!(
                    "The welcome message is too long (maximum {MAX_WELCOME_TEMPLATE_CHARS} characters)."
                ))
                .await;
        }
        let outcome = services
            .store
            .set_welcome_template(group_id, &template)
            .await?;
        tracing::info!(group = group_id, changed = outcome.changed, "welcome template updated");
        return ctx.reply("✅ Welcome message updated.").await;
    }

    if let Some(value) = parse_on_off(&subcommand) {
        services.store.set_welcome_enabled(group_id, value).await?;
        tracing::info!(group = group_id, value, "welcome toggled");
        return ctx
            .reply(format!("Welcome messages are now {}.", on_off(value)))
            .await;
    }

    let settings = services.store.get_welcome(group_id);
    ctx.reply(format!(
        "👋 Welcome messages: {}\n\nCurrent message:\n{}\n\nUsage: {prefix}welcome on|off\n{prefix}welcome set <text>",
        on_off(settings.enabled),
        truncate_chars(&settings.template, WELCOME_PREVIEW_CHARS)
    ))
    .await
}
