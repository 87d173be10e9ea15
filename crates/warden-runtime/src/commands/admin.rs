use anyhow::Result;
use warden_access::{format_handles, Handle};
use warden_core::current_unix_timestamp_ms;

use super::{CommandContext, CommandId, CommandServices};
use crate::contract::{OutboundContent, ParticipantAction, SendOptions};
use crate::group_admin::{AdminStatus, ParticipantActionReport};
use crate::parse::{parse_duration_token, MuteDuration, TargetSource};
use crate::replies;

const FAILED_LIST_LIMIT: usize = 5;

fn usage_example(services: &CommandServices, ctx: &CommandContext, suffix: &str) -> String {
    format!(
        "{}{} @member{suffix}",
        services.config.prefix, ctx.definition.name
    )
}

/// Targets with the bot removed and rewritten to the group's ids. Replies and
/// returns `None` when nothing is left to act on.
async fn sanitized_targets(
    services: &CommandServices,
    ctx: &CommandContext,
    group_id: &str,
    example_suffix: &str,
) -> Result<Option<Vec<Handle>>> {
    if ctx.targets.is_empty() {
        ctx.reply(replies::no_targets(&usage_example(services, ctx, example_suffix)))
            .await?;
        return Ok(None);
    }
    let targets = services.admin.sanitize_targets(group_id, &ctx.targets).await;
    if targets.is_empty() {
        ctx.reply(format!("{} The bot cannot target itself.", replies::NOTHING_DONE))
            .await?;
        return Ok(None);
    }
    Ok(Some(targets))
}

fn failed_line(report: &ParticipantActionReport) -> Option<String> {
    (!report.failed.is_empty()).then(|| {
        format!(
            "⚠️ Failed for {}: {}",
            replies::members(report.failed.len()),
            format_handles(&report.failed, FAILED_LIST_LIMIT)
        )
    })
}

pub(super) async fn participant_update(
    services: &CommandServices,
    ctx: &CommandContext,
) -> Result<()> {
    let group_id = ctx.group()?;
    let (action, verb) = match ctx.definition.id {
        CommandId::Promote => (ParticipantAction::Promote, "Promoted"),
        CommandId::Demote => (ParticipantAction::Demote, "Demoted"),
        _ => (ParticipantAction::Remove, "Removed"),
    };
    let Some(targets) = sanitized_targets(services, ctx, group_id, "").await? else {
        return Ok(());
    };

    let report = services
        .admin
        .run_participant_action(
            group_id,
            &targets,
            action,
            services.config.group_action_spacing_ms,
        )
        .await;
    tracing::info!(
        group = group_id,
        action = action.as_str(),
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "participant update finished"
    );

    let mut lines = Vec::new();
    if report.succeeded.is_empty() {
        lines.push(format!("❌ {verb} nobody."));
    } else {
        lines.push(format!("✅ {verb} {}.", replies::members(report.succeeded.len())));
    }
    lines.extend(failed_line(&report));
    ctx.reply(lines.join("\n")).await
}

pub(super) async fn ban(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    let group_id = ctx.group()?;
    let Some(targets) = sanitized_targets(services, ctx, group_id, "").await? else {
        return Ok(());
    };

    let report = services
        .admin
        .run_participant_action(
            group_id,
            &targets,
            ParticipantAction::Remove,
            services.config.group_action_spacing_ms,
        )
        .await;

    let mut lines = Vec::new();
    if report.succeeded.is_empty() {
        lines.push("❌ Nobody was removed, so no ban was recorded.".to_string());
    } else {
        let removed = replies::members(report.succeeded.len());
        match services.store.add_bans(group_id, &report.succeeded).await {
            Ok(outcome) if outcome.added > 0 => {
                tracing::info!(
                    group = group_id,
                    added = outcome.added,
                    total = outcome.total,
                    "bans recorded"
                );
                lines.push(format!(
                    "🚫 Removed {removed}. Ban stored for {}.",
                    replies::members(outcome.added)
                ));
            }
            Ok(_) => lines.push(format!("🚫 Removed {removed}. They were already banned.")),
            Err(error) => {
                tracing::error!(group = group_id, error = %error, "failed to record bans");
                lines.push(format!(
                    "⚠️ Removed {removed}, but the ban could not be recorded."
                ));
            }
        }
    }
    lines.extend(failed_line(&report));
    ctx.reply(lines.join("\n")).await
}

pub(super) async fn unban(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    let group_id = ctx.group()?;
    if ctx.targets.is_empty() {
        return ctx
            .reply(replies::no_targets(&format!(
                "{}unban +15551234567",
                services.config.prefix
            )))
            .await;
    }

    let by_number = ctx.target_source == Some(TargetSource::Number);
    if by_number {
        let directive = OutboundContent::Delete {
            key: ctx.message.key.clone(),
        };
        if let Err(error) = services
            .transport
            .send_message(group_id, directive, SendOptions::default())
            .await
        {
            tracing::debug!(group = group_id, error = %error, "could not delete unban command");
        }
    }

    let candidates = services
        .admin
        .resolver()
        .resolve_all(&ctx.targets)
        .await
        .into_iter()
        .collect::<Vec<_>>();
    let outcome = services.store.remove_bans(group_id, &candidates).await?;
    tracing::info!(
        group = group_id,
        removed = outcome.removed,
        total = outcome.total,
        "bans lifted"
    );

    let text = if outcome.removed > 0 {
        format!("✅ Ban lifted ({} removed).", outcome.removed)
    } else {
        "No matching ban was found.".to_string()
    };
    if by_number {
        ctx.replier.reply_unquoted(text).await
    } else {
        ctx.reply(text).await
    }
}

enum DurationArg {
    Indefinite,
    For(MuteDuration),
    TooLong(MuteDuration),
}

fn duration_arg(args: &[String]) -> DurationArg {
    match args.iter().find_map(|arg| parse_duration_token(arg)) {
        None => DurationArg::Indefinite,
        Some(duration) if duration.exceeds_maximum() => DurationArg::TooLong(duration),
        Some(duration) => DurationArg::For(duration),
    }
}

pub(super) async fn mute(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    let group_id = ctx.group()?;
    let duration = match duration_arg(&ctx.args) {
        DurationArg::TooLong(duration) => {
            return ctx
                .reply(format!(
                    "{} is too long. Mutes last at most 365 days.",
                    duration.describe()
                ))
                .await;
        }
        DurationArg::For(duration) => Some(duration),
        DurationArg::Indefinite => None,
    };
    let Some(targets) = sanitized_targets(services, ctx, group_id, " 10m").await? else {
        return Ok(());
    };

    let until_ms = duration.map(|d| current_unix_timestamp_ms().saturating_add(d.millis));
    let outcome = services.store.add_mutes(group_id, &targets, until_ms).await?;
    tracing::info!(
        group = group_id,
        added = outcome.added,
        updated = outcome.updated,
        until_ms = ?until_ms,
        "mutes recorded"
    );

    let span = duration.map_or_else(|| "until unmuted".to_string(), |d| format!("for {}", d.describe()));
    let mut lines = Vec::new();
    if outcome.is_noop() {
        lines.push(format!(
            "🔇 Already muted {span}: {}.",
            format_handles(&targets, FAILED_LIST_LIMIT)
        ));
    } else {
        lines.push(format!(
            "🔇 Muted {} {span}.",
            replies::members(outcome.added + outcome.updated)
        ));
        let unchanged = targets.len().saturating_sub(outcome.added + outcome.updated);
        if unchanged > 0 {
            lines.push(format!("{} already muted.", replies::members(unchanged)));
        }
    }
    match services.admin.bot_admin_status(group_id).await {
        Some(AdminStatus::Admin) => {}
        Some(AdminStatus::NotAdmin) => lines.push(
            "Note: the bot is not an admin, so it cannot delete their messages.".to_string(),
        ),
        Some(AdminStatus::Unknown) | None => lines.push(
            "Note: could not verify that the bot is an admin; their messages may stay visible."
                .to_string(),
        ),
    }
    ctx.reply(lines.join("\n")).await
}

pub(super) async fn unmute(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    let group_id = ctx.group()?;
    if ctx.targets.is_empty() {
        return ctx
            .reply(replies::no_targets(&usage_example(services, ctx, "")))
            .await;
    }
    let candidates = services
        .admin
        .resolver()
        .resolve_all(&ctx.targets)
        .await
        .into_iter()
        .collect::<Vec<_>>();
    let outcome = services.store.remove_mutes(group_id, &candidates).await?;
    tracing::info!(group = group_id, removed = outcome.removed, "mutes lifted");
    let text = if outcome.removed > 0 {
        "🔊 Mute lifted.".to_string()
    } else {
        "Nobody matching was muted.".to_string()
    };
    ctx.reply(text).await
}

pub(super) async fn allowlist(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    let prefix = &services.config.prefix;
    let usage = format!(
        "Usage:\n{prefix}allowlist add @member\n{prefix}allowlist remove @member\n{prefix}allowlist list"
    );
    match ctx.first_arg().to_lowercase().as_str() {
        "add" => {
            if ctx.targets.is_empty() {
                return ctx.reply(usage).await;
            }
            let outcome = services.store.add_allowlist(&ctx.targets).await?;
            tracing::info!(added = outcome.added, total = outcome.total, "allowlist extended");
            if outcome.added == 0 {
                return ctx.reply("Already on the allowlist.").await;
            }
            ctx.reply(format!(
                "✅ Added {} to the allowlist ({} total).",
                replies::members(outcome.added),
                outcome.total
            ))
            .await
        }
        "remove" | "del" | "delete" => {
            if ctx.targets.is_empty() {
                return ctx.reply(usage).await;
            }
            let candidates = services
                .admin
                .resolver()
                .resolve_all(&ctx.targets)
                .await
                .into_iter()
                .collect::<Vec<_>>();
            let outcome = services.store.remove_allowlist(&candidates).await?;
            tracing::info!(removed = outcome.removed, total = outcome.total, "allowlist reduced");
            if outcome.removed == 0 {
                return ctx.reply("Not on the allowlist.").await;
            }
            ctx.reply(format!(
                "🗑️ Removed from the allowlist ({} left).",
                outcome.total
            ))
            .await
        }
        "list" => {
            let entries = services.store.list_allowlist();
            if entries.is_empty() {
                return ctx.reply(replies::ALLOWLIST_NOT_CONFIGURED).await;
            }
            let mut lines = vec![format!("🛡️ Allowlist ({})", entries.len()), String::new()];
            lines.extend(entries.iter().map(|handle| format!("- {handle}")));
            ctx.reply(lines.join("\n")).await
        }
        _ => ctx.reply(usage).await,
    }
}

#[cfg(test)]
mod tests {
    use super::{duration_arg, DurationArg};

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn unit_duration_arg_scans_all_arguments() {
        assert!(matches!(duration_arg(&args(&["@15550000002"])), DurationArg::Indefinite));
        match duration_arg(&args(&["@15550000002", "2h"])) {
            DurationArg::For(duration) => assert_eq!(duration.describe(), "2 hours"),
            _ => panic!("expected a duration"),
        }
        assert!(matches!(duration_arg(&args(&["53w"])), DurationArg::TooLong(_)));
        assert!(matches!(duration_arg(&args(&["52w"])), DurationArg::For(_)));
    }
}
