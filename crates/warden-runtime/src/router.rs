//! Inbound message pipeline.
//!
//! Every message walks the same gates in order and leaves at the first one
//! that decides its fate: scope filter, mute and moderation enforcement,
//! command parsing (or menu navigation), catalogue lookup, the group-only
//! check, the privilege gate, rate limiting and finally the handler. The
//! returned [`RouteOutcome`] names the exit taken.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use warden_access::{is_direct_chat_id, is_group_id, Handle, IdentityResolver, BROADCAST_CHAT_ID};
use warden_core::{current_unix_timestamp_ms, wait_seconds_ceil, StampCache};
use warden_store::Store;

use crate::commands::{
    execute, lookup_command, CommandCategory, CommandContext, CommandDefinition, CommandServices,
    Replier,
};
use crate::config::{BotConfig, COOLDOWN_CACHE_CEILING};
use crate::contract::{GroupTransport, InboundMessage, MembershipEvent};
use crate::enforcers::{ModerationEnforcer, MuteEnforcer, SenderIdentity, WarningGate};
use crate::group_admin::{AdminStatus, GroupAdminService};
use crate::membership::{MembershipHandler, MembershipReport};
use crate::menu::MenuManager;
use crate::parse::{parse_command, resolve_targets};
use crate::replies;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `DenialReason` values.
pub enum DenialReason {
    AllowlistNotConfigured,
    NotAllowlisted,
    CallerNotAdmin,
    CallerAdminUnverified,
    BotIdentityUnresolved,
    BotAdminUnverified,
    BotNotAdmin,
}

impl DenialReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllowlistNotConfigured => "allowlist_not_configured",
            Self::NotAllowlisted => "not_allowlisted",
            Self::CallerNotAdmin => "caller_not_admin",
            Self::CallerAdminUnverified => "caller_admin_unverified",
            Self::BotIdentityUnresolved => "bot_identity_unresolved",
            Self::BotAdminUnverified => "bot_admin_unverified",
            Self::BotNotAdmin => "bot_not_admin",
        }
    }

    pub fn reply_text(self) -> &'static str {
        match self {
            Self::AllowlistNotConfigured => replies::ALLOWLIST_NOT_CONFIGURED,
            Self::NotAllowlisted => replies::NOT_ALLOWLISTED,
            Self::CallerNotAdmin => replies::CALLER_NOT_ADMIN,
            Self::CallerAdminUnverified | Self::BotAdminUnverified => replies::CANNOT_VERIFY_ADMIN,
            Self::BotIdentityUnresolved => replies::BOT_IDENTITY_UNRESOLVED,
            Self::BotNotAdmin => replies::BOT_NOT_ADMIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
/// Enumerates supported `RouteOutcome` values.
pub enum RouteOutcome {
    Ignored,
    Muted,
    Moderated,
    MenuNavigated,
    NoCommand,
    UnknownCommand,
    GroupOnly,
    Denied(DenialReason),
    RateLimited,
    Executed,
    Failed,
}

impl RouteOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Muted => "muted",
            Self::Moderated => "moderated",
            Self::MenuNavigated => "menu_navigated",
            Self::NoCommand => "no_command",
            Self::UnknownCommand => "unknown_command",
            Self::GroupOnly => "group_only",
            Self::Denied(_) => "denied",
            Self::RateLimited => "rate_limited",
            Self::Executed => "executed",
            Self::Failed => "failed",
        }
    }
}

pub struct CommandRouter {
    services: CommandServices,
    mute: MuteEnforcer,
    moderation: ModerationEnforcer,
    membership: MembershipHandler,
    command_stamps: StampCache,
    fun_stamps: StampCache,
}

impl CommandRouter {
    pub fn new(
        config: BotConfig,
        store: Arc<Store>,
        transport: Arc<dyn GroupTransport>,
        resolver: IdentityResolver,
    ) -> Self {
        let admin = Arc::new(GroupAdminService::new(
            transport.clone(),
            resolver,
            config.group_snapshot_ttl_ms,
        ));
        let warnings = Arc::new(WarningGate::new(config.warning_cooldown_ms));
        let menu = MenuManager::new(
            &config.prefix,
            config.require_caller_admin,
            transport.clone(),
            config.menu_ttl_ms,
        );
        Self {
            mute: MuteEnforcer::new(store.clone(), transport.clone(), admin.clone(), warnings.clone()),
            moderation: ModerationEnforcer::new(store.clone(), transport.clone(), admin.clone(), warnings),
            membership: MembershipHandler::new(
                store.clone(),
                transport.clone(),
                admin.clone(),
                config.group_action_spacing_ms,
            ),
            command_stamps: StampCache::new(COOLDOWN_CACHE_CEILING),
            fun_stamps: StampCache::new(COOLDOWN_CACHE_CEILING),
            services: CommandServices {
                config,
                store,
                transport,
                admin,
                menu,
            },
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.services.config
    }

    pub fn admin(&self) -> &GroupAdminService {
        &self.services.admin
    }

    pub async fn handle_membership(&self, event: &MembershipEvent) -> MembershipReport {
        self.membership.handle(event).await
    }

    pub async fn handle(&self, message: &InboundMessage) -> RouteOutcome {
        let chat_id = message.key.chat_id.as_str();
        if message.key.from_self || chat_id == BROADCAST_CHAT_ID {
            return RouteOutcome::Ignored;
        }
        let in_group = is_group_id(chat_id);
        if !in_group && !is_direct_chat_id(chat_id) {
            return RouteOutcome::Ignored;
        }
        let Some(sender) = self.sender_identity(message, in_group).await else {
            tracing::debug!(chat = chat_id, "ignoring message without a usable sender id");
            return RouteOutcome::Ignored;
        };
        let store = &self.services.store;
        let is_allowlisted = store.is_any_allowlisted(&sender.candidates);

        if in_group {
            if self.mute.enforce(chat_id, &sender, message).await.is_enforced() {
                return RouteOutcome::Muted;
            }
            if self
                .moderation
                .enforce(chat_id, &sender, is_allowlisted, message)
                .await
                .is_enforced()
            {
                return RouteOutcome::Moderated;
            }
        }

        let prefix = self.services.config.prefix.as_str();
        let replier = Replier::new(self.services.transport.clone(), chat_id, &message.key);
        let Some(parsed) = parse_command(message.text(), prefix) else {
            if in_group {
                match self.services.menu.maybe_navigate(chat_id, message).await {
                    Ok(true) => return RouteOutcome::MenuNavigated,
                    Ok(false) => {}
                    Err(error) => {
                        tracing::warn!(group = chat_id, error = %error, "menu navigation failed");
                    }
                }
            }
            return RouteOutcome::NoCommand;
        };

        let Some(definition) = lookup_command(&parsed.name) else {
            tracing::debug!(chat = chat_id, command = %parsed.name, "unknown command");
            notify(&replier, replies::unknown_command(prefix)).await;
            return RouteOutcome::UnknownCommand;
        };
        if definition.group_only && !in_group {
            notify(&replier, replies::GROUP_ONLY).await;
            return RouteOutcome::GroupOnly;
        }

        if let Some(reason) = self
            .privilege_denial(definition, chat_id, &sender, is_allowlisted)
            .await
        {
            tracing::warn!(
                chat = chat_id,
                sender = %sender.handle,
                command = definition.name,
                reason = reason.as_str(),
                "command denied"
            );
            notify(&replier, reason.reply_text()).await;
            return RouteOutcome::Denied(reason);
        }

        if let Some(text) = self.rate_limit(definition, chat_id, &sender.handle) {
            tracing::warn!(
                chat = chat_id,
                sender = %sender.handle,
                command = definition.name,
                "command rate limited"
            );
            notify(&replier, text).await;
            return RouteOutcome::RateLimited;
        }

        let resolution = resolve_targets(&message.content, &parsed.args);
        let ctx = CommandContext {
            definition,
            chat_id: chat_id.to_string(),
            group_id: in_group.then(|| chat_id.to_string()),
            bot: self.services.admin.bot_handle(),
            sender: Some(sender),
            args: parsed.args,
            raw_args: parsed.raw_args,
            targets: resolution.targets,
            target_source: resolution.source,
            is_allowlisted,
            message: message.clone(),
            replier,
        };

        match execute(&self.services, &ctx).await {
            Ok(()) => {
                tracing::info!(
                    chat = chat_id,
                    command = definition.name,
                    targets = ctx.targets.len(),
                    "command executed"
                );
                RouteOutcome::Executed
            }
            Err(error) => {
                tracing::error!(
                    chat = chat_id,
                    command = definition.name,
                    args = %ctx.raw_args,
                    error = ?error,
                    "command handler failed"
                );
                notify(&ctx.replier, replies::GENERIC_FAILURE).await;
                RouteOutcome::Failed
            }
        }
    }

    async fn sender_identity(&self, message: &InboundMessage, in_group: bool) -> Option<SenderIdentity> {
        let resolver = self.services.admin.resolver();
        let primary = if in_group {
            message.key.author_id.as_deref().and_then(Handle::parse)
        } else {
            Handle::parse(&message.key.chat_id)
        };
        let alternate = message.key.author_alt_id.as_deref().and_then(Handle::parse);
        let handle = primary.or_else(|| alternate.clone())?;

        let mut candidates: BTreeSet<Handle> = resolver.resolve_candidates(&handle).await;
        if let Some(alternate) = alternate.filter(|alternate| *alternate != handle) {
            resolver.learn_pair(&handle, &alternate);
            candidates.insert(alternate);
        }
        Some(SenderIdentity { handle, candidates })
    }

    async fn privilege_denial(
        &self,
        definition: &CommandDefinition,
        group_id: &str,
        sender: &SenderIdentity,
        is_allowlisted: bool,
    ) -> Option<DenialReason> {
        if !definition.privileged {
            return None;
        }
        if !is_allowlisted {
            if self.services.store.list_allowlist().is_empty() {
                return Some(DenialReason::AllowlistNotConfigured);
            }
            return Some(DenialReason::NotAllowlisted);
        }
        let admin = &self.services.admin;
        if self.services.config.require_caller_admin {
            match admin.get_admin_status(group_id, &sender.handle).await {
                AdminStatus::Admin => {}
                AdminStatus::NotAdmin => return Some(DenialReason::CallerNotAdmin),
                AdminStatus::Unknown => return Some(DenialReason::CallerAdminUnverified),
            }
        }
        if definition.requires_bot_admin {
            match admin.bot_admin_status(group_id).await {
                None => return Some(DenialReason::BotIdentityUnresolved),
                Some(AdminStatus::Unknown) => return Some(DenialReason::BotAdminUnverified),
                Some(AdminStatus::NotAdmin) => return Some(DenialReason::BotNotAdmin),
                Some(AdminStatus::Admin) => {}
            }
        }
        None
    }

    /// Checks both cooldown clocks and stamps them when the command may run.
    fn rate_limit(
        &self,
        definition: &CommandDefinition,
        chat_id: &str,
        sender: &Handle,
    ) -> Option<String> {
        let config = &self.services.config;
        let now_ms = current_unix_timestamp_ms();
        let command_key = format!("{chat_id}|{sender}|cmd");
        let fun_key = format!("{chat_id}|{sender}|fun");
        let is_fun = definition.category == CommandCategory::Fun;

        let remaining = self
            .command_stamps
            .remaining_ms(&command_key, config.command_cooldown_ms, now_ms);
        if remaining > 0 {
            return Some(replies::command_cooldown(wait_seconds_ceil(remaining)));
        }
        if is_fun {
            let remaining = self
                .fun_stamps
                .remaining_ms(&fun_key, config.fun_cooldown_ms, now_ms);
            if remaining > 0 {
                return Some(replies::fun_cooldown(wait_seconds_ceil(remaining)));
            }
            self.fun_stamps.stamp(&fun_key, now_ms);
        }
        self.command_stamps.stamp(&command_key, now_ms);
        None
    }
}

async fn notify(replier: &Replier, text: impl Into<String>) {
    if let Err(error) = replier.reply(text).await {
        tracing::warn!(error = %error, "failed to send router reply");
    }
}
