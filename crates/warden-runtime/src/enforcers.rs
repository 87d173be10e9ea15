//! Per-message enforcement: mutes first, then the moderation rules.
//!
//! Both enforcers share the same side-effect sequence. The offending message
//! is deleted only when the bot is a confirmed admin, then a mention warning
//! is sent unless the same `(group, sender, rule)` was warned within the
//! cooldown. Transport failures are logged and swallowed.

use std::collections::BTreeSet;
use std::sync::Arc;

use warden_access::Handle;
use warden_core::{current_unix_timestamp_ms, StampCache};
use warden_store::Store;

use crate::config::WARNING_CACHE_CEILING;
use crate::contract::{GroupTransport, InboundMessage, OutboundContent, SendOptions};
use crate::group_admin::{AdminStatus, GroupAdminService};
use crate::moderation_rules::first_violation;

const MUTE_RULE_KEY: &str = "mute";

/// The sender of an inbound message with every handle it is known by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub handle: Handle,
    pub candidates: BTreeSet<Handle>,
}

/// Suppresses repeated warnings for the same `(group, sender, rule)`.
#[derive(Debug)]
pub struct WarningGate {
    cooldown_ms: u64,
    stamps: StampCache,
}

impl WarningGate {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms,
            stamps: StampCache::new(WARNING_CACHE_CEILING),
        }
    }

    pub fn should_warn(&self, group_id: &str, sender: &Handle, rule: &str, now_ms: u64) -> bool {
        let key = format!("{group_id}|{sender}|{rule}");
        self.stamps.admit(&key, self.cooldown_ms, now_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `EnforcementOutcome` values.
pub enum EnforcementOutcome {
    NotEnforced,
    Enforced { deleted: bool, warned: bool },
}

impl EnforcementOutcome {
    pub fn is_enforced(self) -> bool {
        matches!(self, Self::Enforced { .. })
    }
}

struct EnforcementActions {
    transport: Arc<dyn GroupTransport>,
    admin: Arc<GroupAdminService>,
    warnings: Arc<WarningGate>,
}

impl EnforcementActions {
    async fn delete_then_warn(
        &self,
        group_id: &str,
        sender: &SenderIdentity,
        message: &InboundMessage,
        rule_key: &str,
        warning: String,
    ) -> EnforcementOutcome {
        let deleted = self.delete_if_bot_admin(group_id, sender, message, rule_key).await;

        if !self
            .warnings
            .should_warn(group_id, &sender.handle, rule_key, current_unix_timestamp_ms())
        {
            return EnforcementOutcome::Enforced {
                deleted,
                warned: false,
            };
        }

        let content = OutboundContent::text_with_mentions(warning, vec![sender.handle.clone()]);
        let warned = match self
            .transport
            .send_message(group_id, content, SendOptions::default())
            .await
        {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!(
                    group = group_id,
                    sender = %sender.handle,
                    rule = rule_key,
                    error = %error,
                    "failed to send enforcement warning"
                );
                false
            }
        };
        EnforcementOutcome::Enforced { deleted, warned }
    }

    async fn delete_if_bot_admin(
        &self,
        group_id: &str,
        sender: &SenderIdentity,
        message: &InboundMessage,
        rule_key: &str,
    ) -> bool {
        match self.admin.bot_admin_status(group_id).await {
            Some(AdminStatus::Admin) => {}
            status => {
                tracing::debug!(
                    group = group_id,
                    rule = rule_key,
                    bot_status = status.map_or("unresolved", AdminStatus::as_str),
                    "skipping delete without confirmed bot admin"
                );
                return false;
            }
        }
        let directive = OutboundContent::Delete {
            key: message.key.clone(),
        };
        match self
            .transport
            .send_message(group_id, directive, SendOptions::default())
            .await
        {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!(
                    group = group_id,
                    sender = %sender.handle,
                    rule = rule_key,
                    error = %error,
                    "failed to delete message"
                );
                false
            }
        }
    }
}

/// Deletes messages from muted members.
pub struct MuteEnforcer {
    store: Arc<Store>,
    actions: EnforcementActions,
}

impl MuteEnforcer {
    pub fn new(
        store: Arc<Store>,
        transport: Arc<dyn GroupTransport>,
        admin: Arc<GroupAdminService>,
        warnings: Arc<WarningGate>,
    ) -> Self {
        Self {
            store,
            actions: EnforcementActions {
                transport,
                admin,
                warnings,
            },
        }
    }

    /// Enforced means the message must not be processed further.
    pub async fn enforce(
        &self,
        group_id: &str,
        sender: &SenderIdentity,
        message: &InboundMessage,
    ) -> EnforcementOutcome {
        let now_ms = current_unix_timestamp_ms();
        let status = sender
            .candidates
            .iter()
            .map(|candidate| self.store.get_mute_at(group_id, candidate, now_ms))
            .find(|status| status.muted);
        let Some(status) = status else {
            return EnforcementOutcome::NotEnforced;
        };

        let warning = format!("⚠️ {} you are muted in this group.", sender.handle.mention_tag());
        let outcome = self
            .actions
            .delete_then_warn(group_id, sender, message, MUTE_RULE_KEY, warning)
            .await;
        if let EnforcementOutcome::Enforced { deleted, warned } = outcome {
            tracing::info!(
                group = group_id,
                sender = %sender.handle,
                deleted,
                warned,
                until_ms = ?status.until,
                "mute enforced"
            );
        }
        outcome
    }
}

/// Applies the group's moderation rules to one message.
pub struct ModerationEnforcer {
    store: Arc<Store>,
    actions: EnforcementActions,
}

impl ModerationEnforcer {
    pub fn new(
        store: Arc<Store>,
        transport: Arc<dyn GroupTransport>,
        admin: Arc<GroupAdminService>,
        warnings: Arc<WarningGate>,
    ) -> Self {
        Self {
            store,
            actions: EnforcementActions {
                transport,
                admin,
                warnings,
            },
        }
    }

    pub async fn enforce(
        &self,
        group_id: &str,
        sender: &SenderIdentity,
        is_allowlisted: bool,
        message: &InboundMessage,
    ) -> EnforcementOutcome {
        let settings = self.store.get_moderation(group_id);
        if !settings.any_rule_enabled() {
            return EnforcementOutcome::NotEnforced;
        }
        if settings.exempt_allowlisted && is_allowlisted {
            return EnforcementOutcome::NotEnforced;
        }
        let Some(violation) = first_violation(&settings, &message.content) else {
            return EnforcementOutcome::NotEnforced;
        };
        if settings.exempt_admins {
            match self
                .actions
                .admin
                .get_admin_status(group_id, &sender.handle)
                .await
            {
                AdminStatus::Admin => return EnforcementOutcome::NotEnforced,
                AdminStatus::Unknown => {
                    // Admin exemption cannot be ruled out; the message is let through.
                    tracing::debug!(
                        group = group_id,
                        sender = %sender.handle,
                        rule = violation.rule.as_str(),
                        "admin status unknown; not enforcing"
                    );
                    return EnforcementOutcome::NotEnforced;
                }
                AdminStatus::NotAdmin => {}
            }
        }

        let rule = violation.rule;
        let outcome = self
            .actions
            .delete_then_warn(
                group_id,
                sender,
                message,
                rule.as_str(),
                rule.warning_text(&sender.handle.mention_tag()),
            )
            .await;
        if let EnforcementOutcome::Enforced { deleted, warned } = outcome {
            tracing::info!(
                group = group_id,
                sender = %sender.handle,
                rule = rule.as_str(),
                deleted,
                warned,
                matched = violation.matched.as_deref().unwrap_or(""),
                "moderation enforced"
            );
        }
        outcome
    }
}
