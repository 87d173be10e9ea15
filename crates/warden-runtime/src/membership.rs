//! Join handling: banned members are removed again, the rest are welcomed.

use std::sync::Arc;

use serde::Serialize;
use warden_access::{is_group_id, Handle};
use warden_store::Store;

use crate::commands::render_rules;
use crate::contract::{GroupTransport, MembershipEvent, OutboundContent, ParticipantAction, SendOptions};
use crate::group_admin::{AdminStatus, GroupAdminService};

const FALLBACK_GROUP_NAME: &str = "this group";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MembershipReport {
    /// Banned joiners removed again.
    pub removed: Vec<Handle>,
    /// Banned joiners the bot could not remove.
    pub not_removed: Vec<Handle>,
    pub welcomed: Vec<Handle>,
}

/// Fills `{user}`, `{group}` and `{rules}` in a welcome template.
pub fn render_welcome(template: &str, users: &[Handle], group_name: &str, rules: &str) -> String {
    let tags = users
        .iter()
        .map(Handle::mention_tag)
        .collect::<Vec<_>>()
        .join(", ");
    template
        .replace("{user}", &tags)
        .replace("{group}", group_name)
        .replace("{rules}", rules)
}

pub struct MembershipHandler {
    store: Arc<Store>,
    transport: Arc<dyn GroupTransport>,
    admin: Arc<GroupAdminService>,
    spacing_ms: u64,
}

impl MembershipHandler {
    pub fn new(
        store: Arc<Store>,
        transport: Arc<dyn GroupTransport>,
        admin: Arc<GroupAdminService>,
        spacing_ms: u64,
    ) -> Self {
        Self {
            store,
            transport,
            admin,
            spacing_ms,
        }
    }

    pub async fn handle(&self, event: &MembershipEvent) -> MembershipReport {
        let group_id = event.group_id.as_str();
        if !is_group_id(group_id) {
            return MembershipReport::default();
        }
        self.admin.invalidate(group_id);
        if !event.action.is_join() {
            return MembershipReport::default();
        }

        let mut banned = Vec::new();
        let mut joiners = Vec::new();
        for raw in &event.participants {
            let Some(handle) = Handle::parse(raw) else {
                tracing::debug!(group = group_id, participant = raw, "ignoring invalid participant id");
                continue;
            };
            let candidates = self.admin.resolver().resolve_candidates(&handle).await;
            if self.store.is_any_banned(group_id, &candidates) {
                banned.push(handle);
            } else {
                joiners.push(handle);
            }
        }

        let mut report = MembershipReport::default();
        if !banned.is_empty() {
            self.enforce_bans(group_id, banned, &mut report).await;
        }
        if !joiners.is_empty() && self.welcome(group_id, &joiners).await {
            report.welcomed = joiners;
        }
        report
    }

    async fn enforce_bans(&self, group_id: &str, banned: Vec<Handle>, report: &mut MembershipReport) {
        let status = self.admin.bot_admin_status(group_id).await;
        if status == Some(AdminStatus::Admin) {
            let outcome = self
                .admin
                .run_participant_action(group_id, &banned, ParticipantAction::Remove, self.spacing_ms)
                .await;
            report.removed = outcome.succeeded;
            report.not_removed = outcome.failed;
        } else {
            report.not_removed = banned;
        }
        tracing::info!(
            group = group_id,
            removed = report.removed.len(),
            not_removed = report.not_removed.len(),
            bot_status = status.map_or("unresolved", AdminStatus::as_str),
            "banned members joined"
        );

        if !report.removed.is_empty() {
            let text = format!(
                "🚫 {} is banned from this group and was removed.",
                tags(&report.removed)
            );
            self.notify(group_id, text, report.removed.clone()).await;
        }
        if !report.not_removed.is_empty() {
            let text = format!(
                "⚠️ {} is banned from this group, but the bot cannot remove them (it needs admin rights).",
                tags(&report.not_removed)
            );
            self.notify(group_id, text, report.not_removed.clone()).await;
        }
    }

    async fn welcome(&self, group_id: &str, joiners: &[Handle]) -> bool {
        let settings = self.store.get_welcome(group_id);
        if !settings.enabled {
            return false;
        }
        let group_name = match self.admin.group_snapshot(group_id).await {
            Ok(snapshot) if !snapshot.subject.trim().is_empty() => snapshot.subject,
            Ok(_) => FALLBACK_GROUP_NAME.to_string(),
            Err(error) => {
                tracing::debug!(group = group_id, error = %error, "group name unavailable for welcome");
                FALLBACK_GROUP_NAME.to_string()
            }
        };
        let rules = render_rules(&self.store, group_id);
        let text = render_welcome(&settings.template, joiners, &group_name, &rules);
        self.notify(group_id, text, joiners.to_vec()).await
    }

    async fn notify(&self, group_id: &str, text: String, mentions: Vec<Handle>) -> bool {
        let content = OutboundContent::text_with_mentions(text, mentions);
        match self
            .transport
            .send_message(group_id, content, SendOptions::default())
            .await
        {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!(group = group_id, error = %error, "failed to send membership notice");
                false
            }
        }
    }
}

fn tags(handles: &[Handle]) -> String {
    handles
        .iter()
        .map(Handle::mention_tag)
        .collect::<Vec<_>>()
        .join(", ")
}
