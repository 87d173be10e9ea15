use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use warden_access::{Handle, IdentityResolver};
use warden_core::{current_unix_timestamp_ms, TtlCache};

use crate::config::SNAPSHOT_CACHE_CEILING;
use crate::contract::{GroupMetadata, GroupTransport, ParticipantAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `AdminStatus` values.
///
/// `Unknown` means the membership snapshot could not be fetched and is never
/// treated as `NotAdmin`.
pub enum AdminStatus {
    Admin,
    NotAdmin,
    Unknown,
}

impl AdminStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::NotAdmin => "not_admin",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_admin(self) -> bool {
        self == Self::Admin
    }
}

/// Per-target results of a participant update run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantActionReport {
    pub succeeded: Vec<Handle>,
    pub failed: Vec<Handle>,
}

/// Answers admin questions about groups from cached membership snapshots.
pub struct GroupAdminService {
    transport: Arc<dyn GroupTransport>,
    resolver: IdentityResolver,
    snapshots: TtlCache<GroupMetadata>,
}

impl GroupAdminService {
    pub fn new(
        transport: Arc<dyn GroupTransport>,
        resolver: IdentityResolver,
        snapshot_ttl_ms: u64,
    ) -> Self {
        Self {
            transport,
            resolver,
            snapshots: TtlCache::new(snapshot_ttl_ms, SNAPSHOT_CACHE_CEILING),
        }
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Snapshot for `group_id`, refreshed when missing or older than the TTL.
    pub async fn group_snapshot(&self, group_id: &str) -> Result<GroupMetadata> {
        let now_ms = current_unix_timestamp_ms();
        if let Some(cached) = self.snapshots.get(group_id, now_ms) {
            return Ok(cached);
        }
        let fresh = self.transport.group_metadata(group_id).await?;
        for participant in &fresh.participants {
            let forms = participant.handles();
            for (index, first) in forms.iter().enumerate() {
                for second in &forms[index + 1..] {
                    self.resolver.learn_pair(first, second);
                }
            }
        }
        self.snapshots
            .insert(group_id, fresh.clone(), current_unix_timestamp_ms());
        Ok(fresh)
    }

    /// Drops the cached snapshot so the next query refetches it.
    pub fn invalidate(&self, group_id: &str) {
        self.snapshots.remove(group_id);
    }

    /// The bot's own handles in every namespace the transport reports.
    pub fn bot_handles(&self) -> Vec<Handle> {
        let mut handles = Vec::new();
        for raw in self.transport.bot_identities() {
            if let Some(handle) = Handle::parse(&raw) {
                if !handles.contains(&handle) {
                    handles.push(handle);
                }
            }
        }
        handles
    }

    pub fn bot_handle(&self) -> Option<Handle> {
        self.bot_handles().into_iter().next()
    }

    pub async fn get_admin_status(&self, group_id: &str, handle: &Handle) -> AdminStatus {
        let candidates = self.resolver.resolve_candidates(handle).await;
        self.admin_status_for(group_id, &candidates).await
    }

    /// `None` when the transport cannot tell who the bot is.
    pub async fn bot_admin_status(&self, group_id: &str) -> Option<AdminStatus> {
        let candidates = self.bot_candidates().await;
        if candidates.is_empty() {
            return None;
        }
        Some(self.admin_status_for(group_id, &candidates).await)
    }

    async fn admin_status_for(&self, group_id: &str, candidates: &BTreeSet<Handle>) -> AdminStatus {
        let snapshot = match self.group_snapshot(group_id).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(
                    group = group_id,
                    error = %error,
                    "failed to fetch group snapshot for admin check"
                );
                return AdminStatus::Unknown;
            }
        };
        let participant = snapshot.participants.iter().find(|participant| {
            participant
                .handles()
                .iter()
                .any(|form| candidates.contains(form))
        });
        match participant {
            Some(participant) if participant.admin => AdminStatus::Admin,
            _ => AdminStatus::NotAdmin,
        }
    }

    async fn bot_candidates(&self) -> BTreeSet<Handle> {
        self.resolver.resolve_all(&self.bot_handles()).await
    }

    /// Makes a target list safe for participant updates: duplicates and every
    /// form of the bot are removed, then each target is rewritten to the id
    /// the group snapshot uses for that participant when one matches.
    pub async fn sanitize_targets(&self, group_id: &str, targets: &[Handle]) -> Vec<Handle> {
        let snapshot = match self.group_snapshot(group_id).await {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                tracing::debug!(
                    group = group_id,
                    error = %error,
                    "group snapshot unavailable; targets keep their namespace"
                );
                None
            }
        };
        let bot = self.bot_candidates().await;

        let mut seen = HashSet::new();
        let mut sanitized = Vec::new();
        for target in targets {
            let candidates = self.resolver.resolve_candidates(target).await;
            if !candidates.is_disjoint(&bot) {
                continue;
            }
            let preferred = snapshot
                .as_ref()
                .and_then(|snapshot| {
                    snapshot.participants.iter().find(|participant| {
                        participant
                            .handles()
                            .iter()
                            .any(|form| candidates.contains(form))
                    })
                })
                .and_then(|participant| Handle::parse(&participant.id))
                .unwrap_or_else(|| target.clone());
            if seen.insert(preferred.clone()) {
                sanitized.push(preferred);
            }
        }
        sanitized
    }

    /// Applies `action` to each target separately, pausing `spacing_ms`
    /// between calls. One rejected target never aborts the run.
    pub async fn run_participant_action(
        &self,
        group_id: &str,
        targets: &[Handle],
        action: ParticipantAction,
        spacing_ms: u64,
    ) -> ParticipantActionReport {
        let mut report = ParticipantActionReport::default();
        for (index, target) in targets.iter().enumerate() {
            if index > 0 && spacing_ms > 0 {
                tokio::time::sleep(Duration::from_millis(spacing_ms)).await;
            }
            match self
                .transport
                .group_participants_update(group_id, std::slice::from_ref(target), action)
                .await
            {
                Ok(()) => report.succeeded.push(target.clone()),
                Err(error) => {
                    tracing::warn!(
                        group = group_id,
                        target = %target,
                        action = action.as_str(),
                        error = %error,
                        "participant update failed"
                    );
                    report.failed.push(target.clone());
                }
            }
        }
        if !report.succeeded.is_empty() {
            self.invalidate(group_id);
        }
        report
    }
}
