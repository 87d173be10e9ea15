//! In-memory `GroupTransport` that records every outbound action.
//!
//! Backs the replay runner and the test suites. Group snapshots are mutated by
//! participant updates the same way the network would apply them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use warden_access::{Handle, IdentityLookup};

use crate::contract::{
    GroupMetadata, GroupParticipant, GroupTransport, OutboundContent, ParticipantAction,
    SendOptions,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
/// Enumerates supported `RecordedAction` values.
pub enum RecordedAction {
    Send {
        chat_id: String,
        content: OutboundContent,
        #[serde(skip_serializing_if = "Option::is_none")]
        quoted: Option<String>,
        message_id: String,
    },
    ParticipantsUpdate {
        group_id: String,
        participants: Vec<Handle>,
        update: ParticipantAction,
    },
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    bot_identities: Vec<String>,
    groups: Mutex<HashMap<String, GroupMetadata>>,
    unavailable_groups: Mutex<HashSet<String>>,
    failing_targets: Mutex<HashSet<Handle>>,
    alternates: Mutex<HashMap<Handle, Handle>>,
    actions: Mutex<Vec<RecordedAction>>,
    next_message_id: AtomicU64,
    metadata_calls: AtomicUsize,
}

impl RecordingTransport {
    pub fn new<I, S>(bot_identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bot_identities: bot_identities.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_group(self, group_id: &str, metadata: GroupMetadata) -> Self {
        self.set_group(group_id, metadata);
        self
    }

    pub fn set_group(&self, group_id: &str, metadata: GroupMetadata) {
        lock(&self.groups).insert(group_id.to_string(), metadata);
    }

    /// Makes `group_metadata` fail for the group until cleared.
    pub fn set_metadata_unavailable(&self, group_id: &str, unavailable: bool) {
        let mut groups = lock(&self.unavailable_groups);
        if unavailable {
            groups.insert(group_id.to_string());
        } else {
            groups.remove(group_id);
        }
    }

    /// Participant updates targeting `handle` fail.
    pub fn fail_updates_for(&self, handle: Handle) {
        lock(&self.failing_targets).insert(handle);
    }

    /// Declares two handles as the same account for identity lookups.
    pub fn link_identities(&self, first: Handle, second: Handle) {
        let mut alternates = lock(&self.alternates);
        alternates.insert(first.clone(), second.clone());
        alternates.insert(second, first);
    }

    pub fn actions(&self) -> Vec<RecordedAction> {
        lock(&self.actions).clone()
    }

    pub fn take_actions(&self) -> Vec<RecordedAction> {
        std::mem::take(&mut *lock(&self.actions))
    }

    /// Texts sent to `chat_id`, in order.
    pub fn sent_texts(&self, chat_id: &str) -> Vec<String> {
        lock(&self.actions)
            .iter()
            .filter_map(|action| match action {
                RecordedAction::Send {
                    chat_id: target,
                    content: OutboundContent::Text { text, .. },
                    ..
                } if target == chat_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Ids of messages deleted in `chat_id`.
    pub fn deleted_message_ids(&self, chat_id: &str) -> Vec<String> {
        lock(&self.actions)
            .iter()
            .filter_map(|action| match action {
                RecordedAction::Send {
                    chat_id: target,
                    content: OutboundContent::Delete { key },
                    ..
                } if target == chat_id => Some(key.message_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn group(&self, group_id: &str) -> Option<GroupMetadata> {
        lock(&self.groups).get(group_id).cloned()
    }
}

fn apply_update(metadata: &mut GroupMetadata, target: &Handle, action: ParticipantAction) {
    let matches = |participant: &GroupParticipant| participant.handles().contains(target);
    match action {
        ParticipantAction::Remove => metadata.participants.retain(|p| !matches(p)),
        ParticipantAction::Promote | ParticipantAction::Demote => {
            for participant in metadata.participants.iter_mut().filter(|p| matches(p)) {
                participant.admin = action == ParticipantAction::Promote;
            }
        }
    }
}

#[async_trait]
impl GroupTransport for RecordingTransport {
    fn bot_identities(&self) -> Vec<String> {
        self.bot_identities.clone()
    }

    async fn send_message(
        &self,
        chat_id: &str,
        content: OutboundContent,
        options: SendOptions,
    ) -> Result<Option<String>> {
        let message_id = format!(
            "out-{}",
            self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1
        );
        lock(&self.actions).push(RecordedAction::Send {
            chat_id: chat_id.to_string(),
            content,
            quoted: options.quoted.map(|key| key.message_id),
            message_id: message_id.clone(),
        });
        Ok(Some(message_id))
    }

    async fn group_metadata(&self, group_id: &str) -> Result<GroupMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.unavailable_groups).contains(group_id) {
            bail!("group metadata for {group_id} is unavailable");
        }
        lock(&self.groups)
            .get(group_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown group {group_id}"))
    }

    async fn group_participants_update(
        &self,
        group_id: &str,
        participants: &[Handle],
        action: ParticipantAction,
    ) -> Result<()> {
        lock(&self.actions).push(RecordedAction::ParticipantsUpdate {
            group_id: group_id.to_string(),
            participants: participants.to_vec(),
            update: action,
        });
        if let Some(failed) = participants
            .iter()
            .find(|handle| lock(&self.failing_targets).contains(*handle))
        {
            bail!("participant update rejected for {failed}");
        }
        if let Some(metadata) = lock(&self.groups).get_mut(group_id) {
            for participant in participants {
                apply_update(metadata, participant, action);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityLookup for RecordingTransport {
    async fn alternate_handle(&self, handle: &Handle) -> Result<Option<Handle>> {
        Ok(lock(&self.alternates).get(handle).cloned())
    }
}
