use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tokio::sync::Mutex;
use warden_access::{is_group_id, Handle};
use warden_core::{current_unix_timestamp_ms, ensure_private_dir, write_text_atomic};

use crate::document::{
    AddOutcome, GroupRecord, ModerationFlag, ModerationSettings, MuteEntry, MuteOutcome,
    MuteStatus, RemoveOutcome, StoreDocument, TemplateOutcome, ToggleOutcome, WelcomeSettings,
};
use crate::error::{StoreError, StoreResult};
use crate::normalize::{
    dedupe_banned_words, normalize_banned_word, normalize_document, normalize_welcome_template,
};

/// Durable group policy and per-user state backed by one JSON document.
///
/// Readers take a short lock and return owned copies. Mutators queue on a
/// fair async gate so exactly one mutation (and at most one file rewrite) is
/// in flight; each state-changing mutation rewrites the whole document.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    document: RwLock<StoreDocument>,
    write_gate: Mutex<()>,
}

impl Store {
    /// Loads the document at `path`.
    ///
    /// A missing file starts from defaults, and so does valid JSON that is not
    /// an object; the file stays in place until the next rewrite. A file that
    /// cannot be read or parsed is renamed to `<path>.corrupt.<unix_ms>` and
    /// defaults are used.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            ensure_private_dir(parent).map_err(|error| StoreError::persist(&path, error))?;
        }
        let document = load_document(&path, current_unix_timestamp_ms());
        tracing::info!(
            path = %path.display(),
            groups = document.groups.len(),
            allowlist = document.allowlist.len(),
            "store loaded"
        );
        Ok(Self {
            path,
            document: RwLock::new(document),
            write_gate: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the whole document.
    pub fn snapshot(&self) -> StoreDocument {
        self.read_document().clone()
    }

    /// Waits for every queued mutation to finish.
    pub async fn close(&self) {
        let _gate = self.write_gate.lock().await;
    }

    pub fn list_allowlist(&self) -> Vec<Handle> {
        self.read_document().allowlist.clone()
    }

    pub fn is_allowlisted(&self, handle: &Handle) -> bool {
        self.read_document().allowlist.contains(handle)
    }

    /// True when any of `candidates` is allowlisted.
    pub fn is_any_allowlisted(&self, candidates: &BTreeSet<Handle>) -> bool {
        let document = self.read_document();
        document
            .allowlist
            .iter()
            .any(|handle| candidates.contains(handle))
    }

    pub async fn add_allowlist(&self, handles: &[Handle]) -> StoreResult<AddOutcome> {
        self.mutate(|document| {
            let outcome = add_unique(&mut document.allowlist, handles);
            (outcome, outcome.added > 0)
        })
        .await
    }

    pub async fn remove_allowlist(&self, handles: &[Handle]) -> StoreResult<RemoveOutcome> {
        self.mutate(|document| {
            let outcome = remove_all(&mut document.allowlist, handles);
            (outcome, outcome.removed > 0)
        })
        .await
    }

    /// Adds configured handles at startup while the stored allowlist is
    /// empty. Once it holds anyone the store is the only source of allowlist
    /// membership, so handles removed by command stay removed across restarts.
    pub async fn seed_allowlist(&self, handles: &[Handle]) -> StoreResult<AddOutcome> {
        let outcome = self
            .mutate(|document| {
                if !document.allowlist.is_empty() {
                    let outcome = AddOutcome {
                        added: 0,
                        total: document.allowlist.len(),
                    };
                    return (outcome, false);
                }
                let outcome = add_unique(&mut document.allowlist, handles);
                (outcome, outcome.added > 0)
            })
            .await?;
        if outcome.added > 0 {
            tracing::info!(
                added = outcome.added,
                total = outcome.total,
                "seeded allowlist from configuration"
            );
        }
        Ok(outcome)
    }

    pub fn list_bans(&self, group_id: &str) -> Vec<Handle> {
        self.read_group(group_id, |group| group.bans.clone())
            .unwrap_or_default()
    }

    pub fn is_banned(&self, group_id: &str, handle: &Handle) -> bool {
        self.read_group(group_id, |group| group.bans.contains(handle))
            .unwrap_or(false)
    }

    /// True when any of `candidates` is banned in the group.
    pub fn is_any_banned(&self, group_id: &str, candidates: &BTreeSet<Handle>) -> bool {
        self.read_group(group_id, |group| {
            group.bans.iter().any(|handle| candidates.contains(handle))
        })
        .unwrap_or(false)
    }

    pub async fn add_bans(&self, group_id: &str, handles: &[Handle]) -> StoreResult<AddOutcome> {
        self.mutate_group(group_id, |group| {
            let outcome = add_unique(&mut group.bans, handles);
            (outcome, outcome.added > 0)
        })
        .await
    }

    pub async fn remove_bans(
        &self,
        group_id: &str,
        handles: &[Handle],
    ) -> StoreResult<RemoveOutcome> {
        self.mutate_group(group_id, |group| {
            let outcome = remove_all(&mut group.bans, handles);
            (outcome, outcome.removed > 0)
        })
        .await
    }

    pub fn get_mute(&self, group_id: &str, handle: &Handle) -> MuteStatus {
        self.get_mute_at(group_id, handle, current_unix_timestamp_ms())
    }

    /// Mute state at `now_ms`. An entry found expired is dropped from memory
    /// and leaves the file on the next rewrite.
    pub fn get_mute_at(&self, group_id: &str, handle: &Handle, now_ms: u64) -> MuteStatus {
        let entry = self
            .read_group(group_id, |group| group.mutes.get(handle).copied())
            .flatten();
        let Some(entry) = entry else {
            return MuteStatus::default();
        };
        if entry.is_active_at(now_ms) {
            return MuteStatus {
                muted: true,
                until: entry.until,
            };
        }

        let mut document = self.write_document();
        if let Some(group) = document.groups.get_mut(group_id) {
            if group
                .mutes
                .get(handle)
                .is_some_and(|current| !current.is_active_at(now_ms))
            {
                group.mutes.remove(handle);
                tracing::debug!(group = group_id, user = %handle, "pruned expired mute");
            }
        }
        MuteStatus::default()
    }

    /// Mutes every handle until `until_ms` (`None` = indefinitely). An
    /// expiry already in the past is a no-op.
    pub async fn add_mutes(
        &self,
        group_id: &str,
        handles: &[Handle],
        until_ms: Option<u64>,
    ) -> StoreResult<MuteOutcome> {
        let now_ms = current_unix_timestamp_ms();
        self.mutate_group(group_id, |group| {
            if until_ms.is_some_and(|until| until <= now_ms) {
                let outcome = MuteOutcome {
                    total: group.mutes.len(),
                    ..MuteOutcome::default()
                };
                return (outcome, false);
            }
            let mut outcome = MuteOutcome::default();
            for handle in dedupe(handles) {
                let next = MuteEntry { until: until_ms };
                match group.mutes.insert(handle.clone(), next) {
                    None => outcome.added += 1,
                    Some(previous) if previous != next => outcome.updated += 1,
                    Some(_) => {}
                }
            }
            outcome.total = group.mutes.len();
            (outcome, !outcome.is_noop())
        })
        .await
    }

    pub async fn remove_mutes(
        &self,
        group_id: &str,
        handles: &[Handle],
    ) -> StoreResult<RemoveOutcome> {
        self.mutate_group(group_id, |group| {
            let removed = dedupe(handles)
                .into_iter()
                .filter(|handle| group.mutes.remove(handle).is_some())
                .count();
            let outcome = RemoveOutcome {
                removed,
                total: group.mutes.len(),
            };
            (outcome, removed > 0)
        })
        .await
    }

    /// Moderation settings, or defaults for a group never written.
    pub fn get_moderation(&self, group_id: &str) -> ModerationSettings {
        self.read_group(group_id, |group| group.moderation.clone())
            .unwrap_or_default()
    }

    pub async fn set_moderation_flag(
        &self,
        group_id: &str,
        flag: ModerationFlag,
        value: bool,
    ) -> StoreResult<ToggleOutcome> {
        self.mutate_group(group_id, |group| {
            let changed = group.moderation.set_flag(flag, value);
            (ToggleOutcome { value, changed }, changed)
        })
        .await
    }

    pub fn list_banned_words(&self, group_id: &str) -> Vec<String> {
        self.read_group(group_id, |group| group.moderation.banned_words.clone())
            .unwrap_or_default()
    }

    pub async fn add_banned_word(&self, group_id: &str, phrase: &str) -> StoreResult<AddOutcome> {
        let phrase = normalize_banned_word(phrase);
        self.mutate_group(group_id, |group| {
            let words = &mut group.moderation.banned_words;
            let Some(phrase) = phrase else {
                return (AddOutcome { added: 0, total: words.len() }, false);
            };
            let needle = phrase.to_lowercase();
            if words.iter().any(|word| word.to_lowercase() == needle) {
                return (AddOutcome { added: 0, total: words.len() }, false);
            }
            words.push(phrase);
            *words = dedupe_banned_words(std::mem::take(words));
            (AddOutcome { added: 1, total: words.len() }, true)
        })
        .await
    }

    pub async fn remove_banned_word(
        &self,
        group_id: &str,
        phrase: &str,
    ) -> StoreResult<RemoveOutcome> {
        let needle = normalize_banned_word(phrase).map(|phrase| phrase.to_lowercase());
        self.mutate_group(group_id, |group| {
            let words = &mut group.moderation.banned_words;
            let Some(needle) = needle else {
                return (RemoveOutcome { removed: 0, total: words.len() }, false);
            };
            let before = words.len();
            words.retain(|word| word.to_lowercase() != needle);
            let removed = before - words.len();
            (RemoveOutcome { removed, total: words.len() }, removed > 0)
        })
        .await
    }

    pub fn get_welcome(&self, group_id: &str) -> WelcomeSettings {
        self.read_group(group_id, |group| group.welcome.clone())
            .unwrap_or_default()
    }

    pub async fn set_welcome_enabled(
        &self,
        group_id: &str,
        enabled: bool,
    ) -> StoreResult<ToggleOutcome> {
        self.mutate_group(group_id, |group| {
            let changed = group.welcome.enabled != enabled;
            group.welcome.enabled = enabled;
            (ToggleOutcome { value: enabled, changed }, changed)
        })
        .await
    }

    pub async fn set_welcome_template(
        &self,
        group_id: &str,
        template: &str,
    ) -> StoreResult<TemplateOutcome> {
        let template = normalize_welcome_template(template);
        self.mutate_group(group_id, |group| {
            let changed = group.welcome.template != template;
            group.welcome.template = template.clone();
            (TemplateOutcome { template, changed }, changed)
        })
        .await
    }

    fn read_document(&self) -> RwLockReadGuard<'_, StoreDocument> {
        self.document.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_document(&self) -> RwLockWriteGuard<'_, StoreDocument> {
        self.document.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_group<T>(&self, group_id: &str, read: impl FnOnce(&GroupRecord) -> T) -> Option<T> {
        self.read_document().groups.get(group_id).map(read)
    }

    async fn mutate_group<T>(
        &self,
        group_id: &str,
        apply: impl FnOnce(&mut GroupRecord) -> (T, bool),
    ) -> StoreResult<T> {
        if !is_group_id(group_id) {
            return Err(StoreError::InvalidGroupId(group_id.to_string()));
        }
        self.mutate(|document| {
            let group = document.groups.entry(group_id.to_string()).or_default();
            apply(group)
        })
        .await
    }

    /// Applies `apply` to a copy of the document and publishes the copy only
    /// once its rewrite has landed, so a failed write changes nothing.
    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut StoreDocument) -> (T, bool),
    ) -> StoreResult<T> {
        let _gate = self.write_gate.lock().await;
        let mut next = self.read_document().clone();
        let (outcome, changed) = apply(&mut next);
        if !changed {
            return Ok(outcome);
        }
        // Readers may have pruned mutes since the copy was taken.
        drop_expired_mutes(&mut next, current_unix_timestamp_ms());
        let payload = render_document(&next)?;
        write_text_atomic(&self.path, &payload)
            .await
            .map_err(|error| StoreError::persist(&self.path, error))?;
        *self.write_document() = next;
        Ok(outcome)
    }
}

fn drop_expired_mutes(document: &mut StoreDocument, now_ms: u64) {
    for group in document.groups.values_mut() {
        group.mutes.retain(|_, entry| entry.is_active_at(now_ms));
    }
}

fn render_document(document: &StoreDocument) -> StoreResult<String> {
    let mut payload = serde_json::to_string_pretty(document)?;
    payload.push('\n');
    Ok(payload)
}

fn load_document(path: &Path, now_ms: u64) -> StoreDocument {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return StoreDocument::default();
        }
        Err(error) => {
            let error = StoreError::Io {
                path: path.to_path_buf(),
                source: error,
            };
            tracing::warn!(error = %error, "failed to read store file");
            quarantine(path, now_ms);
            return StoreDocument::default();
        }
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) if value.is_object() => normalize_document(&value, now_ms),
        Ok(_) => {
            tracing::warn!(
                path = %path.display(),
                "store file is not a JSON object; starting from defaults"
            );
            StoreDocument::default()
        }
        Err(error) => {
            tracing::warn!(path = %path.display(), error = %error, "failed to parse store file");
            quarantine(path, now_ms);
            StoreDocument::default()
        }
    }
}

/// Moves an unusable store file aside so startup can continue from defaults.
fn quarantine(path: &Path, now_ms: u64) {
    let mut target = path.as_os_str().to_owned();
    target.push(format!(".corrupt.{now_ms}"));
    let target = PathBuf::from(target);
    match std::fs::rename(path, &target) {
        Ok(()) => {
            tracing::warn!(
                path = %path.display(),
                quarantined = %target.display(),
                "quarantined unreadable store file"
            );
        }
        Err(error) => {
            tracing::warn!(path = %path.display(), error = %error, "failed to quarantine store file");
        }
    }
}

fn dedupe(handles: &[Handle]) -> Vec<&Handle> {
    let mut seen = HashSet::new();
    handles
        .iter()
        .filter(|handle| seen.insert(*handle))
        .collect()
}

fn add_unique(list: &mut Vec<Handle>, handles: &[Handle]) -> AddOutcome {
    let mut added = 0;
    for handle in dedupe(handles) {
        if list.contains(handle) {
            continue;
        }
        list.push(handle.clone());
        added += 1;
    }
    AddOutcome {
        added,
        total: list.len(),
    }
}

fn remove_all(list: &mut Vec<Handle>, handles: &[Handle]) -> RemoveOutcome {
    let targets = handles.iter().collect::<HashSet<_>>();
    let before = list.len();
    list.retain(|handle| !targets.contains(handle));
    RemoveOutcome {
        removed: before - list.len(),
        total: list.len(),
    }
}

#[cfg(test)]
mod tests;
