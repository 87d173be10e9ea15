use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;

use crate::identity::Handle;

const LEARNED_PAIRS_CEILING: usize = 10_000;

#[async_trait]
/// External capability mapping a handle to its counterpart in the other
/// namespace, if the platform knows one.
pub trait IdentityLookup: Send + Sync {
    async fn alternate_handle(&self, handle: &Handle) -> Result<Option<Handle>>;
}

#[derive(Debug, Default, Clone, Copy)]
/// Lookup that never knows an alternate form.
pub struct NoAlternateLookup;

#[async_trait]
impl IdentityLookup for NoAlternateLookup {
    async fn alternate_handle(&self, _handle: &Handle) -> Result<Option<Handle>> {
        Ok(None)
    }
}

#[derive(Clone)]
/// Sole authority on cross-namespace equivalence between handles.
///
/// Pairs observed in group membership snapshots are remembered and used when
/// the external lookup is unavailable or silent.
pub struct IdentityResolver {
    lookup: Arc<dyn IdentityLookup>,
    learned: Arc<Mutex<HashMap<Handle, Handle>>>,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("IdentityResolver")
            .field("learned_pairs", &self.learned_len())
            .finish()
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(Arc::new(NoAlternateLookup))
    }
}

impl IdentityResolver {
    pub fn new(lookup: Arc<dyn IdentityLookup>) -> Self {
        Self {
            lookup,
            learned: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn normalize(&self, raw: &str) -> Option<Handle> {
        Handle::parse(raw)
    }

    /// Records that `first` and `second` denote the same participant.
    /// Ignored unless the two handles live in different namespaces.
    pub fn learn_pair(&self, first: &Handle, second: &Handle) {
        if first.namespace() == second.namespace() {
            return;
        }
        let mut learned = self.learned.lock().unwrap_or_else(PoisonError::into_inner);
        if learned.len() + 2 > LEARNED_PAIRS_CEILING {
            learned.clear();
        }
        learned.insert(first.clone(), second.clone());
        learned.insert(second.clone(), first.clone());
    }

    /// Returns the handle itself plus any equivalent handle in the other
    /// namespace. Lookup failures degrade to whatever is already known.
    pub async fn resolve_candidates(&self, handle: &Handle) -> BTreeSet<Handle> {
        let mut candidates = BTreeSet::from([handle.clone()]);
        match self.lookup.alternate_handle(handle).await {
            Ok(Some(alternate)) if alternate.namespace() != handle.namespace() => {
                self.learn_pair(handle, &alternate);
                candidates.insert(alternate);
            }
            Ok(_) => {}
            Err(error) => {
                tracing::debug!(
                    handle = %handle,
                    error = %error,
                    "alternate handle lookup failed; using known forms only"
                );
            }
        }
        if let Some(alternate) = self.learned_alternate(handle) {
            candidates.insert(alternate);
        }
        candidates
    }

    /// Union of the candidate sets of every handle.
    pub async fn resolve_all<'a, I>(&self, handles: I) -> BTreeSet<Handle>
    where
        I: IntoIterator<Item = &'a Handle>,
    {
        let mut all = BTreeSet::new();
        for handle in handles {
            all.extend(self.resolve_candidates(handle).await);
        }
        all
    }

    pub async fn same_participant(&self, left: &Handle, right: &Handle) -> bool {
        if left == right {
            return true;
        }
        let left_candidates = self.resolve_candidates(left).await;
        if left_candidates.contains(right) {
            return true;
        }
        let right_candidates = self.resolve_candidates(right).await;
        !left_candidates.is_disjoint(&right_candidates)
    }

    fn learned_alternate(&self, handle: &Handle) -> Option<Handle> {
        self.learned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .cloned()
    }

    fn learned_len(&self) -> usize {
        self.learned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
