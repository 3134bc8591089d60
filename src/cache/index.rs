use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{AssignmentService, CacheEntry, CacheError, CacheKey};

/// Immutable view of the whole index at one instant.
pub type Snapshot = Arc<HashMap<CacheKey, CacheEntry>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// No load has succeeded yet.
    Uninitialized,
    Loaded,
    /// Loaded, but a reload has been requested and has not landed.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied { entries: usize },
    /// A load issued later already landed; this result was dropped.
    Superseded,
}

/// A local write newer than the last applied load. `None` records a removal.
#[derive(Debug, Clone)]
struct Patch {
    seq: u64,
    entry: Option<CacheEntry>,
}

#[derive(Debug)]
struct Inner {
    entries: Snapshot,
    state: IndexState,
    next_seq: u64,
    applied_load: u64,
    patches: HashMap<CacheKey, Patch>,
    pending: HashMap<CacheKey, usize>,
}

impl Inner {
    fn issue(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Applies a write unless a newer load or a newer write to the same key already landed.
    fn apply(&mut self, key: CacheKey, seq: u64, entry: Option<CacheEntry>) -> bool {
        if seq <= self.applied_load {
            return false;
        }
        if self.patches.get(&key).is_some_and(|p| p.seq >= seq) {
            return false;
        }
        let map = Arc::make_mut(&mut self.entries);
        match &entry {
            Some(e) => {
                map.insert(key, e.clone());
            }
            None => {
                map.remove(&key);
            }
        }
        self.patches.insert(key, Patch { seq, entry });
        true
    }
}

/// Keyed snapshot of every assignment, read synchronously by the grid.
///
/// Writers are the load routine and [`MutationCoordinator`](crate::cache::MutationCoordinator);
/// the local mutators are crate-private. Every load and every write draws a
/// number from one monotonic sequence, so responses that resolve out of issue
/// order cannot overwrite newer state.
///
/// The fence assumes issue order is the order the store sees. That holds when
/// nothing awaits between drawing the number and the first poll of the service
/// call, and the service fixes its order on that poll: [`SidecarClient`]
/// spawns the exchange there and queues it on a FIFO mutex. Calls raced from
/// different worker threads of a multi-thread runtime can reach the store in
/// the other order; the next load repairs any entry that disagrees.
///
/// [`SidecarClient`]: crate::rpc::SidecarClient
#[derive(Debug)]
pub struct AssignmentIndex {
    inner: RwLock<Inner>,
}

impl Default for AssignmentIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl AssignmentIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: Arc::new(HashMap::new()),
                state: IndexState::Uninitialized,
                next_seq: 0,
                applied_load: 0,
                patches: HashMap::new(),
                pending: HashMap::new(),
            }),
        }
    }

    /// O(1), never touches the network.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.read().entries.get(key).cloned()
    }

    /// The whole map as of now. Later loads and writes do not affect it.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.inner.read().entries)
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> IndexState {
        self.inner.read().state
    }

    /// True while a placement on `key` is waiting for the store.
    pub fn is_pending(&self, key: &CacheKey) -> bool {
        self.inner.read().pending.contains_key(key)
    }

    /// Flags a loaded index as awaiting reload. No effect before the first load.
    pub fn mark_stale(&self) {
        let mut inner = self.inner.write();
        if inner.state == IndexState::Loaded {
            inner.state = IndexState::Stale;
        }
    }

    /// Fetches every assignment and swaps the result in as a whole.
    ///
    /// On failure the previous snapshot and state are kept. Duplicate records
    /// for one slot collapse to the last one returned.
    pub async fn load<S>(&self, service: &S) -> Result<LoadOutcome, CacheError>
    where
        S: AssignmentService + ?Sized,
    {
        let seq = self.inner.write().issue();
        let records = match service.fetch_all().await {
            Ok(r) => r,
            Err(source) => {
                tracing::warn!(error = %source, "assignment load failed; keeping previous snapshot");
                return Err(CacheError::Sync { source });
            }
        };

        let mut fresh = HashMap::with_capacity(records.len());
        for rec in &records {
            if fresh.insert(rec.key(), CacheEntry::from(rec)).is_some() {
                tracing::warn!(slot = %rec.key(), id = rec.id, "duplicate assignment for slot; keeping the later record");
            }
        }

        let outcome = self.install(seq, fresh);
        match outcome {
            LoadOutcome::Applied { entries } => {
                tracing::info!(entries, "assignment index loaded")
            }
            LoadOutcome::Superseded => tracing::debug!(seq, "stale load result dropped"),
        }
        Ok(outcome)
    }

    fn install(&self, seq: u64, mut fresh: HashMap<CacheKey, CacheEntry>) -> LoadOutcome {
        let mut inner = self.inner.write();
        if seq <= inner.applied_load {
            return LoadOutcome::Superseded;
        }

        // Writes confirmed after this load was issued are not in its result.
        inner.patches.retain(|_, p| p.seq > seq);
        for (key, patch) in &inner.patches {
            match &patch.entry {
                Some(e) => {
                    fresh.insert(*key, e.clone());
                }
                None => {
                    fresh.remove(key);
                }
            }
        }

        let entries = fresh.len();
        inner.entries = Arc::new(fresh);
        inner.applied_load = seq;
        inner.state = IndexState::Loaded;
        LoadOutcome::Applied { entries }
    }

    /// Unfenced local insert. Confirmed placements go through [`WriteTicket`].
    #[cfg(test)]
    pub(crate) fn put(&self, key: CacheKey, entry: CacheEntry) {
        let mut inner = self.inner.write();
        let seq = inner.issue();
        inner.apply(key, seq, Some(entry));
    }

    /// Unfenced local removal. Deletions reload instead, since they are keyed by id.
    #[cfg(test)]
    pub(crate) fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut inner = self.inner.write();
        let prior = inner.entries.get(key).cloned();
        let seq = inner.issue();
        inner.apply(*key, seq, None);
        prior
    }

    /// Reserves a sequence number for a write about to go to the store and
    /// marks the key pending until the ticket is committed or dropped.
    pub(crate) fn begin_write(&self, key: CacheKey) -> WriteTicket<'_> {
        let mut inner = self.inner.write();
        let seq = inner.issue();
        *inner.pending.entry(key).or_insert(0) += 1;
        WriteTicket {
            index: self,
            key,
            seq,
        }
    }

    fn release(&self, key: &CacheKey) {
        let mut inner = self.inner.write();
        if let Some(n) = inner.pending.get_mut(key) {
            *n -= 1;
            if *n == 0 {
                inner.pending.remove(key);
            }
        }
    }
}

/// An in-flight write to one key.
#[derive(Debug)]
pub(crate) struct WriteTicket<'a> {
    index: &'a AssignmentIndex,
    key: CacheKey,
    seq: u64,
}

impl WriteTicket<'_> {
    pub(crate) fn key(&self) -> CacheKey {
        self.key
    }

    /// Applies the confirmed entry. False when a newer write or load got there first.
    pub(crate) fn commit(self, entry: CacheEntry) -> bool {
        self.index.inner.write().apply(self.key, self.seq, Some(entry))
    }
}

impl Drop for WriteTicket<'_> {
    fn drop(&mut self) {
        self.index.release(&self.key);
    }
}
