use std::sync::Arc;

use crate::cache::{
    AssignmentIndex, AssignmentService, CacheEntry, CacheError, CacheKey, DropPayload,
    LoadOutcome, PlaceRequest,
};
use crate::rpc::RpcError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceOutcome {
    /// Confirmed by the store and written to the index.
    Applied(CacheEntry),
    /// Confirmed by the store, but a write or load issued later already
    /// landed locally, so this confirmation was not applied.
    Superseded,
}

/// Applies grid mutations: remote call first, local index change only after
/// the store confirms.
///
/// Placement patches a single key; removal reloads the whole index, since the
/// caller identifies the assignment by id rather than by slot.
pub struct MutationCoordinator<S> {
    service: Arc<S>,
    index: Arc<AssignmentIndex>,
}

impl<S: AssignmentService> MutationCoordinator<S> {
    pub fn new(service: Arc<S>, index: Arc<AssignmentIndex>) -> Self {
        Self { service, index }
    }

    pub fn index(&self) -> &Arc<AssignmentIndex> {
        &self.index
    }

    /// Entry point for a raw drop. A malformed payload is a no-op: `Ok(None)`,
    /// no remote call.
    pub async fn handle_drop(
        &self,
        key: CacheKey,
        raw: &str,
    ) -> Result<Option<PlaceOutcome>, CacheError> {
        let Some(payload) = DropPayload::parse(raw) else {
            tracing::debug!(slot = %key, "ignoring malformed drop payload");
            return Ok(None);
        };
        self.place(key, &payload).await.map(Some)
    }

    pub async fn place(
        &self,
        key: CacheKey,
        payload: &DropPayload,
    ) -> Result<PlaceOutcome, CacheError> {
        let ticket = self.index.begin_write(key);
        let req = PlaceRequest {
            key,
            subject_id: payload.subject_id,
            teacher_id: payload.teacher_id,
        };

        let record = match self.service.place(&req).await {
            Ok(r) => r,
            Err(source) => {
                tracing::warn!(slot = %key, error = %source, "placement failed");
                return Err(CacheError::PlacementFailed { key, source });
            }
        };
        if record.key() != ticket.key() {
            tracing::warn!(slot = %key, stored = %record.key(), "store acknowledged a different slot");
            return Err(CacheError::PlacementFailed {
                key,
                source: RpcError::Protocol(format!(
                    "placement at {key} acknowledged for {}",
                    record.key()
                )),
            });
        }

        let entry = CacheEntry::from(&record);
        if ticket.commit(entry.clone()) {
            tracing::debug!(slot = %key, id = entry.id, "placement applied");
            Ok(PlaceOutcome::Applied(entry))
        } else {
            tracing::warn!(slot = %key, id = entry.id, "placement confirmed but superseded locally");
            Ok(PlaceOutcome::Superseded)
        }
    }

    /// Deletes on the store, then reloads. A failed reload after a successful
    /// delete surfaces as [`CacheError::Sync`] and leaves the index stale.
    pub async fn remove(&self, assignment_id: i64) -> Result<LoadOutcome, CacheError> {
        if let Err(source) = self.service.delete(assignment_id).await {
            tracing::warn!(id = assignment_id, error = %source, "deletion failed");
            return Err(CacheError::DeletionFailed {
                assignment_id,
                source,
            });
        }
        self.index.mark_stale();
        self.index.load(self.service.as_ref()).await
    }
}
