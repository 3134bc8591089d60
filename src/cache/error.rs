use crate::cache::CacheKey;
use crate::rpc::RpcError;

/// Failures surfaced to the UI layer. None of them are fatal and none are retried here.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Fetch-all failed; the index still holds its last good snapshot.
    #[error("failed to load assignments")]
    Sync {
        #[source]
        source: RpcError,
    },

    /// The store refused or never confirmed the placement; the cell keeps its prior value.
    #[error("failed to place assignment at {key}")]
    PlacementFailed {
        key: CacheKey,
        #[source]
        source: RpcError,
    },

    /// The store did not delete the assignment; the index is unchanged.
    #[error("failed to delete assignment {assignment_id}")]
    DeletionFailed {
        assignment_id: i64,
        #[source]
        source: RpcError,
    },
}
