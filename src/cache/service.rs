use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::cache::{AssignmentRecord, CacheKey};
use crate::rpc::{RpcError, SidecarClient};

/// Fields of a create-or-replace on one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceRequest {
    #[serde(flatten)]
    pub key: CacheKey,
    pub subject_id: i64,
    pub teacher_id: i64,
}

/// The authoritative assignment store as seen from the cache.
#[async_trait]
pub trait AssignmentService: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<AssignmentRecord>, RpcError>;

    /// Create-or-replace. The acknowledgement is the stored record.
    async fn place(&self, req: &PlaceRequest) -> Result<AssignmentRecord, RpcError>;

    async fn delete(&self, assignment_id: i64) -> Result<(), RpcError>;
}

fn field<T: serde::de::DeserializeOwned>(mut result: Value, key: &str) -> Result<T, RpcError> {
    let v = result
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| RpcError::Protocol(format!("result has no {key}")))?;
    serde_json::from_value(v).map_err(|e| RpcError::Protocol(format!("bad {key}: {e}")))
}

#[async_trait]
impl AssignmentService for SidecarClient {
    async fn fetch_all(&self) -> Result<Vec<AssignmentRecord>, RpcError> {
        let result = self.call("assignments.list", json!({})).await?;
        field(result, "assignments")
    }

    async fn place(&self, req: &PlaceRequest) -> Result<AssignmentRecord, RpcError> {
        let params =
            serde_json::to_value(req).map_err(|e| RpcError::Protocol(e.to_string()))?;
        let result = self.call("assignments.save", params).await?;
        field(result, "assignment")
    }

    async fn delete(&self, assignment_id: i64) -> Result<(), RpcError> {
        self.call(
            "assignments.delete",
            json!({ "assignmentId": assignment_id }),
        )
        .await
        .map(|_| ())
    }
}
