//! Sibling entity stores. They own no cache of their own here; their job, as
//! far as the grid is concerned, is to announce every completed write.

use serde_json::{json, Value};
use std::sync::Arc;

use crate::cache::{ChangeBus, Topic};
use crate::rpc::{RpcError, SidecarClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Subject,
    Teacher,
    Group,
    Classroom,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Subject,
        EntityKind::Teacher,
        EntityKind::Group,
        EntityKind::Classroom,
    ];

    /// Method prefix on the sidecar, and the key of the `list` result.
    pub fn namespace(self) -> &'static str {
        match self {
            EntityKind::Subject => "subjects",
            EntityKind::Teacher => "teachers",
            EntityKind::Group => "groups",
            EntityKind::Classroom => "classrooms",
        }
    }

    pub fn topic(self) -> Topic {
        match self {
            EntityKind::Subject => Topic::SubjectsChanged,
            EntityKind::Teacher => Topic::TeachersChanged,
            EntityKind::Group => Topic::GroupsChanged,
            EntityKind::Classroom => Topic::ClassroomsChanged,
        }
    }

    fn method(self, op: &str) -> String {
        format!("{}.{}", self.namespace(), op)
    }
}

pub struct EntityClient {
    rpc: Arc<SidecarClient>,
    bus: ChangeBus,
}

impl EntityClient {
    pub fn new(rpc: Arc<SidecarClient>, bus: ChangeBus) -> Self {
        Self { rpc, bus }
    }

    pub async fn list(&self, kind: EntityKind) -> Result<Vec<Value>, RpcError> {
        let mut result = self.rpc.call(&kind.method("list"), json!({})).await?;
        match result.get_mut(kind.namespace()).map(Value::take) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(RpcError::Protocol(format!(
                "{} result has no {} array",
                kind.method("list"),
                kind.namespace()
            ))),
        }
    }

    /// `fields` is the camelCase object the sidecar expects for `kind`.
    pub async fn create(&self, kind: EntityKind, fields: Value) -> Result<Value, RpcError> {
        let result = self.rpc.call(&kind.method("create"), fields).await?;
        self.announce(kind);
        Ok(result)
    }

    pub async fn update(
        &self,
        kind: EntityKind,
        id: i64,
        mut fields: Value,
    ) -> Result<Value, RpcError> {
        match fields.as_object_mut() {
            Some(obj) => {
                obj.insert("id".to_string(), json!(id));
            }
            None => return Err(RpcError::Protocol("update fields must be an object".to_string())),
        }
        let result = self.rpc.call(&kind.method("update"), fields).await?;
        self.announce(kind);
        Ok(result)
    }

    /// Inserts every row or none. Returns how many were imported.
    pub async fn import(&self, kind: EntityKind, rows: Vec<Value>) -> Result<u64, RpcError> {
        let result = self
            .rpc
            .call(&kind.method("import"), json!({ "rows": rows }))
            .await?;
        self.announce(kind);
        result
            .get("imported")
            .and_then(Value::as_u64)
            .ok_or_else(|| RpcError::Protocol("import result has no count".to_string()))
    }

    /// The store drops dependent assignments too, so this also invalidates the grid.
    pub async fn delete(&self, kind: EntityKind, id: i64) -> Result<(), RpcError> {
        self.rpc
            .call(&kind.method("delete"), json!({ "id": id }))
            .await?;
        self.announce(kind);
        Ok(())
    }

    /// Deletes every id or none, and announces once. Returns how many were deleted.
    pub async fn delete_many(&self, kind: EntityKind, ids: &[i64]) -> Result<u64, RpcError> {
        let result = self
            .rpc
            .call(&kind.method("deleteMany"), json!({ "ids": ids }))
            .await?;
        self.announce(kind);
        result
            .get("deleted")
            .and_then(Value::as_u64)
            .ok_or_else(|| RpcError::Protocol("deleteMany result has no count".to_string()))
    }

    fn announce(&self, kind: EntityKind) {
        self.bus.publish(kind.topic());
    }
}
