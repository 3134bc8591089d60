use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{conn, delete_in_order, get_i64, get_ids, import_rows, non_empty, params_as};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

const DELETE_STEPS: &[(&str, &str)] = &[
    ("assignments", "DELETE FROM assignments WHERE group_id = ?"),
    ("groups", "DELETE FROM groups WHERE id = ?"),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupFields {
    grade: i64,
    group: String,
    career: Option<String>,
    students: Option<i64>,
}

impl GroupFields {
    fn validate(mut self) -> Result<Self, HandlerErr> {
        if self.grade < 1 {
            return Err(HandlerErr::bad_params("grade must be >= 1")
                .with_details(json!({ "grade": self.grade })));
        }
        self.group = non_empty(&self.group, "group")?;
        Ok(self)
    }
}

fn insert_group(conn: &Connection, g: &GroupFields) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO groups(grade, \"group\", career, students) VALUES(?, ?, ?, ?)",
        (g.grade, &g.group, &g.career, g.students),
    )?;
    Ok(conn.last_insert_rowid())
}

fn handle_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "groups": [] }));
    };
    let mut stmt = conn
        .prepare(
            "SELECT id, grade, \"group\", career, students
             FROM groups
             ORDER BY grade, \"group\", id",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", "groups", e))?;
    let groups = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, i64>(0)?,
                "grade": row.get::<_, i64>(1)?,
                "group": row.get::<_, String>(2)?,
                "career": row.get::<_, Option<String>>(3)?,
                "students": row.get::<_, Option<i64>>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", "groups", e))?;
    Ok(json!({ "groups": groups }))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let fields = params_as::<GroupFields>(&req.params)?.validate()?;
    let id = insert_group(conn, &fields).map_err(|e| HandlerErr::db("db_insert_failed", "groups", e))?;
    Ok(json!({ "groupId": id }))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let id = get_i64(req, "id")?;
    let g = params_as::<GroupFields>(&req.params)?.validate()?;
    let changed = conn
        .execute(
            "UPDATE groups SET grade = ?, \"group\" = ?, career = ?, students = ? WHERE id = ?",
            (g.grade, &g.group, &g.career, g.students, id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", "groups", e))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("group not found").with_details(json!({ "id": id })));
    }
    Ok(json!({ "groupId": id }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let id = get_i64(req, "id")?;
    delete_in_order(conn, &[id], DELETE_STEPS)?;
    Ok(json!({ "deleted": true }))
}

fn handle_delete_many(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let ids = get_ids(req, "ids")?;
    delete_in_order(conn, &ids, DELETE_STEPS)?;
    tracing::debug!(count = ids.len(), "groups deleted");
    Ok(json!({ "deleted": ids.len() }))
}

fn handle_import(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let rows = import_rows::<GroupFields>(req)?
        .into_iter()
        .map(GroupFields::validate)
        .collect::<Result<Vec<_>, _>>()?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for row in &rows {
        insert_group(&tx, row).map_err(|e| HandlerErr::db("db_insert_failed", "groups", e))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    Ok(json!({ "imported": rows.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "groups.list" => handle_list(state, req),
        "groups.create" => handle_create(state, req),
        "groups.update" => handle_update(state, req),
        "groups.delete" => handle_delete(state, req),
        "groups.deleteMany" => handle_delete_many(state, req),
        "groups.import" => handle_import(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
