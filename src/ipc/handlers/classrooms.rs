use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{conn, delete_in_order, get_i64, get_ids, import_rows, params_as};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

const DELETE_STEPS: &[(&str, &str)] = &[("classrooms", "DELETE FROM classrooms WHERE id = ?")];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassroomFields {
    /// Letter or number of the building; free text.
    building_id: Option<String>,
    building_number: i64,
    building_type: Option<String>,
    capacity: Option<i64>,
}

impl ClassroomFields {
    fn validate(self) -> Result<Self, HandlerErr> {
        if self.building_number < 0 {
            return Err(HandlerErr::bad_params("buildingNumber must be >= 0")
                .with_details(json!({ "buildingNumber": self.building_number })));
        }
        if matches!(self.capacity, Some(c) if c < 0) {
            return Err(HandlerErr::bad_params("capacity must be >= 0"));
        }
        Ok(self)
    }
}

fn insert_classroom(conn: &Connection, c: &ClassroomFields) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO classrooms(building_id, building_number, building_type, capacity)
         VALUES(?, ?, ?, ?)",
        (&c.building_id, c.building_number, &c.building_type, c.capacity),
    )?;
    Ok(conn.last_insert_rowid())
}

fn handle_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "classrooms": [] }));
    };
    let mut stmt = conn
        .prepare(
            "SELECT id, building_id, building_number, building_type, capacity
             FROM classrooms
             ORDER BY building_id, building_number, id",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", "classrooms", e))?;
    let classrooms = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, i64>(0)?,
                "buildingId": row.get::<_, Option<String>>(1)?,
                "buildingNumber": row.get::<_, i64>(2)?,
                "buildingType": row.get::<_, Option<String>>(3)?,
                "capacity": row.get::<_, Option<i64>>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", "classrooms", e))?;
    Ok(json!({ "classrooms": classrooms }))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let fields = params_as::<ClassroomFields>(&req.params)?.validate()?;
    let id = insert_classroom(conn, &fields)
        .map_err(|e| HandlerErr::db("db_insert_failed", "classrooms", e))?;
    Ok(json!({ "classroomId": id }))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let id = get_i64(req, "id")?;
    let c = params_as::<ClassroomFields>(&req.params)?.validate()?;
    let changed = conn
        .execute(
            "UPDATE classrooms
             SET building_id = ?, building_number = ?, building_type = ?, capacity = ?
             WHERE id = ?",
            (&c.building_id, c.building_number, &c.building_type, c.capacity, id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", "classrooms", e))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("classroom not found").with_details(json!({ "id": id })));
    }
    Ok(json!({ "classroomId": id }))
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
    tracing::debug!(count = ids.len(), "classrooms deleted");
    Ok(json!({ "deleted": ids.len() }))
}

fn handle_import(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let rows = import_rows::<ClassroomFields>(req)?
        .into_iter()
        .map(ClassroomFields::validate)
        .collect::<Result<Vec<_>, _>>()?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for row in &rows {
        insert_classroom(&tx, row)
            .map_err(|e| HandlerErr::db("db_insert_failed", "classrooms", e))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    Ok(json!({ "imported": rows.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classrooms.list" => handle_list(state, req),
        "classrooms.create" => handle_create(state, req),
        "classrooms.update" => handle_update(state, req),
        "classrooms.delete" => handle_delete(state, req),
        "classrooms.deleteMany" => handle_delete_many(state, req),
        "classrooms.import" => handle_import(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
