use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{conn, get_day, get_i64, get_u32};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    // No workspace yet: an empty grid rather than an error.
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "assignments": [] }));
    };
    let assignments = db::assignments_all(conn)
        .map_err(|e| HandlerErr::db("db_query_failed", "assignments", format!("{e:#}")))?;
    Ok(json!({ "assignments": assignments }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let group_id = get_i64(req, "groupId")?;
    let day = get_day(req, "day")?;
    let module_index = get_u32(req, "moduleIndex")?;

    let assignment = db::assignment_get(conn, group_id, day, module_index)
        .map_err(|e| HandlerErr::db("db_query_failed", "assignments", format!("{e:#}")))?;
    Ok(json!({ "assignment": assignment }))
}

fn handle_save(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let group_id = get_i64(req, "groupId")?;
    let day = get_day(req, "day")?;
    let module_index = get_u32(req, "moduleIndex")?;
    let subject_id = get_i64(req, "subjectId")?;
    let teacher_id = get_i64(req, "teacherId")?;

    let assignment = db::assignment_save(conn, group_id, day, module_index, subject_id, teacher_id)
        .map_err(|e| {
            HandlerErr::db("db_insert_failed", "assignments", format!("{e:#}")).with_details(json!({
                "table": "assignments",
                "groupId": group_id,
                "day": day,
                "moduleIndex": module_index,
                "subjectId": subject_id,
            }))
        })?;
    tracing::debug!(id = assignment.id, slot = %assignment.key(), "assignment saved");
    Ok(json!({ "assignment": assignment }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let assignment_id = get_i64(req, "assignmentId")?;

    let deleted = db::assignment_delete(conn, assignment_id)
        .map_err(|e| HandlerErr::db("db_delete_failed", "assignments", format!("{e:#}")))?;
    if !deleted {
        return Err(HandlerErr::not_found("assignment not found")
            .with_details(json!({ "assignmentId": assignment_id })));
    }
    tracing::debug!(id = assignment_id, "assignment deleted");
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assignments.list" => handle_list(state, req),
        "assignments.get" => handle_get(state, req),
        "assignments.save" => handle_save(state, req),
        "assignments.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
