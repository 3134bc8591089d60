use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{conn, delete_in_order, get_i64, get_ids, import_rows, non_empty, params_as};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

// Explicit dependency order (no ON DELETE CASCADE).
const DELETE_STEPS: &[(&str, &str)] = &[
    ("assignments", "DELETE FROM assignments WHERE subject_id = ?"),
    ("teacher_subjects", "DELETE FROM teacher_subjects WHERE subject_id = ?"),
    ("subjects", "DELETE FROM subjects WHERE id = ?"),
];

const DEFAULT_COLOR: &str = "#cccccc";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubjectFields {
    name: String,
    shorten: Option<String>,
    color: Option<String>,
    spec: Option<String>,
    required_modules: Option<i64>,
    priority: Option<i64>,
}

struct SubjectRow {
    name: String,
    shorten: String,
    color: String,
    spec: Option<String>,
    required_modules: Option<i64>,
    priority: Option<i64>,
}

impl SubjectFields {
    fn normalize(self) -> Result<SubjectRow, HandlerErr> {
        let name = non_empty(&self.name, "name")?;
        // Blank abbreviation: first three characters of the name.
        let shorten = match self.shorten.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => name.chars().take(3).collect::<String>().to_uppercase(),
        };
        let color = match self.color.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => DEFAULT_COLOR.to_string(),
        };
        Ok(SubjectRow {
            name,
            shorten,
            color,
            spec: self.spec.filter(|s| !s.trim().is_empty()),
            required_modules: self.required_modules,
            priority: self.priority,
        })
    }
}

fn insert_subject(conn: &Connection, row: &SubjectRow) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO subjects(name, shorten, color, spec, required_modules, priority)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &row.name,
            &row.shorten,
            &row.color,
            &row.spec,
            row.required_modules,
            row.priority,
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

fn handle_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "subjects": [] }));
    };

    // The drag source needs a teacher per subject; take the lowest linked teacher id.
    let mut stmt = conn
        .prepare(
            "SELECT
               s.id, s.name, s.shorten, s.color, s.spec, s.required_modules, s.priority,
               t.id, t.name, t.father_lastname
             FROM subjects s
             LEFT JOIN teachers t ON t.id = (
               SELECT MIN(ts.teacher_id) FROM teacher_subjects ts WHERE ts.subject_id = s.id
             )
             ORDER BY s.name, s.id",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", "subjects", e))?;

    let subjects = stmt
        .query_map([], |row| {
            let teacher_id: Option<i64> = row.get(7)?;
            let assigned_teacher = match teacher_id {
                Some(tid) => json!({
                    "id": tid,
                    "name": row.get::<_, String>(8)?,
                    "fatherLastname": row.get::<_, String>(9)?,
                }),
                None => serde_json::Value::Null,
            };
            Ok(json!({
                "id": row.get::<_, i64>(0)?,
                "name": row.get::<_, String>(1)?,
                "shorten": row.get::<_, String>(2)?,
                "color": row.get::<_, String>(3)?,
                "spec": row.get::<_, Option<String>>(4)?,
                "requiredModules": row.get::<_, Option<i64>>(5)?,
                "priority": row.get::<_, Option<i64>>(6)?,
                "teacherId": teacher_id,
                "assignedTeacher": assigned_teacher,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", "subjects", e))?;

    Ok(json!({ "subjects": subjects }))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let row = params_as::<SubjectFields>(&req.params)?.normalize()?;
    let id = insert_subject(conn, &row)
        .map_err(|e| HandlerErr::db("db_insert_failed", "subjects", e))?;
    Ok(json!({ "subjectId": id, "shorten": row.shorten }))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let id = get_i64(req, "id")?;
    let row = params_as::<SubjectFields>(&req.params)?.normalize()?;

    let changed = conn
        .execute(
            "UPDATE subjects
             SET name = ?, shorten = ?, color = ?, spec = ?, required_modules = ?, priority = ?
             WHERE id = ?",
            (
                &row.name,
                &row.shorten,
                &row.color,
                &row.spec,
                row.required_modules,
                row.priority,
                id,
            ),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", "subjects", e))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("subject not found").with_details(json!({ "id": id })));
    }
    Ok(json!({ "subjectId": id }))
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
    tracing::debug!(count = ids.len(), "subjects deleted");
    Ok(json!({ "deleted": ids.len() }))
}

fn handle_import(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let rows = import_rows::<SubjectFields>(req)?
        .into_iter()
        .map(SubjectFields::normalize)
        .collect::<Result<Vec<_>, _>>()?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for row in &rows {
        insert_subject(&tx, row).map_err(|e| HandlerErr::db("db_insert_failed", "subjects", e))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    Ok(json!({ "imported": rows.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "subjects.list" => handle_list(state, req),
        "subjects.create" => handle_create(state, req),
        "subjects.update" => handle_update(state, req),
        "subjects.delete" => handle_delete(state, req),
        "subjects.deleteMany" => handle_delete_many(state, req),
        "subjects.import" => handle_import(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
