use crate::cache::Day;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{conn, delete_in_order, get_i64, get_ids, import_rows, non_empty, params_as};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

const DELETE_STEPS: &[(&str, &str)] = &[
    ("assignments", "DELETE FROM assignments WHERE teacher_id = ?"),
    ("teacher_subjects", "DELETE FROM teacher_subjects WHERE teacher_id = ?"),
    ("teachers", "DELETE FROM teachers WHERE id = ?"),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeacherFields {
    name: String,
    father_lastname: String,
    mother_lastname: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    degree: Option<String>,
    commissioned_hours: Option<i64>,
    active_hours: Option<i64>,
    performance: Option<i64>,
    #[serde(default)]
    preferred_days: Vec<String>,
    #[serde(default)]
    preferred_modules: Vec<u32>,
    /// Subjects this teacher can give. `None` on update leaves links untouched.
    subjects: Option<Vec<i64>>,
}

impl TeacherFields {
    fn validate(mut self) -> Result<Self, HandlerErr> {
        self.name = non_empty(&self.name, "name")?;
        self.father_lastname = non_empty(&self.father_lastname, "fatherLastname")?;
        // Stored as three-letter codes, whatever spelling came in.
        self.preferred_days = self
            .preferred_days
            .iter()
            .map(|raw| {
                Day::parse(raw).map(|d| d.code().to_string()).ok_or_else(|| {
                    HandlerErr::bad_params("preferredDays must hold Mon, Tue, Wed, Thu, Fri or Sat")
                        .with_details(json!({ "preferredDays": raw }))
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(self)
    }
}

fn write_teacher(conn: &Connection, id: Option<i64>, t: &TeacherFields) -> rusqlite::Result<i64> {
    // Serializing Vec<String>/Vec<u32> into JSON text cannot fail.
    let days = serde_json::to_string(&t.preferred_days).unwrap_or_else(|_| "[]".to_string());
    let modules = serde_json::to_string(&t.preferred_modules).unwrap_or_else(|_| "[]".to_string());

    let teacher_id = match id {
        None => {
            conn.execute(
                "INSERT INTO teachers(
                   name, father_lastname, mother_lastname, email, phone, degree,
                   commissioned_hours, active_hours, performance, preferred_days, preferred_modules
                 ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &t.name,
                    &t.father_lastname,
                    &t.mother_lastname,
                    &t.email,
                    &t.phone,
                    &t.degree,
                    t.commissioned_hours,
                    t.active_hours,
                    t.performance,
                    &days,
                    &modules,
                ),
            )?;
            conn.last_insert_rowid()
        }
        Some(id) => {
            let changed = conn.execute(
                "UPDATE teachers SET
                   name = ?, father_lastname = ?, mother_lastname = ?, email = ?, phone = ?,
                   degree = ?, commissioned_hours = ?, active_hours = ?, performance = ?,
                   preferred_days = ?, preferred_modules = ?
                 WHERE id = ?",
                (
                    &t.name,
                    &t.father_lastname,
                    &t.mother_lastname,
                    &t.email,
                    &t.phone,
                    &t.degree,
                    t.commissioned_hours,
                    t.active_hours,
                    t.performance,
                    &days,
                    &modules,
                    id,
                ),
            )?;
            if changed == 0 {
                return Err(rusqlite::Error::QueryReturnedNoRows);
            }
            id
        }
    };

    if let Some(subjects) = &t.subjects {
        conn.execute(
            "DELETE FROM teacher_subjects WHERE teacher_id = ?",
            [teacher_id],
        )?;
        for subject_id in subjects {
            conn.execute(
                "INSERT OR IGNORE INTO teacher_subjects(teacher_id, subject_id) VALUES(?, ?)",
                (teacher_id, subject_id),
            )?;
        }
    }
    Ok(teacher_id)
}

fn handle_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "teachers": [] }));
    };

    let mut links: HashMap<i64, Vec<i64>> = HashMap::new();
    {
        let mut stmt = conn
            .prepare("SELECT teacher_id, subject_id FROM teacher_subjects ORDER BY subject_id")
            .map_err(|e| HandlerErr::db("db_query_failed", "teacher_subjects", e))?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(|e| HandlerErr::db("db_query_failed", "teacher_subjects", e))?;
        for (tid, sid) in pairs {
            links.entry(tid).or_default().push(sid);
        }
    }

    let mut stmt = conn
        .prepare(
            "SELECT id, name, father_lastname, mother_lastname, email, phone, degree,
                    commissioned_hours, active_hours, performance, preferred_days, preferred_modules
             FROM teachers
             ORDER BY father_lastname, name, id",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", "teachers", e))?;
    let teachers = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let days: String = row.get(10)?;
            let modules: String = row.get(11)?;
            Ok(json!({
                "id": id,
                "name": row.get::<_, String>(1)?,
                "fatherLastname": row.get::<_, String>(2)?,
                "motherLastname": row.get::<_, Option<String>>(3)?,
                "email": row.get::<_, Option<String>>(4)?,
                "phone": row.get::<_, Option<String>>(5)?,
                "degree": row.get::<_, Option<String>>(6)?,
                "commissionedHours": row.get::<_, Option<i64>>(7)?,
                "activeHours": row.get::<_, Option<i64>>(8)?,
                "performance": row.get::<_, Option<i64>>(9)?,
                "preferredDays": serde_json::from_str::<serde_json::Value>(&days).unwrap_or(json!([])),
                "preferredModules": serde_json::from_str::<serde_json::Value>(&modules).unwrap_or(json!([])),
                "subjects": links.get(&id).cloned().unwrap_or_default(),
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", "teachers", e))?;

    Ok(json!({ "teachers": teachers }))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let fields = params_as::<TeacherFields>(&req.params)?.validate()?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let id = write_teacher(&tx, None, &fields)
        .map_err(|e| HandlerErr::db("db_insert_failed", "teachers", e))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    Ok(json!({ "teacherId": id }))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let id = get_i64(req, "id")?;
    let fields = params_as::<TeacherFields>(&req.params)?.validate()?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    match write_teacher(&tx, Some(id), &fields) {
        Ok(_) => {}
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(HandlerErr::not_found("teacher not found").with_details(json!({ "id": id })));
        }
        Err(e) => return Err(HandlerErr::db("db_update_failed", "teachers", e)),
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    Ok(json!({ "teacherId": id }))
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
    tracing::debug!(count = ids.len(), "teachers deleted");
    Ok(json!({ "deleted": ids.len() }))
}

fn handle_import(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let rows = import_rows::<TeacherFields>(req)?
        .into_iter()
        .map(TeacherFields::validate)
        .collect::<Result<Vec<_>, _>>()?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for row in &rows {
        write_teacher(&tx, None, row)
            .map_err(|e| HandlerErr::db("db_insert_failed", "teachers", e))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    Ok(json!({ "imported": rows.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "teachers.list" => handle_list(state, req),
        "teachers.create" => handle_create(state, req),
        "teachers.update" => handle_update(state, req),
        "teachers.delete" => handle_delete(state, req),
        "teachers.deleteMany" => handle_delete_many(state, req),
        "teachers.import" => handle_import(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
