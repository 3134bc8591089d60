use crate::cache::{AssignmentRecord, Day};
use anyhow::{anyhow, Context};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;

pub const DB_FILE_NAME: &str = "roster.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!(
            "failed to create workspace directory {}",
            workspace.to_string_lossy()
        )
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            shorten TEXT NOT NULL,
            color TEXT NOT NULL,
            spec TEXT,
            required_modules INTEGER,
            priority INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            father_lastname TEXT NOT NULL,
            mother_lastname TEXT,
            email TEXT,
            phone TEXT,
            degree TEXT,
            commissioned_hours INTEGER,
            active_hours INTEGER,
            performance INTEGER,
            preferred_days TEXT NOT NULL DEFAULT '[]',
            preferred_modules TEXT NOT NULL DEFAULT '[]'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_subjects(
            teacher_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            PRIMARY KEY(teacher_id, subject_id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS groups(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            grade INTEGER NOT NULL,
            \"group\" TEXT NOT NULL,
            career TEXT,
            students INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            building_id TEXT,
            building_number INTEGER NOT NULL,
            building_type TEXT,
            capacity INTEGER
        )",
        [],
    )?;

    // One assignment per (group, day, module): the grid depends on it.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL,
            day TEXT NOT NULL,
            module_index INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            teacher_id INTEGER NOT NULL,
            updated_at TEXT,
            UNIQUE(group_id, day, module_index),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_subject ON assignments(subject_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_teacher ON assignments(teacher_id)",
        [],
    )?;

    ensure_assignments_updated_at(&conn)?;

    Ok(conn)
}

const ASSIGNMENT_SELECT: &str = "SELECT
       a.id,
       a.group_id,
       a.day,
       a.module_index,
       a.subject_id,
       a.teacher_id,
       s.shorten,
       s.color
     FROM assignments a
     JOIN subjects s ON s.id = a.subject_id";

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<AssignmentRecord> {
    let day_code: String = row.get(2)?;
    let day = Day::parse(&day_code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown day code {day_code:?}").into(),
        )
    })?;
    Ok(AssignmentRecord {
        id: row.get(0)?,
        group_id: row.get(1)?,
        day,
        module_index: row.get(3)?,
        subject_id: row.get(4)?,
        teacher_id: row.get(5)?,
        subject_shorten: row.get(6)?,
        subject_color: row.get(7)?,
    })
}

pub fn assignments_all(conn: &Connection) -> anyhow::Result<Vec<AssignmentRecord>> {
    let sql = format!("{ASSIGNMENT_SELECT} ORDER BY a.id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], assignment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn assignment_get(
    conn: &Connection,
    group_id: i64,
    day: Day,
    module_index: u32,
) -> anyhow::Result<Option<AssignmentRecord>> {
    let sql = format!(
        "{ASSIGNMENT_SELECT} WHERE a.group_id = ? AND a.day = ? AND a.module_index = ?"
    );
    let rec = conn
        .query_row(
            &sql,
            (group_id, day.code(), module_index),
            assignment_from_row,
        )
        .optional()?;
    Ok(rec)
}

/// Create-or-replace on the slot. Returns the stored row joined with its subject.
pub fn assignment_save(
    conn: &Connection,
    group_id: i64,
    day: Day,
    module_index: u32,
    subject_id: i64,
    teacher_id: i64,
) -> anyhow::Result<AssignmentRecord> {
    let subject_exists: Option<i64> = conn
        .query_row("SELECT 1 FROM subjects WHERE id = ?", [subject_id], |r| {
            r.get(0)
        })
        .optional()?;
    if subject_exists.is_none() {
        return Err(anyhow!("subject {subject_id} not found"));
    }

    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO assignments(group_id, day, module_index, subject_id, teacher_id, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(group_id, day, module_index) DO UPDATE SET
           subject_id = excluded.subject_id,
           teacher_id = excluded.teacher_id,
           updated_at = excluded.updated_at",
        (group_id, day.code(), module_index, subject_id, teacher_id, &now),
    )?;

    assignment_get(conn, group_id, day, module_index)?
        .ok_or_else(|| anyhow!("assignment vanished after save"))
}

/// Returns false when no row had that id.
pub fn assignment_delete(conn: &Connection, assignment_id: i64) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM assignments WHERE id = ?", [assignment_id])?;
    Ok(n > 0)
}

fn ensure_assignments_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "assignments", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE assignments ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
