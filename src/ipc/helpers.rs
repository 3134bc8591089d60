use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::Day;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};

pub fn conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn get_i64(req: &Request, key: &str) -> Result<i64, HandlerErr> {
    req.params
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {key}")))
}

pub fn get_u32(req: &Request, key: &str) -> Result<u32, HandlerErr> {
    let v = get_i64(req, key)?;
    u32::try_from(v).map_err(|_| {
        HandlerErr::bad_params(format!("{key} must be a non-negative integer"))
            .with_details(serde_json::json!({ key: v }))
    })
}

pub fn get_day(req: &Request, key: &str) -> Result<Day, HandlerErr> {
    let raw = req
        .params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {key}")))?;
    Day::parse(raw).ok_or_else(|| {
        HandlerErr::bad_params(format!("{key} must be one of Mon, Tue, Wed, Thu, Fri, Sat"))
            .with_details(serde_json::json!({ key: raw }))
    })
}

/// Non-empty list of integer ids. Repeats are collapsed.
pub fn get_ids(req: &Request, key: &str) -> Result<Vec<i64>, HandlerErr> {
    let Some(items) = req.params.get(key).and_then(Value::as_array) else {
        return Err(HandlerErr::bad_params(format!("missing {key}")));
    };
    if items.is_empty() {
        return Err(HandlerErr::bad_params(format!("{key} must not be empty")));
    }
    let mut ids = items
        .iter()
        .map(|v| {
            v.as_i64().ok_or_else(|| {
                HandlerErr::bad_params(format!("{key} must hold integer ids"))
                    .with_details(serde_json::json!({ key: v }))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

/// Decodes the whole params object into a typed struct.
pub fn params_as<T: DeserializeOwned>(value: &Value) -> Result<T, HandlerErr> {
    serde_json::from_value(value.clone()).map_err(|e| HandlerErr::bad_params(e.to_string()))
}

/// `rows` for the `*.import` methods. An empty batch is rejected.
pub fn import_rows<T: DeserializeOwned>(req: &Request) -> Result<Vec<T>, HandlerErr> {
    let Some(rows) = req.params.get("rows").and_then(Value::as_array) else {
        return Err(HandlerErr::bad_params("missing rows"));
    };
    if rows.is_empty() {
        return Err(HandlerErr::bad_params("no rows to import"));
    }
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            params_as(row).map_err(|e| e.with_details(serde_json::json!({ "row": i })))
        })
        .collect()
}

pub fn non_empty(value: &str, field: &str) -> Result<String, HandlerErr> {
    let v = value.trim();
    if v.is_empty() {
        return Err(HandlerErr::bad_params(format!("{field} must not be empty")));
    }
    Ok(v.to_string())
}

/// Deletes entities and their dependents inside a single transaction.
/// `steps` run in order for each id, each bound to it; the last step must delete
/// the entity row. An id that matches no entity rolls back the whole batch.
pub fn delete_in_order(
    conn: &Connection,
    ids: &[i64],
    steps: &[(&str, &str)],
) -> Result<(), HandlerErr> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    for &id in ids {
        let mut last_changed = 0;
        for (table, sql) in steps {
            last_changed = tx
                .execute(sql, [id])
                .map_err(|e| HandlerErr::db("db_delete_failed", table, e))?;
        }
        if last_changed == 0 {
            let _ = tx.rollback();
            return Err(
                HandlerErr::not_found("not found").with_details(serde_json::json!({ "id": id }))
            );
        }
    }

    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))
}
