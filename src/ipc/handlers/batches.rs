use crate::calendar::{parse_clock_time, parse_iso_date};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn parse_opt_string(v: Option<&JsonValue>) -> Result<Option<String>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or("must be string or null")?
                .trim()
                .to_string();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
    }
}

fn parse_bool(v: Option<&JsonValue>, default: bool) -> Result<bool, &'static str> {
    match v {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v.as_bool().ok_or("must be boolean"),
    }
}

// Suggested dates/times are stored as-is but rejected when they are not even
// parseable; the defaulting engine handles staleness, not garbage.
fn parse_opt_date_field(
    v: Option<&JsonValue>,
    key: &str,
) -> Result<Option<String>, String> {
    let raw = parse_opt_string(v).map_err(|m| format!("{} {}", key, m))?;
    if let Some(raw) = raw.as_deref() {
        if parse_iso_date(raw).is_none() {
            return Err(format!("{} must be YYYY-MM-DD", key));
        }
    }
    Ok(raw)
}

fn parse_opt_time_field(
    v: Option<&JsonValue>,
    key: &str,
) -> Result<Option<String>, String> {
    let raw = parse_opt_string(v).map_err(|m| format!("{} {}", key, m))?;
    if let Some(raw) = raw.as_deref() {
        if parse_clock_time(raw).is_none() {
            return Err(format!("{} must be HH:MM", key));
        }
    }
    Ok(raw)
}

fn now_ts() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

fn batch_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "courseId": r.get::<_, String>(1)?,
        "title": r.get::<_, String>(2)?,
        "employeeId": r.get::<_, Option<String>>(3)?,
        "startDate": r.get::<_, Option<String>>(4)?,
        "endDate": r.get::<_, Option<String>>(5)?,
        "startTime": r.get::<_, Option<String>>(6)?,
        "endTime": r.get::<_, Option<String>>(7)?,
        "archived": r.get::<_, i64>(8)? != 0,
    }))
}

const BATCH_COLUMNS: &str =
    "id, course_id, title, employee_id, start_date, end_date, start_time, end_time, archived";

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "batches": [] }));
    };
    let course_id = match parse_opt_string(req.params.get("courseId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("courseId {}", m), None),
    };
    let include_archived = match parse_bool(req.params.get("includeArchived"), false) {
        Ok(v) => v,
        Err(m) => {
            return err(
                &req.id,
                "bad_params",
                format!("includeArchived {}", m),
                None,
            )
        }
    };

    let sql = format!(
        "SELECT {} FROM batches
         WHERE (?1 IS NULL OR course_id = ?1) AND (?2 OR archived = 0)
         ORDER BY title",
        BATCH_COLUMNS
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let batches = match stmt.query_map(params![course_id, include_archived], batch_json) {
        Ok(rows) => match rows.collect::<Result<Vec<_>, _>>() {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(&req.id, json!({ "batches": batches }))
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(input) = req.params.get("input").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing input", None);
    };

    let course_id = match input.get("courseId").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "input.courseId is required", None),
    };
    let title = match input.get("title").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "input.title is required", None),
    };
    let employee_id = match parse_opt_string(input.get("employeeId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("input.employeeId {}", m), None),
    };
    let start_date = match parse_opt_date_field(input.get("startDate"), "input.startDate") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let end_date = match parse_opt_date_field(input.get("endDate"), "input.endDate") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let start_time = match parse_opt_time_field(input.get("startTime"), "input.startTime") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let end_time = match parse_opt_time_field(input.get("endTime"), "input.endTime") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let course_ok = conn
        .query_row(
            "SELECT 1 FROM courses WHERE id = ? LIMIT 1",
            [&course_id],
            |_r| Ok(()),
        )
        .optional();
    match course_ok {
        Ok(Some(())) => {}
        Ok(None) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let batch_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO batches(
            id, course_id, title, employee_id, start_date, end_date, start_time, end_time, archived, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        params![
            batch_id,
            course_id,
            title,
            employee_id,
            start_date,
            end_date,
            start_time,
            end_time,
            ts,
            ts
        ],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "batchId": batch_id }))
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let batch_id = match required_str(req, "batchId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let exists = conn
        .query_row(
            "SELECT 1 FROM batches WHERE id = ? LIMIT 1",
            [&batch_id],
            |_r| Ok(()),
        )
        .optional();
    match exists {
        Ok(Some(())) => {}
        Ok(None) => return err(&req.id, "not_found", "batch not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let mut fields: Vec<&'static str> = Vec::new();
    let mut values: Vec<Option<String>> = Vec::new();

    if let Some(v) = patch.get("title") {
        let Some(title) = v.as_str().map(|s| s.trim()).filter(|s| !s.is_empty()) else {
            return err(&req.id, "bad_params", "patch.title must not be empty", None);
        };
        fields.push("title = ?");
        values.push(Some(title.to_string()));
    }
    if patch.contains_key("employeeId") {
        match parse_opt_string(patch.get("employeeId")) {
            Ok(v) => {
                fields.push("employee_id = ?");
                values.push(v);
            }
            Err(m) => return err(&req.id, "bad_params", format!("patch.employeeId {}", m), None),
        }
    }
    if patch.contains_key("startDate") {
        match parse_opt_date_field(patch.get("startDate"), "patch.startDate") {
            Ok(v) => {
                fields.push("start_date = ?");
                values.push(v);
            }
            Err(m) => return err(&req.id, "bad_params", m, None),
        }
    }
    if patch.contains_key("endDate") {
        match parse_opt_date_field(patch.get("endDate"), "patch.endDate") {
            Ok(v) => {
                fields.push("end_date = ?");
                values.push(v);
            }
            Err(m) => return err(&req.id, "bad_params", m, None),
        }
    }
    if patch.contains_key("startTime") {
        match parse_opt_time_field(patch.get("startTime"), "patch.startTime") {
            Ok(v) => {
                fields.push("start_time = ?");
                values.push(v);
            }
            Err(m) => return err(&req.id, "bad_params", m, None),
        }
    }
    if patch.contains_key("endTime") {
        match parse_opt_time_field(patch.get("endTime"), "patch.endTime") {
            Ok(v) => {
                fields.push("end_time = ?");
                values.push(v);
            }
            Err(m) => return err(&req.id, "bad_params", m, None),
        }
    }

    if fields.is_empty() {
        return err(&req.id, "bad_params", "patch has no supported fields", None);
    }

    let sql = format!(
        "UPDATE batches SET {}, updated_at = ? WHERE id = ?",
        fields.join(", ")
    );
    let mut bind: Vec<rusqlite::types::Value> = values
        .into_iter()
        .map(|v| match v {
            Some(s) => rusqlite::types::Value::Text(s),
            None => rusqlite::types::Value::Null,
        })
        .collect();
    bind.push(rusqlite::types::Value::Text(now_ts()));
    bind.push(rusqlite::types::Value::Text(batch_id));
    if let Err(e) = conn.execute(&sql, rusqlite::params_from_iter(bind)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_archive(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let batch_id = match required_str(req, "batchId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let archived = match parse_bool(req.params.get("archived"), true) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("archived {}", m), None),
    };

    let changed = match conn.execute(
        "UPDATE batches SET archived = ?, updated_at = ? WHERE id = ?",
        params![if archived { 1 } else { 0 }, now_ts(), batch_id],
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if changed == 0 {
        return err(&req.id, "not_found", "batch not found", None);
    }
    ok(&req.id, json!({ "archived": archived }))
}

/// The BatchDefaults shape the schedule form feeds into the defaulting
/// engine when this batch is selected.
fn handle_defaults(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let batch_id = match required_str(req, "batchId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let sql = format!("SELECT {} FROM batches WHERE id = ?", BATCH_COLUMNS);
    let row = conn
        .query_row(&sql, [&batch_id], |r| {
            Ok(json!({
                "batchId": r.get::<_, String>(0)?,
                "courseId": r.get::<_, String>(1)?,
                "title": r.get::<_, String>(2)?,
                "employeeId": r.get::<_, Option<String>>(3)?,
                "startDate": r.get::<_, Option<String>>(4)?,
                "endDate": r.get::<_, Option<String>>(5)?,
                "startTime": r.get::<_, Option<String>>(6)?,
                "endTime": r.get::<_, Option<String>>(7)?,
            }))
        })
        .optional();
    match row {
        Ok(Some(batch)) => ok(&req.id, json!({ "batch": batch })),
        Ok(None) => err(&req.id, "not_found", "batch not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "batches.list" => Some(handle_list(state, req)),
        "batches.create" => Some(handle_create(state, req)),
        "batches.update" => Some(handle_update(state, req)),
        "batches.archive" => Some(handle_archive(state, req)),
        "batches.defaults" => Some(handle_defaults(state, req)),
        _ => None,
    }
}
