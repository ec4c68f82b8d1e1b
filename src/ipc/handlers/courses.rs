use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
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

fn course_exists(conn: &Connection, course_id: &str) -> Result<bool, String> {
    conn.query_row(
        "SELECT 1 FROM courses WHERE id = ? LIMIT 1",
        [course_id],
        |_r| Ok(()),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| e.to_string())
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "courses": [] }));
    };

    // Counts let the console dashboard show usage without extra round trips.
    // Correlated subqueries avoid double-counting from joins.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.code,
           c.archived,
           (SELECT COUNT(*) FROM batches b WHERE b.course_id = c.id) AS batch_count,
           (SELECT COUNT(*) FROM schedules s WHERE s.course_id = c.id AND s.archived = 0) AS schedule_count
         FROM courses c
         ORDER BY c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let courses = match stmt.query_map([], |r| {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "name": r.get::<_, String>(1)?,
            "code": r.get::<_, Option<String>>(2)?,
            "archived": r.get::<_, i64>(3)? != 0,
            "batchCount": r.get::<_, i64>(4)?,
            "scheduleCount": r.get::<_, i64>(5)?,
        }))
    }) {
        Ok(rows) => match rows.collect::<Result<Vec<_>, _>>() {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(&req.id, json!({ "courses": courses }))
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let code = match parse_opt_string(req.params.get("code")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("code {}", m), None),
    };

    let course_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, name, code, archived) VALUES(?, ?, ?, 0)",
        params![course_id, name, code],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "courseId": course_id }))
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };
    match course_exists(conn, &course_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e, None),
    }

    if let Some(v) = patch.get("name") {
        let Some(name) = v.as_str().map(|s| s.trim()).filter(|s| !s.is_empty()) else {
            return err(&req.id, "bad_params", "patch.name must not be empty", None);
        };
        if let Err(e) = conn.execute(
            "UPDATE courses SET name = ? WHERE id = ?",
            params![name, course_id],
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    if patch.contains_key("code") {
        let code = match parse_opt_string(patch.get("code")) {
            Ok(v) => v,
            Err(m) => return err(&req.id, "bad_params", format!("patch.code {}", m), None),
        };
        if let Err(e) = conn.execute(
            "UPDATE courses SET code = ? WHERE id = ?",
            params![code, course_id],
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_archive(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let archived = match parse_bool(req.params.get("archived"), true) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("archived {}", m), None),
    };

    let changed = match conn.execute(
        "UPDATE courses SET archived = ? WHERE id = ?",
        params![if archived { 1 } else { 0 }, course_id],
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if changed == 0 {
        return err(&req.id, "not_found", "course not found", None);
    }
    ok(&req.id, json!({ "archived": archived }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_list(state, req)),
        "courses.create" => Some(handle_create(state, req)),
        "courses.update" => Some(handle_update(state, req)),
        "courses.archive" => Some(handle_archive(state, req)),
        _ => None,
    }
}
