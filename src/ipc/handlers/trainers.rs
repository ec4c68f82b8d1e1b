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

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "trainers": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           t.id,
           t.name,
           t.email,
           t.active,
           (SELECT COUNT(*) FROM schedules s WHERE s.employee_id = t.id AND s.archived = 0) AS schedule_count
         FROM trainers t
         ORDER BY t.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let trainers = match stmt.query_map([], |r| {
        Ok(json!({
            "employeeId": r.get::<_, String>(0)?,
            "name": r.get::<_, String>(1)?,
            "email": r.get::<_, Option<String>>(2)?,
            "active": r.get::<_, i64>(3)? != 0,
            "scheduleCount": r.get::<_, i64>(4)?,
        }))
    }) {
        Ok(rows) => match rows.collect::<Result<Vec<_>, _>>() {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(&req.id, json!({ "trainers": trainers }))
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
    let email = match parse_opt_string(req.params.get("email")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("email {}", m), None),
    };
    // SIS-assigned employee ids arrive from the console; generate one only
    // for trainers created by hand.
    let employee_id = match parse_opt_string(req.params.get("employeeId")) {
        Ok(Some(v)) => v,
        Ok(None) => Uuid::new_v4().to_string(),
        Err(m) => return err(&req.id, "bad_params", format!("employeeId {}", m), None),
    };

    let exists = conn
        .query_row(
            "SELECT 1 FROM trainers WHERE id = ? LIMIT 1",
            [&employee_id],
            |_r| Ok(()),
        )
        .optional();
    match exists {
        Ok(Some(())) => {
            return err(
                &req.id,
                "conflict",
                "trainer already exists",
                Some(json!({ "employeeId": employee_id })),
            )
        }
        Ok(None) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    if let Err(e) = conn.execute(
        "INSERT INTO trainers(id, name, email, active) VALUES(?, ?, ?, 1)",
        params![employee_id, name, email],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "employeeId": employee_id }))
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let employee_id = match required_str(req, "employeeId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    if let Some(v) = patch.get("name") {
        let Some(name) = v.as_str().map(|s| s.trim()).filter(|s| !s.is_empty()) else {
            return err(&req.id, "bad_params", "patch.name must not be empty", None);
        };
        if let Err(e) = conn.execute(
            "UPDATE trainers SET name = ? WHERE id = ?",
            params![name, employee_id],
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    if patch.contains_key("email") {
        let email = match parse_opt_string(patch.get("email")) {
            Ok(v) => v,
            Err(m) => return err(&req.id, "bad_params", format!("patch.email {}", m), None),
        };
        if let Err(e) = conn.execute(
            "UPDATE trainers SET email = ? WHERE id = ?",
            params![email, employee_id],
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    if let Some(v) = patch.get("active") {
        let Some(active) = v.as_bool() else {
            return err(&req.id, "bad_params", "patch.active must be boolean", None);
        };
        if let Err(e) = conn.execute(
            "UPDATE trainers SET active = ? WHERE id = ?",
            params![if active { 1 } else { 0 }, employee_id],
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "trainers.list" => Some(handle_list(state, req)),
        "trainers.create" => Some(handle_create(state, req)),
        "trainers.update" => Some(handle_update(state, req)),
        _ => None,
    }
}
