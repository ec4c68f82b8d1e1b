use super::schedules::{parse_request_input, resolve_now};
use super::setup::scheduling_section;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::recurrence::validate_request;
use crate::upstream::{build_submission, normalize_schedules, DEFAULT_SUBMIT_DATE_FORMAT};
use rusqlite::params;
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_ts() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

/// Pull a page of raw hosted-API records into the workspace. Records are
/// normalized at this boundary; anything without an identity or a usable
/// date is counted and skipped, never fatal.
fn handle_import_schedules(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(raw_records) = req.params.get("records").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "records must be an array", None);
    };

    let summary = normalize_schedules(raw_records);
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let ts = now_ts();
    let mut imported = 0usize;
    for record in &summary.accepted {
        // Imports may arrive before their reference entities; create stubs
        // so the schedule rows always satisfy their foreign keys.
        let course_name = record
            .course_name
            .clone()
            .unwrap_or_else(|| record.course_id.clone());
        if let Err(e) = tx.execute(
            "INSERT OR IGNORE INTO courses(id, name, archived) VALUES(?, ?, 0)",
            params![record.course_id, course_name],
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        let trainer_name = record
            .trainer_name
            .clone()
            .unwrap_or_else(|| record.employee_id.clone());
        if let Err(e) = tx.execute(
            "INSERT OR IGNORE INTO trainers(id, name, active) VALUES(?, ?, 1)",
            params![record.employee_id, trainer_name],
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        let batch_title = record
            .batch_title
            .clone()
            .unwrap_or_else(|| record.batch_id.clone());
        if let Err(e) = tx.execute(
            "INSERT OR IGNORE INTO batches(id, course_id, title, archived, created_at, updated_at)
             VALUES(?, ?, ?, 0, ?, ?)",
            params![record.batch_id, record.course_id, batch_title, ts, ts],
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }

        let days_json =
            serde_json::to_string(&record.days_of_week).unwrap_or_else(|_| "[]".to_string());
        if let Err(e) = tx.execute(
            "INSERT INTO schedules(
                id, batch_id, course_id, employee_id, scheduled_date, start_time, end_time,
                recurrence_type, days_of_week_json, class_link, is_online, archived, created_at, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               batch_id = excluded.batch_id,
               course_id = excluded.course_id,
               employee_id = excluded.employee_id,
               scheduled_date = excluded.scheduled_date,
               start_time = excluded.start_time,
               end_time = excluded.end_time,
               recurrence_type = excluded.recurrence_type,
               days_of_week_json = excluded.days_of_week_json,
               class_link = excluded.class_link,
               is_online = excluded.is_online,
               archived = excluded.archived,
               updated_at = excluded.updated_at",
            params![
                record.schedule_id,
                record.batch_id,
                record.course_id,
                record.employee_id,
                record.scheduled_date,
                record.start_time,
                record.end_time,
                record.recurrence_type,
                days_json,
                record.class_link,
                if record.is_online_class { 1 } else { 0 },
                if record.archived { 1 } else { 0 },
                ts,
                ts
            ],
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        imported += 1;
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "imported": imported, "skipped": summary.skipped }),
    )
}

/// Render a RecurrenceRequest the way the hosted API's schedule endpoint
/// expects it, using the workspace's configured display date format.
fn handle_build_submission(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(input) = req.params.get("input").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing input", None);
    };
    let request = match parse_request_input(input) {
        Ok(v) => v,
        Err(e) => return err(&req.id, e.code, e.message, e.details),
    };
    let now = match resolve_now(&req.params) {
        Ok(v) => v,
        Err(e) => return err(&req.id, e.code, e.message, e.details),
    };

    let issues = validate_request(&request, now.date(), false);
    if !issues.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "invalid schedule request",
            Some(json!({ "issues": issues })),
        );
    }

    let date_format = state
        .db
        .as_ref()
        .and_then(|conn| scheduling_section(conn).ok())
        .and_then(|section| {
            section
                .get("submitDateFormat")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| DEFAULT_SUBMIT_DATE_FORMAT.to_string());

    ok(
        &req.id,
        json!({ "payload": build_submission(&request, &date_format) }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "upstream.importSchedules" => Some(handle_import_schedules(state, req)),
        "upstream.buildSubmission" => Some(handle_build_submission(state, req)),
        _ => None,
    }
}
