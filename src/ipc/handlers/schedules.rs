use crate::calendar::{self, parse_clock_time, parse_iso_date, ScheduleFilters, ScheduleRecord};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::recurrence::{
    expand_occurrences, normalize_weekday_codes, validate_request, Recurrence, RecurrenceRequest,
};
use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection};
use serde_json::{json, Map, Value as JsonValue};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub(crate) struct HandlerErr {
    pub(crate) code: &'static str,
    pub(crate) message: String,
    pub(crate) details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    fn db(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "db_query_failed",
            message: message.into(),
            details: None,
        }
    }
}

fn db_conn<'a>(state: &'a AppState) -> Result<&'a Connection, HandlerErr> {
    state.db.as_ref().ok_or(HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".to_string(),
        details: None,
    })
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

fn get_bool(params: &serde_json::Value, key: &str, default: bool) -> Result<bool, HandlerErr> {
    match params.get(key) {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be boolean", key))),
    }
}

fn now_ts() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

/// Wall clock, unless the request pins `now` (UI previews and tests).
pub(crate) fn resolve_now(params: &serde_json::Value) -> Result<NaiveDateTime, HandlerErr> {
    let Some(raw) = params.get("now").and_then(|v| v.as_str()) else {
        return Ok(Local::now().naive_local());
    };
    let t = raw.trim();
    NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M"))
        .map_err(|_| HandlerErr::bad_params("now must be YYYY-MM-DDTHH:MM[:SS]"))
}

fn json_array_string(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

fn parse_json_array_string(raw: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(raw).unwrap_or_default()
}

const RECORD_SELECT: &str = "SELECT
   s.id, s.batch_id, s.course_id, s.employee_id, s.scheduled_date,
   s.start_time, s.end_time, s.recurrence_type, s.days_of_week_json,
   s.class_link, s.is_online, s.archived,
   t.name AS trainer_name, c.name AS course_name, b.title AS batch_title
 FROM schedules s
 LEFT JOIN trainers t ON t.id = s.employee_id
 LEFT JOIN courses c ON c.id = s.course_id
 LEFT JOIN batches b ON b.id = s.batch_id";

fn row_to_record(r: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleRecord> {
    let days_raw: String = r.get(8)?;
    Ok(ScheduleRecord {
        schedule_id: r.get(0)?,
        batch_id: r.get(1)?,
        course_id: r.get(2)?,
        employee_id: r.get(3)?,
        scheduled_date: r.get(4)?,
        start_time: r.get(5)?,
        end_time: r.get(6)?,
        recurrence_type: r.get(7)?,
        days_of_week: parse_json_array_string(&days_raw),
        class_link: r.get(9)?,
        is_online_class: r.get::<_, i64>(10)? != 0,
        archived: r.get::<_, i64>(11)? != 0,
        trainer_name: r.get(12)?,
        course_name: r.get(13)?,
        batch_title: r.get(14)?,
    })
}

pub(crate) fn load_records(
    conn: &Connection,
    include_archived: bool,
) -> Result<Vec<ScheduleRecord>, HandlerErr> {
    let sql = format!(
        "{} WHERE (? OR s.archived = 0) ORDER BY s.scheduled_date, s.start_time",
        RECORD_SELECT
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| HandlerErr::db(e.to_string()))?;
    stmt.query_map([include_archived], row_to_record)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db(e.to_string()))
}

fn record_json(record: &ScheduleRecord, now: NaiveDateTime) -> serde_json::Value {
    let status = calendar::status_for(record, now);
    let mut value = serde_json::to_value(record).unwrap_or_else(|_| json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.insert("status".to_string(), json!(status));
    }
    value
}

fn parse_filters(params: &serde_json::Value) -> Result<ScheduleFilters, HandlerErr> {
    calendar::parse_schedule_filters(params.get("filters")).map_err(|e| HandlerErr {
        code: "bad_params",
        message: e.message,
        details: e.details,
    })
}

/// Shared by schedules.create, schedules.update and upstream.buildSubmission.
pub(crate) fn parse_request_input(
    input: &Map<String, JsonValue>,
) -> Result<RecurrenceRequest, HandlerErr> {
    let required = |key: &str| -> Result<String, HandlerErr> {
        input
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr::bad_params(format!("input.{} is required", key)))
    };

    let start_date = parse_iso_date(&required("startDate")?)
        .ok_or_else(|| HandlerErr::bad_params("input.startDate must be YYYY-MM-DD"))?;
    let end_date = parse_iso_date(&required("endDate")?)
        .ok_or_else(|| HandlerErr::bad_params("input.endDate must be YYYY-MM-DD"))?;
    let start_time = parse_clock_time(&required("startTime")?)
        .ok_or_else(|| HandlerErr::bad_params("input.startTime must be HH:MM"))?;
    let end_time = parse_clock_time(&required("endTime")?)
        .ok_or_else(|| HandlerErr::bad_params("input.endTime must be HH:MM"))?;
    let recurrence = Recurrence::parse(&required("recurrenceType")?).ok_or_else(|| {
        HandlerErr::bad_params(
            "input.recurrenceType must be one of: day, daily, weekly, custom_days",
        )
    })?;

    let days_of_week = match input.get("daysOfWeek") {
        None => Vec::new(),
        Some(v) if v.is_null() => Vec::new(),
        Some(v) => {
            let arr = v
                .as_array()
                .ok_or_else(|| HandlerErr::bad_params("input.daysOfWeek must be an array"))?;
            let raw: Vec<String> = arr
                .iter()
                .filter_map(|x| x.as_str())
                .map(|s| s.to_string())
                .collect();
            normalize_weekday_codes(&raw)
        }
    };
    let class_link = input
        .get("classLink")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let is_online_class = match input.get("isOnlineClass") {
        None => false,
        Some(v) if v.is_null() => false,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::bad_params("input.isOnlineClass must be boolean"))?,
    };

    Ok(RecurrenceRequest {
        batch_id: required("batchId")?,
        course_id: required("courseId")?,
        employee_id: required("employeeId")?,
        start_date,
        end_date,
        start_time,
        end_time,
        recurrence,
        days_of_week,
        class_link,
        is_online_class,
    })
}

fn ensure_refs_exist(conn: &Connection, req: &RecurrenceRequest) -> Result<(), HandlerErr> {
    let checks: [(&str, &str, &str); 3] = [
        ("batches", req.batch_id.as_str(), "batch not found"),
        ("courses", req.course_id.as_str(), "course not found"),
        ("trainers", req.employee_id.as_str(), "trainer not found"),
    ];
    for (table, id, message) in checks {
        let sql = format!("SELECT 1 FROM {} WHERE id = ? LIMIT 1", table);
        let found = conn
            .query_row(&sql, [id], |_r| Ok(()))
            .map(|_| true)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(other),
            })
            .map_err(|e| HandlerErr::db(e.to_string()))?;
        if !found {
            return Err(HandlerErr {
                code: "not_found",
                message: message.to_string(),
                details: Some(json!({ "id": id })),
            });
        }
    }
    Ok(())
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let Some(input) = req.params.get("input").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing input", None);
    };
    let request = match parse_request_input(input) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let now = match resolve_now(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
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
    if let Err(e) = ensure_refs_exist(conn, &request) {
        return e.response(&req.id);
    }

    let days_json = json_array_string(&request.days_of_week);
    let start_time = calendar::format_clock_time(request.start_time);
    let end_time = calendar::format_clock_time(request.end_time);
    let ts = now_ts();
    let mut schedule_ids = Vec::new();
    for date in expand_occurrences(&request) {
        let schedule_id = Uuid::new_v4().to_string();
        if let Err(e) = conn.execute(
            "INSERT INTO schedules(
                id, batch_id, course_id, employee_id, scheduled_date, start_time, end_time,
                recurrence_type, days_of_week_json, class_link, is_online, archived, created_at, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
            params![
                schedule_id,
                request.batch_id,
                request.course_id,
                request.employee_id,
                calendar::format_iso_date(date),
                start_time,
                end_time,
                request.recurrence.as_str(),
                days_json,
                request.class_link,
                if request.is_online_class { 1 } else { 0 },
                ts,
                ts
            ],
        ) {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "insertedSoFar": schedule_ids.len() })),
            );
        }
        schedule_ids.push(schedule_id);
    }

    ok(
        &req.id,
        json!({ "createdCount": schedule_ids.len(), "scheduleIds": schedule_ids }),
    )
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "schedules": [] }));
    };
    let filters = match parse_filters(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let include_archived = match get_bool(&req.params, "includeArchived", false) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let now = match resolve_now(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let records = match load_records(conn, include_archived) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let filtered = calendar::apply_filters(&records, &filters);
    let schedules: Vec<serde_json::Value> =
        filtered.iter().map(|r| record_json(r, now)).collect();

    ok(&req.id, json!({ "schedules": schedules }))
}

fn handle_calendar(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "events": [] }));
    };
    let filters = match parse_filters(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let records = match load_records(conn, false) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    // Filtering always runs before projection.
    let filtered = calendar::apply_filters(&records, &filters);
    let events = calendar::to_calendar_events(&filtered);

    match serde_json::to_value(&events) {
        Ok(events) => ok(&req.id, json!({ "events": events })),
        Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if leap => 29,
        2 => 28,
        _ => 30,
    }
}

fn parse_month_key(month: &str) -> Result<(i32, u32), HandlerErr> {
    let t = month.trim();
    let Some((y, m)) = t.split_once('-') else {
        return Err(HandlerErr::bad_params("month must be YYYY-MM"));
    };
    let year = y
        .parse::<i32>()
        .map_err(|_| HandlerErr::bad_params("month year must be numeric"))?;
    let month_num = m
        .parse::<u32>()
        .map_err(|_| HandlerErr::bad_params("month must be YYYY-MM"))?;
    if !(1..=12).contains(&month_num) {
        return Err(HandlerErr::bad_params("month must be between 01 and 12"));
    }
    Ok((year, month_num))
}

fn handle_day_markers(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "markers": {} }));
    };
    let month_key = match get_required_str(&req.params, "month") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let (year, month) = match parse_month_key(&month_key) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let filters = match parse_filters(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let records = match load_records(conn, false) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let filtered = calendar::apply_filters(&records, &filters);

    let mut markers = serde_json::Map::new();
    for day in 1..=days_in_month(year, month) {
        let Some(date) = chrono::NaiveDate::from_ymd_opt(year, month, day) else {
            continue;
        };
        let m = calendar::day_markers(&filtered, date);
        if m.count == 0 {
            continue;
        }
        markers.insert(
            calendar::format_iso_date(date),
            serde_json::to_value(m).unwrap_or_else(|_| json!({})),
        );
    }

    ok(
        &req.id,
        json!({ "month": month_key, "markers": JsonValue::Object(markers) }),
    )
}

fn handle_day(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "schedules": [] }));
    };
    let date_raw = match get_required_str(&req.params, "date") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(date) = parse_iso_date(&date_raw) else {
        return err(&req.id, "bad_params", "date must be YYYY-MM-DD", None);
    };
    let filters = match parse_filters(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let now = match resolve_now(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let records = match load_records(conn, false) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let filtered = calendar::apply_filters(&records, &filters);
    let day_records = calendar::filter_by_clicked_day(&filtered, date);
    let schedules: Vec<serde_json::Value> =
        day_records.iter().map(|r| record_json(r, now)).collect();

    ok(&req.id, json!({ "date": date_raw, "schedules": schedules }))
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let schedule_id = match get_required_str(&req.params, "scheduleId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(input) = req.params.get("input").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing input", None);
    };
    let now = match resolve_now(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let existing = conn
        .query_row(
            "SELECT recurrence_type, scheduled_date FROM schedules WHERE id = ?",
            [&schedule_id],
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
        )
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Err(HandlerErr {
                code: "not_found",
                message: "schedule not found".to_string(),
                details: None,
            }),
            other => Err(HandlerErr::db(other.to_string())),
        });
    let (stored_recurrence, stored_date) = match existing {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // An occurrence edit is a full replace of one row; its date range is the
    // single day, so reuse the request parser with start == end.
    let mut edit = input.clone();
    if let Some(date) = edit.get("scheduledDate").cloned() {
        edit.insert("startDate".to_string(), date.clone());
        edit.insert("endDate".to_string(), date);
    }
    if !edit.contains_key("startDate") {
        return err(&req.id, "bad_params", "input.scheduledDate is required", None);
    }
    edit.entry("recurrenceType".to_string())
        .or_insert_with(|| json!("day"));
    let request = match parse_request_input(&edit) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // Keeping the original (possibly past) date of a single-day record is
    // allowed; anything else must start today or later.
    let keeps_original_date = stored_recurrence == "day"
        && calendar::format_iso_date(request.start_date) == stored_date;
    let issues = validate_request(&request, now.date(), keeps_original_date);
    if !issues.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "invalid schedule request",
            Some(json!({ "issues": issues })),
        );
    }
    if let Err(e) = ensure_refs_exist(conn, &request) {
        return e.response(&req.id);
    }

    if let Err(e) = conn.execute(
        "UPDATE schedules SET
            batch_id = ?, course_id = ?, employee_id = ?, scheduled_date = ?,
            start_time = ?, end_time = ?, class_link = ?, is_online = ?, updated_at = ?
         WHERE id = ?",
        params![
            request.batch_id,
            request.course_id,
            request.employee_id,
            calendar::format_iso_date(request.start_date),
            calendar::format_clock_time(request.start_time),
            calendar::format_clock_time(request.end_time),
            request.class_link,
            if request.is_online_class { 1 } else { 0 },
            now_ts(),
            schedule_id
        ],
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_archive(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let schedule_id = match get_required_str(&req.params, "scheduleId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let archived = match get_bool(&req.params, "archived", true) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let changed = match conn.execute(
        "UPDATE schedules SET archived = ?, updated_at = ? WHERE id = ?",
        params![if archived { 1 } else { 0 }, now_ts(), schedule_id],
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if changed == 0 {
        return err(&req.id, "not_found", "schedule not found", None);
    }
    ok(&req.id, json!({ "archived": archived }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedules.create" => Some(handle_create(state, req)),
        "schedules.list" => Some(handle_list(state, req)),
        "schedules.calendar" => Some(handle_calendar(state, req)),
        "schedules.dayMarkers" => Some(handle_day_markers(state, req)),
        "schedules.day" => Some(handle_day(state, req)),
        "schedules.update" => Some(handle_update(state, req)),
        "schedules.archive" => Some(handle_archive(state, req)),
        _ => None,
    }
}
