use super::schedules::{resolve_now, HandlerErr};
use crate::calendar::{format_clock_time, format_iso_date, parse_clock_time, parse_iso_date};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::recurrence::{
    field_policy, initial_form, reduce, BatchDefaults, FormEvent, Recurrence, ScheduleForm,
};
use chrono::NaiveDateTime;
use serde_json::{json, Value as JsonValue};

fn form_json(form: &ScheduleForm) -> serde_json::Value {
    json!({
        "recurrenceType": form.recurrence.as_str(),
        "batchId": form.batch_id,
        "startDate": format_iso_date(form.start_date),
        "endDate": format_iso_date(form.end_date),
        "startTime": format_clock_time(form.start_time),
        "endTime": format_clock_time(form.end_time),
        "daysOfWeek": form.days_of_week,
    })
}

fn policy_json(form: &ScheduleForm, now: NaiveDateTime, editing_existing_single: bool) -> serde_json::Value {
    let policy = field_policy(form.recurrence, now.date(), editing_existing_single);
    json!({
        "endDateLocked": policy.end_date_locked,
        "minStartDate": policy.min_start_date.map(format_iso_date),
        "daysOfWeekVisible": policy.days_of_week_visible,
        "windowDays": policy.window_days,
    })
}

fn parse_form(raw: &JsonValue) -> Result<ScheduleForm, HandlerErr> {
    let Some(obj) = raw.as_object() else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "form must be an object".to_string(),
            details: None,
        });
    };
    let field = |key: &str| -> Result<String, HandlerErr> {
        obj.get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr {
                code: "bad_params",
                message: format!("form.{} is required", key),
                details: None,
            })
    };

    let recurrence = Recurrence::parse(&field("recurrenceType")?).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "form.recurrenceType is not a known type".to_string(),
        details: None,
    })?;
    let start_date = parse_iso_date(&field("startDate")?).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "form.startDate must be YYYY-MM-DD".to_string(),
        details: None,
    })?;
    let end_date = parse_iso_date(&field("endDate")?).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "form.endDate must be YYYY-MM-DD".to_string(),
        details: None,
    })?;
    let start_time = parse_clock_time(&field("startTime")?).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "form.startTime must be HH:MM".to_string(),
        details: None,
    })?;
    let end_time = parse_clock_time(&field("endTime")?).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "form.endTime must be HH:MM".to_string(),
        details: None,
    })?;

    let batch_id = obj
        .get("batchId")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let days_of_week = obj
        .get("daysOfWeek")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|x| x.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();

    Ok(ScheduleForm {
        recurrence,
        batch_id,
        start_date,
        end_date,
        start_time,
        end_time,
        days_of_week,
    })
}

fn parse_batch(raw: Option<&JsonValue>) -> Result<Option<BatchDefaults>, HandlerErr> {
    match raw {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => serde_json::from_value::<BatchDefaults>(v.clone())
            .map(Some)
            .map_err(|e| HandlerErr {
                code: "bad_params",
                message: format!("batch is not a valid shape: {}", e),
                details: None,
            }),
    }
}

fn parse_event(raw: &JsonValue) -> Result<FormEvent, HandlerErr> {
    let bad = |message: &str| HandlerErr {
        code: "bad_params",
        message: message.to_string(),
        details: None,
    };
    let Some(obj) = raw.as_object() else {
        return Err(bad("event must be an object"));
    };
    let Some(kind) = obj.get("type").and_then(|v| v.as_str()) else {
        return Err(bad("event.type is required"));
    };

    match kind {
        "batchSelected" => Ok(FormEvent::BatchSelected(parse_batch(obj.get("batch"))?)),
        "recurrenceChanged" => {
            let raw = obj
                .get("recurrenceType")
                .and_then(|v| v.as_str())
                .ok_or_else(|| bad("event.recurrenceType is required"))?;
            let recurrence =
                Recurrence::parse(raw).ok_or_else(|| bad("event.recurrenceType is not a known type"))?;
            Ok(FormEvent::RecurrenceChanged(recurrence))
        }
        "startDateChanged" => {
            let raw = obj
                .get("startDate")
                .and_then(|v| v.as_str())
                .ok_or_else(|| bad("event.startDate is required"))?;
            let date =
                parse_iso_date(raw).ok_or_else(|| bad("event.startDate must be YYYY-MM-DD"))?;
            Ok(FormEvent::StartDateChanged(date))
        }
        "daysOfWeekChanged" => {
            let days = obj
                .get("daysOfWeek")
                .and_then(|v| v.as_array())
                .ok_or_else(|| bad("event.daysOfWeek must be an array"))?
                .iter()
                .filter_map(|x| x.as_str())
                .map(|s| s.to_string())
                .collect();
            Ok(FormEvent::DaysOfWeekChanged(days))
        }
        other => Err(bad(&format!("unknown event type: {}", other))),
    }
}

fn handle_init(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let now = match resolve_now(&req.params) {
        Ok(v) => v,
        Err(e) => {
            return err(&req.id, e.code, e.message, e.details);
        }
    };
    let batch = match parse_batch(req.params.get("batch")) {
        Ok(v) => v,
        Err(e) => return err(&req.id, e.code, e.message, e.details),
    };

    let mut form = initial_form(now);
    if batch.is_some() {
        form = reduce(&form, FormEvent::BatchSelected(batch), now);
    }

    ok(
        &req.id,
        json!({
            "form": form_json(&form),
            "policy": policy_json(&form, now, false),
        }),
    )
}

fn handle_event(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let now = match resolve_now(&req.params) {
        Ok(v) => v,
        Err(e) => return err(&req.id, e.code, e.message, e.details),
    };
    let Some(form_raw) = req.params.get("form") else {
        return err(&req.id, "bad_params", "missing form", None);
    };
    let form = match parse_form(form_raw) {
        Ok(v) => v,
        Err(e) => return err(&req.id, e.code, e.message, e.details),
    };
    let Some(event_raw) = req.params.get("event") else {
        return err(&req.id, "bad_params", "missing event", None);
    };
    let event = match parse_event(event_raw) {
        Ok(v) => v,
        Err(e) => return err(&req.id, e.code, e.message, e.details),
    };
    let editing_existing_single = req
        .params
        .get("editingExistingSingle")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let next = reduce(&form, event, now);

    ok(
        &req.id,
        json!({
            "form": form_json(&next),
            "policy": policy_json(&next, now, editing_existing_single),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scheduleForm.init" => Some(handle_init(state, req)),
        "scheduleForm.event" => Some(handle_event(state, req)),
        _ => None,
    }
}
