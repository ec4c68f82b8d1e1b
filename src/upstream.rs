use crate::calendar::{format_clock_time, parse_clock_time, parse_iso_date, ScheduleRecord};
use crate::recurrence::{normalize_weekday_codes, Recurrence, RecurrenceRequest};
use chrono::NaiveDate;
use serde_json::{json, Value};

// The hosted API has grown several spellings for the same fields over time
// (trainer_employee_id vs trainer_id, scheduled_date vs date, camelCase vs
// snake_case). Everything is mapped onto the canonical record here so the
// core only ever sees one shape.

fn str_field(raw: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match raw.get(*key) {
            Some(v) if v.is_string() => {
                let t = v.as_str().unwrap_or("").trim();
                if !t.is_empty() {
                    return Some(t.to_string());
                }
            }
            Some(v) if v.is_i64() || v.is_u64() => {
                return Some(v.to_string());
            }
            _ => {}
        }
    }
    None
}

fn bool_field(raw: &Value, keys: &[&str]) -> bool {
    for key in keys {
        match raw.get(*key) {
            Some(Value::Bool(b)) => return *b,
            Some(Value::Number(n)) => return n.as_i64().unwrap_or(0) != 0,
            Some(Value::String(s)) => return s.trim().eq_ignore_ascii_case("true"),
            _ => {}
        }
    }
    false
}

fn string_array_field(raw: &Value, keys: &[&str]) -> Vec<String> {
    for key in keys {
        if let Some(arr) = raw.get(*key).and_then(|v| v.as_array()) {
            return arr
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect();
        }
    }
    Vec::new()
}

/// ISO first, then the hosted API's DD-MM-YYYY form.
pub fn parse_upstream_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    parse_iso_date(t).or_else(|| NaiveDate::parse_from_str(t, "%d-%m-%Y").ok())
}

fn canonical_time(raw: Option<String>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    match parse_clock_time(&raw) {
        Some(t) => format_clock_time(t),
        // Leave unparseable times for the projector's degrade path.
        None => raw,
    }
}

/// Map one raw upstream record onto the canonical shape. Returns None when
/// the record is missing an identity field or a usable date; callers count
/// those instead of failing the whole import.
pub fn normalize_schedule(raw: &Value) -> Option<ScheduleRecord> {
    if !raw.is_object() {
        return None;
    }

    let schedule_id = str_field(raw, &["schedule_id", "scheduleId", "id"])?;
    let batch_id = str_field(raw, &["batch_id", "batchId"])?;
    let course_id = str_field(raw, &["course_id", "courseId"])?;
    let employee_id = str_field(
        raw,
        &[
            "trainer_employee_id",
            "trainerEmployeeId",
            "trainer_id",
            "trainerId",
            "employee_id",
            "employeeId",
        ],
    )?;
    let scheduled_date = str_field(raw, &["scheduled_date", "scheduledDate", "date"])
        .and_then(|s| parse_upstream_date(&s))?;

    let recurrence_type = str_field(raw, &["recurrence_type", "recurrenceType"])
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_else(|| "day".to_string());

    Some(ScheduleRecord {
        schedule_id,
        batch_id,
        course_id,
        employee_id,
        scheduled_date: scheduled_date.format("%Y-%m-%d").to_string(),
        start_time: canonical_time(str_field(raw, &["start_time", "startTime"])),
        end_time: canonical_time(str_field(raw, &["end_time", "endTime"])),
        recurrence_type,
        days_of_week: normalize_weekday_codes(&string_array_field(
            raw,
            &["days_of_week", "daysOfWeek"],
        )),
        class_link: str_field(raw, &["class_link", "classLink", "meeting_link", "meetingLink"]),
        is_online_class: bool_field(
            raw,
            &["is_online_class", "isOnlineClass", "is_online", "isOnline"],
        ),
        trainer_name: str_field(raw, &["trainer_name", "trainerName"]),
        course_name: str_field(raw, &["course_name", "courseName"]),
        batch_title: str_field(raw, &["batch_title", "batchTitle", "batch_name", "batchName"]),
        archived: bool_field(raw, &["archived", "is_archived", "isArchived"]),
    })
}

#[derive(Debug, Clone)]
pub struct NormalizeSummary {
    pub accepted: Vec<ScheduleRecord>,
    pub skipped: usize,
}

pub fn normalize_schedules(raw: &[Value]) -> NormalizeSummary {
    let mut accepted = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;
    for value in raw {
        match normalize_schedule(value) {
            Some(record) => accepted.push(record),
            None => skipped += 1,
        }
    }
    NormalizeSummary { accepted, skipped }
}

pub const DEFAULT_SUBMIT_DATE_FORMAT: &str = "DD-MM-YYYY";

fn chrono_date_format(display: &str) -> String {
    display
        .replace("YYYY", "%Y")
        .replace("DD", "%d")
        .replace("MM", "%m")
}

/// Submission payload for the hosted API, shaped the way its schedule
/// endpoint expects it: display-formatted dates (DD-MM-YYYY unless the
/// workspace overrides it) and HH:MM times.
pub fn build_submission(req: &RecurrenceRequest, date_format: &str) -> Value {
    let fmt = chrono_date_format(if date_format.trim().is_empty() {
        DEFAULT_SUBMIT_DATE_FORMAT
    } else {
        date_format
    });
    let mut payload = json!({
        "batch": req.batch_id,
        "course": req.course_id,
        "employee_id": req.employee_id,
        "start_date": req.start_date.format(&fmt).to_string(),
        "end_date": req.end_date.format(&fmt).to_string(),
        "start_time": format_clock_time(req.start_time),
        "end_time": format_clock_time(req.end_time),
        "recurrence_type": req.recurrence.as_str(),
        "is_online_class": req.is_online_class,
        "class_link": req.class_link,
    });
    if req.recurrence == Recurrence::CustomDays {
        payload["days_of_week"] = json!(normalize_weekday_codes(&req.days_of_week));
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use serde_json::json;

    #[test]
    fn normalizes_aliased_field_names() {
        let raw = json!({
            "id": 42,
            "batchId": "b1",
            "course_id": "c1",
            "trainer_id": "t9",
            "date": "01-06-2025",
            "startTime": "09:00:00",
            "end_time": "10:30",
            "recurrenceType": "CUSTOM_DAYS",
            "daysOfWeek": ["monday", "WED"],
            "isOnline": 1,
            "trainerName": "Priya Nair"
        });
        let record = normalize_schedule(&raw).expect("normalize");
        assert_eq!(record.schedule_id, "42");
        assert_eq!(record.employee_id, "t9");
        assert_eq!(record.scheduled_date, "2025-06-01");
        assert_eq!(record.start_time, "09:00");
        assert_eq!(record.end_time, "10:30");
        assert_eq!(record.recurrence_type, "custom_days");
        assert_eq!(record.days_of_week, vec!["MON", "WED"]);
        assert!(record.is_online_class);
        assert_eq!(record.trainer_name.as_deref(), Some("Priya Nair"));
    }

    #[test]
    fn unusable_records_are_skipped_not_fatal() {
        let raw = vec![
            json!({ "schedule_id": "s1" }),
            json!("not even an object"),
            json!({
                "schedule_id": "s2",
                "batch_id": "b1",
                "course_id": "c1",
                "employee_id": "t1",
                "scheduled_date": "2025-06-01"
            }),
        ];
        let summary = normalize_schedules(&raw);
        assert_eq!(summary.accepted.len(), 1);
        assert_eq!(summary.accepted[0].schedule_id, "s2");
        assert_eq!(summary.skipped, 2);
    }

    #[test]
    fn submission_uses_display_date_format() {
        let req = RecurrenceRequest {
            batch_id: "b1".to_string(),
            course_id: "c1".to_string(),
            employee_id: "t1".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 6, 1).expect("date"),
            end_date: NaiveDate::from_ymd_opt(2025, 6, 8).expect("date"),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
            end_time: NaiveTime::from_hms_opt(10, 30, 0).expect("time"),
            recurrence: Recurrence::Daily,
            days_of_week: Vec::new(),
            class_link: None,
            is_online_class: false,
        };
        let payload = build_submission(&req, DEFAULT_SUBMIT_DATE_FORMAT);
        assert_eq!(
            payload.get("start_date").and_then(|v| v.as_str()),
            Some("01-06-2025")
        );
        assert_eq!(
            payload.get("start_time").and_then(|v| v.as_str()),
            Some("09:00")
        );
        assert!(payload.get("days_of_week").is_none());

        let mut custom = req;
        custom.recurrence = Recurrence::CustomDays;
        custom.days_of_week = vec!["TUE".to_string()];
        let payload = build_submission(&custom, "YYYY-MM-DD");
        assert_eq!(
            payload.get("end_date").and_then(|v| v.as_str()),
            Some("2025-06-08")
        );
        assert_eq!(
            payload
                .get("days_of_week")
                .and_then(|v| v.as_array())
                .map(|a| a.len()),
            Some(1)
        );
    }
}
