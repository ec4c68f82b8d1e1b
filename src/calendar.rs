use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Canonical schedule record as everything downstream of the boundary sees it.
/// Heterogeneous upstream shapes are mapped onto this in `upstream` before
/// any projection or filtering runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecord {
    pub schedule_id: String,
    pub batch_id: String,
    pub course_id: String,
    pub employee_id: String,
    pub scheduled_date: String,
    pub start_time: String,
    pub end_time: String,
    pub recurrence_type: String,
    #[serde(default)]
    pub days_of_week: Vec<String>,
    #[serde(default)]
    pub class_link: Option<String>,
    #[serde(default)]
    pub is_online_class: bool,
    #[serde(default)]
    pub trainer_name: Option<String>,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub batch_title: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalendarError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Accepts the upstream's HH:MM and HH:MM:SS clock forms.
pub fn parse_clock_time(raw: &str) -> Option<NaiveTime> {
    let t = raw.trim();
    NaiveTime::parse_from_str(t, "%H:%M:%S")
        .ok()
        .or_else(|| NaiveTime::parse_from_str(t, "%H:%M").ok())
}

pub fn format_iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn format_clock_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn fallback_date() -> NaiveDate {
    NaiveDate::default()
}

/// Start/end instants for a record. Malformed fields degrade instead of
/// failing: a bad date lands on the epoch, a bad start time on midnight, and
/// a bad or inverted end time one hour after the start.
pub fn event_window(record: &ScheduleRecord) -> (NaiveDateTime, NaiveDateTime) {
    let date = parse_iso_date(&record.scheduled_date).unwrap_or_else(fallback_date);
    let start_time = parse_clock_time(&record.start_time).unwrap_or(NaiveTime::MIN);
    let start = date.and_time(start_time);
    let end = match parse_clock_time(&record.end_time) {
        Some(t) if t > start_time => date.and_time(t),
        _ => start + Duration::hours(1),
    };
    (start, end)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub start: String,
    pub end: String,
    pub title: String,
    #[serde(flatten)]
    pub record: ScheduleRecord,
}

/// One event per record, in input order. Sorting is the renderer's concern.
pub fn to_calendar_events(records: &[ScheduleRecord]) -> Vec<CalendarEvent> {
    records
        .iter()
        .map(|record| {
            let (start, end) = event_window(record);
            CalendarEvent {
                start: start.format("%Y-%m-%dT%H:%M:%S").to_string(),
                end: end.format("%Y-%m-%dT%H:%M:%S").to_string(),
                title: record.trainer_name.clone().unwrap_or_default(),
                record: record.clone(),
            }
        })
        .collect()
}

pub fn status_for(record: &ScheduleRecord, now: NaiveDateTime) -> &'static str {
    let (start, end) = event_window(record);
    if now < start {
        "upcoming"
    } else if now <= end {
        "ongoing"
    } else {
        "completed"
    }
}

pub const DAY_MARKER_DISPLAY_CAP: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayMarkers {
    pub count: usize,
    pub display_count: usize,
    pub overflow: usize,
}

/// Month-cell summary: up to three indicator dots plus a "+N" badge.
pub fn day_markers(records: &[ScheduleRecord], date: NaiveDate) -> DayMarkers {
    let count = records
        .iter()
        .filter(|r| parse_iso_date(&r.scheduled_date) == Some(date))
        .count();
    DayMarkers {
        count,
        display_count: count.min(DAY_MARKER_DISPLAY_CAP),
        overflow: count.saturating_sub(DAY_MARKER_DISPLAY_CAP),
    }
}

pub fn filter_by_clicked_day(records: &[ScheduleRecord], date: NaiveDate) -> Vec<ScheduleRecord> {
    records
        .iter()
        .filter(|r| parse_iso_date(&r.scheduled_date) == Some(date))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleFilters {
    pub employee_id: Option<String>,
    pub course_id: Option<String>,
    pub batch_id: Option<String>,
    pub on_date: Option<String>,
}

fn parse_filter_str(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<Option<String>, CalendarError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(CalendarError::new(
                    "bad_params",
                    format!("filters.{} must be string or null", key),
                ));
            };
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("ALL") {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
    }
}

pub fn parse_schedule_filters(
    raw: Option<&serde_json::Value>,
) -> Result<ScheduleFilters, CalendarError> {
    let Some(raw) = raw else {
        return Ok(ScheduleFilters::default());
    };
    if raw.is_null() {
        return Ok(ScheduleFilters::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(CalendarError::new("bad_params", "filters must be an object"));
    };

    let employee_id = parse_filter_str(obj, "employeeId")?;
    let course_id = parse_filter_str(obj, "courseId")?;
    let batch_id = parse_filter_str(obj, "batchId")?;
    let on_date = parse_filter_str(obj, "onDate")?;
    if let Some(raw_date) = on_date.as_deref() {
        if parse_iso_date(raw_date).is_none() {
            return Err(CalendarError::new(
                "bad_params",
                "filters.onDate must be YYYY-MM-DD",
            ));
        }
    }

    Ok(ScheduleFilters {
        employee_id,
        course_id,
        batch_id,
        on_date,
    })
}

/// Conjunction of whichever filters are set; an empty filter set passes
/// every record.
pub fn matches_filters(record: &ScheduleRecord, filters: &ScheduleFilters) -> bool {
    let employee_ok = filters
        .employee_id
        .as_deref()
        .map(|id| record.employee_id == id)
        .unwrap_or(true);
    let course_ok = filters
        .course_id
        .as_deref()
        .map(|id| record.course_id == id)
        .unwrap_or(true);
    let batch_ok = filters
        .batch_id
        .as_deref()
        .map(|id| record.batch_id == id)
        .unwrap_or(true);
    let date_ok = filters
        .on_date
        .as_deref()
        .and_then(parse_iso_date)
        .map(|d| parse_iso_date(&record.scheduled_date) == Some(d))
        .unwrap_or(true);
    employee_ok && course_ok && batch_ok && date_ok
}

pub fn apply_filters(records: &[ScheduleRecord], filters: &ScheduleFilters) -> Vec<ScheduleRecord> {
    records
        .iter()
        .filter(|r| matches_filters(r, filters))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, date: &str, course: &str, employee: &str) -> ScheduleRecord {
        ScheduleRecord {
            schedule_id: id.to_string(),
            batch_id: "b1".to_string(),
            course_id: course.to_string(),
            employee_id: employee.to_string(),
            scheduled_date: date.to_string(),
            start_time: "09:00".to_string(),
            end_time: "10:30".to_string(),
            recurrence_type: "daily".to_string(),
            days_of_week: Vec::new(),
            class_link: None,
            is_online_class: false,
            trainer_name: Some("Priya Nair".to_string()),
            course_name: None,
            batch_title: None,
            archived: false,
        }
    }

    #[test]
    fn events_project_one_to_one_without_drops() {
        let records = vec![
            record("s1", "2025-06-01", "cA", "t1"),
            record("s2", "2025-06-02", "cA", "t2"),
        ];
        let events = to_calendar_events(&records);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start, "2025-06-01T09:00:00");
        assert_eq!(events[0].end, "2025-06-01T10:30:00");
        assert_eq!(events[0].title, "Priya Nair");
        assert_eq!(events[1].record.schedule_id, "s2");
    }

    #[test]
    fn malformed_times_degrade_instead_of_dropping() {
        let mut bad = record("s1", "2025-06-01", "cA", "t1");
        bad.start_time = "not-a-time".to_string();
        bad.end_time = "".to_string();
        let events = to_calendar_events(&[bad]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start, "2025-06-01T00:00:00");
        assert_eq!(events[0].end, "2025-06-01T01:00:00");
    }

    #[test]
    fn inverted_end_time_clamps_to_start_plus_hour() {
        let mut r = record("s1", "2025-06-01", "cA", "t1");
        r.start_time = "09:00".to_string();
        r.end_time = "08:00".to_string();
        let (start, end) = event_window(&r);
        assert_eq!(end - start, Duration::hours(1));
    }

    #[test]
    fn day_projection_is_idempotent() {
        let records = vec![
            record("s1", "2025-06-01", "cA", "t1"),
            record("s2", "2025-06-01", "cA", "t2"),
            record("s3", "2025-06-02", "cB", "t1"),
        ];
        let day = NaiveDate::from_ymd_opt(2025, 6, 1).expect("date");
        let first = to_calendar_events(&filter_by_clicked_day(&records, day));
        let second = to_calendar_events(&filter_by_clicked_day(&records, day));
        assert_eq!(first.len(), 2);
        assert_eq!(
            serde_json::to_value(&first).expect("json"),
            serde_json::to_value(&second).expect("json")
        );
    }

    #[test]
    fn day_markers_cap_at_three_with_overflow() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 1).expect("date");
        let records: Vec<ScheduleRecord> = (0..5)
            .map(|i| record(&format!("s{}", i), "2025-06-01", "cA", "t1"))
            .collect();
        let markers = day_markers(&records, day);
        assert_eq!(markers.count, 5);
        assert_eq!(markers.display_count, 3);
        assert_eq!(markers.overflow, 2);

        let other = NaiveDate::from_ymd_opt(2025, 6, 2).expect("date");
        let empty = day_markers(&records, other);
        assert_eq!(empty.count, 0);
        assert_eq!(empty.display_count, 0);
        assert_eq!(empty.overflow, 0);
    }

    #[test]
    fn filters_are_conjunctive() {
        let records = vec![
            record("s1", "2025-06-01", "cA", "t1"),
            record("s2", "2025-06-01", "cA", "t2"),
            record("s3", "2025-06-01", "cB", "t1"),
        ];
        let filters = ScheduleFilters {
            course_id: Some("cA".to_string()),
            employee_id: Some("t1".to_string()),
            ..ScheduleFilters::default()
        };
        let hits = apply_filters(&records, &filters);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].schedule_id, "s1");
    }

    #[test]
    fn empty_filters_pass_everything() {
        let records = vec![record("s1", "2025-06-01", "cA", "t1")];
        let hits = apply_filters(&records, &ScheduleFilters::default());
        assert_eq!(hits.len(), 1);

        let none: Vec<ScheduleRecord> = Vec::new();
        assert!(apply_filters(&none, &ScheduleFilters::default()).is_empty());
        assert!(to_calendar_events(&none).is_empty());
        let day = NaiveDate::from_ymd_opt(2025, 6, 1).expect("date");
        assert_eq!(day_markers(&none, day).count, 0);
        assert!(filter_by_clicked_day(&none, day).is_empty());
    }

    #[test]
    fn parse_filters_accepts_all_and_null() {
        let raw = json!({
            "employeeId": "ALL",
            "courseId": null,
            "batchId": "b1",
            "onDate": "2025-06-01"
        });
        let parsed = parse_schedule_filters(Some(&raw)).expect("parse filters");
        assert_eq!(parsed.employee_id, None);
        assert_eq!(parsed.course_id, None);
        assert_eq!(parsed.batch_id.as_deref(), Some("b1"));
        assert_eq!(parsed.on_date.as_deref(), Some("2025-06-01"));

        assert!(parse_schedule_filters(Some(&json!({ "onDate": "01-06-2025" }))).is_err());
        assert!(parse_schedule_filters(None).expect("none").employee_id.is_none());
    }

    #[test]
    fn status_follows_the_clock() {
        let r = record("s1", "2025-06-01", "cA", "t1");
        let before = NaiveDate::from_ymd_opt(2025, 6, 1)
            .expect("date")
            .and_hms_opt(8, 0, 0)
            .expect("time");
        let during = NaiveDate::from_ymd_opt(2025, 6, 1)
            .expect("date")
            .and_hms_opt(9, 30, 0)
            .expect("time");
        let after = NaiveDate::from_ymd_opt(2025, 6, 1)
            .expect("date")
            .and_hms_opt(11, 0, 0)
            .expect("time");
        assert_eq!(status_for(&r, before), "upcoming");
        assert_eq!(status_for(&r, during), "ongoing");
        assert_eq!(status_for(&r, after), "completed");
    }
}
