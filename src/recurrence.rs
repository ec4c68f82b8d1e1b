use crate::calendar::{parse_clock_time, parse_iso_date};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    Day,
    Daily,
    Weekly,
    CustomDays,
}

impl Recurrence {
    pub fn parse(raw: &str) -> Option<Recurrence> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "day" => Some(Recurrence::Day),
            "daily" => Some(Recurrence::Daily),
            "weekly" => Some(Recurrence::Weekly),
            "custom_days" => Some(Recurrence::CustomDays),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Recurrence::Day => "day",
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::CustomDays => "custom_days",
        }
    }

    /// Length of the auto-computed end-date window, in days past the start.
    pub fn window_days(self) -> i64 {
        match self {
            Recurrence::Day => 0,
            Recurrence::Daily | Recurrence::Weekly => 7,
            Recurrence::CustomDays => 30,
        }
    }

    pub fn needs_days_of_week(self) -> bool {
        matches!(self, Recurrence::CustomDays)
    }
}

pub fn default_end_date(start: NaiveDate, recurrence: Recurrence) -> NaiveDate {
    start + Duration::days(recurrence.window_days())
}

pub const WEEKDAY_CODES: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

pub fn parse_weekday_code(raw: &str) -> Option<Weekday> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "MON" | "MONDAY" => Some(Weekday::Mon),
        "TUE" | "TUESDAY" => Some(Weekday::Tue),
        "WED" | "WEDNESDAY" => Some(Weekday::Wed),
        "THU" | "THURSDAY" => Some(Weekday::Thu),
        "FRI" | "FRIDAY" => Some(Weekday::Fri),
        "SAT" | "SATURDAY" => Some(Weekday::Sat),
        "SUN" | "SUNDAY" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Canonical three-letter codes, unknown entries dropped, duplicates removed,
/// input order kept.
pub fn normalize_weekday_codes(raw: &[String]) -> Vec<String> {
    let mut seen: HashSet<Weekday> = HashSet::new();
    let mut out = Vec::new();
    for code in raw {
        let Some(day) = parse_weekday_code(code) else {
            continue;
        };
        if seen.insert(day) {
            out.push(WEEKDAY_CODES[day.num_days_from_monday() as usize].to_string());
        }
    }
    out
}

/// Suggested scheduling parameters copied from a batch. Dates and times stay
/// raw strings here: the defaulting engine treats anything unparseable as
/// absent rather than rejecting it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchDefaults {
    pub batch_id: String,
    pub course_id: Option<String>,
    pub employee_id: Option<String>,
    pub title: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeDefaults {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
}

/// Pre-fill `{start_date, end_date, start_time, end_time}` from a selected
/// batch, or reset them when no batch is selected. Never schedules a new
/// start in the past, and keeps the end after the start. Both returned
/// instants are anchored to the resolved start date.
pub fn apply_batch_defaults(batch: Option<&BatchDefaults>, now: NaiveDateTime) -> TimeDefaults {
    let today = now.date();
    let Some(batch) = batch else {
        return TimeDefaults {
            start_date: today,
            end_date: today,
            start_at: now,
            end_at: now + Duration::hours(1),
        };
    };

    let start_date = batch
        .start_date
        .as_deref()
        .and_then(parse_iso_date)
        .filter(|d| *d >= today)
        .unwrap_or(today);
    let end_date = batch
        .end_date
        .as_deref()
        .and_then(parse_iso_date)
        .filter(|d| *d >= start_date)
        .unwrap_or_else(|| start_date + Duration::days(1));

    let start_at = match batch.start_time.as_deref().and_then(parse_clock_time) {
        Some(t) => {
            let candidate = start_date.and_time(t);
            if start_date == today && candidate < now {
                now
            } else {
                candidate
            }
        }
        None => start_date.and_time(now.time()),
    };
    let end_at = match batch.end_time.as_deref().and_then(parse_clock_time) {
        Some(t) => {
            let candidate = start_date.and_time(t);
            if candidate <= start_at {
                start_at + Duration::hours(1)
            } else {
                candidate
            }
        }
        None => start_at + Duration::hours(1),
    };

    TimeDefaults {
        start_date,
        end_date,
        start_at,
        end_at,
    }
}

#[derive(Debug, Clone)]
pub struct FieldPolicy {
    pub end_date_locked: bool,
    pub min_start_date: Option<NaiveDate>,
    pub days_of_week_visible: bool,
    pub window_days: i64,
}

/// What the create/edit form may do for a given recurrence type. The only
/// case with an unconstrained start date is editing an already-existing
/// single-day record, which may keep its original (possibly past) date.
pub fn field_policy(
    recurrence: Recurrence,
    today: NaiveDate,
    editing_existing_single: bool,
) -> FieldPolicy {
    let min_start_date = if recurrence == Recurrence::Day && editing_existing_single {
        None
    } else {
        Some(today)
    };
    FieldPolicy {
        end_date_locked: recurrence == Recurrence::Day,
        min_start_date,
        days_of_week_visible: recurrence.needs_days_of_week(),
        window_days: recurrence.window_days(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleForm {
    pub recurrence: Recurrence,
    pub batch_id: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub days_of_week: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum FormEvent {
    BatchSelected(Option<BatchDefaults>),
    RecurrenceChanged(Recurrence),
    StartDateChanged(NaiveDate),
    DaysOfWeekChanged(Vec<String>),
}

pub fn initial_form(now: NaiveDateTime) -> ScheduleForm {
    let d = apply_batch_defaults(None, now);
    ScheduleForm {
        recurrence: Recurrence::Day,
        batch_id: None,
        start_date: d.start_date,
        end_date: d.start_date,
        start_time: d.start_at.time(),
        end_time: d.end_at.time(),
        days_of_week: Vec::new(),
    }
}

/// Single transition function for the schedule form. All of the reset rules
/// live here: picking a batch overwrites the date/time block, changing the
/// recurrence type clears the batch and recomputes the window from today (or
/// from a still-valid chosen start date), and a start-date edit recomputes
/// the end date from the window rule.
pub fn reduce(form: &ScheduleForm, event: FormEvent, now: NaiveDateTime) -> ScheduleForm {
    let today = now.date();
    let mut next = form.clone();
    match event {
        FormEvent::BatchSelected(batch) => {
            next.batch_id = batch.as_ref().map(|b| b.batch_id.clone());
            let d = apply_batch_defaults(batch.as_ref(), now);
            next.start_date = d.start_date;
            next.end_date = if next.recurrence == Recurrence::Day {
                d.start_date
            } else {
                d.end_date
            };
            next.start_time = d.start_at.time();
            next.end_time = d.end_at.time();
        }
        FormEvent::RecurrenceChanged(recurrence) => {
            next.recurrence = recurrence;
            next.batch_id = None;
            if next.start_date < today {
                next.start_date = today;
            }
            next.end_date = default_end_date(next.start_date, recurrence);
            if !recurrence.needs_days_of_week() {
                next.days_of_week.clear();
            }
        }
        FormEvent::StartDateChanged(date) => {
            next.start_date = date;
            next.end_date = default_end_date(date, next.recurrence);
        }
        FormEvent::DaysOfWeekChanged(days) => {
            next.days_of_week = normalize_weekday_codes(&days);
        }
    }
    next
}

#[derive(Debug, Clone)]
pub struct RecurrenceRequest {
    pub batch_id: String,
    pub course_id: String,
    pub employee_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub recurrence: Recurrence,
    pub days_of_week: Vec<String>,
    pub class_link: Option<String>,
    pub is_online_class: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldIssue {
    pub field: &'static str,
    pub message: String,
}

fn issue(field: &'static str, message: impl Into<String>) -> FieldIssue {
    FieldIssue {
        field,
        message: message.into(),
    }
}

/// Guards a typo'd year from expanding into thousands of rows.
pub const MAX_WINDOW_DAYS: i64 = 370;

/// Pre-expansion validation. `allow_past_start` is set only when an existing
/// single-day record is being edited and keeps its stored date.
pub fn validate_request(
    req: &RecurrenceRequest,
    today: NaiveDate,
    allow_past_start: bool,
) -> Vec<FieldIssue> {
    let mut issues = Vec::new();

    if req.end_date < req.start_date {
        issues.push(issue("endDate", "end date must not be before start date"));
    }
    if req.end_time <= req.start_time {
        issues.push(issue("endTime", "end time must be after start time"));
    }
    if req.recurrence == Recurrence::Day && req.end_date != req.start_date {
        issues.push(issue(
            "endDate",
            "single-day schedules must end on the start date",
        ));
    }
    if req.recurrence.needs_days_of_week() && normalize_weekday_codes(&req.days_of_week).is_empty()
    {
        issues.push(issue("daysOfWeek", "select at least one weekday"));
    }
    if req.start_date < today && !allow_past_start {
        issues.push(issue("startDate", "start date must not be in the past"));
    }
    if (req.end_date - req.start_date).num_days() > MAX_WINDOW_DAYS {
        issues.push(issue(
            "endDate",
            format!("window must not exceed {} days", MAX_WINDOW_DAYS),
        ));
    }

    issues
}

/// Dates a request expands into, one ScheduleRecord per date.
pub fn expand_occurrences(req: &RecurrenceRequest) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    if req.end_date < req.start_date {
        return out;
    }
    match req.recurrence {
        Recurrence::Day => out.push(req.start_date),
        Recurrence::Daily => {
            let mut d = req.start_date;
            while d <= req.end_date {
                out.push(d);
                d += Duration::days(1);
            }
        }
        Recurrence::Weekly => {
            let mut d = req.start_date;
            while d <= req.end_date {
                out.push(d);
                d += Duration::days(7);
            }
        }
        Recurrence::CustomDays => {
            let wanted: HashSet<Weekday> = req
                .days_of_week
                .iter()
                .filter_map(|c| parse_weekday_code(c))
                .collect();
            if wanted.is_empty() {
                return out;
            }
            let mut d = req.start_date;
            while d <= req.end_date {
                if wanted.contains(&d.weekday()) {
                    out.push(d);
                }
                d += Duration::days(1);
            }
        }
    }
    out
}
