mod test_support;

use serde_json::json;
use test_support::{request_ok, spawn_sidecar};

const NOW: &str = "2030-01-07T08:00:00";

fn base_form() -> serde_json::Value {
    json!({
        "recurrenceType": "day",
        "batchId": "b1",
        "startDate": "2030-01-07",
        "endDate": "2030-01-07",
        "startTime": "08:00",
        "endTime": "09:00",
        "daysOfWeek": []
    })
}

#[test]
fn init_starts_from_now_with_a_locked_single_day() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scheduleForm.init",
        json!({ "now": NOW }),
    );
    let form = opened.get("form").cloned().expect("form");
    assert_eq!(
        form.get("recurrenceType").and_then(|v| v.as_str()),
        Some("day")
    );
    assert_eq!(form.get("startDate").and_then(|v| v.as_str()), Some("2030-01-07"));
    assert_eq!(form.get("endDate").and_then(|v| v.as_str()), Some("2030-01-07"));
    assert_eq!(form.get("startTime").and_then(|v| v.as_str()), Some("08:00"));
    assert_eq!(form.get("endTime").and_then(|v| v.as_str()), Some("09:00"));
    assert!(form.get("batchId").map(|v| v.is_null()).unwrap_or(false));

    let policy = opened.get("policy").cloned().expect("policy");
    assert_eq!(policy.get("endDateLocked").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        policy.get("minStartDate").and_then(|v| v.as_str()),
        Some("2030-01-07")
    );
    assert_eq!(
        policy.get("daysOfWeekVisible").and_then(|v| v.as_bool()),
        Some(false)
    );
}

#[test]
fn stale_batch_defaults_clamp_to_today() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    // Batch dates from a past term: the start clamps to today, the end falls
    // back to the next day, the times come from the batch template.
    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scheduleForm.event",
        json!({
            "now": NOW,
            "form": base_form(),
            "event": {
                "type": "batchSelected",
                "batch": {
                    "batchId": "b-old",
                    "startDate": "2029-10-01",
                    "startTime": "09:00",
                    "endTime": "10:30"
                }
            }
        }),
    );
    let form = applied.get("form").cloned().expect("form");
    assert_eq!(form.get("batchId").and_then(|v| v.as_str()), Some("b-old"));
    assert_eq!(form.get("startDate").and_then(|v| v.as_str()), Some("2030-01-07"));
    // Single-day recurrence keeps the end locked to the start.
    assert_eq!(form.get("endDate").and_then(|v| v.as_str()), Some("2030-01-07"));
    assert_eq!(form.get("startTime").and_then(|v| v.as_str()), Some("09:00"));
    assert_eq!(form.get("endTime").and_then(|v| v.as_str()), Some("10:30"));

    // Clearing the batch resets the block to now.
    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "scheduleForm.event",
        json!({
            "now": NOW,
            "form": applied.get("form").cloned().expect("form"),
            "event": { "type": "batchSelected", "batch": null }
        }),
    );
    let form = cleared.get("form").cloned().expect("form");
    assert!(form.get("batchId").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(form.get("startTime").and_then(|v| v.as_str()), Some("08:00"));
    assert_eq!(form.get("endTime").and_then(|v| v.as_str()), Some("09:00"));
}

#[test]
fn recurrence_change_resets_batch_and_window() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let changed = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scheduleForm.event",
        json!({
            "now": NOW,
            "form": base_form(),
            "event": { "type": "recurrenceChanged", "recurrenceType": "weekly" }
        }),
    );
    let form = changed.get("form").cloned().expect("form");
    assert!(form.get("batchId").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(form.get("endDate").and_then(|v| v.as_str()), Some("2030-01-14"));
    let policy = changed.get("policy").cloned().expect("policy");
    assert_eq!(policy.get("endDateLocked").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(policy.get("windowDays").and_then(|v| v.as_i64()), Some(7));

    let custom = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "scheduleForm.event",
        json!({
            "now": NOW,
            "form": form,
            "event": { "type": "recurrenceChanged", "recurrenceType": "custom_days" }
        }),
    );
    let form = custom.get("form").cloned().expect("form");
    assert_eq!(form.get("endDate").and_then(|v| v.as_str()), Some("2030-02-06"));
    let policy = custom.get("policy").cloned().expect("policy");
    assert_eq!(
        policy.get("daysOfWeekVisible").and_then(|v| v.as_bool()),
        Some(true)
    );
    assert_eq!(policy.get("windowDays").and_then(|v| v.as_i64()), Some(30));
}

#[test]
fn start_date_change_and_weekday_selection() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let mut form = base_form();
    form["recurrenceType"] = json!("daily");
    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scheduleForm.event",
        json!({
            "now": NOW,
            "form": form,
            "event": { "type": "startDateChanged", "startDate": "2030-01-20" }
        }),
    );
    let form = moved.get("form").cloned().expect("form");
    assert_eq!(form.get("startDate").and_then(|v| v.as_str()), Some("2030-01-20"));
    assert_eq!(form.get("endDate").and_then(|v| v.as_str()), Some("2030-01-27"));

    let mut custom = base_form();
    custom["recurrenceType"] = json!("custom_days");
    let picked = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "scheduleForm.event",
        json!({
            "now": NOW,
            "form": custom,
            "event": {
                "type": "daysOfWeekChanged",
                "daysOfWeek": ["monday", "MON", "wed", "bogus"]
            }
        }),
    );
    let days = picked
        .get("form")
        .and_then(|f| f.get("daysOfWeek"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(days, vec![json!("MON"), json!("WED")]);
}

#[test]
fn editing_existing_single_day_relaxes_the_start_floor() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let edited = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scheduleForm.event",
        json!({
            "now": NOW,
            "editingExistingSingle": true,
            "form": base_form(),
            "event": { "type": "daysOfWeekChanged", "daysOfWeek": [] }
        }),
    );
    let policy = edited.get("policy").cloned().expect("policy");
    assert!(policy
        .get("minStartDate")
        .map(|v| v.is_null())
        .unwrap_or(false));
}
