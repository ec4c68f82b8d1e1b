mod test_support;

use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

const NOW: &str = "2030-01-07T08:00:00";

#[test]
fn import_normalizes_aliases_and_skips_garbage() {
    let workspace = temp_dir("classdesk-upstream-import");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "upstream.importSchedules",
        json!({
            "records": [
                {
                    "id": 9001,
                    "batchId": "b-up",
                    "course_id": "c-up",
                    "trainer_id": "t-up",
                    "date": "08-01-2030",
                    "startTime": "09:00:00",
                    "end_time": "10:30",
                    "recurrenceType": "CUSTOM_DAYS",
                    "daysOfWeek": ["tuesday", "THU"],
                    "isOnline": 1,
                    "trainerName": "Imported Trainer",
                    "courseName": "Imported Course",
                    "batchName": "Imported Batch"
                },
                { "schedule_id": "missing-everything" },
                "not an object"
            ]
        }),
    );
    assert_eq!(imported.get("imported").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(imported.get("skipped").and_then(|v| v.as_i64()), Some(2));

    // The canonical record is what comes back out, stub references included.
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedules.list",
        json!({ "now": NOW }),
    );
    let schedules = listed
        .get("schedules")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(schedules.len(), 1);
    let record = &schedules[0];
    assert_eq!(record.get("scheduleId").and_then(|v| v.as_str()), Some("9001"));
    assert_eq!(
        record.get("scheduledDate").and_then(|v| v.as_str()),
        Some("2030-01-08")
    );
    assert_eq!(record.get("startTime").and_then(|v| v.as_str()), Some("09:00"));
    assert_eq!(record.get("employeeId").and_then(|v| v.as_str()), Some("t-up"));
    assert_eq!(
        record.get("recurrenceType").and_then(|v| v.as_str()),
        Some("custom_days")
    );
    assert_eq!(
        record.get("daysOfWeek").and_then(|v| v.as_array()).cloned(),
        Some(vec![json!("TUE"), json!("THU")])
    );
    assert_eq!(
        record.get("isOnlineClass").and_then(|v| v.as_bool()),
        Some(true)
    );
    assert_eq!(record.get("status").and_then(|v| v.as_str()), Some("upcoming"));

    let trainers = request_ok(&mut stdin, &mut reader, "4", "trainers.list", json!({}));
    assert_eq!(
        trainers
            .get("trainers")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|t| t.get("name"))
            .and_then(|v| v.as_str()),
        Some("Imported Trainer")
    );

    // Re-import with a moved date updates in place instead of duplicating.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "upstream.importSchedules",
        json!({
            "records": [{
                "schedule_id": "9001",
                "batch_id": "b-up",
                "course_id": "c-up",
                "trainer_employee_id": "t-up",
                "scheduled_date": "2030-01-09",
                "start_time": "09:00",
                "end_time": "10:30"
            }]
        }),
    );
    assert_eq!(again.get("imported").and_then(|v| v.as_i64()), Some(1));
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "schedules.list",
        json!({ "now": NOW }),
    );
    let schedules = listed
        .get("schedules")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(schedules.len(), 1);
    assert_eq!(
        schedules[0].get("scheduledDate").and_then(|v| v.as_str()),
        Some("2030-01-09")
    );
}

#[test]
fn submission_payload_follows_configured_date_format() {
    let workspace = temp_dir("classdesk-upstream-submit");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let input = json!({
        "batchId": "b1",
        "courseId": "c1",
        "employeeId": "t1",
        "startDate": "2030-01-07",
        "endDate": "2030-02-06",
        "startTime": "09:00",
        "endTime": "10:30",
        "recurrenceType": "custom_days",
        "daysOfWeek": ["MON", "WED"],
        "isOnlineClass": true,
        "classLink": "https://meet.example.org/b1"
    });

    let built = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "upstream.buildSubmission",
        json!({ "now": NOW, "input": input.clone() }),
    );
    let payload = built.get("payload").cloned().expect("payload");
    assert_eq!(
        payload.get("start_date").and_then(|v| v.as_str()),
        Some("07-01-2030")
    );
    assert_eq!(
        payload.get("end_date").and_then(|v| v.as_str()),
        Some("06-02-2030")
    );
    assert_eq!(
        payload.get("start_time").and_then(|v| v.as_str()),
        Some("09:00")
    );
    assert_eq!(
        payload.get("days_of_week").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );
    assert_eq!(
        payload.get("is_online_class").and_then(|v| v.as_bool()),
        Some(true)
    );

    // The workspace can override the display format.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "scheduling", "patch": { "submitDateFormat": "YYYY-MM-DD" } }),
    );
    let built = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "upstream.buildSubmission",
        json!({ "now": NOW, "input": input }),
    );
    assert_eq!(
        built
            .get("payload")
            .and_then(|p| p.get("start_date"))
            .and_then(|v| v.as_str()),
        Some("2030-01-07")
    );
}
