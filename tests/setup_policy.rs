mod test_support;

use serde_json::json;
use test_support::{admin, spawn_with_workspace, teacher};

#[test]
fn defaults_are_reported_and_patches_persist() {
    let (mut sidecar, workspace) = spawn_with_workspace("erpd-setup-policy");

    let setup = sidecar.ok("setup.get", json!({ "auth": teacher() }));
    assert_eq!(setup["grading"]["passPercent"], json!(40.0));
    assert_eq!(setup["attendance"]["goodStandingPercent"], json!(75));

    sidecar.ok(
        "setup.update",
        json!({ "auth": admin(), "section": "attendance", "patch": { "goodStandingPercent": 80 } }),
    );
    drop(sidecar);

    // A fresh process on the same workspace sees the saved value.
    let mut sidecar = test_support::spawn_sidecar();
    sidecar.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    let setup = sidecar.ok("setup.get", json!({ "auth": admin() }));
    assert_eq!(setup["attendance"]["goodStandingPercent"], json!(80));
}

#[test]
fn pass_threshold_changes_backlog_classification() {
    let (mut sidecar, _ws) = spawn_with_workspace("erpd-setup-pass");
    let student = sidecar.create_student("CS-500", 5);
    let subject = sidecar.create_subject("CS301", 4.0);
    sidecar.ok(
        "marks.enter",
        json!({
            "auth": teacher(),
            "studentId": student,
            "subjectId": subject,
            "examType": "End-Term",
            "academicYear": "2024-25",
            "marksObtained": 36,
            "maxMarks": 100
        }),
    );

    let before = sidecar.ok("marks.summary", json!({ "auth": admin(), "studentId": student }));
    assert_eq!(before["backlogCount"], json!(1));

    sidecar.ok(
        "setup.update",
        json!({ "auth": admin(), "section": "grading", "patch": { "passPercent": 35 } }),
    );
    let after = sidecar.ok("marks.summary", json!({ "auth": admin(), "studentId": student }));
    assert_eq!(after["backlogCount"], json!(0));
    assert_eq!(after["records"][0]["grade"], json!("D"));
}

#[test]
fn invalid_updates_are_rejected() {
    let (mut sidecar, _ws) = spawn_with_workspace("erpd-setup-invalid");

    let update = |section: &str, patch: serde_json::Value| {
        json!({ "auth": admin(), "section": section, "patch": patch })
    };
    assert_eq!(
        sidecar.err_code("setup.update", update("grading", json!({ "passPercent": 120 }))),
        "bad_params"
    );
    assert_eq!(
        sidecar.err_code("setup.update", update("attendance", json!({ "goodStandingPercent": 7.5 }))),
        "bad_params"
    );
    assert_eq!(
        sidecar.err_code("setup.update", update("printer", json!({}))),
        "bad_params"
    );
    assert_eq!(
        sidecar.err_code(
            "setup.update",
            json!({ "auth": teacher(), "section": "grading", "patch": { "passPercent": 50 } }),
        ),
        "forbidden"
    );
}
