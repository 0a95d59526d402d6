mod test_support;

use serde_json::json;
use test_support::{admin, spawn_sidecar, temp_dir, teacher};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("erpd-router-smoke");
    let mut sidecar = spawn_sidecar();

    let health = sidecar.ok("health", json!({}));
    assert!(health["workspacePath"].is_null());

    assert_eq!(
        sidecar.err_code("students.list", json!({ "auth": admin() })),
        "no_workspace"
    );

    sidecar.ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = sidecar.create_student("CS-001", 5);
    let subject_id = sidecar.create_subject("CS301", 4.0);

    // Every method must be routed; a domain error is fine, not_implemented is not.
    let calls = [
        ("students.list", json!({ "auth": admin() })),
        ("subjects.list", json!({ "auth": teacher() })),
        (
            "parents.link",
            json!({ "auth": admin(), "parentId": "parent-1", "studentId": student_id }),
        ),
        (
            "attendance.mark",
            json!({
                "auth": teacher(),
                "subjectId": subject_id,
                "date": "2024-08-01",
                "records": [{ "studentId": student_id, "status": "Present" }]
            }),
        ),
        (
            "attendance.correct",
            json!({
                "auth": teacher(),
                "studentId": student_id,
                "subjectId": subject_id,
                "date": "2024-08-01",
                "status": "Late"
            }),
        ),
        (
            "attendance.summary",
            json!({ "auth": admin(), "studentId": student_id }),
        ),
        (
            "marks.enter",
            json!({
                "auth": teacher(),
                "studentId": student_id,
                "subjectId": subject_id,
                "examType": "End-Term",
                "academicYear": "2024-25",
                "marksObtained": 71,
                "maxMarks": 100
            }),
        ),
        ("marks.summary", json!({ "auth": admin(), "studentId": student_id })),
        ("marks.backlogs", json!({ "auth": admin(), "studentId": student_id })),
        (
            "fees.assign",
            json!({
                "auth": admin(),
                "studentId": student_id,
                "feeStructureId": "tuition",
                "totalAmount": 5000,
                "academicYear": "2024-25",
                "dueDate": "2024-09-30"
            }),
        ),
        ("fees.pay", json!({ "auth": admin(), "feeId": "missing", "amount": 1, "method": "Cash" })),
        ("fees.summary", json!({ "auth": admin(), "studentId": student_id })),
        ("fees.overdue", json!({ "auth": admin(), "asOf": "2024-10-15" })),
        (
            "leave.apply",
            json!({
                "auth": admin(),
                "studentId": student_id,
                "leaveType": "Casual Leave",
                "fromDate": "2024-08-05",
                "toDate": "2024-08-06",
                "reason": "family function"
            }),
        ),
        ("leave.review", json!({ "auth": teacher(), "leaveId": "missing", "decision": "Approved" })),
        ("leave.cancel", json!({ "auth": admin(), "leaveId": "missing" })),
        ("leave.list", json!({ "auth": admin(), "studentId": student_id })),
        ("leave.pending", json!({ "auth": teacher() })),
        ("summary.student", json!({ "auth": admin(), "studentId": student_id })),
        ("summary.wards", json!({ "auth": admin(), "parentId": "parent-1" })),
        ("setup.get", json!({ "auth": admin() })),
        (
            "setup.update",
            json!({ "auth": admin(), "section": "grading", "patch": { "passPercent": 40 } }),
        ),
    ];
    for (method, params) in calls {
        let resp = sidecar.request(method, params);
        let code = resp
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str());
        assert_ne!(code, Some("not_implemented"), "{} was not routed", method);
    }

    assert_eq!(sidecar.err_code("grades.explode", json!({})), "not_implemented");
}

#[test]
fn malformed_lines_and_missing_auth_are_rejected() {
    let (mut sidecar, _ws) = test_support::spawn_with_workspace("erpd-router-errors");

    let resp = sidecar.write_line("{not json");
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("bad_json"));

    // Still serving after the bad line.
    sidecar.ok("health", json!({}));

    assert_eq!(sidecar.err_code("students.list", json!({})), "unauthorized");
    assert_eq!(
        sidecar.err_code(
            "students.list",
            json!({ "auth": { "role": "registrar", "userId": "x" } })
        ),
        "unauthorized"
    );
    assert_eq!(
        sidecar.err_code("workspace.select", json!({})),
        "bad_params"
    );
}
