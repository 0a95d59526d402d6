mod test_support;

use serde_json::json;
use test_support::{admin, as_parent, as_student, spawn_with_workspace, teacher, Sidecar};

fn apply(sidecar: &mut Sidecar, auth: serde_json::Value, student: &str) -> String {
    let res = sidecar.ok(
        "leave.apply",
        json!({
            "auth": auth,
            "studentId": student,
            "leaveType": "sick leave",
            "fromDate": "2024-03-01",
            "toDate": "2024-03-03",
            "reason": "fever"
        }),
    );
    assert_eq!(res["leave"]["status"], json!("Pending"));
    assert_eq!(res["leave"]["leaveType"], json!("Sick Leave"));
    assert_eq!(res["leave"]["numberOfDays"], json!(3));
    res["leave"]["id"].as_str().expect("leave id").to_string()
}

#[test]
fn review_happens_exactly_once() {
    let (mut sidecar, _ws) = spawn_with_workspace("erpd-leave-review");
    let student = sidecar.create_student("CS-300", 5);
    let leave = apply(&mut sidecar, as_student(&student), &student);

    let pending = sidecar.ok("leave.pending", json!({ "auth": teacher() }));
    assert_eq!(pending["count"], json!(1));

    let reviewed = sidecar.ok(
        "leave.review",
        json!({
            "auth": teacher(),
            "leaveId": leave,
            "decision": "Approved",
            "remarks": "get well soon",
            "asOf": "2024-02-28"
        }),
    );
    assert_eq!(reviewed["leave"]["status"], json!("Approved"));
    assert_eq!(reviewed["leave"]["reviewedBy"], json!("teacher-1"));
    assert_eq!(reviewed["leave"]["reviewedAt"], json!("2024-02-28"));

    assert_eq!(
        sidecar.err_code(
            "leave.review",
            json!({ "auth": admin(), "leaveId": leave, "decision": "Rejected" }),
        ),
        "invalid_transition"
    );
    assert_eq!(
        sidecar.err_code(
            "leave.cancel",
            json!({ "auth": as_student(&student), "leaveId": leave }),
        ),
        "invalid_transition"
    );

    let list = sidecar.ok(
        "leave.list",
        json!({ "auth": as_student(&student), "studentId": student }),
    );
    assert_eq!(list["summary"]["approved"], json!(1));
    assert_eq!(list["summary"]["totalDays"], json!(3));
    assert_eq!(list["leaves"][0]["reviewRemarks"], json!("get well soon"));

    let pending = sidecar.ok("leave.pending", json!({ "auth": admin() }));
    assert_eq!(pending["count"], json!(0));
}

#[test]
fn applicant_can_cancel_while_pending() {
    let (mut sidecar, _ws) = spawn_with_workspace("erpd-leave-cancel");
    let student = sidecar.create_student("CS-301", 5);
    sidecar.ok(
        "parents.link",
        json!({ "auth": admin(), "parentId": "parent-7", "studentId": student }),
    );
    let leave = apply(&mut sidecar, as_parent("parent-7"), &student);

    let cancelled = sidecar.ok(
        "leave.cancel",
        json!({ "auth": as_parent("parent-7"), "leaveId": leave }),
    );
    assert_eq!(cancelled["leave"]["status"], json!("Cancelled"));
    assert_eq!(cancelled["leave"]["appliedBy"], json!("parent-7"));

    assert_eq!(
        sidecar.err_code(
            "leave.review",
            json!({ "auth": teacher(), "leaveId": leave, "decision": "Approved" }),
        ),
        "invalid_transition"
    );

    let list = sidecar.ok("leave.list", json!({ "auth": admin(), "studentId": student }));
    assert_eq!(list["summary"]["cancelled"], json!(1));
    assert_eq!(list["summary"]["totalDays"], json!(0));
}

#[test]
fn invalid_applications_and_reviewers_are_rejected() {
    let (mut sidecar, _ws) = spawn_with_workspace("erpd-leave-invalid");
    let student = sidecar.create_student("CS-302", 5);
    let other = sidecar.create_student("CS-303", 5);

    let base = json!({
        "auth": as_student(&student),
        "studentId": student,
        "leaveType": "Casual Leave",
        "fromDate": "2024-03-05",
        "toDate": "2024-03-04",
        "reason": "trip"
    });
    assert_eq!(sidecar.err_code("leave.apply", base.clone()), "bad_params");

    let mut bad_type = base.clone();
    bad_type["toDate"] = json!("2024-03-06");
    bad_type["leaveType"] = json!("Vacation");
    assert_eq!(sidecar.err_code("leave.apply", bad_type), "bad_params");

    let mut for_other = base.clone();
    for_other["toDate"] = json!("2024-03-06");
    for_other["studentId"] = json!(other);
    assert_eq!(sidecar.err_code("leave.apply", for_other), "forbidden");

    let mut by_teacher = base;
    by_teacher["toDate"] = json!("2024-03-06");
    by_teacher["auth"] = teacher();
    assert_eq!(sidecar.err_code("leave.apply", by_teacher), "forbidden");

    let leave = apply(&mut sidecar, as_student(&student), &student);
    assert_eq!(
        sidecar.err_code(
            "leave.review",
            json!({ "auth": as_student(&student), "leaveId": leave, "decision": "Approved" }),
        ),
        "forbidden"
    );
    assert_eq!(
        sidecar.err_code(
            "leave.review",
            json!({ "auth": teacher(), "leaveId": leave, "decision": "Pending" }),
        ),
        "bad_params"
    );
    assert_eq!(
        sidecar.err_code(
            "leave.cancel",
            json!({ "auth": as_student(&other), "leaveId": leave }),
        ),
        "forbidden"
    );
}
