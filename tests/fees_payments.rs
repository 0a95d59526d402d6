mod test_support;

use serde_json::json;
use test_support::{admin, as_parent, as_student, spawn_with_workspace, teacher, Sidecar};

fn assign(sidecar: &mut Sidecar, student: &str, total: f64, due: &str) -> String {
    let res = sidecar.ok(
        "fees.assign",
        json!({
            "auth": admin(),
            "studentId": student,
            "feeStructureId": "tuition-2024",
            "totalAmount": total,
            "academicYear": "2024-25",
            "dueDate": due,
            "asOf": "2024-07-01"
        }),
    );
    assert_eq!(res["fee"]["status"], json!("Pending"));
    res["fee"]["feeId"].as_str().expect("fee id").to_string()
}

#[test]
fn half_payment_is_partial() {
    let (mut sidecar, _ws) = spawn_with_workspace("erpd-fees-partial");
    let student = sidecar.create_student("CS-200", 5);
    let fee = assign(&mut sidecar, &student, 5000.0, "2024-09-30");

    let paid = sidecar.ok(
        "fees.pay",
        json!({
            "auth": as_student(&student),
            "feeId": fee,
            "amount": 2500,
            "method": "upi",
            "date": "2024-07-10",
            "asOf": "2024-07-10"
        }),
    );
    assert_eq!(paid["payment"]["method"], json!("UPI"));
    assert!(paid["payment"]["transactionId"]
        .as_str()
        .expect("transaction id")
        .starts_with("TXN"));
    assert_eq!(paid["fee"]["paidAmount"], json!(2500.0));
    assert_eq!(paid["fee"]["dueAmount"], json!(2500.0));
    assert_eq!(paid["fee"]["status"], json!("Partial"));

    let summary = sidecar.ok(
        "fees.summary",
        json!({ "auth": admin(), "studentId": student, "asOf": "2024-08-01" }),
    );
    assert_eq!(
        summary["totals"],
        json!({ "total": 5000.0, "paid": 2500.0, "due": 2500.0 })
    );
    assert_eq!(summary["fees"][0]["paymentCount"], json!(1));
}

#[test]
fn status_tracks_due_date_and_settlement() {
    let (mut sidecar, _ws) = spawn_with_workspace("erpd-fees-status");
    let student = sidecar.create_student("CS-201", 5);
    let fee = assign(&mut sidecar, &student, 1200.0, "2024-09-30");

    let on_due_date = sidecar.ok(
        "fees.summary",
        json!({ "auth": admin(), "studentId": student, "asOf": "2024-09-30" }),
    );
    assert_eq!(on_due_date["fees"][0]["status"], json!("Pending"));

    let after = sidecar.ok(
        "fees.summary",
        json!({ "auth": admin(), "studentId": student, "asOf": "2024-10-01" }),
    );
    assert_eq!(after["fees"][0]["status"], json!("Overdue"));

    let overdue = sidecar.ok("fees.overdue", json!({ "auth": admin(), "asOf": "2024-10-01" }));
    assert_eq!(overdue["count"], json!(1));
    assert_eq!(overdue["fees"][0]["studentId"], json!(student));
    assert_eq!(overdue["totalDue"], json!(1200.0));

    sidecar.ok(
        "fees.pay",
        json!({ "auth": admin(), "feeId": fee, "amount": 1200, "method": "Cash", "asOf": "2024-10-02" }),
    );
    let settled = sidecar.ok(
        "fees.summary",
        json!({ "auth": admin(), "studentId": student, "asOf": "2024-12-01" }),
    );
    assert_eq!(settled["fees"][0]["status"], json!("Paid"));
    assert_eq!(settled["fees"][0]["dueAmount"], json!(0.0));

    let overdue = sidecar.ok("fees.overdue", json!({ "auth": admin(), "asOf": "2024-12-01" }));
    assert_eq!(overdue["count"], json!(0));
}

#[test]
fn payments_must_fit_the_balance() {
    let (mut sidecar, _ws) = spawn_with_workspace("erpd-fees-limits");
    let student = sidecar.create_student("CS-202", 5);
    let fee = assign(&mut sidecar, &student, 1000.0, "2024-09-30");

    sidecar.ok(
        "fees.pay",
        json!({ "auth": admin(), "feeId": fee, "amount": 600, "method": "Card" }),
    );
    assert_eq!(
        sidecar.err_code(
            "fees.pay",
            json!({ "auth": admin(), "feeId": fee, "amount": 400.01, "method": "Card" }),
        ),
        "bad_params"
    );
    assert_eq!(
        sidecar.err_code(
            "fees.pay",
            json!({ "auth": admin(), "feeId": fee, "amount": 0, "method": "Card" }),
        ),
        "bad_params"
    );
    assert_eq!(
        sidecar.err_code(
            "fees.pay",
            json!({ "auth": admin(), "feeId": fee, "amount": 10, "method": "Barter" }),
        ),
        "bad_params"
    );
    assert_eq!(
        sidecar.err_code(
            "fees.pay",
            json!({ "auth": admin(), "feeId": "nope", "amount": 10, "method": "Cash" }),
        ),
        "not_found"
    );
    sidecar.ok(
        "fees.pay",
        json!({ "auth": admin(), "feeId": fee, "amount": 400, "method": "DD" }),
    );

    // Settled: even a sub-cent amount is refused.
    assert_eq!(
        sidecar.err_code(
            "fees.pay",
            json!({ "auth": admin(), "feeId": fee, "amount": 0.004, "method": "Cash" }),
        ),
        "bad_params"
    );
    let summary = sidecar.ok("fees.summary", json!({ "auth": admin(), "studentId": student }));
    assert_eq!(summary["fees"][0]["paymentCount"], json!(2));
    assert_eq!(summary["fees"][0]["status"], json!("Paid"));
}

#[test]
fn payment_and_assignment_permissions() {
    let (mut sidecar, _ws) = spawn_with_workspace("erpd-fees-auth");
    let student = sidecar.create_student("CS-203", 5);
    let other = sidecar.create_student("CS-204", 5);
    let fee = assign(&mut sidecar, &student, 1000.0, "2024-09-30");

    let pay = |auth: serde_json::Value| {
        json!({ "auth": auth, "feeId": fee, "amount": 10, "method": "Online" })
    };
    assert_eq!(sidecar.err_code("fees.pay", pay(teacher())), "forbidden");
    assert_eq!(sidecar.err_code("fees.pay", pay(as_student(&other))), "forbidden");
    assert_eq!(sidecar.err_code("fees.pay", pay(as_parent("parent-5"))), "forbidden");

    sidecar.ok(
        "parents.link",
        json!({ "auth": admin(), "parentId": "parent-5", "studentId": student }),
    );
    sidecar.ok("fees.pay", pay(as_parent("parent-5")));

    assert_eq!(
        sidecar.err_code(
            "fees.assign",
            json!({
                "auth": teacher(),
                "studentId": student,
                "feeStructureId": "hostel",
                "totalAmount": 100,
                "academicYear": "2024-25",
                "dueDate": "2024-09-30"
            }),
        ),
        "forbidden"
    );
    assert_eq!(
        sidecar.err_code("fees.overdue", json!({ "auth": teacher() })),
        "forbidden"
    );
}
