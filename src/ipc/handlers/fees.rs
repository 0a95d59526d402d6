use crate::calc::fees::{
    due_amount, evaluate_fee, fee_analytics, paid_amount, payment_history, summarize_fees,
};
use crate::calc::round_2;
use crate::ipc::helpers::{
    as_of, ensure_can_act, ensure_can_view, get_optional_date, get_optional_i64,
    get_optional_str, get_required_date, get_required_f64, get_required_str, parse_auth,
    require_student, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::records::{FeeStatus, Payment, PaymentMethod};
use crate::store::{format_date, CohortFilter, NewFee, RecordStore, SqliteStore, TermFilter};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

/// Half a cent, so float noise on a full settlement is not rejected.
const PAYMENT_TOLERANCE: f64 = 0.005;

fn new_transaction_id() -> String {
    format!("TXN{}", Uuid::new_v4().simple().to_string().to_ascii_uppercase())
}

fn term_filter(params: &Value) -> Result<TermFilter, HandlerErr> {
    Ok(TermFilter {
        academic_year: get_optional_str(params, "academicYear")?,
        semester: get_optional_i64(params, "semester")?,
    })
}

fn fees_assign(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    parse_auth(params)?.require_admin()?;
    let student_id = get_required_str(params, "studentId")?;
    let fee_structure_id = get_required_str(params, "feeStructureId")?;
    let academic_year = get_required_str(params, "academicYear")?;
    let due_date = get_required_date(params, "dueDate")?;
    let total_amount = get_required_f64(params, "totalAmount")?;
    if total_amount <= 0.0 {
        return Err(HandlerErr::bad_params("totalAmount must be positive"));
    }

    let store = SqliteStore::new(conn);
    let student = require_student(&store, &student_id)?;
    let semester = get_optional_i64(params, "semester")?.unwrap_or(student.semester);
    let fee = store
        .insert_fee(&NewFee {
            student_id,
            fee_structure_id,
            total_amount,
            academic_year,
            semester,
            due_date,
        })
        .map_err(HandlerErr::write("db_insert_failed"))?;
    info!(
        "fee {} assigned to {} ({:.2} due {})",
        fee.id,
        fee.student_id,
        fee.total_amount,
        format_date(fee.due_date)
    );
    Ok(json!({ "fee": evaluate_fee(&fee, as_of(params)?) }))
}

fn fees_pay(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let fee_id = get_required_str(params, "feeId")?;
    let amount = get_required_f64(params, "amount")?;
    let method_raw = get_required_str(params, "method")?;
    let Some(method) = PaymentMethod::parse(&method_raw) else {
        return Err(HandlerErr::bad_params(
            "method must be one of: Cash, Online, Cheque, DD, UPI, Card",
        ));
    };
    let today = as_of(params)?;
    let paid_on = get_optional_date(params, "date")?.unwrap_or(today);
    if amount <= 0.0 {
        return Err(HandlerErr::bad_params("amount must be positive"));
    }

    let store = SqliteStore::new(conn);
    let Some(mut fee) = store.fee(&fee_id)? else {
        return Err(HandlerErr::new("not_found", "fee assignment not found"));
    };
    ensure_can_act(&auth, &store, &fee.student_id)?;

    let outstanding = due_amount(fee.total_amount, paid_amount(&fee.payments));
    if outstanding <= 0.0 {
        return Err(HandlerErr::bad_params("fee is already paid")
            .with_details(json!({ "feeId": fee.id })));
    }
    if amount > outstanding + PAYMENT_TOLERANCE {
        return Err(
            HandlerErr::bad_params("payment amount exceeds due amount").with_details(json!({
                "dueAmount": outstanding,
                "amount": amount
            })),
        );
    }

    let payment = Payment {
        amount,
        date: paid_on,
        method,
        transaction_id: new_transaction_id(),
    };
    store
        .insert_payment(&fee.id, &payment, &auth.user_id)
        .map_err(HandlerErr::write("db_insert_failed"))?;
    info!(
        "payment {} of {:.2} recorded on fee {}",
        payment.transaction_id, payment.amount, fee.id
    );
    fee.payments.push(payment.clone());
    Ok(json!({
        "payment": payment,
        "fee": evaluate_fee(&fee, today)
    }))
}

fn fees_summary(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let student_id = get_required_str(params, "studentId")?;
    let store = SqliteStore::new(conn);
    require_student(&store, &student_id)?;
    ensure_can_view(&auth, &store, &student_id)?;

    let fees = store.fees_for(&student_id, &term_filter(params)?)?;
    let summary = summarize_fees(&fees, as_of(params)?);
    Ok(json!({
        "studentId": student_id,
        "fees": summary.fees,
        "totals": summary.totals,
        "skippedCount": summary.skipped_count
    }))
}

/// Every assignment in the workspace that is overdue as of `asOf`.
fn fees_overdue(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    parse_auth(params)?.require_admin()?;
    let day = as_of(params)?;
    let store = SqliteStore::new(conn);
    let mut rows = Vec::new();
    let mut total_due = 0.0;
    for fee in store.fees_due_before(day)? {
        let Some(line) = evaluate_fee(&fee, day) else {
            continue;
        };
        if line.status != FeeStatus::Overdue {
            continue;
        }
        total_due += line.due_amount;
        rows.push(line);
    }
    Ok(json!({
        "asOf": format_date(day),
        "count": rows.len(),
        "totalDue": round_2(total_due),
        "fees": rows
    }))
}

fn fees_payments(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let student_id = get_required_str(params, "studentId")?;
    let store = SqliteStore::new(conn);
    require_student(&store, &student_id)?;
    ensure_can_view(&auth, &store, &student_id)?;

    let fees = store.fees_for(&student_id, &term_filter(params)?)?;
    let payments = payment_history(&fees);
    let total_paid = payments.iter().fold(0.0, |acc, p| acc + p.payment.amount);
    Ok(json!({
        "studentId": student_id,
        "count": payments.len(),
        "totalPaid": round_2(total_paid),
        "payments": payments
    }))
}

/// Collection overview for the whole workspace, or one department.
fn fees_analytics(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    parse_auth(params)?.require_admin()?;
    let cohort = CohortFilter {
        department: get_optional_str(params, "department")?,
        semester: None,
    };
    let fees = SqliteStore::new(conn).fees_for_cohort(&cohort, &term_filter(params)?)?;
    let day = as_of(params)?;
    let mut out = json!(fee_analytics(&fees, day));
    out["asOf"] = json!(format_date(day));
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.assign" => Some(with_conn(state, req, fees_assign)),
        "fees.pay" => Some(with_conn(state, req, fees_pay)),
        "fees.summary" => Some(with_conn(state, req, fees_summary)),
        "fees.overdue" => Some(with_conn(state, req, fees_overdue)),
        "fees.payments" => Some(with_conn(state, req, fees_payments)),
        "fees.analytics" => Some(with_conn(state, req, fees_analytics)),
        _ => None,
    }
}
