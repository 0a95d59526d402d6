use crate::calc::leave::{
    cancel, leave_analytics, number_of_days, review, summarize_leaves, validate_range,
};
use crate::ipc::helpers::{
    as_of, ensure_can_act, ensure_can_view, get_optional_i64, get_optional_str,
    get_required_date, get_required_str, parse_auth, require_student, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::records::{canonical_leave_type, LeaveApplication, LeaveStatus, LEAVE_TYPES};
use crate::store::{RecordStore, SqliteStore};
use chrono::Datelike;
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

fn leave_view(app: &LeaveApplication) -> Value {
    let mut v = json!(app);
    v["numberOfDays"] = json!(number_of_days(app.from_date, app.to_date));
    v
}

fn load_leave(store: &SqliteStore<'_>, leave_id: &str) -> Result<LeaveApplication, HandlerErr> {
    store
        .leave(leave_id)?
        .ok_or_else(|| HandlerErr::new("not_found", "leave application not found"))
}

fn leave_apply(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let student_id = get_required_str(params, "studentId")?;
    let leave_type_raw = get_required_str(params, "leaveType")?;
    let Some(leave_type) = canonical_leave_type(&leave_type_raw) else {
        return Err(HandlerErr::bad_params("unknown leaveType")
            .with_details(json!({ "allowed": LEAVE_TYPES })));
    };
    let from_date = get_required_date(params, "fromDate")?;
    let to_date = get_required_date(params, "toDate")?;
    let reason = get_required_str(params, "reason")?;
    validate_range(from_date, to_date)?;

    let store = SqliteStore::new(conn);
    require_student(&store, &student_id)?;
    ensure_can_act(&auth, &store, &student_id)?;

    let app = LeaveApplication {
        id: Uuid::new_v4().to_string(),
        student_id,
        applied_by: auth.user_id.clone(),
        leave_type: leave_type.to_string(),
        from_date,
        to_date,
        reason,
        status: LeaveStatus::Pending,
        reviewed_by: None,
        review_remarks: None,
        reviewed_at: None,
    };
    store
        .insert_leave(&app)
        .map_err(HandlerErr::write("db_insert_failed"))?;
    info!(
        "leave {} applied for {} by {}",
        app.id, app.student_id, app.applied_by
    );
    Ok(json!({ "leave": leave_view(&app) }))
}

fn leave_review(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    auth.require_staff()?;
    let leave_id = get_required_str(params, "leaveId")?;
    let decision_raw = get_required_str(params, "decision")?;
    let Some(decision) = LeaveStatus::parse(&decision_raw) else {
        return Err(HandlerErr::bad_params("decision must be Approved or Rejected"));
    };
    let remarks = get_optional_str(params, "remarks")?;

    let store = SqliteStore::new(conn);
    let mut app = load_leave(&store, &leave_id)?;
    review(&mut app, decision, &auth.user_id, remarks, as_of(params)?)?;
    store
        .save_leave_status(&app)
        .map_err(HandlerErr::write("db_update_failed"))?;
    info!(
        "leave {} {} by {}",
        app.id,
        app.status.as_str().to_ascii_lowercase(),
        auth.user_id
    );
    Ok(json!({ "leave": leave_view(&app) }))
}

fn leave_cancel(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let leave_id = get_required_str(params, "leaveId")?;
    let store = SqliteStore::new(conn);
    let mut app = load_leave(&store, &leave_id)?;
    ensure_can_act(&auth, &store, &app.student_id)?;
    cancel(&mut app)?;
    store
        .save_leave_status(&app)
        .map_err(HandlerErr::write("db_update_failed"))?;
    info!("leave {} cancelled by {}", app.id, auth.user_id);
    Ok(json!({ "leave": leave_view(&app) }))
}

fn leave_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let student_id = get_required_str(params, "studentId")?;
    let store = SqliteStore::new(conn);
    require_student(&store, &student_id)?;
    ensure_can_view(&auth, &store, &student_id)?;

    let apps = store.leaves_for(&student_id)?;
    let summary = summarize_leaves(&apps);
    Ok(json!({
        "studentId": student_id,
        "summary": summary,
        "leaves": apps.iter().map(leave_view).collect::<Vec<_>>()
    }))
}

fn leave_pending(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    parse_auth(params)?.require_staff()?;
    let apps = SqliteStore::new(conn).pending_leaves()?;
    Ok(json!({
        "count": apps.len(),
        "leaves": apps.iter().map(leave_view).collect::<Vec<_>>()
    }))
}

/// Workspace-wide leave picture; `year` keeps applications starting in it.
fn leave_analytics_view(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    parse_auth(params)?.require_admin()?;
    let year = get_optional_i64(params, "year")?;
    let apps: Vec<LeaveApplication> = SqliteStore::new(conn)
        .all_leaves()?
        .into_iter()
        .filter(|app| year.map_or(true, |y| i64::from(app.from_date.year()) == y))
        .collect();
    let mut out = json!(leave_analytics(&apps));
    out["year"] = json!(year);
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "leave.apply" => Some(with_conn(state, req, leave_apply)),
        "leave.review" => Some(with_conn(state, req, leave_review)),
        "leave.cancel" => Some(with_conn(state, req, leave_cancel)),
        "leave.list" => Some(with_conn(state, req, leave_list)),
        "leave.pending" => Some(with_conn(state, req, leave_pending)),
        "leave.analytics" => Some(with_conn(state, req, leave_analytics_view)),
        _ => None,
    }
}
