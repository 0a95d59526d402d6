use crate::calc::attendance::{
    attendance_analytics, attendance_report, below_good_standing, summarize_attendance,
};
use crate::ipc::handlers::setup::attendance_policy;
use crate::ipc::helpers::{
    ensure_can_view, get_optional_date, get_optional_i64, get_optional_str, get_required_date,
    get_required_str, parse_auth, parse_month_range, require_student, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::records::{AttendanceRecord, AttendanceStatus};
use crate::store::{format_date, AttendanceFilter, CohortFilter, RecordStore, SqliteStore};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashSet;

fn parse_status(params: &Value, key: &str) -> Result<AttendanceStatus, HandlerErr> {
    let raw = get_required_str(params, key)?;
    AttendanceStatus::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params(format!("{} must be Present, Absent, Late or Leave", key))
            .with_details(json!({ "value": raw }))
    })
}

fn require_subject(store: &SqliteStore<'_>, subject_id: &str) -> Result<(), HandlerErr> {
    match store.subject(subject_id)? {
        Some(_) => Ok(()),
        None => Err(HandlerErr::new("not_found", "subject not found")),
    }
}

/// `subjectId` plus one date window: a single `date`, a `month`, or
/// `fromDate`/`toDate`.
fn attendance_filter(params: &Value) -> Result<AttendanceFilter, HandlerErr> {
    let mut filter = AttendanceFilter {
        subject_id: get_optional_str(params, "subjectId")?,
        from: get_optional_date(params, "fromDate")?,
        to: get_optional_date(params, "toDate")?,
    };
    let ranged = filter.from.is_some() || filter.to.is_some();
    let day = get_optional_date(params, "date")?;
    let month = get_optional_str(params, "month")?;
    match (day, month) {
        (Some(_), Some(_)) => {
            return Err(HandlerErr::bad_params("date cannot be combined with month"))
        }
        (Some(_), None) | (None, Some(_)) if ranged => {
            return Err(HandlerErr::bad_params(
                "date and month cannot be combined with fromDate/toDate",
            ))
        }
        (Some(day), None) => {
            filter.from = Some(day);
            filter.to = Some(day);
        }
        (None, Some(month)) => {
            let (first, last) = parse_month_range(&month)?;
            filter.from = Some(first);
            filter.to = Some(last);
        }
        (None, None) => {}
    }
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if to < from {
            return Err(HandlerErr::bad_params("toDate must not be before fromDate"));
        }
    }
    Ok(filter)
}

fn cohort_filter(params: &Value) -> Result<CohortFilter, HandlerErr> {
    Ok(CohortFilter {
        department: get_optional_str(params, "department")?,
        semester: get_optional_i64(params, "semester")?,
    })
}

/// Marks one subject/date for a batch of students. Any duplicate rejects the
/// whole batch.
fn attendance_mark(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    auth.require_staff()?;
    let subject_id = get_required_str(params, "subjectId")?;
    let date = get_required_date(params, "date")?;
    let Some(entries) = params.get("records").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("records must be an array"));
    };
    if entries.is_empty() {
        return Err(HandlerErr::bad_params("records must not be empty"));
    }

    let store = SqliteStore::new(conn);
    require_subject(&store, &subject_id)?;

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let student_id = get_required_str(entry, "studentId")
            .map_err(|e| e.with_details(json!({ "index": i })))?;
        let status =
            parse_status(entry, "status").map_err(|e| e.with_details(json!({ "index": i })))?;
        if !seen.insert(student_id.clone()) {
            return Err(HandlerErr::new(
                "duplicate_record",
                format!("student {} appears twice in the batch", student_id),
            )
            .with_details(json!({ "index": i })));
        }
        require_student(&store, &student_id)?;
        records.push(AttendanceRecord {
            student_id,
            subject_id: subject_id.clone(),
            date,
            status,
        });
    }

    let marked = store
        .mark_attendance(&records, &auth.user_id)
        .map_err(HandlerErr::write("db_insert_failed"))?;
    info!(
        "attendance marked for {} students in {} on {}",
        marked,
        subject_id,
        format_date(date)
    );
    Ok(json!({ "marked": marked }))
}

fn attendance_correct(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    auth.require_staff()?;
    let student_id = get_required_str(params, "studentId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let date = get_required_date(params, "date")?;
    let status = parse_status(params, "status")?;
    let remarks = get_optional_str(params, "remarks")?;

    let store = SqliteStore::new(conn);
    let previous = store
        .correct_attendance(
            &student_id,
            &subject_id,
            date,
            status,
            remarks.as_deref(),
            &auth.user_id,
        )
        .map_err(HandlerErr::write("db_update_failed"))?;
    info!(
        "attendance corrected for {} in {} on {}: {} -> {}",
        student_id,
        subject_id,
        format_date(date),
        previous,
        status.as_str()
    );
    Ok(json!({
        "previousStatus": previous,
        "status": status
    }))
}

fn attendance_summary(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let student_id = get_required_str(params, "studentId")?;
    let store = SqliteStore::new(conn);
    require_student(&store, &student_id)?;
    ensure_can_view(&auth, &store, &student_id)?;

    let records = store.attendance_for(&student_id, &attendance_filter(params)?)?;
    let report = attendance_report(&records);
    let policy = attendance_policy(conn)?;
    Ok(json!({
        "studentId": student_id,
        "overall": report.overall,
        "subjects": report.subjects,
        "goodStandingPercent": policy.good_standing_percent,
        "belowThreshold": below_good_standing(&report.overall, &policy)
    }))
}

/// Roster view for staff: every matching record with its student.
fn attendance_class(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    parse_auth(params)?.require_staff()?;
    let rows = SqliteStore::new(conn)
        .roster_attendance(&cohort_filter(params)?, &attendance_filter(params)?)?;
    Ok(json!({
        "count": rows.len(),
        "summary": summarize_attendance(rows.iter().map(|r| r.record.status)),
        "records": rows
    }))
}

fn attendance_analytics_view(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    parse_auth(params)?.require_staff()?;
    let rows = SqliteStore::new(conn)
        .roster_attendance(&cohort_filter(params)?, &attendance_filter(params)?)?;
    Ok(json!(attendance_analytics(&rows)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(with_conn(state, req, attendance_mark)),
        "attendance.correct" => Some(with_conn(state, req, attendance_correct)),
        "attendance.summary" => Some(with_conn(state, req, attendance_summary)),
        "attendance.class" => Some(with_conn(state, req, attendance_class)),
        "attendance.analytics" => Some(with_conn(state, req, attendance_analytics_view)),
        _ => None,
    }
}
