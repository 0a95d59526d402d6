use crate::auth::{Role, WardDirectory};
use crate::calc::summary::student_summary;
use crate::ipc::handlers::setup::{attendance_policy, grading_policy};
use crate::ipc::helpers::{
    as_of, ensure_can_view, get_optional_str, get_required_str, parse_auth, require_student,
    with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use rusqlite::Connection;
use serde_json::{json, Value};

fn summary_student(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let student_id = get_required_str(params, "studentId")?;
    let store = SqliteStore::new(conn);
    let student = require_student(&store, &student_id)?;
    ensure_can_view(&auth, &store, &student_id)?;

    let summary = student_summary(
        &store,
        &student_id,
        &grading_policy(conn)?,
        &attendance_policy(conn)?,
        as_of(params)?,
    );
    Ok(json!({ "student": student, "summary": summary }))
}

/// One summary per ward. Parents get their own wards; admins may pass
/// `parentId` to see another parent's view.
fn summary_wards(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let parent_id = match auth.role {
        Role::Parent => auth.user_id.clone(),
        Role::Admin => get_optional_str(params, "parentId")?
            .ok_or_else(|| HandlerErr::bad_params("missing parentId"))?,
        Role::Teacher | Role::Student => {
            return Err(HandlerErr::new("forbidden", "ward view is for parents"))
        }
    };

    let store = SqliteStore::new(conn);
    let grading = grading_policy(conn)?;
    let attendance = attendance_policy(conn)?;
    let day = as_of(params)?;
    let ward_ids = store.wards_of(&parent_id)?;
    let wards: Vec<Value> = store
        .list_students(Some(ward_ids.as_slice()))?
        .into_iter()
        .map(|student| {
            let summary = student_summary(&store, &student.id, &grading, &attendance, day);
            json!({ "student": student, "summary": summary })
        })
        .collect();
    Ok(json!({
        "parentId": parent_id,
        "count": wards.len(),
        "wards": wards
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "summary.student" => Some(with_conn(state, req, summary_student)),
        "summary.wards" => Some(with_conn(state, req, summary_wards)),
        _ => None,
    }
}
