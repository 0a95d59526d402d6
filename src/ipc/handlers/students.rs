use crate::auth::{Role, WardDirectory};
use crate::ipc::helpers::{
    get_optional_i64, get_required_f64, get_required_str, parse_auth, require_student, with_conn,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{NewStudent, SqliteStore};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};

fn students_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    parse_auth(params)?.require_admin()?;
    let semester = get_optional_i64(params, "semester")?.unwrap_or(1);
    if !(1..=12).contains(&semester) {
        return Err(HandlerErr::bad_params("semester must be in 1..=12"));
    }
    let new = NewStudent {
        roll_number: get_required_str(params, "rollNumber")?,
        first_name: get_required_str(params, "firstName")?,
        last_name: get_required_str(params, "lastName")?,
        department: get_required_str(params, "department")?,
        semester,
    };
    let store = SqliteStore::new(conn);
    let student = store
        .insert_student(&new)
        .map_err(HandlerErr::write("db_insert_failed"))?;
    info!("student {} created ({})", student.id, student.roll_number);
    Ok(json!({ "student": student }))
}

/// Staff see every student; parents their wards; students themselves.
fn students_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let store = SqliteStore::new(conn);
    let students = match auth.role {
        Role::Admin | Role::Teacher => store.list_students(None)?,
        Role::Parent => {
            let wards = store.wards_of(&auth.user_id)?;
            store.list_students(Some(wards.as_slice()))?
        }
        Role::Student => store.list_students(Some(std::slice::from_ref(&auth.user_id)))?,
    };
    Ok(json!({ "students": students }))
}

fn subjects_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    parse_auth(params)?.require_admin()?;
    let code = get_required_str(params, "code")?;
    let name = get_required_str(params, "name")?;
    let credits = get_required_f64(params, "credits")?;
    if credits < 0.0 {
        return Err(HandlerErr::bad_params("credits must not be negative"));
    }
    let store = SqliteStore::new(conn);
    let subject = store
        .insert_subject(&code, &name, credits)
        .map_err(HandlerErr::write("db_insert_failed"))?;
    info!("subject {} created ({} credits)", subject.code, subject.credits);
    Ok(json!({ "subject": subject }))
}

fn subjects_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    parse_auth(params)?;
    let subjects = SqliteStore::new(conn).list_subjects()?;
    Ok(json!({ "subjects": subjects }))
}

fn parents_link(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    parse_auth(params)?.require_admin()?;
    let parent_id = get_required_str(params, "parentId")?;
    let student_id = get_required_str(params, "studentId")?;
    let store = SqliteStore::new(conn);
    require_student(&store, &student_id)?;
    let linked = store
        .link_parent(&parent_id, &student_id)
        .map_err(HandlerErr::write("db_insert_failed"))?;
    Ok(json!({ "linked": linked }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(with_conn(state, req, students_create)),
        "students.list" => Some(with_conn(state, req, students_list)),
        "subjects.create" => Some(with_conn(state, req, subjects_create)),
        "subjects.list" => Some(with_conn(state, req, subjects_list)),
        "parents.link" => Some(with_conn(state, req, parents_link)),
        _ => None,
    }
}
