use crate::calc::grades::{backlog_analytics, grade_mark, summarize_grades};
use crate::ipc::handlers::setup::grading_policy;
use crate::ipc::helpers::{
    ensure_can_view, get_optional_i64, get_optional_str, get_required_str, parse_auth,
    require_student, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::records::MarkRecord;
use crate::store::{CohortFilter, RecordStore, SqliteStore, TermFilter};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;

fn optional_number(params: &Value, keys: &[&str]) -> Result<Option<f64>, HandlerErr> {
    for key in keys {
        match params.get(*key) {
            None => continue,
            Some(v) if v.is_null() => continue,
            Some(v) => {
                let n = v
                    .as_f64()
                    .filter(|n| n.is_finite())
                    .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key)))?;
                return Ok(Some(n));
            }
        }
    }
    Ok(None)
}

fn term_filter(params: &Value) -> Result<TermFilter, HandlerErr> {
    Ok(TermFilter {
        academic_year: get_optional_str(params, "academicYear")?,
        semester: get_optional_i64(params, "semester")?,
    })
}

fn marks_enter(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    auth.require_staff()?;
    let student_id = get_required_str(params, "studentId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let exam_type = get_required_str(params, "examType")?;
    let academic_year = get_required_str(params, "academicYear")?;
    let marks_obtained = optional_number(params, &["marksObtained", "obtainedMarks"])?;
    let max_marks = optional_number(params, &["maxMarks"])?;
    let grade = get_optional_str(params, "grade")?;
    let attempt_number = get_optional_i64(params, "attemptNumber")?.unwrap_or(1);
    if attempt_number < 1 {
        return Err(HandlerErr::bad_params("attemptNumber must be >= 1"));
    }

    match (marks_obtained, max_marks) {
        (Some(_), Some(_)) if grade.is_some() => {
            return Err(HandlerErr::bad_params(
                "grade is derived from marks; send either marks or a grade",
            ))
        }
        (Some(obtained), Some(max)) => {
            if max <= 0.0 {
                return Err(HandlerErr::bad_params("maxMarks must be positive"));
            }
            if !(0.0..=max).contains(&obtained) {
                return Err(HandlerErr::bad_params("marksObtained must be in 0..=maxMarks"));
            }
        }
        (None, None) if grade.is_some() => {}
        _ => {
            return Err(HandlerErr::bad_params(
                "provide marksObtained with maxMarks, or a grade",
            ))
        }
    }

    let store = SqliteStore::new(conn);
    let student = require_student(&store, &student_id)?;
    let Some(subject) = store.subject(&subject_id)? else {
        return Err(HandlerErr::new("not_found", "subject not found"));
    };
    let semester = get_optional_i64(params, "semester")?.unwrap_or(student.semester);

    let record = MarkRecord {
        student_id,
        subject_id,
        exam_type,
        marks_obtained,
        max_marks,
        semester,
        academic_year,
        attempt_number,
        credits: subject.credits,
        grade,
    };
    store
        .upsert_mark(&record, &auth.user_id)
        .map_err(HandlerErr::write("db_update_failed"))?;
    info!(
        "marks entered for {} in {} ({}, attempt {})",
        record.student_id, subject.code, record.exam_type, record.attempt_number
    );

    let graded = grade_mark(&record, &grading_policy(conn)?);
    Ok(json!({ "mark": graded }))
}

fn marks_summary(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let student_id = get_required_str(params, "studentId")?;
    let store = SqliteStore::new(conn);
    require_student(&store, &student_id)?;
    ensure_can_view(&auth, &store, &student_id)?;

    let records = store.marks_for(&student_id, &term_filter(params)?)?;
    let summary = summarize_grades(&records, &grading_policy(conn)?);
    Ok(json!({
        "studentId": student_id,
        "cgpa": summary.cgpa,
        "totalCredits": summary.total_credits,
        "backlogCount": summary.backlog_count,
        "passedCount": summary.passed_count,
        "skippedCount": summary.skipped_count,
        "semesters": summary.semesters,
        "records": summary.records
    }))
}

fn marks_backlogs(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let student_id = get_required_str(params, "studentId")?;
    let store = SqliteStore::new(conn);
    require_student(&store, &student_id)?;
    ensure_can_view(&auth, &store, &student_id)?;

    let records = store.marks_for(&student_id, &term_filter(params)?)?;
    let summary = summarize_grades(&records, &grading_policy(conn)?);
    let backlogs: Vec<_> = summary
        .records
        .into_iter()
        .filter(|m| m.is_backlog())
        .collect();
    Ok(json!({
        "studentId": student_id,
        "count": backlogs.len(),
        "backlogs": backlogs
    }))
}

/// Backlogs across students, optionally narrowed to one department and a
/// term.
fn marks_analytics(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    parse_auth(params)?.require_staff()?;
    let cohort = CohortFilter {
        department: get_optional_str(params, "department")?,
        semester: None,
    };
    let store = SqliteStore::new(conn);
    let records = store.marks_for_cohort(&cohort, &term_filter(params)?)?;
    let analytics = backlog_analytics(&records, &grading_policy(conn)?);

    let codes: HashMap<String, String> = store
        .list_subjects()?
        .into_iter()
        .map(|s| (s.id, s.code))
        .collect();
    let subject_wise: Vec<Value> = analytics
        .subject_wise
        .iter()
        .map(|row| {
            json!({
                "subjectId": row.subject_id,
                "code": codes.get(&row.subject_id),
                "count": row.count
            })
        })
        .collect();
    let mut out = json!(analytics);
    out["subjectWise"] = json!(subject_wise);
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.enter" => Some(with_conn(state, req, marks_enter)),
        "marks.summary" => Some(with_conn(state, req, marks_summary)),
        "marks.backlogs" => Some(with_conn(state, req, marks_backlogs)),
        "marks.analytics" => Some(with_conn(state, req, marks_analytics)),
        _ => None,
    }
}
