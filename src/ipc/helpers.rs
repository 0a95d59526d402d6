use crate::auth::{AuthContext, Denied};
use crate::calc::leave::LeaveError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::records::Student;
use crate::store::{parse_date, SqliteStore, StoreError};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::Value;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }

    /// Store errors from a write: raw sqlite failures get `code` instead of
    /// `db_query_failed`.
    pub fn write(code: &'static str) -> impl Fn(StoreError) -> HandlerErr {
        move |e| match e {
            StoreError::Sqlite(_) => HandlerErr::new(code, e.to_string()),
            other => other.into(),
        }
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => HandlerErr::new("not_found", e.to_string()),
            StoreError::Duplicate(_) => HandlerErr::new("duplicate_record", e.to_string()),
            StoreError::Sqlite(_) => HandlerErr::new("db_query_failed", e.to_string()),
        }
    }
}

impl From<Denied> for HandlerErr {
    fn from(_: Denied) -> Self {
        HandlerErr::new("forbidden", "not permitted for this role")
    }
}

impl From<LeaveError> for HandlerErr {
    fn from(e: LeaveError) -> Self {
        match e {
            LeaveError::AlreadyFinal(_) => HandlerErr::new("invalid_transition", e.to_string()),
            LeaveError::InvertedRange | LeaveError::InvalidDecision => {
                HandlerErr::bad_params(e.to_string())
            }
        }
    }
}

/// Runs a handler body against the open workspace and wraps the outcome in
/// the response envelope.
pub fn with_conn<F>(state: &AppState, req: &Request, body: F) -> Value
where
    F: FnOnce(&Connection, &Value) -> Result<Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match body(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    let s = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    if s.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(s)
}

pub fn get_optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!(
                    "{} must be string or null",
                    key
                )));
            };
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
    }
}

pub fn get_optional_i64(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer", key))),
    }
}

pub fn get_required_f64(params: &Value, key: &str) -> Result<f64, HandlerErr> {
    let n = params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key)))?;
    if !n.is_finite() {
        return Err(HandlerErr::bad_params(format!("{} must be finite", key)));
    }
    Ok(n)
}

pub fn get_optional_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    match get_optional_str(params, key)? {
        None => Ok(None),
        Some(raw) => parse_date(&raw)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key))),
    }
}

pub fn get_required_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    get_optional_date(params, key)?
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// `params.asOf`, defaulting to today's local date.
pub fn as_of(params: &Value) -> Result<NaiveDate, HandlerErr> {
    Ok(get_optional_date(params, "asOf")?.unwrap_or_else(|| chrono::Local::now().date_naive()))
}

pub fn parse_auth(params: &Value) -> Result<AuthContext, HandlerErr> {
    let Some(raw) = params.get("auth") else {
        return Err(HandlerErr::new("unauthorized", "missing auth"));
    };
    let auth: AuthContext = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::new("unauthorized", format!("invalid auth: {}", e)))?;
    if auth.user_id.trim().is_empty() {
        return Err(HandlerErr::new("unauthorized", "auth.userId must not be empty"));
    }
    Ok(auth)
}

pub fn require_student(store: &SqliteStore<'_>, student_id: &str) -> Result<Student, HandlerErr> {
    store
        .student(student_id)?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))
}

pub fn ensure_can_view(
    auth: &AuthContext,
    store: &SqliteStore<'_>,
    student_id: &str,
) -> Result<(), HandlerErr> {
    if auth.can_view_student(store, student_id)? {
        Ok(())
    } else {
        Err(Denied::Forbidden.into())
    }
}

pub fn ensure_can_act(
    auth: &AuthContext,
    store: &SqliteStore<'_>,
    student_id: &str,
) -> Result<(), HandlerErr> {
    if auth.can_act_for_student(store, student_id)? {
        Ok(())
    } else {
        Err(Denied::Forbidden.into())
    }
}

/// `YYYY-MM` → first and last day of that month.
pub fn parse_month_range(month: &str) -> Result<(NaiveDate, NaiveDate), HandlerErr> {
    let t = month.trim();
    let Some((y, m)) = t.split_once('-') else {
        return Err(HandlerErr::bad_params("month must be YYYY-MM"));
    };
    let year = y
        .parse::<i32>()
        .map_err(|_| HandlerErr::bad_params("month year must be numeric"))?;
    let month_num = m
        .parse::<u32>()
        .map_err(|_| HandlerErr::bad_params("month must be YYYY-MM"))?;
    if !(1..=12).contains(&month_num) {
        return Err(HandlerErr::bad_params("month must be between 01 and 12"));
    }
    let first = NaiveDate::from_ymd_opt(year, month_num, 1)
        .ok_or_else(|| HandlerErr::bad_params("month out of range"))?;
    let next = if month_num == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month_num + 1, 1)
    }
    .ok_or_else(|| HandlerErr::bad_params("month out of range"))?;
    let last = next
        .pred_opt()
        .ok_or_else(|| HandlerErr::bad_params("month out of range"))?;
    Ok((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn month_range_covers_leap_february() {
        let (first, last) = parse_month_range("2024-02").ok().expect("range");
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 2, 1).expect("date"));
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 2, 29).expect("date"));
        let (_, dec_last) = parse_month_range("2023-12").ok().expect("range");
        assert_eq!(dec_last, NaiveDate::from_ymd_opt(2023, 12, 31).expect("date"));
        assert!(parse_month_range("2024-13").is_err());
        assert!(parse_month_range("March").is_err());
    }

    #[test]
    fn auth_is_required_and_validated() {
        assert_eq!(parse_auth(&json!({})).err().map(|e| e.code), Some("unauthorized"));
        assert_eq!(
            parse_auth(&json!({ "auth": { "role": "dean", "userId": "x" } }))
                .err()
                .map(|e| e.code),
            Some("unauthorized")
        );
        assert!(parse_auth(&json!({ "auth": { "role": "admin", "userId": "a1" } })).is_ok());
    }

    #[test]
    fn optional_strings_treat_blank_as_missing() {
        let p = json!({ "a": "  ", "b": " x ", "c": 3 });
        assert_eq!(get_optional_str(&p, "a").ok().flatten(), None);
        assert_eq!(get_optional_str(&p, "b").ok().flatten(), Some("x".to_string()));
        assert!(get_optional_str(&p, "c").is_err());
        assert!(get_required_str(&p, "a").is_err());
    }
}
