use crate::calc::policy::{
    AttendancePolicy, GradingPolicy, DEFAULT_GOOD_STANDING_PERCENT, DEFAULT_PASS_PERCENT,
};
use crate::db;
use crate::ipc::helpers::{get_required_str, parse_auth, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use log::{info, warn};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Grading,
    Attendance,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "attendance" => Some(Self::Attendance),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Grading => "setup.grading",
            Self::Attendance => "setup.attendance",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Grading => json!({ "passPercent": DEFAULT_PASS_PERCENT }),
        SetupSection::Attendance => json!({ "goodStandingPercent": DEFAULT_GOOD_STANDING_PERCENT }),
    }
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Grading => match k.as_str() {
                "passPercent" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 0.0, 100.0)?));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
            SetupSection::Attendance => match k.as_str() {
                "goodStandingPercent" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 100)?));
                }
                _ => return Err(format!("unknown attendance field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                warn!("ignoring malformed saved {}: {}", section.key(), e);
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

/// Saved pass threshold, or the default when nothing usable is stored.
pub fn grading_policy(conn: &Connection) -> Result<GradingPolicy, HandlerErr> {
    let section = load_section(conn, SetupSection::Grading)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    Ok(section
        .get("passPercent")
        .and_then(|v| v.as_f64())
        .map(GradingPolicy::with_pass_percent)
        .unwrap_or_default())
}

pub fn attendance_policy(conn: &Connection) -> Result<AttendancePolicy, HandlerErr> {
    let section = load_section(conn, SetupSection::Attendance)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    Ok(section
        .get("goodStandingPercent")
        .and_then(|v| v.as_u64())
        .and_then(|n| u32::try_from(n).ok())
        .map(|good_standing_percent| AttendancePolicy {
            good_standing_percent,
        })
        .unwrap_or_default())
}

fn setup_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    parse_auth(params)?;
    let grading = load_section(conn, SetupSection::Grading)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let attendance = load_section(conn, SetupSection::Attendance)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    Ok(json!({
        "grading": grading,
        "attendance": attendance
    }))
}

fn setup_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    parse_auth(params)?.require_admin()?;
    let section_raw = get_required_str(params, "section")?;
    let Some(section) = SetupSection::parse(&section_raw) else {
        return Err(HandlerErr::bad_params("unknown section"));
    };
    let Some(patch_obj) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let mut current = load_section(conn, section)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    merge_section_patch(section, &mut current, patch_obj).map_err(HandlerErr::bad_params)?;
    db::settings_set_json(conn, section.key(), &current)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    info!("{} updated", section.key());
    Ok(json!({ "section": section_raw, "values": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(with_conn(state, req, setup_get)),
        "setup.update" => Some(with_conn(state, req, setup_update)),
        _ => None,
    }
}
