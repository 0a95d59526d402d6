use crate::records::{LeaveApplication, LeaveStatus};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeaveError {
    #[error("toDate must not be before fromDate")]
    InvertedRange,

    #[error("review decision must be Approved or Rejected")]
    InvalidDecision,

    #[error("leave application has already been {0}")]
    AlreadyFinal(&'static str),
}

/// Inclusive day count between two dates.
pub fn number_of_days(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days().abs() + 1
}

pub fn validate_range(from: NaiveDate, to: NaiveDate) -> Result<i64, LeaveError> {
    if to < from {
        return Err(LeaveError::InvertedRange);
    }
    Ok(number_of_days(from, to))
}

fn ensure_pending(app: &LeaveApplication) -> Result<(), LeaveError> {
    match app.status {
        LeaveStatus::Pending => Ok(()),
        LeaveStatus::Approved => Err(LeaveError::AlreadyFinal("approved")),
        LeaveStatus::Rejected => Err(LeaveError::AlreadyFinal("rejected")),
        LeaveStatus::Cancelled => Err(LeaveError::AlreadyFinal("cancelled")),
    }
}

pub fn review(
    app: &mut LeaveApplication,
    decision: LeaveStatus,
    reviewer: &str,
    remarks: Option<String>,
    on: NaiveDate,
) -> Result<(), LeaveError> {
    if !matches!(decision, LeaveStatus::Approved | LeaveStatus::Rejected) {
        return Err(LeaveError::InvalidDecision);
    }
    ensure_pending(app)?;
    app.status = decision;
    app.reviewed_by = Some(reviewer.to_string());
    app.review_remarks = remarks;
    app.reviewed_at = Some(on);
    Ok(())
}

pub fn cancel(app: &mut LeaveApplication) -> Result<(), LeaveError> {
    ensure_pending(app)?;
    app.status = LeaveStatus::Cancelled;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveSummary {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub cancelled: usize,
    /// Days covered by approved applications only.
    pub total_days: i64,
}

pub fn summarize_leaves(apps: &[LeaveApplication]) -> LeaveSummary {
    let mut s = LeaveSummary::default();
    for app in apps {
        match app.status {
            LeaveStatus::Pending => s.pending += 1,
            LeaveStatus::Approved => {
                s.approved += 1;
                s.total_days += number_of_days(app.from_date, app.to_date);
            }
            LeaveStatus::Rejected => s.rejected += 1,
            LeaveStatus::Cancelled => s.cancelled += 1,
        }
    }
    s
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveTypeCount {
    pub leave_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveMonth {
    /// `YYYY-MM` of the first day of leave.
    pub month: String,
    pub count: usize,
    pub approved: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveAnalytics {
    pub status_distribution: LeaveSummary,
    pub type_distribution: Vec<LeaveTypeCount>,
    pub monthly_trend: Vec<LeaveMonth>,
}

pub fn leave_analytics(apps: &[LeaveApplication]) -> LeaveAnalytics {
    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_month: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for app in apps {
        *by_type.entry(app.leave_type.as_str()).or_default() += 1;
        let month = by_month
            .entry(app.from_date.format("%Y-%m").to_string())
            .or_default();
        month.0 += 1;
        if app.status == LeaveStatus::Approved {
            month.1 += 1;
        }
    }

    LeaveAnalytics {
        status_distribution: summarize_leaves(apps),
        type_distribution: by_type
            .into_iter()
            .map(|(leave_type, count)| LeaveTypeCount {
                leave_type: leave_type.to_string(),
                count,
            })
            .collect(),
        monthly_trend: by_month
            .into_iter()
            .map(|(month, (count, approved))| LeaveMonth {
                month,
                count,
                approved,
            })
            .collect(),
    }
}
