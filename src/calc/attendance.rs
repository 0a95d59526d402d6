use crate::calc::policy::AttendancePolicy;
use crate::calc::{round_2, whole_percent};
use crate::records::{AttendanceRecord, AttendanceStatus, RosterAttendance};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total: usize,
    /// Present plus Late.
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub leave: usize,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAttendance {
    pub subject_id: String,
    #[serde(flatten)]
    pub summary: AttendanceSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceReport {
    pub overall: AttendanceSummary,
    pub subjects: Vec<SubjectAttendance>,
}

pub fn summarize_attendance<I>(statuses: I) -> AttendanceSummary
where
    I: IntoIterator<Item = AttendanceStatus>,
{
    let mut s = AttendanceSummary::default();
    for status in statuses {
        s.total += 1;
        if status.is_attended() {
            s.present += 1;
        }
        match status {
            AttendanceStatus::Present => {}
            AttendanceStatus::Absent => s.absent += 1,
            AttendanceStatus::Late => s.late += 1,
            AttendanceStatus::Leave => s.leave += 1,
        }
    }
    s.percentage = whole_percent(s.present, s.total);
    s
}

/// An empty history is never flagged.
pub fn below_good_standing(summary: &AttendanceSummary, policy: &AttendancePolicy) -> bool {
    summary.total > 0 && policy.is_below_threshold(summary.percentage)
}

/// Overall summary plus one row per subject, ordered by subject id.
pub fn attendance_report(records: &[AttendanceRecord]) -> AttendanceReport {
    let mut by_subject: BTreeMap<&str, Vec<AttendanceStatus>> = BTreeMap::new();
    for r in records {
        by_subject
            .entry(r.subject_id.as_str())
            .or_default()
            .push(r.status);
    }

    let subjects = by_subject
        .into_iter()
        .map(|(subject_id, statuses)| SubjectAttendance {
            subject_id: subject_id.to_string(),
            summary: summarize_attendance(statuses),
        })
        .collect();

    AttendanceReport {
        overall: summarize_attendance(records.iter().map(|r| r.status)),
        subjects,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRate {
    pub total: usize,
    pub present: usize,
    /// Two decimals, unlike the whole-number student percentage.
    pub percentage: f64,
}

impl AttendanceRate {
    fn add(&mut self, status: AttendanceStatus) {
        self.total += 1;
        if status.is_attended() {
            self.present += 1;
        }
    }

    fn finish(mut self) -> Self {
        self.percentage = if self.total == 0 {
            0.0
        } else {
            round_2((100.0 * self.present as f64 / self.total as f64).clamp(0.0, 100.0))
        };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAttendance {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub rate: AttendanceRate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentAttendance {
    pub department: String,
    #[serde(flatten)]
    pub rate: AttendanceRate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceAnalytics {
    pub overall: AttendanceSummary,
    pub daily_trend: Vec<DailyAttendance>,
    pub department_wise: Vec<DepartmentAttendance>,
}

/// Cohort-wide view: one rate per day (oldest first) and per department
/// (alphabetical).
pub fn attendance_analytics(rows: &[RosterAttendance]) -> AttendanceAnalytics {
    let mut by_day: BTreeMap<NaiveDate, AttendanceRate> = BTreeMap::new();
    let mut by_department: BTreeMap<&str, AttendanceRate> = BTreeMap::new();
    for row in rows {
        let status = row.record.status;
        by_day.entry(row.record.date).or_default().add(status);
        by_department
            .entry(row.student.department.as_str())
            .or_default()
            .add(status);
    }

    AttendanceAnalytics {
        overall: summarize_attendance(rows.iter().map(|r| r.record.status)),
        daily_trend: by_day
            .into_iter()
            .map(|(date, rate)| DailyAttendance {
                date,
                rate: rate.finish(),
            })
            .collect(),
        department_wise: by_department
            .into_iter()
            .map(|(department, rate)| DepartmentAttendance {
                department: department.to_string(),
                rate: rate.finish(),
            })
            .collect(),
    }
}
