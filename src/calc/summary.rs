use crate::calc::attendance::{below_good_standing, summarize_attendance, AttendanceSummary};
use crate::calc::fees::{summarize_fees, FeeTotals};
use crate::calc::grades::{summarize_grades, GradeTotals};
use crate::calc::leave::summarize_leaves;
use crate::calc::policy::{AttendancePolicy, GradingPolicy};
use crate::store::{AttendanceFilter, RecordStore, StoreError, TermFilter};
use chrono::NaiveDate;
use log::warn;
use serde::Serialize;

/// The dashboard payload every role view consumes for one student.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub student_id: String,
    pub attendance: AttendanceSummary,
    pub below_attendance_threshold: bool,
    pub fees: FeeTotals,
    pub grades: GradeTotals,
    pub pending_leaves: usize,
    /// Sections that fell back to zero values because their fetch failed.
    pub unavailable: Vec<&'static str>,
}

fn section<T, R>(
    name: &'static str,
    student_id: &str,
    fetched: Result<R, StoreError>,
    compute: impl FnOnce(R) -> T,
    unavailable: &mut Vec<&'static str>,
) -> T
where
    T: Default,
{
    match fetched {
        Ok(records) => compute(records),
        Err(e) => {
            warn!(
                "summary section {} unavailable for student {}: {}",
                name, student_id, e
            );
            unavailable.push(name);
            T::default()
        }
    }
}

pub fn student_summary<S: RecordStore + ?Sized>(
    store: &S,
    student_id: &str,
    grading: &GradingPolicy,
    attendance_policy: &AttendancePolicy,
    as_of: NaiveDate,
) -> StudentSummary {
    let mut unavailable = Vec::new();

    let attendance = section(
        "attendance",
        student_id,
        store.attendance_for(student_id, &AttendanceFilter::default()),
        |records| summarize_attendance(records.iter().map(|r| r.status)),
        &mut unavailable,
    );
    let fees = section(
        "fees",
        student_id,
        store.fees_for(student_id, &TermFilter::default()),
        |records| summarize_fees(&records, as_of).totals,
        &mut unavailable,
    );
    let grades = section(
        "grades",
        student_id,
        store.marks_for(student_id, &TermFilter::default()),
        |records| summarize_grades(&records, grading).totals(),
        &mut unavailable,
    );
    let pending_leaves = section(
        "leave",
        student_id,
        store.leaves_for(student_id),
        |records| summarize_leaves(&records).pending,
        &mut unavailable,
    );

    StudentSummary {
        student_id: student_id.to_string(),
        below_attendance_threshold: below_good_standing(&attendance, attendance_policy),
        attendance,
        fees,
        grades,
        pending_leaves,
        unavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{
        AttendanceRecord, AttendanceStatus, FeeAssignment, LeaveApplication, LeaveStatus,
        MarkRecord, Payment, PaymentMethod,
    };
    use pretty_assertions::assert_eq;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).expect("valid date")
    }

    #[derive(Default)]
    struct MemoryStore {
        attendance: Vec<AttendanceRecord>,
        marks: Vec<MarkRecord>,
        fees: Vec<FeeAssignment>,
        leaves: Vec<LeaveApplication>,
        failing_fees: bool,
        failing_marks: bool,
    }

    impl RecordStore for MemoryStore {
        fn attendance_for(
            &self,
            student_id: &str,
            _filter: &AttendanceFilter,
        ) -> Result<Vec<AttendanceRecord>, StoreError> {
            Ok(self
                .attendance
                .iter()
                .filter(|r| r.student_id == student_id)
                .cloned()
                .collect())
        }

        fn marks_for(
            &self,
            student_id: &str,
            _filter: &TermFilter,
        ) -> Result<Vec<MarkRecord>, StoreError> {
            if self.failing_marks {
                return Err(StoreError::NotFound("marks table".into()));
            }
            Ok(self
                .marks
                .iter()
                .filter(|m| m.student_id == student_id)
                .cloned()
                .collect())
        }

        fn fees_for(
            &self,
            student_id: &str,
            _filter: &TermFilter,
        ) -> Result<Vec<FeeAssignment>, StoreError> {
            if self.failing_fees {
                return Err(StoreError::NotFound("fee_assignments table".into()));
            }
            Ok(self
                .fees
                .iter()
                .filter(|f| f.student_id == student_id)
                .cloned()
                .collect())
        }

        fn leaves_for(&self, student_id: &str) -> Result<Vec<LeaveApplication>, StoreError> {
            Ok(self
                .leaves
                .iter()
                .filter(|l| l.student_id == student_id)
                .cloned()
                .collect())
        }
    }

    fn summarize(store: &MemoryStore, student_id: &str) -> StudentSummary {
        student_summary(
            store,
            student_id,
            &GradingPolicy::default(),
            &AttendancePolicy::default(),
            day(8, 31),
        )
    }

    fn populated() -> MemoryStore {
        let attendance = (1..=10)
            .map(|d| AttendanceRecord {
                student_id: "s1".into(),
                subject_id: "cs301".into(),
                date: day(8, d),
                status: if d <= 8 {
                    AttendanceStatus::Present
                } else {
                    AttendanceStatus::Absent
                },
            })
            .collect();
        let marks = vec![MarkRecord {
            student_id: "s1".into(),
            subject_id: "cs301".into(),
            exam_type: "End-Term".into(),
            marks_obtained: Some(78.0),
            max_marks: Some(100.0),
            semester: 5,
            academic_year: "2024-25".into(),
            attempt_number: 1,
            credits: 4.0,
            grade: None,
        }];
        let fees = vec![FeeAssignment {
            id: "f1".into(),
            student_id: "s1".into(),
            fee_structure_id: "tuition".into(),
            total_amount: 5000.0,
            academic_year: "2024-25".into(),
            semester: 5,
            due_date: day(9, 30),
            payments: vec![Payment {
                amount: 2500.0,
                date: day(7, 1),
                method: PaymentMethod::Cash,
                transaction_id: "TXN1".into(),
            }],
        }];
        let leaves = vec![LeaveApplication {
            id: "l1".into(),
            student_id: "s1".into(),
            applied_by: "s1".into(),
            leave_type: "Sick Leave".into(),
            from_date: day(8, 20),
            to_date: day(8, 21),
            reason: "fever".into(),
            status: LeaveStatus::Pending,
            reviewed_by: None,
            review_remarks: None,
            reviewed_at: None,
        }];
        MemoryStore {
            attendance,
            marks,
            fees,
            leaves,
            ..MemoryStore::default()
        }
    }

    #[test]
    fn composes_every_section() {
        let store = populated();
        let s = summarize(&store, "s1");
        assert_eq!(s.attendance.total, 10);
        assert_eq!(s.attendance.percentage, 80);
        assert_eq!(
            s.fees,
            FeeTotals {
                total: 5000.0,
                paid: 2500.0,
                due: 2500.0,
            }
        );
        assert_eq!(s.grades.cgpa, Some(9.0));
        assert_eq!(s.grades.total_credits, 4.0);
        assert_eq!(s.grades.backlog_count, 0);
        assert_eq!(s.pending_leaves, 1);
        assert!(!s.below_attendance_threshold);
        assert!(s.unavailable.is_empty());

        let strict = AttendancePolicy {
            good_standing_percent: 85,
        };
        let s = student_summary(&store, "s1", &GradingPolicy::default(), &strict, day(8, 31));
        assert!(s.below_attendance_threshold);
    }

    #[test]
    fn failed_fetch_degrades_only_that_section() {
        let store = MemoryStore {
            failing_fees: true,
            ..populated()
        };
        let s = summarize(&store, "s1");
        assert_eq!(s.fees, FeeTotals::default());
        assert_eq!(s.unavailable, vec!["fees"]);
        assert_eq!(s.attendance.percentage, 80);
        assert_eq!(s.grades.cgpa, Some(9.0));
        assert_eq!(s.pending_leaves, 1);

        let store = MemoryStore {
            failing_fees: true,
            failing_marks: true,
            ..populated()
        };
        let s = summarize(&store, "s1");
        assert_eq!(s.unavailable, vec!["fees", "grades"]);
        assert_eq!(s.grades, GradeTotals::default());
    }

    #[test]
    fn unknown_student_gets_zero_summary() {
        let store = populated();
        let s = summarize(&store, "nobody");
        assert_eq!(s.attendance, AttendanceSummary::default());
        assert_eq!(s.fees, FeeTotals::default());
        assert_eq!(s.grades.cgpa, None);
        assert_eq!(s.pending_leaves, 0);
        assert!(!s.below_attendance_threshold);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let store = populated();
        let a = summarize(&store, "s1");
        let b = summarize(&store, "s1");
        assert_eq!(a, b);
    }
}
