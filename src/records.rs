use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Leave,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" | "p" => Some(Self::Present),
            "absent" | "a" => Some(Self::Absent),
            "late" | "l" => Some(Self::Late),
            "leave" | "e" => Some(Self::Leave),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
            Self::Late => "Late",
            Self::Leave => "Leave",
        }
    }

    /// Late arrivals count as attended.
    pub fn is_attended(self) -> bool {
        matches!(self, Self::Present | Self::Late)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: String,
    pub subject_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkStatus {
    Pass,
    Fail,
}

/// A mark as read from the store. `grade` is only present when the entry
/// supplied a letter without usable numbers; otherwise it is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    pub student_id: String,
    pub subject_id: String,
    pub exam_type: String,
    pub marks_obtained: Option<f64>,
    pub max_marks: Option<f64>,
    pub semester: i64,
    pub academic_year: String,
    pub attempt_number: i64,
    pub credits: f64,
    pub grade: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Online,
    Cheque,
    #[serde(rename = "DD")]
    Dd,
    #[serde(rename = "UPI")]
    Upi,
    Card,
}

impl PaymentMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Some(Self::Cash),
            "online" => Some(Self::Online),
            "cheque" => Some(Self::Cheque),
            "dd" => Some(Self::Dd),
            "upi" => Some(Self::Upi),
            "card" => Some(Self::Card),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "Cash",
            Self::Online => "Online",
            Self::Cheque => "Cheque",
            Self::Dd => "DD",
            Self::Upi => "UPI",
            Self::Card => "Card",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub amount: f64,
    pub date: NaiveDate,
    pub method: PaymentMethod,
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeAssignment {
    pub id: String,
    pub student_id: String,
    pub fee_structure_id: String,
    pub total_amount: f64,
    pub academic_year: String,
    pub semester: i64,
    pub due_date: NaiveDate,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeStatus {
    Paid,
    Partial,
    Pending,
    Overdue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Cancelled => "Cancelled",
        }
    }
}

pub const LEAVE_TYPES: [&str; 6] = [
    "Sick Leave",
    "Casual Leave",
    "Emergency Leave",
    "Medical Leave",
    "Personal",
    "Other",
];

/// Canonical spelling of a leave type, matched case-insensitively.
pub fn canonical_leave_type(raw: &str) -> Option<&'static str> {
    let t = raw.trim();
    LEAVE_TYPES
        .iter()
        .copied()
        .find(|lt| lt.eq_ignore_ascii_case(t))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveApplication {
    pub id: String,
    pub student_id: String,
    pub applied_by: String,
    pub leave_type: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub reason: String,
    pub status: LeaveStatus,
    pub reviewed_by: Option<String>,
    pub review_remarks: Option<String>,
    pub reviewed_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub roll_number: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
    pub semester: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub code: String,
    pub name: String,
    pub credits: f64,
}

/// An attendance record joined with the student it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterAttendance {
    pub student: Student,
    pub record: AttendanceRecord,
}
