use crate::auth::WardDirectory;
use crate::records::{
    AttendanceRecord, AttendanceStatus, FeeAssignment, LeaveApplication, LeaveStatus, MarkRecord,
    Payment, PaymentMethod, RosterAttendance, Student, Subject,
};
use chrono::NaiveDate;
use log::warn;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

pub const DATE_FMT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FMT).ok()
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(f, _) => {
            f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub subject_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl AttendanceFilter {
    // ISO dates compare correctly as text.
    fn append_to(&self, alias: &str, sql: &mut String, binds: &mut Vec<Value>) {
        if let Some(subject_id) = &self.subject_id {
            sql.push_str(&format!(" AND {}subject_id = ?", alias));
            binds.push(Value::Text(subject_id.clone()));
        }
        if let Some(from) = self.from {
            sql.push_str(&format!(" AND {}date >= ?", alias));
            binds.push(Value::Text(format_date(from)));
        }
        if let Some(to) = self.to {
            sql.push_str(&format!(" AND {}date <= ?", alias));
            binds.push(Value::Text(format_date(to)));
        }
    }
}

/// Academic year / semester scoping shared by marks and fees.
#[derive(Debug, Clone, Default)]
pub struct TermFilter {
    pub academic_year: Option<String>,
    pub semester: Option<i64>,
}

impl TermFilter {
    fn append_to(&self, alias: &str, sql: &mut String, binds: &mut Vec<Value>) {
        if let Some(year) = &self.academic_year {
            sql.push_str(&format!(" AND {}academic_year = ?", alias));
            binds.push(Value::Text(year.clone()));
        }
        if let Some(semester) = self.semester {
            sql.push_str(&format!(" AND {}semester = ?", alias));
            binds.push(Value::Integer(semester));
        }
    }
}

/// Students of one department and/or current semester, for workspace-wide
/// reads.
#[derive(Debug, Clone, Default)]
pub struct CohortFilter {
    pub department: Option<String>,
    pub semester: Option<i64>,
}

impl CohortFilter {
    /// Restricts `column` (a student id) to the cohort.
    fn append_to(&self, column: &str, sql: &mut String, binds: &mut Vec<Value>) {
        let mut conds = Vec::new();
        if let Some(department) = &self.department {
            conds.push("department = ?");
            binds.push(Value::Text(department.clone()));
        }
        if let Some(semester) = self.semester {
            conds.push("semester = ?");
            binds.push(Value::Integer(semester));
        }
        if !conds.is_empty() {
            sql.push_str(&format!(
                " AND {} IN (SELECT id FROM students WHERE {})",
                column,
                conds.join(" AND ")
            ));
        }
    }
}

/// Per-student reads the aggregators consume. Every method returns records
/// scoped to exactly one student.
pub trait RecordStore {
    fn attendance_for(
        &self,
        student_id: &str,
        filter: &AttendanceFilter,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;

    fn marks_for(&self, student_id: &str, filter: &TermFilter)
        -> Result<Vec<MarkRecord>, StoreError>;

    fn fees_for(
        &self,
        student_id: &str,
        filter: &TermFilter,
    ) -> Result<Vec<FeeAssignment>, StoreError>;

    fn leaves_for(&self, student_id: &str) -> Result<Vec<LeaveApplication>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub roll_number: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
    pub semester: i64,
}

#[derive(Debug, Clone)]
pub struct NewFee {
    pub student_id: String,
    pub fee_structure_id: String,
    pub total_amount: f64,
    pub academic_year: String,
    pub semester: i64,
    pub due_date: NaiveDate,
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert_student(&self, s: &NewStudent) -> Result<Student, StoreError> {
        let id = Uuid::new_v4().to_string();
        let res = self.conn.execute(
            "INSERT INTO students(id, roll_number, first_name, last_name, department, semester, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &s.roll_number,
                &s.first_name,
                &s.last_name,
                &s.department,
                s.semester,
                now_stamp(),
            ),
        );
        match res {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Duplicate(format!(
                    "roll number {}",
                    s.roll_number
                )))
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Student {
            id,
            roll_number: s.roll_number.clone(),
            first_name: s.first_name.clone(),
            last_name: s.last_name.clone(),
            department: s.department.clone(),
            semester: s.semester,
        })
    }

    pub fn student(&self, id: &str) -> Result<Option<Student>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, roll_number, first_name, last_name, department, semester
                 FROM students WHERE id = ?",
                [id],
                |r| {
                    Ok(Student {
                        id: r.get(0)?,
                        roll_number: r.get(1)?,
                        first_name: r.get(2)?,
                        last_name: r.get(3)?,
                        department: r.get(4)?,
                        semester: r.get(5)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn list_students(&self, ids: Option<&[String]>) -> Result<Vec<Student>, StoreError> {
        let mut sql = String::from(
            "SELECT id, roll_number, first_name, last_name, department, semester FROM students",
        );
        let mut binds: Vec<Value> = Vec::new();
        if let Some(ids) = ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = std::iter::repeat("?")
                .take(ids.len())
                .collect::<Vec<_>>()
                .join(",");
            sql.push_str(&format!(" WHERE id IN ({})", placeholders));
            binds.extend(ids.iter().map(|id| Value::Text(id.clone())));
        }
        sql.push_str(" ORDER BY roll_number");
        let mut stmt = self.conn.prepare(&sql)?;
        let students = stmt
            .query_map(params_from_iter(binds), |r| {
                Ok(Student {
                    id: r.get(0)?,
                    roll_number: r.get(1)?,
                    first_name: r.get(2)?,
                    last_name: r.get(3)?,
                    department: r.get(4)?,
                    semester: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(students)
    }

    pub fn insert_subject(&self, code: &str, name: &str, credits: f64) -> Result<Subject, StoreError> {
        let id = Uuid::new_v4().to_string();
        match self.conn.execute(
            "INSERT INTO subjects(id, code, name, credits) VALUES(?, ?, ?, ?)",
            (&id, code, name, credits),
        ) {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Duplicate(format!("subject code {}", code)))
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Subject {
            id,
            code: code.to_string(),
            name: name.to_string(),
            credits,
        })
    }

    pub fn subject(&self, id: &str) -> Result<Option<Subject>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, code, name, credits FROM subjects WHERE id = ?",
                [id],
                |r| {
                    Ok(Subject {
                        id: r.get(0)?,
                        code: r.get(1)?,
                        name: r.get(2)?,
                        credits: r.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn list_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, code, name, credits FROM subjects ORDER BY code")?;
        let subjects = stmt
            .query_map([], |r| {
                Ok(Subject {
                    id: r.get(0)?,
                    code: r.get(1)?,
                    name: r.get(2)?,
                    credits: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(subjects)
    }

    /// Linking the same pair twice is a no-op.
    pub fn link_parent(&self, parent_id: &str, student_id: &str) -> Result<bool, StoreError> {
        let n = self.conn.execute(
            "INSERT OR IGNORE INTO parent_students(parent_id, student_id) VALUES(?, ?)",
            (parent_id, student_id),
        )?;
        Ok(n > 0)
    }

    /// Inserts the whole batch or nothing.
    pub fn mark_attendance(
        &self,
        records: &[AttendanceRecord],
        marked_by: &str,
    ) -> Result<usize, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO attendance(id, student_id, subject_id, date, status, marked_by, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
            )?;
            for r in records {
                let res = stmt.execute((
                    Uuid::new_v4().to_string(),
                    &r.student_id,
                    &r.subject_id,
                    format_date(r.date),
                    r.status.as_str(),
                    marked_by,
                    now_stamp(),
                ));
                match res {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => {
                        return Err(StoreError::Duplicate(format!(
                            "attendance for student {} subject {} on {}",
                            r.student_id,
                            r.subject_id,
                            format_date(r.date)
                        )))
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Rewrites the status of an existing record and returns the previous status.
    pub fn correct_attendance(
        &self,
        student_id: &str,
        subject_id: &str,
        date: NaiveDate,
        status: AttendanceStatus,
        remarks: Option<&str>,
        corrected_by: &str,
    ) -> Result<String, StoreError> {
        let day = format_date(date);
        let previous: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM attendance WHERE student_id = ? AND subject_id = ? AND date = ?",
                (student_id, subject_id, &day),
                |r| r.get(0),
            )
            .optional()?;
        let Some(previous) = previous else {
            return Err(StoreError::NotFound("attendance record".into()));
        };
        self.conn.execute(
            "UPDATE attendance
             SET status = ?, remarks = ?, corrected_by = ?, corrected_at = ?
             WHERE student_id = ? AND subject_id = ? AND date = ?",
            (
                status.as_str(),
                remarks,
                corrected_by,
                now_stamp(),
                student_id,
                subject_id,
                &day,
            ),
        )?;
        Ok(previous)
    }

    /// Insert or overwrite the mark for (student, subject, exam, year, attempt).
    pub fn upsert_mark(&self, m: &MarkRecord, entered_by: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO marks(id, student_id, subject_id, exam_type, semester, academic_year,
                               attempt_number, marks_obtained, max_marks, grade, entered_by, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, subject_id, exam_type, academic_year, attempt_number)
             DO UPDATE SET semester = excluded.semester,
                           marks_obtained = excluded.marks_obtained,
                           max_marks = excluded.max_marks,
                           grade = excluded.grade,
                           entered_by = excluded.entered_by,
                           updated_at = excluded.updated_at",
            (
                Uuid::new_v4().to_string(),
                &m.student_id,
                &m.subject_id,
                &m.exam_type,
                m.semester,
                &m.academic_year,
                m.attempt_number,
                m.marks_obtained,
                m.max_marks,
                m.grade.as_deref(),
                entered_by,
                now_stamp(),
            ),
        )?;
        Ok(())
    }

    pub fn insert_fee(&self, f: &NewFee) -> Result<FeeAssignment, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO fee_assignments(id, student_id, fee_structure_id, total_amount,
                                         academic_year, semester, due_date, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &f.student_id,
                &f.fee_structure_id,
                f.total_amount,
                &f.academic_year,
                f.semester,
                format_date(f.due_date),
                now_stamp(),
            ),
        )?;
        Ok(FeeAssignment {
            id,
            student_id: f.student_id.clone(),
            fee_structure_id: f.fee_structure_id.clone(),
            total_amount: f.total_amount,
            academic_year: f.academic_year.clone(),
            semester: f.semester,
            due_date: f.due_date,
            payments: Vec::new(),
        })
    }

    pub fn fee(&self, fee_id: &str) -> Result<Option<FeeAssignment>, StoreError> {
        let fees = self.query_fees(" WHERE id = ?", vec![Value::Text(fee_id.to_string())])?;
        Ok(fees.into_iter().next())
    }

    /// Every assignment across students whose due date lies before `as_of`.
    pub fn fees_due_before(&self, as_of: NaiveDate) -> Result<Vec<FeeAssignment>, StoreError> {
        self.query_fees(
            " WHERE due_date < ?",
            vec![Value::Text(format_date(as_of))],
        )
    }

    pub fn insert_payment(
        &self,
        fee_id: &str,
        payment: &Payment,
        processed_by: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO payments(id, fee_id, amount, paid_on, method, transaction_id, processed_by)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                fee_id,
                payment.amount,
                format_date(payment.date),
                payment.method.as_str(),
                &payment.transaction_id,
                processed_by,
            ),
        )?;
        Ok(())
    }

    fn query_fees(&self, where_sql: &str, binds: Vec<Value>) -> Result<Vec<FeeAssignment>, StoreError> {
        let sql = format!(
            "SELECT id, student_id, fee_structure_id, total_amount, academic_year, semester, due_date
             FROM fee_assignments{}
             ORDER BY due_date, created_at",
            where_sql
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(binds), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, f64>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, i64>(5)?,
                    r.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut payments_stmt = self.conn.prepare(
            "SELECT amount, paid_on, method, transaction_id
             FROM payments WHERE fee_id = ?
             ORDER BY paid_on, rowid",
        )?;
        let mut out = Vec::with_capacity(rows.len());
        for (id, student_id, fee_structure_id, total_amount, academic_year, semester, due_raw) in rows
        {
            let Some(due_date) = parse_date(&due_raw) else {
                warn!("skipping fee {} with malformed due date {:?}", id, due_raw);
                continue;
            };
            let raw_payments = payments_stmt
                .query_map([&id], |r| {
                    Ok((
                        r.get::<_, f64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            let mut payments = Vec::with_capacity(raw_payments.len());
            for (amount, paid_on, method, transaction_id) in raw_payments {
                let (Some(date), Some(method)) = (parse_date(&paid_on), PaymentMethod::parse(&method))
                else {
                    warn!("skipping malformed payment {} on fee {}", transaction_id, id);
                    continue;
                };
                payments.push(Payment {
                    amount,
                    date,
                    method,
                    transaction_id,
                });
            }
            out.push(FeeAssignment {
                id,
                student_id,
                fee_structure_id,
                total_amount,
                academic_year,
                semester,
                due_date,
                payments,
            });
        }
        Ok(out)
    }

    /// Fee assignments of a whole cohort, payments included.
    pub fn fees_for_cohort(
        &self,
        cohort: &CohortFilter,
        term: &TermFilter,
    ) -> Result<Vec<FeeAssignment>, StoreError> {
        let mut where_sql = String::from(" WHERE 1 = 1");
        let mut binds: Vec<Value> = Vec::new();
        cohort.append_to("student_id", &mut where_sql, &mut binds);
        term.append_to("", &mut where_sql, &mut binds);
        self.query_fees(&where_sql, binds)
    }

    pub fn marks_for_cohort(
        &self,
        cohort: &CohortFilter,
        term: &TermFilter,
    ) -> Result<Vec<MarkRecord>, StoreError> {
        let mut where_sql = String::from(" WHERE 1 = 1");
        let mut binds: Vec<Value> = Vec::new();
        cohort.append_to("m.student_id", &mut where_sql, &mut binds);
        term.append_to("m.", &mut where_sql, &mut binds);
        self.query_marks(&where_sql, binds)
    }

    fn query_marks(&self, where_sql: &str, binds: Vec<Value>) -> Result<Vec<MarkRecord>, StoreError> {
        let sql = format!(
            "SELECT m.student_id, m.subject_id, m.exam_type, m.marks_obtained, m.max_marks,
                    m.semester, m.academic_year, m.attempt_number, s.credits, m.grade
             FROM marks m
             JOIN subjects s ON s.id = m.subject_id{}
             ORDER BY m.student_id, m.semester, s.code, m.exam_type, m.attempt_number",
            where_sql
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let marks = stmt
            .query_map(params_from_iter(binds), |r| {
                Ok(MarkRecord {
                    student_id: r.get(0)?,
                    subject_id: r.get(1)?,
                    exam_type: r.get(2)?,
                    marks_obtained: r.get(3)?,
                    max_marks: r.get(4)?,
                    semester: r.get(5)?,
                    academic_year: r.get(6)?,
                    attempt_number: r.get(7)?,
                    credits: r.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
                    grade: r.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(marks)
    }

    /// Attendance across students, each row joined with its student,
    /// ordered by roll number then date.
    pub fn roster_attendance(
        &self,
        cohort: &CohortFilter,
        filter: &AttendanceFilter,
    ) -> Result<Vec<RosterAttendance>, StoreError> {
        let mut sql = String::from(
            "SELECT a.student_id, a.subject_id, a.date, a.status,
                    s.roll_number, s.first_name, s.last_name, s.department, s.semester
             FROM attendance a
             JOIN students s ON s.id = a.student_id
             WHERE 1 = 1",
        );
        let mut binds: Vec<Value> = Vec::new();
        cohort.append_to("a.student_id", &mut sql, &mut binds);
        filter.append_to("a.", &mut sql, &mut binds);
        sql.push_str(" ORDER BY s.roll_number, a.date, a.subject_id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(binds), |r| {
                Ok((
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    Student {
                        id: r.get(0)?,
                        roll_number: r.get(4)?,
                        first_name: r.get(5)?,
                        last_name: r.get(6)?,
                        department: r.get(7)?,
                        semester: r.get(8)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (subject_id, date_raw, status_raw, student) in rows {
            let (Some(date), Some(status)) =
                (parse_date(&date_raw), AttendanceStatus::parse(&status_raw))
            else {
                warn!(
                    "skipping malformed attendance row for student {} ({:?}, {:?})",
                    student.id, date_raw, status_raw
                );
                continue;
            };
            out.push(RosterAttendance {
                record: AttendanceRecord {
                    student_id: student.id.clone(),
                    subject_id,
                    date,
                    status,
                },
                student,
            });
        }
        Ok(out)
    }

    pub fn insert_leave(&self, app: &LeaveApplication) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO leave_applications(id, student_id, applied_by, leave_type, from_date, to_date,
                                            reason, status, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &app.id,
                &app.student_id,
                &app.applied_by,
                &app.leave_type,
                format_date(app.from_date),
                format_date(app.to_date),
                &app.reason,
                app.status.as_str(),
                now_stamp(),
            ),
        )?;
        Ok(())
    }

    pub fn leave(&self, id: &str) -> Result<Option<LeaveApplication>, StoreError> {
        let apps = self.query_leaves(" WHERE id = ?", vec![Value::Text(id.to_string())])?;
        Ok(apps.into_iter().next())
    }

    pub fn pending_leaves(&self) -> Result<Vec<LeaveApplication>, StoreError> {
        self.query_leaves(" WHERE status = 'Pending'", Vec::new())
    }

    pub fn all_leaves(&self) -> Result<Vec<LeaveApplication>, StoreError> {
        self.query_leaves("", Vec::new())
    }

    /// Persists status and review fields of an application read earlier.
    pub fn save_leave_status(&self, app: &LeaveApplication) -> Result<(), StoreError> {
        let n = self.conn.execute(
            "UPDATE leave_applications
             SET status = ?, reviewed_by = ?, review_remarks = ?, reviewed_at = ?
             WHERE id = ?",
            (
                app.status.as_str(),
                app.reviewed_by.as_deref(),
                app.review_remarks.as_deref(),
                app.reviewed_at.map(format_date),
                &app.id,
            ),
        )?;
        if n == 0 {
            return Err(StoreError::NotFound("leave application".into()));
        }
        Ok(())
    }

    fn query_leaves(
        &self,
        where_sql: &str,
        binds: Vec<Value>,
    ) -> Result<Vec<LeaveApplication>, StoreError> {
        let sql = format!(
            "SELECT id, student_id, applied_by, leave_type, from_date, to_date, reason, status,
                    reviewed_by, review_remarks, reviewed_at
             FROM leave_applications{}
             ORDER BY created_at, rowid",
            where_sql
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(binds), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, String>(7)?,
                    r.get::<_, Option<String>>(8)?,
                    r.get::<_, Option<String>>(9)?,
                    r.get::<_, Option<String>>(10)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (
            id,
            student_id,
            applied_by,
            leave_type,
            from_raw,
            to_raw,
            reason,
            status_raw,
            reviewed_by,
            review_remarks,
            reviewed_at,
        ) in rows
        {
            let (Some(from_date), Some(to_date), Some(status)) = (
                parse_date(&from_raw),
                parse_date(&to_raw),
                LeaveStatus::parse(&status_raw),
            ) else {
                warn!("skipping malformed leave application {}", id);
                continue;
            };
            out.push(LeaveApplication {
                id,
                student_id,
                applied_by,
                leave_type,
                from_date,
                to_date,
                reason,
                status,
                reviewed_by,
                review_remarks,
                reviewed_at: reviewed_at.as_deref().and_then(parse_date),
            });
        }
        Ok(out)
    }
}

impl RecordStore for SqliteStore<'_> {
    fn attendance_for(
        &self,
        student_id: &str,
        filter: &AttendanceFilter,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut sql = String::from(
            "SELECT subject_id, date, status FROM attendance WHERE student_id = ?",
        );
        let mut binds: Vec<Value> = vec![Value::Text(student_id.to_string())];
        filter.append_to("", &mut sql, &mut binds);
        sql.push_str(" ORDER BY date DESC, subject_id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(binds), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (subject_id, date_raw, status_raw) in rows {
            let (Some(date), Some(status)) =
                (parse_date(&date_raw), AttendanceStatus::parse(&status_raw))
            else {
                warn!(
                    "skipping malformed attendance row for student {} ({:?}, {:?})",
                    student_id, date_raw, status_raw
                );
                continue;
            };
            out.push(AttendanceRecord {
                student_id: student_id.to_string(),
                subject_id,
                date,
                status,
            });
        }
        Ok(out)
    }

    fn marks_for(
        &self,
        student_id: &str,
        filter: &TermFilter,
    ) -> Result<Vec<MarkRecord>, StoreError> {
        let mut where_sql = String::from(" WHERE m.student_id = ?");
        let mut binds: Vec<Value> = vec![Value::Text(student_id.to_string())];
        filter.append_to("m.", &mut where_sql, &mut binds);
        self.query_marks(&where_sql, binds)
    }

    fn fees_for(
        &self,
        student_id: &str,
        filter: &TermFilter,
    ) -> Result<Vec<FeeAssignment>, StoreError> {
        let mut where_sql = String::from(" WHERE student_id = ?");
        let mut binds: Vec<Value> = vec![Value::Text(student_id.to_string())];
        filter.append_to("", &mut where_sql, &mut binds);
        self.query_fees(&where_sql, binds)
    }

    fn leaves_for(&self, student_id: &str) -> Result<Vec<LeaveApplication>, StoreError> {
        self.query_leaves(
            " WHERE student_id = ?",
            vec![Value::Text(student_id.to_string())],
        )
    }
}

impl WardDirectory for SqliteStore<'_> {
    fn wards_of(&self, parent_id: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT student_id FROM parent_students WHERE parent_id = ? ORDER BY student_id",
        )?;
        let ids = stmt
            .query_map([parent_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}
