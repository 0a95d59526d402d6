use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("erp.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            roll_number TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            department TEXT NOT NULL,
            semester INTEGER NOT NULL,
            created_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            credits REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS parent_students(
            parent_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            PRIMARY KEY(parent_id, student_id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            remarks TEXT,
            marked_by TEXT NOT NULL,
            created_at TEXT,
            corrected_by TEXT,
            corrected_at TEXT,
            UNIQUE(student_id, subject_id, date),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student_date ON attendance(student_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            exam_type TEXT NOT NULL,
            semester INTEGER NOT NULL,
            academic_year TEXT NOT NULL,
            attempt_number INTEGER NOT NULL DEFAULT 1,
            marks_obtained REAL,
            max_marks REAL,
            grade TEXT,
            entered_by TEXT,
            updated_at TEXT,
            UNIQUE(student_id, subject_id, exam_type, academic_year, attempt_number),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student_semester ON marks(student_id, semester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_assignments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            fee_structure_id TEXT NOT NULL,
            total_amount REAL NOT NULL,
            academic_year TEXT NOT NULL,
            semester INTEGER NOT NULL,
            due_date TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_assignments_student ON fee_assignments(student_id, academic_year, semester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments(
            id TEXT PRIMARY KEY,
            fee_id TEXT NOT NULL,
            amount REAL NOT NULL,
            paid_on TEXT NOT NULL,
            method TEXT NOT NULL,
            transaction_id TEXT NOT NULL UNIQUE,
            processed_by TEXT,
            FOREIGN KEY(fee_id) REFERENCES fee_assignments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_fee ON payments(fee_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS leave_applications(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            applied_by TEXT NOT NULL,
            leave_type TEXT NOT NULL,
            from_date TEXT NOT NULL,
            to_date TEXT NOT NULL,
            reason TEXT NOT NULL,
            status TEXT NOT NULL,
            reviewed_by TEXT,
            review_remarks TEXT,
            reviewed_at TEXT,
            created_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_leave_student_status ON leave_applications(student_id, status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workspace_settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM workspace_settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO workspace_settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
