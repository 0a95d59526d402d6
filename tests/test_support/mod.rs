#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn spawn_sidecar() -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_erpd");
    let mut child = Command::new(exe)
        .env_remove("ERPD_WORKSPACE")
        .env("RUST_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn erpd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
    }
}

/// Spawns a sidecar with a fresh workspace already selected.
pub fn spawn_with_workspace(prefix: &str) -> (Sidecar, PathBuf) {
    let workspace = temp_dir(prefix);
    let mut sidecar = spawn_sidecar();
    sidecar.ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    (sidecar, workspace)
}

pub fn admin() -> serde_json::Value {
    json!({ "role": "admin", "userId": "admin-1" })
}

pub fn teacher() -> serde_json::Value {
    json!({ "role": "teacher", "userId": "teacher-1" })
}

pub fn as_student(id: &str) -> serde_json::Value {
    json!({ "role": "student", "userId": id })
}

pub fn as_parent(id: &str) -> serde_json::Value {
    json!({ "role": "parent", "userId": id })
}

impl Sidecar {
    pub fn write_line(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    /// Raw response envelope.
    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        let value = self.write_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(serde_json::Value::Null)
    }

    /// Asserts failure and returns the error code.
    pub fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }

    pub fn create_student(&mut self, roll: &str, semester: i64) -> String {
        self.create_student_in(roll, "Computer Engineering", semester)
    }

    pub fn create_student_in(&mut self, roll: &str, department: &str, semester: i64) -> String {
        let res = self.ok(
            "students.create",
            json!({
                "auth": admin(),
                "rollNumber": roll,
                "firstName": "Asha",
                "lastName": roll,
                "department": department,
                "semester": semester
            }),
        );
        res["student"]["id"].as_str().expect("student id").to_string()
    }

    pub fn create_subject(&mut self, code: &str, credits: f64) -> String {
        let res = self.ok(
            "subjects.create",
            json!({
                "auth": admin(),
                "code": code,
                "name": format!("Subject {}", code),
                "credits": credits
            }),
        );
        res["subject"]["id"].as_str().expect("subject id").to_string()
    }
}
