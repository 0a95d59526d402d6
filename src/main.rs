mod auth;
mod calc;
mod db;
mod ipc;
mod records;
mod store;

use env_logger::Env;
use log::{error, info, warn};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

fn open_startup_workspace(state: &mut ipc::AppState) {
    let Some(path) = std::env::var_os("ERPD_WORKSPACE")
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
    else {
        return;
    };
    match db::open_db(&path) {
        Ok(conn) => {
            info!("workspace opened at {}", path.display());
            state.workspace = Some(path);
            state.db = Some(conn);
        }
        // The host can still send workspace.select.
        Err(e) => warn!("could not open ERPD_WORKSPACE {}: {:?}", path.display(), e),
    }
}

fn main() {
    // stdout carries the protocol; env_logger writes to stderr.
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    open_startup_workspace(&mut state);
    info!("erpd {} ready", env!("CARGO_PKG_VERSION"));

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                error!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                warn!("rejecting malformed request line: {}", e);
                let id = serde_json::from_str::<serde_json::Value>(&line)
                    .ok()
                    .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
                    .unwrap_or_default();
                ipc::err(&id, "bad_json", e.to_string(), None)
            }
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
