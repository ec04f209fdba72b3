mod backup;
mod calc;
mod db;
mod ipc;
mod logging;
mod model;
mod scale;
mod solver;

use serde_json::json;
use std::io::{self, BufRead, Write};

fn main() {
    logging::init();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gradebookd started");

    let mut state = ipc::AppState::default();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed with error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                // Can't reply without id.
                tracing::warn!(error = %e, "unparseable request line");
                json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                })
            }
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed; exiting");
}
