use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::str_param;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "schemaVersion": db::SCHEMA_VERSION,
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        })),
    )
}

fn workspace_select(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(str_param(&req.params, "path")?);

    // Release the previous handle before touching another database.
    state.close_workspace();
    let opened = db::open_workspace(&path)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;

    tracing::info!(
        workspace = %path.to_string_lossy(),
        classes = opened.gradebook.classes().len(),
        recovered = opened.recovered_from.is_some(),
        "workspace opened"
    );

    let recovered_from = opened
        .recovered_from
        .as_ref()
        .map(|p| p.to_string_lossy().to_string());
    state.install(path.clone(), opened.conn, opened.gradebook);

    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "classCount": state.gradebook.classes().len(),
        "recovered": recovered_from.is_some(),
        "recoveredFrom": recovered_from,
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = workspace_select(state, req);
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
