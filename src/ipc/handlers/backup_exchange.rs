use crate::backup;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::str_param;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};

fn workspace_path(state: &AppState, req: &Request) -> Result<PathBuf, HandlerErr> {
    req.params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn export_bundle(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let out_path = str_param(&req.params, "outPath")?.to_string();
    let workspace_path = workspace_path(state, req)?;

    if let Some(conn) = state.db.as_ref() {
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
    }

    let export = backup::export_workspace_bundle(
        &workspace_path,
        Path::new(&out_path),
        db::SCHEMA_VERSION,
    )
    .map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": out_path }))
    })?;

    tracing::info!(path = %out_path, sha256 = %export.db_sha256, "workspace bundle exported");
    Ok(json!({
        "ok": true,
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "dbSha256": export.db_sha256,
    }))
}

/// Reopens `workspace` into `state`, recovering from a bad database the
/// same way `workspace.select` does.
fn reload(state: &mut AppState, workspace: &Path) -> Result<Option<PathBuf>, HandlerErr> {
    let opened = db::open_workspace(workspace)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;
    state.install(workspace.to_path_buf(), opened.conn, opened.gradebook);
    Ok(opened.recovered_from)
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn import_bundle(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let in_path = str_param(&req.params, "inPath")?.to_string();
    let workspace_path = workspace_path(state, req)?;

    // Importing elsewhere would leave the caller on a workspace it never selected.
    if let Some(selected) = state.workspace.as_deref() {
        if !same_path(selected, &workspace_path) {
            return Err(HandlerErr::new(
                "bad_params",
                "workspacePath differs from the selected workspace",
            )
            .with_details(json!({
                "workspacePath": workspace_path.to_string_lossy(),
                "selected": selected.to_string_lossy(),
            })));
        }
    }

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // Drop open handle before replacing file.
    state.db = None;

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            let cause = format!("{e:#}");
            tracing::warn!(path = %in_path, error = %cause, "workspace bundle import failed");
            let mut details = json!({ "path": in_path });
            // The old database is still in place; keep serving it.
            if let Some(previous) = state.workspace.clone() {
                if let Err(reopen) = reload(state, &previous) {
                    tracing::warn!(
                        workspace = %previous.to_string_lossy(),
                        error = %reopen.message,
                        "could not reopen workspace after failed import"
                    );
                    state.close_workspace();
                    details["reopenError"] = json!(reopen.message);
                }
            }
            return Err(HandlerErr::new("io_failed", cause).with_details(details));
        }
    };

    let recovered_from = reload(state, &workspace_path)?;
    tracing::info!(
        path = %in_path,
        format = %import.bundle_format_detected,
        classes = state.gradebook.classes().len(),
        "workspace bundle imported"
    );
    Ok(json!({
        "ok": true,
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
        "classCount": state.gradebook.classes().len(),
        "recovered": recovered_from.is_some(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => export_bundle(state, req),
        "backup.importWorkspaceBundle" => import_bundle(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
