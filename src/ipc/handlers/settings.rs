use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{parse_scale, require_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn default_scale_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let stored = db::settings_get_json(conn, db::SETTING_DEFAULT_SCALE)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?;
    Ok(json!({
        "scale": db::default_scale(conn),
        "isBuiltIn": stored.is_none(),
    }))
}

/// New classes pick this up; existing classes keep their own copy.
fn default_scale_update(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let raw = req
        .params
        .get("scale")
        .ok_or_else(|| HandlerErr::new("bad_params", "missing scale"))?;
    let scale = parse_scale(raw)?;
    let value = serde_json::to_value(&scale)
        .map_err(|e| HandlerErr::new("server_error", e.to_string()))?;
    db::settings_set_json(conn, db::SETTING_DEFAULT_SCALE, &value)
        .map_err(|e| HandlerErr::new("db_write_failed", format!("{e:#}")))?;
    tracing::info!(entries = scale.entries().len(), "default scale updated");
    Ok(json!({ "scale": value }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "settings.defaultScale.get" => default_scale_get(state, req),
        "settings.defaultScale.update" => default_scale_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
