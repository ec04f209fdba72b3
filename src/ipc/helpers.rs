use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::model::{Category, ClassRecord, Gradebook};
use crate::scale::{GradingScale, ScaleEntry};
use rusqlite::Connection;
use serde_json::json;

fn bad_param(key: &str, message: &str) -> HandlerErr {
    HandlerErr::new("bad_params", message).with_details(json!({ "param": key }))
}

/// Required, trimmed, non-empty string.
pub fn str_param<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        Some(_) => Err(bad_param(key, &format!("{} must not be empty", key))),
        None => Err(bad_param(key, &format!("missing {}", key))),
    }
}

pub fn opt_f64_param(params: &serde_json::Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_f64() {
            Some(n) if n.is_finite() => Ok(Some(n)),
            _ => Err(bad_param(key, &format!("{} must be a number", key))),
        },
    }
}

pub fn f64_param(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    opt_f64_param(params, key)?.ok_or_else(|| bad_param(key, &format!("missing {}", key)))
}

pub fn opt_usize_param(params: &serde_json::Value, key: &str) -> Result<Option<usize>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| bad_param(key, &format!("{} must be a non-negative integer", key))),
    }
}

pub fn usize_param(params: &serde_json::Value, key: &str) -> Result<usize, HandlerErr> {
    opt_usize_param(params, key)?.ok_or_else(|| bad_param(key, &format!("missing {}", key)))
}

pub fn opt_bool_param(params: &serde_json::Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| bad_param(key, &format!("{} must be a boolean", key))),
    }
}

/// Scores entered through the UI must be percentages.
pub fn check_score(key: &str, value: f64) -> Result<f64, HandlerErr> {
    if !(0.0..=100.0).contains(&value) {
        return Err(HandlerErr::new("bad_params", "scores must be within 0..100")
            .with_details(json!({ "param": key, "value": value })));
    }
    Ok(value)
}

pub fn parse_scale(raw: &serde_json::Value) -> Result<GradingScale, HandlerErr> {
    let entries: Vec<ScaleEntry> = serde_json::from_value(raw.clone()).map_err(|e| {
        HandlerErr::new("bad_params", "scale must be a list of {cutoff, label}")
            .with_details(json!({ "error": e.to_string() }))
    })?;
    Ok(GradingScale::new(entries)?)
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn find_class<'a>(book: &'a Gradebook, name: &str) -> Result<&'a ClassRecord, HandlerErr> {
    book.class(name).ok_or_else(|| {
        HandlerErr::new("not_found", "class not found").with_details(json!({ "className": name }))
    })
}

pub fn find_class_mut<'a>(
    book: &'a mut Gradebook,
    name: &str,
) -> Result<&'a mut ClassRecord, HandlerErr> {
    book.class_mut(name).ok_or_else(|| {
        HandlerErr::new("not_found", "class not found").with_details(json!({ "className": name }))
    })
}

pub fn find_category_mut<'a>(
    record: &'a mut ClassRecord,
    name: &str,
) -> Result<&'a mut Category, HandlerErr> {
    record.category_mut(name).ok_or_else(|| {
        HandlerErr::new("not_found", "category not found")
            .with_details(json!({ "categoryName": name }))
    })
}

/// Applies `f` to a copy of the gradebook, persists the copy, and only then
/// swaps it in. A failed write leaves the in-memory state untouched.
pub fn mutate<T>(
    state: &mut AppState,
    f: impl FnOnce(&mut Gradebook) -> Result<T, HandlerErr>,
) -> Result<T, HandlerErr> {
    let conn = require_db(state)?;
    let mut next = state.gradebook.clone();
    let out = f(&mut next)?;
    db::save_gradebook(conn, &next)
        .map_err(|e| HandlerErr::new("db_write_failed", format!("{e:#}")))?;
    state.gradebook = next;
    Ok(out)
}
