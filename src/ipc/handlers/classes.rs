use crate::calc;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    f64_param, find_class, find_class_mut, mutate, opt_bool_param, opt_f64_param, parse_scale,
    require_db, str_param,
};
use crate::ipc::types::{AppState, Request};
use crate::model::ClassRecord;
use serde_json::json;

fn class_row(record: &ClassRecord) -> serde_json::Value {
    json!({
        "name": record.name(),
        "categoryCount": record.categories().len(),
        "finalGrade": record.final_grade(),
        "letterGrade": record.letter_grade(),
        "extraCredit": record.extra_credit(),
        "rounding": record.rounding_enabled(),
        "roundingThreshold": record.rounding_threshold(),
        "scale": record.scale(),
    })
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let classes: Vec<serde_json::Value> = state.gradebook.classes().iter().map(class_row).collect();
    respond(&req.id, Ok(json!({ "classes": classes })))
}

/// Rounding needs a positive threshold; the threshold alone is kept as-is.
fn read_rounding(
    params: &serde_json::Value,
    current: (bool, f64),
) -> Result<(bool, f64), HandlerErr> {
    let enabled = opt_bool_param(params, "rounding")?.unwrap_or(current.0);
    let threshold = opt_f64_param(params, "roundingThreshold")?.unwrap_or(current.1);
    if threshold < 0.0 {
        return Err(HandlerErr::new("bad_params", "roundingThreshold must not be negative"));
    }
    if enabled && threshold <= 0.0 {
        return Err(HandlerErr::new(
            "bad_params",
            "roundingThreshold must be positive when rounding is enabled",
        ));
    }
    Ok((enabled, threshold))
}

fn classes_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let name = str_param(&req.params, "name")?.to_string();
    let (rounding, threshold) = read_rounding(&req.params, (false, 0.0))?;
    let scale = match req.params.get("scale").filter(|v| !v.is_null()) {
        Some(raw) => parse_scale(raw)?,
        None => db::default_scale(require_db(state)?),
    };

    let mut record = ClassRecord::new(name.clone());
    record.set_rounding(rounding, threshold);
    record.set_scale(scale);
    let row = class_row(&record);
    mutate(state, |book| Ok(book.add_class(record)?))?;

    tracing::info!(class = %name, "class created");
    Ok(json!({ "class": row }))
}

fn classes_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_name = str_param(&req.params, "className")?.to_string();
    let scale = match req.params.get("scale").filter(|v| !v.is_null()) {
        Some(raw) => Some(parse_scale(raw)?),
        None => None,
    };
    let params = &req.params;
    let row = mutate(state, |book| {
        let record = find_class_mut(book, &class_name)?;
        let (rounding, threshold) = read_rounding(
            params,
            (record.rounding_enabled(), record.rounding_threshold()),
        )?;
        record.set_rounding(rounding, threshold);
        if let Some(scale) = scale {
            record.set_scale(scale);
        }
        Ok(class_row(record))
    })?;
    Ok(json!({ "class": row }))
}

fn classes_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_name = str_param(&req.params, "className")?.to_string();
    mutate(state, |book| {
        book.remove_class(&class_name).map(|_| ()).ok_or_else(|| {
            HandlerErr::new("not_found", "class not found")
                .with_details(json!({ "className": class_name }))
        })
    })?;
    tracing::info!(class = %class_name, "class deleted");
    Ok(json!({ "ok": true }))
}

fn classes_validate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let record = find_class(&state.gradebook, str_param(&req.params, "className")?)?;
    let warnings = calc::validate_class(record);
    Ok(json!({
        "className": record.name(),
        "valid": warnings.is_empty(),
        "warnings": warnings,
    }))
}

fn extra_credit_add(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_name = str_param(&req.params, "className")?.to_string();
    let amount = f64_param(&req.params, "amount")?;
    let (total, final_grade) = mutate(state, |book| {
        let record = find_class_mut(book, &class_name)?;
        record.add_extra_credit(amount)?;
        Ok((record.extra_credit(), record.final_grade()))
    })?;
    Ok(json!({ "extraCredit": total, "finalGrade": final_grade }))
}

fn extra_credit_reset(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_name = str_param(&req.params, "className")?.to_string();
    let final_grade = mutate(state, |book| {
        let record = find_class_mut(book, &class_name)?;
        record.reset_extra_credit();
        Ok(record.final_grade())
    })?;
    Ok(json!({ "extraCredit": 0.0, "finalGrade": final_grade }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.list" => return Some(handle_classes_list(state, req)),
        "classes.create" => classes_create(state, req),
        "classes.update" => classes_update(state, req),
        "classes.delete" => classes_delete(state, req),
        "classes.validate" => classes_validate(state, req),
        "extraCredit.add" => extra_credit_add(state, req),
        "extraCredit.reset" => extra_credit_reset(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
