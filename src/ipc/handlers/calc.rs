use crate::calc::{self, Hypotheticals};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{check_score, find_class, str_param};
use crate::ipc::types::{AppState, Request};
use crate::model::ClassRecord;
use crate::solver;
use serde_json::json;
use std::collections::HashMap;

fn class_summary(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let record = find_class(&state.gradebook, str_param(&req.params, "className")?)?;
    let breakdown = calc::compute_final_breakdown(record);
    let mut out = serde_json::to_value(&breakdown)
        .map_err(|e| HandlerErr::new("server_error", e.to_string()))?;
    if let Some(obj) = out.as_object_mut() {
        obj.insert("className".into(), json!(record.name()));
    }
    Ok(out)
}

fn bad_hypothetical(category: &str, message: &str) -> HandlerErr {
    HandlerErr::new("bad_params", message).with_details(json!({ "categoryName": category }))
}

fn score_value(category: &str, v: &serde_json::Value) -> Result<f64, HandlerErr> {
    let n = v
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or_else(|| bad_hypothetical(category, "hypothetical scores must be numbers"))?;
    check_score("hypothetical", n)
}

/// Accepts `{cat: [scores]}` or `{cat: {remaining, average}}` per category.
fn parse_hypotheticals(
    record: &ClassRecord,
    raw: Option<&serde_json::Value>,
) -> Result<Hypotheticals, HandlerErr> {
    let Some(obj) = raw.and_then(|v| v.as_object()) else {
        return Err(HandlerErr::new("bad_params", "hypothetical must be an object"));
    };

    let mut out = Hypotheticals::new();
    for (key, entry) in obj {
        let Some(category) = record.category(key) else {
            return Err(HandlerErr::new("not_found", "category not found")
                .with_details(json!({ "categoryName": key })));
        };
        let name = category.name();
        if let Some(list) = entry.as_array() {
            let scores = list
                .iter()
                .map(|v| score_value(name, v))
                .collect::<Result<Vec<f64>, _>>()?;
            out.add_scores(name, scores);
            continue;
        }
        let remaining = entry
            .get("remaining")
            .and_then(|v| v.as_u64())
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| bad_hypothetical(name, "remaining must be a non-negative integer"))?;
        let average = entry
            .get("average")
            .ok_or_else(|| bad_hypothetical(name, "missing average"))
            .and_then(|v| score_value(name, v))?;
        out.add_uniform(name, remaining, average);
    }
    Ok(out)
}

fn what_if(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let record = find_class(&state.gradebook, str_param(&req.params, "className")?)?;
    let hypotheticals = parse_hypotheticals(record, req.params.get("hypothetical"))?;
    let projected = calc::project_class(record, &hypotheticals);
    let breakdown = calc::compute_final_breakdown(&projected);
    Ok(json!({
        "className": record.name(),
        "currentFinalGrade": record.final_grade(),
        "currentLetterGrade": record.letter_grade(),
        "finalGrade": breakdown.final_grade,
        "letterGrade": breakdown.letter_grade,
        "breakdown": breakdown,
    }))
}

fn needed_grades(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let record = find_class(&state.gradebook, str_param(&req.params, "className")?)?;
    let desired = str_param(&req.params, "desiredLetter")?;

    let mut remaining: HashMap<String, usize> = HashMap::new();
    if let Some(raw) = req.params.get("remaining").filter(|v| !v.is_null()) {
        let Some(obj) = raw.as_object() else {
            return Err(HandlerErr::new("bad_params", "remaining must be an object"));
        };
        for (name, n) in obj {
            let n = n
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| bad_hypothetical(name, "remaining must be a non-negative integer"))?;
            remaining.insert(name.clone(), n);
        }
    }

    let outcome = solver::solve_needed_grades(record, desired, &remaining)?;
    let mut out = serde_json::to_value(&outcome)
        .map_err(|e| HandlerErr::new("server_error", e.to_string()))?;
    if let Some(obj) = out.as_object_mut() {
        obj.insert("className".into(), json!(record.name()));
        obj.insert("currentFinalGrade".into(), json!(record.final_grade()));
    }
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "calc.classSummary" => class_summary(state, req),
        "calc.whatIf" => what_if(state, req),
        "calc.neededGrades" => needed_grades(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
