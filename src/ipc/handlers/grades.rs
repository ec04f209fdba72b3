use crate::calc;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    check_score, f64_param, find_category_mut, find_class, find_class_mut, mutate,
    opt_usize_param, str_param, usize_param,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Category;
use serde_json::json;

fn categories_add(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_name = str_param(&req.params, "className")?.to_string();
    let name = str_param(&req.params, "name")?.to_string();
    let weight = f64_param(&req.params, "weight")?;
    if weight < 0.0 {
        return Err(HandlerErr::new("bad_params", "weight must not be negative")
            .with_details(json!({ "weight": weight })));
    }
    let num_dropped = opt_usize_param(&req.params, "numDropped")?.unwrap_or(0);

    let total_weight = mutate(state, |book| {
        let record = find_class_mut(book, &class_name)?;
        record.add_category(Category::new(name.clone(), weight, num_dropped))?;
        Ok(record.categories().iter().map(|c| c.weight()).sum::<f64>())
    })?;

    Ok(json!({
        "className": class_name,
        "name": name,
        "weight": weight,
        "numDropped": num_dropped,
        "totalWeight": total_weight,
    }))
}

fn categories_set_dropped(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let class_name = str_param(&req.params, "className")?.to_string();
    let category_name = str_param(&req.params, "categoryName")?.to_string();
    let num_dropped = usize_param(&req.params, "numDropped")?;
    let average = mutate(state, |book| {
        let record = find_class_mut(book, &class_name)?;
        let category = find_category_mut(record, &category_name)?;
        category.set_num_dropped(num_dropped);
        Ok(category.average())
    })?;
    Ok(json!({ "numDropped": num_dropped, "average": average }))
}

fn categories_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let record = find_class(&state.gradebook, str_param(&req.params, "className")?)?;
    let breakdown = calc::compute_final_breakdown(record);
    Ok(json!({
        "className": record.name(),
        "categories": breakdown.categories,
    }))
}

/// Shared shape for grade mutations: run `f` on the category, report its
/// grades and the class's new final grade.
fn with_category(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&mut Category),
) -> Result<serde_json::Value, HandlerErr> {
    let class_name = str_param(&req.params, "className")?.to_string();
    let category_name = str_param(&req.params, "categoryName")?.to_string();
    let (grades, average, final_grade) = mutate(state, |book| {
        let record = find_class_mut(book, &class_name)?;
        let category = find_category_mut(record, &category_name)?;
        f(category);
        let grades = category.grades().to_vec();
        let average = category.average();
        Ok((grades, average, record.final_grade()))
    })?;
    Ok(json!({
        "grades": grades,
        "average": average,
        "finalGrade": final_grade,
    }))
}

fn grades_add(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let value = check_score("value", f64_param(&req.params, "value")?)?;
    with_category(state, req, |c| c.add_grade(value))
}

fn grades_edit(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let index = usize_param(&req.params, "index")?;
    let value = check_score("value", f64_param(&req.params, "value")?)?;
    with_category(state, req, |c| c.edit_grade(index, value))
}

fn grades_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let index = usize_param(&req.params, "index")?;
    with_category(state, req, |c| c.delete_grade(index))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "categories.add" => categories_add(state, req),
        "categories.setDropped" => categories_set_dropped(state, req),
        "categories.list" => categories_list(state, req),
        "grades.add" => grades_add(state, req),
        "grades.edit" => grades_edit(state, req),
        "grades.delete" => grades_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
