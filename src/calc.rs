use crate::model::{Category, ClassRecord};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// 2-decimal rounding, halves away from zero for non-negative inputs:
/// `Int(100*x + 0.5) / 100`
pub fn round_off_2_decimal(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CalcError {}

fn sorted_ascending(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Mean after discarding the `dropped` lowest values. Dropping everything
/// (or more) yields 0.0, as does an empty slice.
pub fn average_with_drops(grades: &[f64], dropped: usize) -> f64 {
    if grades.is_empty() || dropped >= grades.len() {
        return 0.0;
    }
    let sorted = sorted_ascending(grades);
    let kept = &sorted[dropped..];
    kept.iter().sum::<f64>() / (kept.len() as f64)
}

pub fn compute_median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted_ascending(values);
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[(n / 2) - 1] + sorted[n / 2]) / 2.0
    }
}

pub fn compute_highest(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

pub fn compute_lowest(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / (values.len() as f64)
    }
}

/// Mean of the averages of every category that has at least one grade.
/// This is the value imputed for ungraded categories.
pub fn average_of_averages(categories: &[Category]) -> f64 {
    let existing: Vec<f64> = categories
        .iter()
        .filter(|c| !c.grades().is_empty())
        .map(|c| c.average())
        .collect();
    mean(&existing)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub name: String,
    pub weight: f64,
    pub num_dropped: usize,
    pub grades: Vec<f64>,
    pub average: f64,
    pub median: f64,
    pub highest: f64,
    pub lowest: f64,
    pub imputed: bool,
    pub effective_value: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalGradeBreakdown {
    pub average_of_averages: f64,
    pub weighted_sum: f64,
    pub after_rounding: f64,
    pub extra_credit: f64,
    pub final_grade: f64,
    pub letter_grade: String,
    pub categories: Vec<CategoryBreakdown>,
}

/// Applies the rounding policy to a raw weighted sum: either plain
/// 2-decimal rounding or a snap up to the next cutoff within `threshold`.
fn apply_rounding(record: &ClassRecord, weighted_sum: f64) -> f64 {
    if !record.rounding_enabled() {
        return round_off_2_decimal(weighted_sum);
    }
    match record.scale().next_higher_cutoff(weighted_sum) {
        Some(cutoff) if cutoff - weighted_sum <= record.rounding_threshold() => cutoff,
        _ => weighted_sum,
    }
}

pub fn compute_final_breakdown(record: &ClassRecord) -> FinalGradeBreakdown {
    let categories = record.categories();
    let avg_of_avgs = average_of_averages(categories);

    let mut weighted_sum = 0.0_f64;
    let mut per_category: Vec<CategoryBreakdown> = Vec::with_capacity(categories.len());
    for c in categories {
        let imputed = c.grades().is_empty();
        let average = c.average();
        let effective_value = if imputed { avg_of_avgs } else { average };
        let contribution = effective_value * (c.weight() / 100.0);
        weighted_sum += contribution;
        per_category.push(CategoryBreakdown {
            name: c.name().to_string(),
            weight: c.weight(),
            num_dropped: c.num_dropped(),
            grades: c.grades().to_vec(),
            average,
            median: c.median(),
            highest: c.highest(),
            lowest: c.lowest(),
            imputed,
            effective_value,
            contribution,
        });
    }

    let after_rounding = apply_rounding(record, weighted_sum);
    let with_credit = (after_rounding + record.extra_credit()).min(100.0);
    let final_grade = round_off_2_decimal(with_credit);

    FinalGradeBreakdown {
        average_of_averages: avg_of_avgs,
        weighted_sum,
        after_rounding,
        extra_credit: record.extra_credit(),
        final_grade,
        letter_grade: record.scale().letter_grade(final_grade).to_string(),
        categories: per_category,
    }
}

pub fn compute_final_grade(record: &ClassRecord) -> f64 {
    compute_final_breakdown(record).final_grade
}

fn category_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Hypothetical scores to append per category, keyed the way category
/// lookups match names (trimmed, case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct Hypotheticals {
    by_category: HashMap<String, Vec<f64>>,
}

impl Hypotheticals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scores(&mut self, category: &str, scores: impl IntoIterator<Item = f64>) {
        self.by_category
            .entry(category_key(category))
            .or_default()
            .extend(scores);
    }

    /// `remaining` copies of `average`, the shape a what-if dialog collects.
    pub fn add_uniform(&mut self, category: &str, remaining: usize, average: f64) {
        self.add_scores(category, std::iter::repeat(average).take(remaining));
    }

    pub fn scores_for(&self, category: &str) -> Option<&[f64]> {
        self.by_category
            .get(&category_key(category))
            .map(|v| v.as_slice())
    }
}

/// Evaluates a class as if the hypothetical scores had been entered.
/// The record itself is never touched; all work happens on a snapshot.
pub fn project_class(record: &ClassRecord, hypotheticals: &Hypotheticals) -> ClassRecord {
    let mut snapshot = record.clone();
    for c in snapshot.categories_mut() {
        if let Some(extra) = hypotheticals.scores_for(c.name()) {
            for v in extra {
                c.add_grade(*v);
            }
        }
    }
    snapshot
}

pub fn projected_final(record: &ClassRecord, hypotheticals: &Hypotheticals) -> f64 {
    compute_final_grade(&project_class(record, hypotheticals))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationWarning {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
}

/// Caller-side data checks. Nothing reported here blocks a computation.
pub fn validate_class(record: &ClassRecord) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let total_weight: f64 = record.categories().iter().map(|c| c.weight()).sum();
    if !record.categories().is_empty() && (total_weight - 100.0).abs() > 1e-6 {
        warnings.push(ValidationWarning {
            code: "weights_not_100".to_string(),
            message: format!("category weights sum to {} instead of 100", total_weight),
            category_name: None,
        });
    }

    for c in record.categories() {
        let count = c.grades().len();
        if count > 0 && c.num_dropped() >= count {
            warnings.push(ValidationWarning {
                code: "all_grades_dropped".to_string(),
                message: format!(
                    "drops {} of {} grades; the category averages to 0",
                    c.num_dropped(),
                    count
                ),
                category_name: Some(c.name().to_string()),
            });
        }
        if c.grades().iter().any(|g| !(0.0..=100.0).contains(g)) {
            warnings.push(ValidationWarning {
                code: "grade_out_of_range".to_string(),
                message: "category holds a grade outside 0..100".to_string(),
                category_name: Some(c.name().to_string()),
            });
        }
    }

    warnings
}
