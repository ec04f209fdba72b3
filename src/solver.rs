use crate::calc::{self, CalcError, Hypotheticals};
use crate::model::ClassRecord;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

const MAX_SCORE: f64 = 100.0;
const LAZY_STEP: f64 = 0.5;
const TREND_STEP: f64 = 0.5;
const FOCUS_STEP: f64 = 1.0;
const BISECT_ITERATIONS: usize = 40;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Strategy {
    Lazy,
    CurrentTrend,
    #[serde(rename_all = "camelCase")]
    Focus { category_name: String },
}

impl Strategy {
    pub fn label(&self) -> String {
        match self {
            Strategy::Lazy => "Lazy".to_string(),
            Strategy::CurrentTrend => "Current Trend".to_string(),
            Strategy::Focus { category_name } => format!("Focus on {}", category_name),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NeededScore {
    pub category_name: String,
    pub remaining: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    pub strategy: Strategy,
    pub final_grade: f64,
    pub letter_grade: String,
    pub reached: bool,
    pub needed: Vec<NeededScore>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum GoalOutcome {
    #[serde(rename_all = "camelCase")]
    Infeasible {
        desired_letter: String,
        cutoff: f64,
        best_final: f64,
    },
    #[serde(rename_all = "camelCase")]
    Feasible {
        desired_letter: String,
        cutoff: f64,
        minimum_uniform_score: Option<f64>,
        scenarios: Vec<Scenario>,
    },
}

/// Remaining-work counts aligned with a class's categories, plus the
/// trial evaluator every strategy shares.
struct Search<'a> {
    record: &'a ClassRecord,
    remaining: Vec<usize>,
    cutoff: f64,
}

impl<'a> Search<'a> {
    fn is_open(&self, idx: usize) -> bool {
        self.remaining[idx] > 0
    }

    fn evaluate(&self, scores: &[f64]) -> f64 {
        let mut h = Hypotheticals::new();
        for (idx, c) in self.record.categories().iter().enumerate() {
            if self.is_open(idx) {
                h.add_uniform(c.name(), self.remaining[idx], scores[idx]);
            }
        }
        calc::projected_final(self.record, &h)
    }

    fn filled(&self, value: f64) -> Vec<f64> {
        vec![value; self.remaining.len()]
    }

    /// Each category's own average, or the average of averages if ungraded.
    fn trend_seed(&self) -> Vec<f64> {
        let categories = self.record.categories();
        let avg_of_avgs = calc::average_of_averages(categories);
        categories
            .iter()
            .map(|c| {
                if c.grades().is_empty() {
                    avg_of_avgs
                } else {
                    c.average()
                }
            })
            .collect()
    }

    /// Raises every open category not in `frozen` by `step` (capped at 100)
    /// until the cutoff is met or nothing can move any more.
    fn climb(&self, scores: &mut [f64], step: f64, frozen: Option<usize>) -> f64 {
        let mut current = self.evaluate(scores);
        while current < self.cutoff {
            let mut changed = false;
            for (idx, score) in scores.iter_mut().enumerate() {
                if !self.is_open(idx) || Some(idx) == frozen {
                    continue;
                }
                if *score < MAX_SCORE {
                    *score = (*score + step).min(MAX_SCORE);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            current = self.evaluate(scores);
        }
        current
    }

    fn scenario(&self, strategy: Strategy, scores: &[f64], final_grade: f64) -> Scenario {
        let needed = self
            .record
            .categories()
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.is_open(*idx))
            .map(|(idx, c)| NeededScore {
                category_name: c.name().to_string(),
                remaining: self.remaining[idx],
                score: calc::round_off_2_decimal(scores[idx]),
            })
            .collect();
        Scenario {
            name: strategy.label(),
            strategy,
            final_grade,
            letter_grade: self.record.scale().letter_grade(final_grade).to_string(),
            reached: final_grade >= self.cutoff,
            needed,
        }
    }

    fn lazy(&self) -> Scenario {
        let mut scores = self.filled(0.0);
        let final_grade = self.climb(&mut scores, LAZY_STEP, None);
        self.scenario(Strategy::Lazy, &scores, final_grade)
    }

    fn current_trend(&self) -> Scenario {
        let mut scores = self.trend_seed();
        let final_grade = self.climb(&mut scores, TREND_STEP, None);
        self.scenario(Strategy::CurrentTrend, &scores, final_grade)
    }

    fn focus(&self, focus_idx: usize) -> Scenario {
        let mut scores = self.trend_seed();
        scores[focus_idx] = MAX_SCORE;
        let final_grade = self.climb(&mut scores, FOCUS_STEP, Some(focus_idx));
        let category_name = self.record.categories()[focus_idx].name().to_string();
        self.scenario(Strategy::Focus { category_name }, &scores, final_grade)
    }

    /// Smallest single score (to 0.01) that reaches the cutoff when applied
    /// to every remaining assignment. Relies on the projection being
    /// non-decreasing in the uniform score.
    fn minimum_uniform_score(&self) -> Option<f64> {
        if !self.remaining.iter().any(|r| *r > 0) {
            return None;
        }
        if self.evaluate(&self.filled(0.0)) >= self.cutoff {
            return Some(0.0);
        }
        if self.evaluate(&self.filled(MAX_SCORE)) < self.cutoff {
            return None;
        }
        let (mut lo, mut hi) = (0.0_f64, MAX_SCORE);
        for _ in 0..BISECT_ITERATIONS {
            let mid = (lo + hi) / 2.0;
            if self.evaluate(&self.filled(mid)) >= self.cutoff {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        let mut candidate = ((hi * 100.0) - 1e-6).ceil() / 100.0;
        if self.evaluate(&self.filled(candidate)) < self.cutoff {
            candidate += 0.01;
        }
        Some(candidate.min(MAX_SCORE))
    }
}

fn align_remaining(
    record: &ClassRecord,
    remaining: &HashMap<String, usize>,
) -> Result<Vec<usize>, CalcError> {
    for name in remaining.keys() {
        if record.category(name).is_none() {
            return Err(CalcError::new("not_found", "category not found")
                .with_details(json!({ "categoryName": name })));
        }
    }
    Ok(record
        .categories()
        .iter()
        .map(|c| {
            remaining
                .iter()
                .filter(|(name, _)| name.trim().eq_ignore_ascii_case(c.name()))
                .map(|(_, n)| *n)
                .sum()
        })
        .collect())
}

/// Searches for future scores that reach `desired_letter`.
///
/// `remaining` maps category names (any case) to the number of assignments
/// still to come; categories left out have none.
pub fn solve_needed_grades(
    record: &ClassRecord,
    desired_letter: &str,
    remaining: &HashMap<String, usize>,
) -> Result<GoalOutcome, CalcError> {
    let Some(cutoff) = record.scale().cutoff_for_letter(desired_letter) else {
        return Err(CalcError::new("not_found", "letter grade not in the class scale")
            .with_details(json!({
                "desiredLetter": desired_letter,
                "letters": record.scale().letters(),
            })));
    };
    let search = Search {
        record,
        remaining: align_remaining(record, remaining)?,
        cutoff,
    };

    let best_final = search.evaluate(&search.filled(MAX_SCORE));
    if best_final < cutoff {
        return Ok(GoalOutcome::Infeasible {
            desired_letter: desired_letter.trim().to_string(),
            cutoff,
            best_final,
        });
    }

    let mut scenarios = vec![search.lazy(), search.current_trend()];
    for idx in 0..search.remaining.len() {
        if search.is_open(idx) {
            scenarios.push(search.focus(idx));
        }
    }
    for s in &scenarios {
        tracing::debug!(
            scenario = %s.name,
            final_grade = s.final_grade,
            reached = s.reached,
            "needed-grades scenario"
        );
    }

    Ok(GoalOutcome::Feasible {
        desired_letter: desired_letter.trim().to_string(),
        cutoff,
        minimum_uniform_score: search.minimum_uniform_score(),
        scenarios,
    })
}
