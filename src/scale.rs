use crate::calc::CalcError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleEntry {
    pub cutoff: f64,
    pub label: String,
}

impl ScaleEntry {
    pub fn new(cutoff: f64, label: &str) -> Self {
        Self {
            cutoff,
            label: label.to_string(),
        }
    }
}

/// Cutoff table mapping minimum percentages to letter grades.
///
/// Entries are kept sorted by descending cutoff and always include a 0.0
/// cutoff, so every percentage resolves to some label. Classes hold their
/// own copy; replacing the workspace default never touches existing classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ScaleEntry>", into = "Vec<ScaleEntry>")]
pub struct GradingScale {
    entries: Vec<ScaleEntry>,
}

impl GradingScale {
    pub fn new(entries: Vec<ScaleEntry>) -> Result<Self, CalcError> {
        if entries.is_empty() {
            return Err(CalcError::new("bad_scale", "grading scale must not be empty"));
        }
        for e in &entries {
            if !e.cutoff.is_finite() || !(0.0..=100.0).contains(&e.cutoff) {
                return Err(CalcError::new("bad_scale", "cutoffs must be within 0..100")
                    .with_details(json!({ "cutoff": e.cutoff, "label": e.label })));
            }
            if e.label.trim().is_empty() {
                return Err(CalcError::new("bad_scale", "labels must not be blank")
                    .with_details(json!({ "cutoff": e.cutoff })));
            }
        }

        let mut sorted = entries;
        sorted.sort_by(|a, b| b.cutoff.partial_cmp(&a.cutoff).unwrap_or(Ordering::Equal));
        for pair in sorted.windows(2) {
            if pair[0].cutoff == pair[1].cutoff {
                return Err(CalcError::new("bad_scale", "duplicate cutoff")
                    .with_details(json!({ "cutoff": pair[0].cutoff })));
            }
        }
        if !sorted.iter().any(|e| e.cutoff == 0.0) {
            return Err(CalcError::new(
                "bad_scale",
                "grading scale must contain a 0 cutoff",
            ));
        }

        Ok(Self { entries: sorted })
    }

    pub fn entries(&self) -> &[ScaleEntry] {
        &self.entries
    }

    pub fn letter_grade(&self, percentage: f64) -> &str {
        match self.entries.iter().find(|e| percentage >= e.cutoff) {
            Some(e) => &e.label,
            // Below 0 (or NaN): fall through to the bottom entry.
            None => self.entries.last().map(|e| e.label.as_str()).unwrap_or(""),
        }
    }

    /// Smallest cutoff strictly above `percentage`, or `None` at/above the top.
    pub fn next_higher_cutoff(&self, percentage: f64) -> Option<f64> {
        self.entries
            .iter()
            .rev()
            .map(|e| e.cutoff)
            .find(|c| *c > percentage)
    }

    pub fn cutoff_for_letter(&self, label: &str) -> Option<f64> {
        let wanted = label.trim();
        self.entries
            .iter()
            .rev()
            .find(|e| e.label.eq_ignore_ascii_case(wanted))
            .map(|e| e.cutoff)
    }

    pub fn letters(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }
}

impl Default for GradingScale {
    fn default() -> Self {
        let entries = [
            (97.0, "A+"),
            (93.0, "A"),
            (90.0, "A-"),
            (87.0, "B+"),
            (83.0, "B"),
            (80.0, "B-"),
            (77.0, "C+"),
            (73.0, "C"),
            (70.0, "C-"),
            (67.0, "D+"),
            (63.0, "D"),
            (60.0, "D-"),
            (0.0, "F"),
        ];
        Self {
            entries: entries
                .iter()
                .map(|(cutoff, label)| ScaleEntry::new(*cutoff, label))
                .collect(),
        }
    }
}

impl TryFrom<Vec<ScaleEntry>> for GradingScale {
    type Error = CalcError;

    fn try_from(entries: Vec<ScaleEntry>) -> Result<Self, Self::Error> {
        GradingScale::new(entries)
    }
}

impl From<GradingScale> for Vec<ScaleEntry> {
    fn from(scale: GradingScale) -> Self {
        scale.entries
    }
}
