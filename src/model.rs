use crate::calc::{self, CalcError};
use crate::scale::GradingScale;
use serde_json::json;

/// One weighted component of a class, e.g. "Homework".
///
/// Grades keep their insertion order; averaging sorts a copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    name: String,
    weight: f64,
    num_dropped: usize,
    grades: Vec<f64>,
}

impl Category {
    pub fn new(name: impl Into<String>, weight: f64, num_dropped: usize) -> Self {
        Self {
            name: name.into(),
            weight,
            num_dropped,
            grades: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn num_dropped(&self) -> usize {
        self.num_dropped
    }

    pub fn set_num_dropped(&mut self, num_dropped: usize) {
        self.num_dropped = num_dropped;
    }

    pub fn grades(&self) -> &[f64] {
        &self.grades
    }

    pub fn add_grade(&mut self, value: f64) {
        self.grades.push(value);
    }

    /// Out-of-range indexes are ignored.
    pub fn edit_grade(&mut self, index: usize, value: f64) {
        if let Some(slot) = self.grades.get_mut(index) {
            *slot = value;
        }
    }

    /// Out-of-range indexes are ignored.
    pub fn delete_grade(&mut self, index: usize) {
        if index < self.grades.len() {
            self.grades.remove(index);
        }
    }

    pub fn average(&self) -> f64 {
        calc::average_with_drops(&self.grades, self.num_dropped)
    }

    /// Median over all grades; the drop policy does not apply.
    pub fn median(&self) -> f64 {
        calc::compute_median(&self.grades)
    }

    pub fn highest(&self) -> f64 {
        calc::compute_highest(&self.grades)
    }

    pub fn lowest(&self) -> f64 {
        calc::compute_lowest(&self.grades)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassRecord {
    name: String,
    categories: Vec<Category>,
    scale: GradingScale,
    rounding_enabled: bool,
    rounding_threshold: f64,
    extra_credit: f64,
}

impl ClassRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            categories: Vec::new(),
            scale: GradingScale::default(),
            rounding_enabled: false,
            rounding_threshold: 0.0,
            extra_credit: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn categories_mut(&mut self) -> &mut [Category] {
        &mut self.categories
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn category_mut(&mut self, name: &str) -> Option<&mut Category> {
        self.categories
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn add_category(&mut self, category: Category) -> Result<(), CalcError> {
        if self.category(&category.name).is_some() {
            return Err(CalcError::new("conflict", "category name already exists")
                .with_details(json!({ "categoryName": category.name })));
        }
        self.categories.push(category);
        Ok(())
    }

    pub fn scale(&self) -> &GradingScale {
        &self.scale
    }

    /// Stores a copy; later changes to the caller's scale are not seen here.
    pub fn set_scale(&mut self, scale: GradingScale) {
        self.scale = scale;
    }

    pub fn rounding_enabled(&self) -> bool {
        self.rounding_enabled
    }

    pub fn rounding_threshold(&self) -> f64 {
        self.rounding_threshold
    }

    pub fn set_rounding(&mut self, enabled: bool, threshold: f64) {
        self.rounding_enabled = enabled;
        self.rounding_threshold = threshold;
    }

    pub fn extra_credit(&self) -> f64 {
        self.extra_credit
    }

    pub fn add_extra_credit(&mut self, amount: f64) -> Result<(), CalcError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(CalcError::new(
                "invalid_argument",
                "extra credit must be a non-negative number",
            )
            .with_details(json!({ "amount": amount })));
        }
        self.extra_credit += amount;
        Ok(())
    }

    pub fn reset_extra_credit(&mut self) {
        self.extra_credit = 0.0;
    }

    pub fn final_grade(&self) -> f64 {
        calc::compute_final_grade(self)
    }

    pub fn letter_grade(&self) -> String {
        self.scale.letter_grade(self.final_grade()).to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gradebook {
    classes: Vec<ClassRecord>,
}

impl Gradebook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classes(&self) -> &[ClassRecord] {
        &self.classes
    }

    pub fn class(&self, name: &str) -> Option<&ClassRecord> {
        self.classes
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn class_mut(&mut self, name: &str) -> Option<&mut ClassRecord> {
        self.classes
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn add_class(&mut self, record: ClassRecord) -> Result<(), CalcError> {
        if self.class(&record.name).is_some() {
            return Err(CalcError::new("conflict", "class name already exists")
                .with_details(json!({ "className": record.name })));
        }
        self.classes.push(record);
        Ok(())
    }

    pub fn remove_class(&mut self, name: &str) -> Option<ClassRecord> {
        let idx = self
            .classes
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name.trim()))?;
        Some(self.classes.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::ScaleEntry;

    #[test]
    fn category_stats_over_all_grades() {
        let mut c = Category::new("Homework", 40.0, 1);
        for g in [60.0, 90.0, 70.0, 80.0] {
            c.add_grade(g);
        }
        assert_eq!(c.average(), 80.0);
        assert_eq!(c.median(), 75.0);
        assert_eq!(c.highest(), 90.0);
        assert_eq!(c.lowest(), 60.0);
        assert_eq!(c.grades(), &[60.0, 90.0, 70.0, 80.0]);
    }

    #[test]
    fn empty_category_stats_are_zero() {
        let c = Category::new("Labs", 10.0, 0);
        assert_eq!(c.average(), 0.0);
        assert_eq!(c.median(), 0.0);
        assert_eq!(c.highest(), 0.0);
        assert_eq!(c.lowest(), 0.0);
    }

    #[test]
    fn edit_and_delete_ignore_bad_indexes() {
        let mut c = Category::new("Quizzes", 20.0, 0);
        c.add_grade(50.0);
        c.add_grade(60.0);
        c.edit_grade(5, 99.0);
        c.delete_grade(2);
        assert_eq!(c.grades(), &[50.0, 60.0]);

        c.edit_grade(0, 75.0);
        c.delete_grade(1);
        assert_eq!(c.grades(), &[75.0]);
    }

    #[test]
    fn negative_extra_credit_is_rejected() {
        let mut record = ClassRecord::new("Chem");
        let e = record.add_extra_credit(-1.0).unwrap_err();
        assert_eq!(e.code, "invalid_argument");
        assert!(record.add_extra_credit(f64::NAN).is_err());
        assert_eq!(record.extra_credit(), 0.0);

        record.add_extra_credit(1.5).expect("add");
        record.add_extra_credit(2.0).expect("add");
        assert_eq!(record.extra_credit(), 3.5);
        record.reset_extra_credit();
        assert_eq!(record.extra_credit(), 0.0);
    }

    #[test]
    fn category_names_are_unique_ignoring_case() {
        let mut record = ClassRecord::new("Bio");
        record.add_category(Category::new("Exams", 60.0, 0)).expect("add");
        let e = record.add_category(Category::new("EXAMS", 40.0, 0)).unwrap_err();
        assert_eq!(e.code, "conflict");
        assert!(record.category("exams").is_some());
    }

    #[test]
    fn class_names_are_unique_ignoring_case() {
        let mut book = Gradebook::new();
        book.add_class(ClassRecord::new("Physics")).expect("add");
        assert!(book.add_class(ClassRecord::new("physics")).is_err());
        assert!(book.class_mut("PHYSICS").is_some());
        assert!(book.remove_class("Physics").is_some());
        assert!(book.classes().is_empty());
        assert!(book.remove_class("Physics").is_none());
    }

    #[test]
    fn scale_is_copied_into_the_class() {
        let shared = GradingScale::new(vec![ScaleEntry::new(0.0, "F"), ScaleEntry::new(50.0, "P")])
            .expect("valid scale");
        let mut a = ClassRecord::new("A");
        let mut b = ClassRecord::new("B");
        a.set_scale(shared.clone());
        b.set_scale(shared);

        let strict = GradingScale::new(vec![ScaleEntry::new(0.0, "F"), ScaleEntry::new(90.0, "P")])
            .expect("valid scale");
        a.set_scale(strict);
        assert_eq!(a.scale().cutoff_for_letter("P"), Some(90.0));
        assert_eq!(b.scale().cutoff_for_letter("P"), Some(50.0));
    }

    #[test]
    fn mutations_are_visible_to_the_next_computation() {
        let mut record = ClassRecord::new("Art");
        record.add_category(Category::new("Projects", 100.0, 0)).expect("add");
        assert_eq!(record.final_grade(), 0.0);
        if let Some(c) = record.category_mut("projects") {
            c.add_grade(88.0);
        }
        assert_eq!(record.final_grade(), 88.0);
        assert_eq!(record.letter_grade(), "B+");
    }
}
