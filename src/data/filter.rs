use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::{Deserialize, Serialize};

use super::model::{CellValue, Dataset};

// ---------------------------------------------------------------------------
// Filter predicate: which values are allowed per column
// ---------------------------------------------------------------------------

/// Constraint on a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// The value must be one of the selected values. An empty set means
    /// nothing is selected, so no row passes.
    OneOf(BTreeSet<CellValue>),
    /// Inclusive range; an absent bound is unbounded on that side.
    Between {
        min: Option<CellValue>,
        max: Option<CellValue>,
    },
}

impl Constraint {
    /// Whether a cell (or a missing cell, `None`) satisfies the constraint.
    pub fn matches(&self, value: Option<&CellValue>) -> bool {
        match self {
            Constraint::OneOf(selected) => match value {
                Some(val) => contains_value(selected, val),
                // row doesn't have this column → include only if Null is selected
                None => selected.contains(&CellValue::Null),
            },
            Constraint::Between { min, max } => {
                let Some(val) = value else {
                    return false;
                };
                if val.is_null() {
                    return false;
                }
                let above_min = min
                    .as_ref()
                    .map_or(true, |lo| matches!(compare_cells(val, lo), Some(Ordering::Greater | Ordering::Equal)));
                let below_max = max
                    .as_ref()
                    .map_or(true, |hi| matches!(compare_cells(val, hi), Some(Ordering::Less | Ordering::Equal)));
                above_min && below_max
            }
        }
    }
}

/// Set membership where `Integer(2022)` and `Float(2022.0)` are the same value.
fn contains_value(selected: &BTreeSet<CellValue>, val: &CellValue) -> bool {
    if selected.contains(val) {
        return true;
    }
    match val.as_f64() {
        Some(x) => selected.iter().any(|s| s.as_f64() == Some(x)),
        None => false,
    }
}

/// Compare numerically across integer/float, otherwise only within the same type.
fn compare_cells(a: &CellValue, b: &CellValue) -> Option<Ordering> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ if std::mem::discriminant(a) == std::mem::discriminant(b) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Per-column constraints: maps column_name → constraint.
/// A column absent from the spec is unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSpec {
    constraints: BTreeMap<String, Constraint>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict `column` to the given values.
    pub fn one_of<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<CellValue>,
    {
        self.set(
            column,
            Constraint::OneOf(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Restrict `column` to an inclusive range.
    pub fn between(mut self, column: &str, min: Option<CellValue>, max: Option<CellValue>) -> Self {
        self.set(column, Constraint::Between { min, max });
        self
    }

    pub fn set(&mut self, column: &str, constraint: Constraint) {
        self.constraints.insert(column.to_string(), constraint);
    }

    pub fn remove(&mut self, column: &str) -> Option<Constraint> {
        self.constraints.remove(column)
    }

    pub fn get(&self, column: &str) -> Option<&Constraint> {
        self.constraints.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Constraint)> {
        self.constraints.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Initial selection: the dataset values of each column that equal one of
    /// its preferred values (numbers compare across integer/float). Columns
    /// absent from the dataset are skipped.
    pub fn with_defaults(dataset: &Dataset, preferred: &[(&str, Vec<CellValue>)]) -> Self {
        let mut spec = FilterSpec::new();
        for (column, wanted) in preferred {
            let Some(available) = dataset.unique_values(column) else {
                continue;
            };
            let wanted: BTreeSet<CellValue> = wanted.iter().cloned().collect();
            let selected: BTreeSet<CellValue> = available
                .iter()
                .filter(|v| contains_value(&wanted, v))
                .cloned()
                .collect();
            spec.set(column, Constraint::OneOf(selected));
        }
        spec
    }
}

/// Return indices of records that pass all constraints, in dataset order.
///
/// A record passes a column constraint when:
/// * The column is not present in `spec` → passes (no constraint)
/// * A `OneOf` set is empty → nothing selected → fails
/// * The record has no cell in the column → passes only if `Null` is selected
/// * The record's value satisfies the constraint → passes
pub fn filtered_indices(dataset: &Dataset, spec: &FilterSpec) -> Vec<usize> {
    dataset
        .records()
        .iter()
        .enumerate()
        .filter(|(_, rec)| {
            spec.iter()
                .all(|(col, constraint)| constraint.matches(rec.get(col)))
        })
        .map(|(i, _)| i)
        .collect()
}

/// Apply a spec, producing a new dataset that preserves record order.
pub fn apply(dataset: &Dataset, spec: &FilterSpec) -> Dataset {
    if spec.is_empty() {
        return dataset.clone();
    }
    let indices = filtered_indices(dataset, spec);
    debug!("Filter kept {} of {} records", indices.len(), dataset.len());
    let records = indices
        .into_iter()
        .map(|i| dataset.records()[i].clone())
        .collect();
    dataset.with_records(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::tests::{price_dataset, price_record};

    fn sample() -> Dataset {
        price_dataset(vec![
            price_record("Honda", "Civic", 2020, 2021, 1, 100000.0),
            price_record("Toyota", "Corolla", 2022, 2021, 2, 120000.0),
            price_record("Honda", "Fit", 2024, 2022, 3, 80000.0),
            price_record("Fiat", "Uno", 2021, 2022, 4, 30000.0),
        ])
    }

    fn models(ds: &Dataset) -> Vec<String> {
        ds.records()
            .iter()
            .map(|r| r.get("modelo").unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_empty_spec_is_identity() {
        let ds = sample();
        let out = apply(&ds, &FilterSpec::new());
        assert_eq!(out.records(), ds.records());
    }

    #[test]
    fn test_one_of_preserves_order() {
        let ds = sample();
        let spec = FilterSpec::new().one_of("marca", ["Honda", "Fiat"]);
        let out = apply(&ds, &spec);
        assert_eq!(models(&out), vec!["Civic", "Fit", "Uno"]);
    }

    #[test]
    fn test_constraints_are_conjunctive() {
        let ds = sample();
        let spec = FilterSpec::new()
            .one_of("marca", ["Honda"])
            .one_of("anoModelo", [2024i64]);
        assert_eq!(models(&apply(&ds, &spec)), vec!["Fit"]);
    }

    #[test]
    fn test_empty_selection_hides_everything() {
        let ds = sample();
        let spec = FilterSpec::new().one_of("marca", Vec::<CellValue>::new());
        assert!(apply(&ds, &spec).is_empty());
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let ds = price_dataset(vec![price_record("Honda", "Civic", 2020, 2021, 1, 1.0)]);
        let spec = FilterSpec::new().one_of("marca", ["Toyota"]);
        let out = apply(&ds, &spec);
        assert!(out.is_empty());
        assert_eq!(out.columns(), ds.columns());
    }

    #[test]
    fn test_between_is_inclusive_and_numeric() {
        let ds = sample();
        let spec = FilterSpec::new().between(
            "anoModelo",
            Some(CellValue::Float(2021.0)),
            Some(CellValue::Integer(2022)),
        );
        assert_eq!(models(&apply(&ds, &spec)), vec!["Corolla", "Uno"]);

        let open_ended = FilterSpec::new().between("valor", Some(CellValue::Integer(100000)), None);
        assert_eq!(models(&apply(&ds, &open_ended)), vec!["Civic", "Corolla"]);
    }

    #[test]
    fn test_unknown_column_only_matches_null() {
        let ds = sample();
        let spec = FilterSpec::new().one_of("regiao", ["Sul"]);
        assert!(apply(&ds, &spec).is_empty());
        let spec = FilterSpec::new().one_of("regiao", [CellValue::Null]);
        assert_eq!(apply(&ds, &spec).len(), 4);
    }

    #[test]
    fn test_full_selection_still_rejects_rows_without_the_column() {
        let mut with_color = price_record("Fiat", "Uno", 2020, 2021, 1, 30000.0);
        with_color.fields.insert("cor".to_string(), CellValue::from("azul"));
        let without_color = price_record("Fiat", "Mobi", 2020, 2021, 1, 35000.0);
        let ds = price_dataset(vec![with_color, without_color]);

        // "azul" is every value the column has, yet Mobi has no cell at all
        let spec = FilterSpec::new().one_of("cor", ["azul"]);
        assert_eq!(models(&apply(&ds, &spec)), vec!["Uno"]);

        let spec = FilterSpec::new().one_of("cor", [CellValue::from("azul"), CellValue::Null]);
        assert_eq!(models(&apply(&ds, &spec)), vec!["Uno", "Mobi"]);
    }

    #[test]
    fn test_one_of_matches_integral_floats() {
        let mut rec = price_record("Honda", "Civic", 2022, 2023, 1, 140000.0);
        rec.fields.insert("anoModelo".to_string(), CellValue::Float(2022.0));
        let ds = price_dataset(vec![rec, price_record("Fiat", "Uno", 2021, 2023, 1, 30000.0)]);

        let spec = FilterSpec::new().one_of("anoModelo", [2022i64]);
        assert_eq!(models(&apply(&ds, &spec)), vec!["Civic"]);

        let defaults = FilterSpec::with_defaults(&ds, &[("anoModelo", vec![CellValue::Integer(2022)])]);
        assert_eq!(
            defaults.get("anoModelo"),
            Some(&Constraint::OneOf([CellValue::Float(2022.0)].into_iter().collect()))
        );
        assert_eq!(models(&apply(&ds, &defaults)), vec!["Civic"]);
    }

    #[test]
    fn test_defaults_intersect_available_values() {
        let ds = sample();
        let spec = FilterSpec::with_defaults(
            &ds,
            &[
                ("marca", vec!["Toyota".into(), "Volkswagen".into(), "Honda".into()]),
                ("regiao", vec!["Sul".into()]),
            ],
        );
        assert_eq!(
            spec.get("marca"),
            Some(&Constraint::OneOf(
                ["Honda", "Toyota"].into_iter().map(CellValue::from).collect()
            ))
        );
        assert!(spec.get("regiao").is_none());
    }
}
