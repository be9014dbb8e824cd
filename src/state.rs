use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use crate::analysis::metrics::{
    compare_groups, evolution, summarize, top_appreciation, with_condition, Appreciation,
    PricePoint, Summary, CONDITION_COLUMN,
};
use crate::cache::DatasetCache;
use crate::config::{AnalysisConfig, Config};
use crate::data::filter::{apply, Constraint, FilterSpec};
use crate::data::model::{CellValue, Dataset};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Interaction state of one dashboard session, independent of rendering.
///
/// Every mutation recomputes the filtered view from the shared dataset.
pub struct Session {
    /// Loaded dataset, shared with the cache.
    dataset: Arc<Dataset>,

    /// Current per-column selections.
    filters: FilterSpec,

    /// Records passing the current filters (cached).
    filtered: Dataset,

    /// Model whose price evolution is shown.
    selected_model: Option<String>,

    analysis: AnalysisConfig,
}

/// Everything a presentation layer needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub summary: Summary,
    /// Distinct models of the filtered data, sorted.
    pub models: Vec<String>,
    pub selected_model: Option<String>,
    pub evolution: Vec<PricePoint>,
    pub top_appreciation: Vec<Appreciation>,
    /// Mean price per condition ("Novo"/"Usado"); empty without a model-year column.
    pub new_vs_used: BTreeMap<String, f64>,
}

impl Session {
    /// Start a session with the configured default selection.
    pub fn new(dataset: Arc<Dataset>, config: &Config) -> Self {
        let preferred = config.filters.preferred(dataset.schema());
        let preferred: Vec<(&str, Vec<CellValue>)> = preferred
            .iter()
            .map(|(col, vals)| (col.as_str(), vals.clone()))
            .collect();
        let filters = FilterSpec::with_defaults(&dataset, &preferred);
        Self::with_filters(dataset, filters, config.analysis.clone())
    }

    pub fn with_filters(dataset: Arc<Dataset>, filters: FilterSpec, analysis: AnalysisConfig) -> Self {
        let filtered = apply(&dataset, &filters);
        let mut session = Session {
            dataset,
            filters,
            filtered,
            selected_model: None,
            analysis,
        };
        session.ensure_selected_model();
        session
    }

    /// Load (or reuse) the configured source through `cache` and start a
    /// session. A missing source gives an empty session.
    pub fn open(config: &Config, cache: &DatasetCache) -> Result<Self> {
        let schema = config.source.schema();
        let dataset = cache.load_or_empty(&config.source.path, &schema)?;
        Ok(Self::new(dataset, config))
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn filters(&self) -> &FilterSpec {
        &self.filters
    }

    pub fn filtered(&self) -> &Dataset {
        &self.filtered
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }

    /// Options for each multi-select: sorted distinct values per column of
    /// the full dataset.
    pub fn filter_options(&self, column: &str) -> Vec<CellValue> {
        self.dataset
            .unique_values(column)
            .map(|vals| vals.iter().filter(|v| !v.is_null()).cloned().collect())
            .unwrap_or_default()
    }

    /// Recompute the filtered view after a filter change.
    pub fn refilter(&mut self) {
        self.filtered = apply(&self.dataset, &self.filters);
        self.ensure_selected_model();
    }

    /// Replace the constraint on a column.
    pub fn set_filter(&mut self, column: &str, constraint: Constraint) {
        self.filters.set(column, constraint);
        self.refilter();
    }

    /// Remove any constraint on a column.
    pub fn clear_filter(&mut self, column: &str) {
        self.filters.remove(column);
        self.refilter();
    }

    /// Toggle a single value in a column's selection. A column without a
    /// selection, or with a range, starts from everything selected.
    pub fn toggle_filter_value(&mut self, column: &str, value: &CellValue) {
        let all = || -> BTreeSet<CellValue> {
            self.dataset
                .unique_values(column)
                .cloned()
                .unwrap_or_default()
        };
        let mut selected = match self.filters.get(column) {
            Some(Constraint::OneOf(selected)) => selected.clone(),
            _ => all(),
        };
        if !selected.remove(value) {
            selected.insert(value.clone());
        }
        self.set_filter(column, Constraint::OneOf(selected));
    }

    /// Select all values in a column.
    pub fn select_all(&mut self, column: &str) {
        if let Some(all_vals) = self.dataset.unique_values(column) {
            let all_vals = all_vals.clone();
            self.set_filter(column, Constraint::OneOf(all_vals));
        }
    }

    /// Deselect all values in a column.
    pub fn select_none(&mut self, column: &str) {
        self.set_filter(column, Constraint::OneOf(BTreeSet::new()));
    }

    /// Choose the model for the evolution chart. Returns false when the
    /// model is not in the filtered data.
    pub fn select_model(&mut self, model: &str) -> bool {
        let present = self
            .filtered
            .models()
            .iter()
            .any(|m| m.as_str() == Some(model));
        if present {
            self.selected_model = Some(model.to_string());
        }
        present
    }

    /// Keep the selection if still visible, otherwise fall back to the
    /// first model in sorted order.
    fn ensure_selected_model(&mut self) {
        let models = self.filtered.models();
        let still_visible = self
            .selected_model
            .as_deref()
            .is_some_and(|sel| models.iter().any(|m| m.as_str() == Some(sel)));
        if !still_visible {
            self.selected_model = models.first().map(|m| m.to_string());
        }
    }

    /// Compute every aggregate for the current selection.
    pub fn view(&self) -> DashboardView {
        let evolution = self
            .selected_model
            .as_deref()
            .map(|model| evolution(&self.filtered, model).to_vec())
            .unwrap_or_default();

        let new_vs_used = match with_condition(&self.filtered, self.analysis.new_vehicle_from_year) {
            Ok(with_tipo) => compare_groups(&with_tipo, &[CONDITION_COLUMN])
                .into_iter()
                .filter_map(|(key, mean)| key.first().map(|k| (k.to_string(), mean)))
                .collect(),
            Err(err) => {
                log::debug!("Skipping new vs used comparison: {err}");
                BTreeMap::new()
            }
        };

        DashboardView {
            summary: summarize(&self.filtered),
            models: self.filtered.models().iter().map(|m| m.to_string()).collect(),
            selected_model: self.selected_model.clone(),
            evolution,
            top_appreciation: top_appreciation(&self.filtered, self.analysis.top_n),
            new_vs_used,
        }
    }
}
