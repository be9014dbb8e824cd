use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use super::aggregator::{group_aggregate, Aggregation, Stat};
use crate::data::model::{CellValue, Dataset};
use crate::error::{EngineError, Result};

/// Column added by [`with_condition`].
pub const CONDITION_COLUMN: &str = "tipo";
pub const CONDITION_NEW: &str = "Novo";
pub const CONDITION_USED: &str = "Usado";

// ---------------------------------------------------------------------------
// Summary KPIs
// ---------------------------------------------------------------------------

/// Headline indicators for a (usually filtered) dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub row_count: usize,
    pub count_models: usize,
    /// NaN on an empty dataset; guard before display.
    pub mean_price: f64,
    pub period_start_year: Option<i32>,
    pub period_end_year: Option<i32>,
}

pub fn summarize(dataset: &Dataset) -> Summary {
    let records = dataset.records();
    let mean_price = if records.is_empty() {
        f64::NAN
    } else {
        records.iter().map(|r| r.price).sum::<f64>() / records.len() as f64
    };

    Summary {
        row_count: records.len(),
        count_models: dataset.models().len(),
        mean_price,
        period_start_year: records.iter().map(|r| r.timestamp).min().map(|d| d.year()),
        period_end_year: records.iter().map(|r| r.timestamp).max().map(|d| d.year()),
    }
}

// ---------------------------------------------------------------------------
// Price evolution of one model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub timestamp: NaiveDate,
    pub price: f64,
    pub brand: String,
}

/// Records of one model in ascending timestamp order. Can be iterated any
/// number of times.
#[derive(Debug, Clone)]
pub struct Evolution<'a> {
    dataset: &'a Dataset,
    order: Vec<usize>,
}

impl Evolution<'_> {
    pub fn iter(&self) -> EvolutionIter<'_> {
        EvolutionIter {
            dataset: self.dataset,
            order: self.order.iter(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn to_vec(&self) -> Vec<PricePoint> {
        self.iter().collect()
    }
}

/// Iterator over the points of an [`Evolution`].
pub struct EvolutionIter<'e> {
    dataset: &'e Dataset,
    order: std::slice::Iter<'e, usize>,
}

impl Iterator for EvolutionIter<'_> {
    type Item = PricePoint;

    fn next(&mut self) -> Option<PricePoint> {
        let &i = self.order.next()?;
        let rec = &self.dataset.records()[i];
        Some(PricePoint {
            timestamp: rec.timestamp,
            price: rec.price,
            brand: rec
                .get(&self.dataset.schema().brand)
                .map(|b| b.to_string())
                .unwrap_or_default(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.order.size_hint()
    }
}

/// Records whose model equals `model`, sorted by timestamp. Equal
/// timestamps keep dataset order.
pub fn evolution<'a>(dataset: &'a Dataset, model: &str) -> Evolution<'a> {
    let model_col = &dataset.schema().model;
    let records = dataset.records();
    let mut order: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.get(model_col).and_then(CellValue::as_str) == Some(model))
        .map(|(i, _)| i)
        .collect();
    order.sort_by_key(|&i| records[i].timestamp);
    Evolution { dataset, order }
}

// ---------------------------------------------------------------------------
// Appreciation ranking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Appreciation {
    pub model: String,
    pub initial_price: f64,
    pub final_price: f64,
    /// `(final - initial) / initial * 100`
    pub pct_change: f64,
}

/// Models ranked by percentage change between their first and last record.
///
/// First and last are positional (dataset order), not chronological.
/// Ties keep ascending model order; NaN changes sort last.
pub fn top_appreciation(dataset: &Dataset, n: usize) -> Vec<Appreciation> {
    let schema = dataset.schema();
    let grouped = group_aggregate(
        dataset,
        &[schema.model.as_str()],
        &[
            Stat::named("initial", &schema.price, Aggregation::First),
            Stat::named("final", &schema.price, Aggregation::Last),
        ],
    );

    let mut ranked: Vec<Appreciation> = grouped
        .rows
        .into_iter()
        .map(|row| {
            let initial = row.values[0].as_f64().unwrap_or(f64::NAN);
            let last = row.values[1].as_f64().unwrap_or(f64::NAN);
            Appreciation {
                model: row.key[0].to_string(),
                initial_price: initial,
                final_price: last,
                pct_change: (last - initial) / initial * 100.0,
            }
        })
        .collect();

    ranked.sort_by(|a, b| descending_nan_last(a.pct_change, b.pct_change));
    ranked.truncate(n);
    ranked
}

fn descending_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

// ---------------------------------------------------------------------------
// Group comparisons and series
// ---------------------------------------------------------------------------

/// Mean price per group (brand, region, fuel, new vs used, ...).
pub fn compare_groups(dataset: &Dataset, keys: &[&str]) -> BTreeMap<Vec<CellValue>, f64> {
    let price = dataset.schema().price.clone();
    compare_groups_on(dataset, keys, &price)
}

/// Mean of an arbitrary measure per group, e.g. `vendas` or `faturamento`.
pub fn compare_groups_on(
    dataset: &Dataset,
    keys: &[&str],
    measure: &str,
) -> BTreeMap<Vec<CellValue>, f64> {
    group_aggregate(dataset, keys, &[Stat::named("mean", measure, Aggregation::Mean)])
        .to_f64_map("mean")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: NaiveDate,
    pub value: f64,
}

/// One point per reference date, ascending, aggregating `measure`.
pub fn time_series(dataset: &Dataset, measure: &str, aggregation: Aggregation) -> Vec<SeriesPoint> {
    let date_col = dataset.schema().date_column.as_str();
    group_aggregate(dataset, &[date_col], &[Stat::named("value", measure, aggregation)])
        .rows
        .into_iter()
        .filter_map(|row| match row.key.first() {
            Some(CellValue::Date(timestamp)) => Some(SeriesPoint {
                timestamp: *timestamp,
                value: row.values[0].as_f64().unwrap_or(f64::NAN),
            }),
            _ => None,
        })
        .collect()
}

/// Add a `tipo` column: `Novo` when the model year is at least
/// `new_from_year`, otherwise `Usado`.
pub fn with_condition(dataset: &Dataset, new_from_year: i64) -> Result<Dataset> {
    let schema = dataset.schema();
    let Some(year_col) = schema.model_year.as_deref() else {
        return Err(EngineError::SchemaMismatch {
            schema: schema.name.clone(),
            missing: vec!["model year".to_string()],
        });
    };

    let records = dataset
        .records()
        .iter()
        .map(|r| {
            let is_new = r
                .get(year_col)
                .and_then(CellValue::as_i64)
                .is_some_and(|y| y >= new_from_year);
            let label = if is_new { CONDITION_NEW } else { CONDITION_USED };
            let mut rec = r.clone();
            rec.fields
                .insert(CONDITION_COLUMN.to_string(), CellValue::from(label));
            rec
        })
        .collect();

    let mut columns = dataset.columns().to_vec();
    if !columns.iter().any(|c| c == CONDITION_COLUMN) {
        columns.push(CONDITION_COLUMN.to_string());
    }
    Ok(Dataset::from_records(schema.clone(), columns, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::{apply, FilterSpec};
    use crate::data::model::tests::{price_dataset, price_record};
    use crate::data::schema::SchemaVariant;

    #[test]
    fn test_summarize() {
        let ds = price_dataset(vec![
            price_record("Fiat", "Uno", 2020, 2020, 1, 30000.0),
            price_record("Fiat", "Uno", 2020, 2023, 6, 40000.0),
            price_record("Honda", "Fit", 2021, 2021, 2, 80000.0),
        ]);
        let s = summarize(&ds);
        assert_eq!(s.row_count, 3);
        assert_eq!(s.count_models, 2);
        assert_eq!(s.mean_price, 50000.0);
        assert_eq!(s.period_start_year, Some(2020));
        assert_eq!(s.period_end_year, Some(2023));
    }

    #[test]
    fn test_summarize_empty_after_filter() {
        let ds = price_dataset(vec![
            price_record("Honda", "Civic", 2020, 2021, 1, 100000.0),
            price_record("Honda", "Fit", 2020, 2021, 1, 80000.0),
        ]);
        let filtered = apply(&ds, &FilterSpec::new().one_of("marca", ["Toyota"]));
        assert!(filtered.is_empty());
        let s = summarize(&filtered);
        assert_eq!(s.count_models, 0);
        assert!(s.mean_price.is_nan());
        assert_eq!(s.period_start_year, None);
        assert_eq!(s.period_end_year, None);
    }

    #[test]
    fn test_evolution_sorted_and_stable() {
        let ds = price_dataset(vec![
            price_record("Fiat", "Uno", 2020, 2022, 3, 3.0),
            price_record("Fiat", "Mobi", 2020, 2022, 1, 99.0),
            price_record("Fiat", "Uno", 2020, 2022, 1, 1.0),
            price_record("Fiat", "Uno", 2021, 2022, 1, 2.0),
        ]);
        let evo = evolution(&ds, "Uno");
        assert_eq!(evo.len(), 3);
        let prices: Vec<f64> = evo.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![1.0, 2.0, 3.0]);
        // restartable
        assert_eq!(evo.to_vec(), evo.iter().collect::<Vec<_>>());
        assert_eq!(evo.to_vec()[0].brand, "Fiat");
        assert!(evolution(&ds, "Gol").is_empty());
    }

    #[test]
    fn test_top_appreciation_single_model() {
        let ds = price_dataset(vec![
            price_record("Chevrolet", "Onix", 2020, 2020, 1, 50000.0),
            price_record("Chevrolet", "Onix", 2021, 2021, 1, 55000.0),
        ]);
        let top = top_appreciation(&ds, 10);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].model, "Onix");
        assert!((top[0].pct_change - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_top_appreciation_ranking_and_truncation() {
        let ds = price_dataset(vec![
            price_record("VW", "Gol", 2020, 2020, 1, 100.0),
            price_record("VW", "Polo", 2020, 2020, 1, 100.0),
            price_record("Fiat", "Argo", 2020, 2020, 1, 100.0),
            price_record("VW", "Gol", 2020, 2021, 1, 90.0),
            price_record("VW", "Polo", 2020, 2021, 1, 150.0),
            price_record("Fiat", "Argo", 2020, 2021, 1, 150.0),
            price_record("Fiat", "Toro", 2020, 2021, 1, 150.0),
        ]);
        let top = top_appreciation(&ds, 3);
        let names: Vec<&str> = top.iter().map(|a| a.model.as_str()).collect();
        // Argo and Polo tie at 50%, ordered by model name
        assert_eq!(names, vec!["Argo", "Polo", "Toro"]);
        assert_eq!(top[2].pct_change, 0.0);

        let all = top_appreciation(&ds, 10);
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].pct_change >= w[1].pct_change));
        assert_eq!(all[3].model, "Gol");
    }

    #[test]
    fn test_top_appreciation_uses_positional_order() {
        // the later reference date appears first in the table
        let ds = price_dataset(vec![
            price_record("Fiat", "Uno", 2020, 2023, 1, 200.0),
            price_record("Fiat", "Uno", 2020, 2020, 1, 100.0),
        ]);
        let top = top_appreciation(&ds, 1);
        assert_eq!(top[0].initial_price, 200.0);
        assert_eq!(top[0].pct_change, -50.0);
    }

    #[test]
    fn test_new_vs_used_comparison() {
        let ds = price_dataset(vec![
            price_record("Toyota", "Corolla", 2024, 2024, 1, 100000.0),
            price_record("Toyota", "Corolla", 2020, 2024, 1, 40000.0),
            price_record("Toyota", "Etios", 2019, 2024, 1, 60000.0),
        ]);
        let ds = with_condition(&ds, 2024).unwrap();
        assert!(ds.has_column(CONDITION_COLUMN));
        let means = compare_groups(&ds, &[CONDITION_COLUMN]);
        assert_eq!(means.len(), 2);
        assert_eq!(means[&vec![CellValue::from("Novo")]], 100000.0);
        assert_eq!(means[&vec![CellValue::from("Usado")]], 50000.0);
    }

    #[test]
    fn test_condition_requires_model_year() {
        let ds = Dataset::empty(SchemaVariant::Sales.schema());
        let err = with_condition(&ds, 2024).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_time_series_mean_per_month() {
        let ds = price_dataset(vec![
            price_record("Fiat", "Uno", 2020, 2021, 2, 30.0),
            price_record("Fiat", "Mobi", 2020, 2021, 1, 10.0),
            price_record("Fiat", "Uno", 2020, 2021, 1, 20.0),
        ]);
        let series = time_series(&ds, "valor", Aggregation::Mean);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].timestamp, NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        assert_eq!(series[0].value, 15.0);
        assert_eq!(series[1].value, 30.0);
    }
}
