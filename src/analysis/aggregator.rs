//! Group-by aggregation over a [`Dataset`].
//!
//! Rows are partitioned by equality of the full key tuple; groups come out
//! in ascending key order, and rows whose key has a missing or null cell
//! are skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::model::{CellValue, Dataset, Record};

/// Statistic computed over one column of each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Arithmetic mean of numeric cells; NaN when there are none.
    Mean,
    /// Sum of numeric cells; integer when every cell is an integer and the
    /// total fits in an `i64`.
    Sum,
    /// First non-null cell in dataset order.
    First,
    /// Last non-null cell in dataset order.
    Last,
    /// Number of non-null cells.
    Count,
    /// Number of distinct non-null cells.
    NUnique,
    Min,
    Max,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregation::Mean => "mean",
            Aggregation::Sum => "sum",
            Aggregation::First => "first",
            Aggregation::Last => "last",
            Aggregation::Count => "count",
            Aggregation::NUnique => "nunique",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
        };
        write!(f, "{name}")
    }
}

/// A named statistic: `column` aggregated with `aggregation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub name: String,
    pub column: String,
    pub aggregation: Aggregation,
}

impl Stat {
    /// Named `<column>_<aggregation>`, e.g. `valor_mean`.
    pub fn new(column: &str, aggregation: Aggregation) -> Self {
        Stat {
            name: format!("{column}_{aggregation}"),
            column: column.to_string(),
            aggregation,
        }
    }

    pub fn named(name: &str, column: &str, aggregation: Aggregation) -> Self {
        Stat {
            name: name.to_string(),
            column: column.to_string(),
            aggregation,
        }
    }
}

/// One group of an [`AggregateResult`]: the key tuple and one value per stat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub key: Vec<CellValue>,
    pub values: Vec<CellValue>,
}

/// Output of [`group_aggregate`], rows in ascending key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub group_columns: Vec<String>,
    pub stat_names: Vec<String>,
    pub rows: Vec<GroupRow>,
}

impl AggregateResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &[CellValue]) -> Option<&GroupRow> {
        self.rows.iter().find(|row| row.key == key)
    }

    /// Value of the named stat for a group.
    pub fn value(&self, key: &[CellValue], stat: &str) -> Option<&CellValue> {
        let idx = self.stat_names.iter().position(|s| s == stat)?;
        self.get(key).and_then(|row| row.values.get(idx))
    }

    /// Numeric value of a single-stat result per group.
    pub fn to_f64_map(&self, stat: &str) -> BTreeMap<Vec<CellValue>, f64> {
        let Some(idx) = self.stat_names.iter().position(|s| s == stat) else {
            return BTreeMap::new();
        };
        self.rows
            .iter()
            .map(|row| {
                let v = row.values.get(idx).and_then(CellValue::as_f64).unwrap_or(f64::NAN);
                (row.key.clone(), v)
            })
            .collect()
    }
}

/// Partition `dataset` by `keys` and compute `stats` for every group.
pub fn group_aggregate(dataset: &Dataset, keys: &[&str], stats: &[Stat]) -> AggregateResult {
    let mut groups: BTreeMap<Vec<CellValue>, Vec<&Record>> = BTreeMap::new();

    'rows: for record in dataset.records() {
        let mut key = Vec::with_capacity(keys.len());
        for col in keys {
            match record.get(col) {
                Some(value) if !value.is_null() => key.push(value.clone()),
                _ => continue 'rows,
            }
        }
        groups.entry(key).or_default().push(record);
    }

    debug!(
        "Grouped {} records by {:?} into {} groups",
        dataset.len(),
        keys,
        groups.len()
    );

    let rows = groups
        .into_iter()
        .map(|(key, records)| GroupRow {
            key,
            values: stats
                .iter()
                .map(|stat| aggregate(&records, &stat.column, stat.aggregation))
                .collect(),
        })
        .collect();

    AggregateResult {
        group_columns: keys.iter().map(|k| k.to_string()).collect(),
        stat_names: stats.iter().map(|s| s.name.clone()).collect(),
        rows,
    }
}

/// Compute one statistic over the `column` cells of `records`.
pub fn aggregate(records: &[&Record], column: &str, aggregation: Aggregation) -> CellValue {
    let mut cells = records
        .iter()
        .filter_map(|r| r.get(column))
        .filter(|v| !v.is_null());

    match aggregation {
        Aggregation::Mean => {
            let (sum, n) = cells
                .filter_map(CellValue::as_f64)
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if n == 0 {
                CellValue::Float(f64::NAN)
            } else {
                CellValue::Float(sum / n as f64)
            }
        }
        Aggregation::Sum => {
            // None once a float is seen or the integer sum overflows
            let mut int_sum: Option<i64> = Some(0);
            let mut float_sum = 0.0;
            for cell in cells {
                match cell {
                    CellValue::Integer(i) => {
                        int_sum = int_sum.and_then(|s| s.checked_add(*i));
                        float_sum += *i as f64;
                    }
                    CellValue::Float(f) => {
                        int_sum = None;
                        float_sum += f;
                    }
                    _ => {}
                }
            }
            match int_sum {
                Some(sum) => CellValue::Integer(sum),
                None => CellValue::Float(float_sum),
            }
        }
        Aggregation::First => cells.next().cloned().unwrap_or(CellValue::Null),
        Aggregation::Last => cells.last().cloned().unwrap_or(CellValue::Null),
        Aggregation::Count => CellValue::Integer(cells.count() as i64),
        Aggregation::NUnique => CellValue::Integer(cells.collect::<BTreeSet<_>>().len() as i64),
        Aggregation::Min => cells.min().cloned().unwrap_or(CellValue::Null),
        Aggregation::Max => cells.max().cloned().unwrap_or(CellValue::Null),
    }
}
