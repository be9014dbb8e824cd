//! Configuration file handling.
//!
//! Settings come from a TOML file such as `rusty-fipe.toml`; every section
//! and key is optional and falls back to the defaults below.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::model::CellValue;
use crate::data::schema::{Schema, SchemaVariant};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Initial filter selection.
    #[serde(default)]
    pub filters: FilterConfig,

    /// Aggregate settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Where the data comes from and how it is laid out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path of the CSV, JSON or Parquet file.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Built-in layout of the file.
    #[serde(default)]
    pub variant: SchemaVariant,

    /// Full layout description; overrides `variant` when present.
    #[serde(default)]
    pub schema: Option<Schema>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            variant: SchemaVariant::default(),
            schema: None,
        }
    }
}

impl SourceConfig {
    /// The effective schema descriptor.
    pub fn schema(&self) -> Schema {
        self.schema.clone().unwrap_or_else(|| self.variant.schema())
    }
}

fn default_path() -> PathBuf {
    PathBuf::from("tabela-fipe-historico-precos.csv")
}

/// Values pre-selected when a session starts. Only values present in the
/// data are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_brands")]
    pub brands: Vec<String>,

    #[serde(default = "default_model_years")]
    pub model_years: Vec<i64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            brands: default_brands(),
            model_years: default_model_years(),
        }
    }
}

impl FilterConfig {
    /// Preferred values per column of `schema`. Model years are only
    /// included when the layout has a model-year column.
    pub fn preferred(&self, schema: &Schema) -> Vec<(String, Vec<CellValue>)> {
        let mut preferred = vec![(
            schema.brand.clone(),
            self.brands.iter().map(|b| CellValue::from(b.as_str())).collect(),
        )];
        if let Some(year_col) = &schema.model_year {
            preferred.push((
                year_col.clone(),
                self.model_years.iter().map(|y| CellValue::Integer(*y)).collect(),
            ));
        }
        preferred
    }
}

fn default_brands() -> Vec<String> {
    vec!["Toyota", "Volkswagen", "Honda"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_model_years() -> Vec<i64> {
    (2020..=2024).collect()
}

/// Aggregate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Number of models in the appreciation ranking.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Model years from this one on count as new vehicles.
    #[serde(default = "default_new_vehicle_from_year")]
    pub new_vehicle_from_year: i64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            new_vehicle_from_year: default_new_vehicle_from_year(),
        }
    }
}

fn default_top_n() -> usize {
    10
}

fn default_new_vehicle_from_year() -> i64 {
    2024
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            log::info!("Loading config from: {}", path.display());
            Self::load(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Serialize configuration to TOML, e.g. to write a starter file.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
