//! # rusty-fipe
//!
//! Filter and aggregate engine for Brazilian vehicle price history (FIPE)
//! and sales tables. It loads a table once, narrows it with per-column
//! selections and derives the figures a dashboard shows:
//!
//! - headline summary (models, mean price, covered period)
//! - price evolution of one model over time
//! - models ranked by appreciation between first and last record
//! - mean price (or sales/revenue) per group, e.g. new vs used or brand
//!
//! Rendering is left to the caller; every result is a plain serializable value.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use rusty_fipe::{filter, metrics, loader, FilterSpec, SchemaVariant};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema = SchemaVariant::PriceHistory.schema();
//!     let dataset = loader::load_file(Path::new("tabela-fipe-historico-precos.csv"), &schema)?;
//!
//!     let spec = FilterSpec::new().one_of("marca", ["Toyota", "Honda"]);
//!     let filtered = filter::apply(&dataset, &spec);
//!
//!     let summary = metrics::summarize(&filtered);
//!     println!("{} models, mean price {:.2}", summary.count_models, summary.mean_price);
//!
//!     for entry in metrics::top_appreciation(&filtered, 10) {
//!         println!("{:<30} {:>8.2}%", entry.model, entry.pct_change);
//!     }
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod state;

pub use analysis::{aggregator, metrics};
pub use cache::DatasetCache;
pub use config::Config;
pub use data::filter::{self, Constraint, FilterSpec};
pub use data::loader;
pub use data::model::{CellValue, Dataset, Record};
pub use data::schema::{Schema, SchemaVariant, TimestampSource};
pub use error::EngineError;
pub use state::{DashboardView, Session};
