use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use log::{debug, warn};
use moka::sync::Cache;

use crate::data::loader;
use crate::data::model::Dataset;
use crate::data::schema::Schema;
use crate::error::Result;

type CacheKey = (PathBuf, Schema);

/// Memoized dataset loads keyed by canonical source path and the full schema.
///
/// The cache has no capacity bound: entries live until
/// [`invalidate`](Self::invalidate) or [`clear`](Self::clear) is called.
/// Failed loads are never cached.
pub struct DatasetCache {
    entries: Cache<CacheKey, Arc<Dataset>>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().build(),
        }
    }

    /// Process-wide instance.
    pub fn global() -> &'static DatasetCache {
        static GLOBAL: OnceLock<DatasetCache> = OnceLock::new();
        GLOBAL.get_or_init(DatasetCache::new)
    }

    fn canonical(path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    /// Return the cached dataset or load and remember it.
    ///
    /// Two threads missing the same key at once may both load the source;
    /// the last insert wins and both results are equal.
    pub fn load(&self, path: &Path, schema: &Schema) -> Result<Arc<Dataset>> {
        let key = (Self::canonical(path), schema.clone());
        if let Some(dataset) = self.entries.get(&key) {
            debug!("Cache hit for {} ({})", path.display(), schema.name);
            return Ok(dataset);
        }
        let dataset = Arc::new(loader::load_file(path, schema)?);
        self.entries.insert(key, Arc::clone(&dataset));
        Ok(dataset)
    }

    /// Like [`load`](Self::load), but a missing source yields an empty
    /// dataset that is not cached, so a file created later is picked up.
    pub fn load_or_empty(&self, path: &Path, schema: &Schema) -> Result<Arc<Dataset>> {
        match self.load(path, schema) {
            Err(err) if err.is_not_found() => {
                warn!("{err}; continuing with an empty dataset");
                Ok(Arc::new(Dataset::empty(schema.clone())))
            }
            other => other,
        }
    }

    /// Drop every entry loaded from `path`, whatever its schema. Returns how
    /// many were removed.
    pub fn invalidate(&self, path: &Path) -> usize {
        let path = Self::canonical(path);
        let stale: Vec<Arc<CacheKey>> = self
            .entries
            .iter()
            .map(|(key, _)| key)
            .filter(|key| key.0 == path)
            .collect();
        for key in &stale {
            self.entries.invalidate(key.as_ref());
        }
        stale.len()
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Number of cached datasets.
    pub fn len(&self) -> usize {
        // moka applies removals lazily; settle them so the count is exact
        self.entries.run_pending_tasks();
        usize::try_from(self.entries.entry_count()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DatasetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DatasetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::SchemaVariant;
    use std::io::Write;

    fn source() -> tempfile::NamedTempFile {
        let mut tmp = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(
            tmp,
            "marca,modelo,anoModelo,mesReferencia,anoReferencia,valor\nFiat,Uno,2020,1,2021,100\n"
        )
        .unwrap();
        tmp
    }

    #[test]
    fn test_second_load_is_shared() {
        let tmp = source();
        let cache = DatasetCache::new();
        let schema = SchemaVariant::PriceHistory.schema();
        let a = cache.load(tmp.path(), &schema).unwrap();
        let b = cache.load(tmp.path(), &schema).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let tmp = source();
        let cache = DatasetCache::new();
        let schema = SchemaVariant::PriceHistory.schema();
        let a = cache.load(tmp.path(), &schema).unwrap();
        assert_eq!(cache.invalidate(tmp.path()), 1);
        let b = cache.load(tmp.path(), &schema).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_same_name_different_delimiter_is_separate_entry() {
        let tmp = source();
        let cache = DatasetCache::new();
        let comma = SchemaVariant::PriceHistory.schema();
        let mut semicolon = comma.clone();
        semicolon.delimiter = ';';

        let a = cache.load(tmp.path(), &comma).unwrap();
        assert_eq!(a.len(), 1);
        // same name, different layout: not served from the comma entry
        let err = cache.load(tmp.path(), &semicolon).unwrap_err();
        assert!(matches!(err, crate::EngineError::SchemaMismatch { .. }));
        assert_eq!(cache.len(), 1);

        let mut renamed_price = comma.clone();
        renamed_price.required.retain(|c| c != "valor");
        renamed_price.price = "anoModelo".to_string();
        let b = cache.load(tmp.path(), &renamed_price).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.records()[0].price, 2020.0);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.invalidate(tmp.path()), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_source_not_cached() {
        let cache = DatasetCache::new();
        let schema = SchemaVariant::PriceHistory.schema();
        let ds = cache
            .load_or_empty(Path::new("/nonexistent/tabela.csv"), &schema)
            .unwrap();
        assert!(ds.is_empty());
        assert!(cache.is_empty());
    }
}
