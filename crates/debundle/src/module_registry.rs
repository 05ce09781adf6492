//! Module registry for tracking the records extracted from one bundle
//!
//! The ModuleRegistry is the single source of truth for module identity
//! during a run. It keeps records in bundle order and guarantees that every
//! logical path appears at most once.

use crate::{
    error::UnbundleError,
    types::{FxIndexMap, FxIndexSet, ModuleRecord},
};

/// Ordered collection of the application modules found in a bundle
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    /// Map from logical path to record, in registry order
    modules: FxIndexMap<String, ModuleRecord>,
    /// Paths dropped because they matched the excluded prefix
    excluded: FxIndexSet<String>,
}

impl ModuleRegistry {
    /// Create a new empty module registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, rejecting a logical path that was already registered
    pub fn add_module(&mut self, record: ModuleRecord) -> Result<(), UnbundleError> {
        if self.modules.contains_key(&record.path) || self.excluded.contains(&record.path) {
            return Err(UnbundleError::Format(format!(
                "duplicate module path `{}`",
                record.path
            )));
        }
        log::trace!("Registered module {}", record.path);
        self.modules.insert(record.path.clone(), record);
        Ok(())
    }

    /// Remember a path that was filtered out
    pub fn add_excluded(&mut self, path: String) -> Result<(), UnbundleError> {
        if self.modules.contains_key(&path) || self.excluded.contains(&path) {
            return Err(UnbundleError::Format(format!(
                "duplicate module path `{path}`"
            )));
        }
        self.excluded.insert(path);
        Ok(())
    }

    /// Get a record by logical path
    pub fn get(&self, path: &str) -> Option<&ModuleRecord> {
        self.modules.get(path)
    }

    /// Check if a module with the given logical path was registered
    pub fn has_module(&self, path: &str) -> bool {
        self.modules.contains_key(path)
    }

    /// Iterate over records in registry order
    pub fn iter(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values()
    }

    /// Logical paths of the excluded records
    pub fn excluded(&self) -> impl Iterator<Item = &str> {
        self.excluded.iter().map(String::as_str)
    }

    /// Number of records dropped by the prefix filter
    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }

    /// Get total number of application modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the registry holds no application modules
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Consume the registry, yielding records in registry order
    pub fn into_records(self) -> Vec<ModuleRecord> {
        self.modules.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> ModuleRecord {
        ModuleRecord::new(path, Vec::new(), "")
    }

    #[test]
    fn test_registry_preserves_order() {
        let mut registry = ModuleRegistry::new();
        registry.add_module(record("./src/b.js")).expect("first insert");
        registry.add_module(record("./src/a.js")).expect("second insert");

        let paths: Vec<_> = registry.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["./src/b.js", "./src/a.js"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registry_rejects_duplicate_path() {
        let mut registry = ModuleRegistry::new();
        registry.add_module(record("./src/a.js")).expect("first insert");
        let error = registry
            .add_module(record("./src/a.js"))
            .expect_err("duplicate must fail");
        assert!(matches!(error, UnbundleError::Format(_)));
    }

    #[test]
    fn test_excluded_paths_count_toward_uniqueness() {
        let mut registry = ModuleRegistry::new();
        registry
            .add_excluded("./node_modules/x/index.js".to_owned())
            .expect("first insert");
        assert!(
            registry
                .add_module(record("./node_modules/x/index.js"))
                .is_err()
        );
        assert!(registry.is_empty());
        assert_eq!(registry.excluded_count(), 1);
    }
}
