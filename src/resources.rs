//! Named resource registry
//!
//! Server-scoped lookup of typed resources under fixed logical names. The
//! database configurator binds two entries during `ConfigureStart`: the
//! main data source and a scalar environment value. The registry is passed
//! explicitly to whatever needs it; there is no static lookup.

use crate::error::{ServerError, ServerResult};
use localdb::DatabaseHandle;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Logical name of the main data source.
pub const DATA_SOURCE_NAME: &str = "db/main";

/// Logical name of the demonstration environment value.
pub const ENV_VALUE_NAME: &str = "env/testvalue";

/// A registered resource.
#[derive(Clone)]
pub enum Resource {
    DataSource(DatabaseHandle),
    Value(i64),
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::DataSource(_) => write!(f, "DataSource"),
            Resource::Value(v) => write!(f, "Value({v})"),
        }
    }
}

/// Name-to-resource map with duplicate-refusing registration.
pub struct ResourceRegistry {
    entries: RwLock<HashMap<String, Resource>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a resource under `name`. Registering an already-bound name
    /// is a naming error.
    pub fn register(&self, name: impl Into<String>, resource: Resource) -> ServerResult<()> {
        let name = name.into();
        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(ServerError::naming(format!(
                "duplicate resource: {name}"
            )));
        }
        entries.insert(name, resource);
        Ok(())
    }

    /// Remove a binding, returning it if present. Used on after-stop so a
    /// restarted server can re-register its resources.
    pub fn remove(&self, name: &str) -> Option<Resource> {
        self.entries.write().remove(name)
    }

    /// Look up a data source by name.
    pub fn data_source(&self, name: &str) -> ServerResult<DatabaseHandle> {
        match self.entries.read().get(name) {
            Some(Resource::DataSource(handle)) => Ok(handle.clone()),
            Some(other) => Err(ServerError::naming(format!(
                "resource {name} is not a data source (found {other:?})"
            ))),
            None => Err(ServerError::naming(format!("resource not bound: {name}"))),
        }
    }

    /// Look up a scalar environment value by name.
    pub fn env_value(&self, name: &str) -> ServerResult<i64> {
        match self.entries.read().get(name) {
            Some(Resource::Value(v)) => Ok(*v),
            Some(other) => Err(ServerError::naming(format!(
                "resource {name} is not a value (found {other:?})"
            ))),
            None => Err(ServerError::naming(format!("resource not bound: {name}"))),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup_value() {
        let registry = ResourceRegistry::new();
        registry
            .register(ENV_VALUE_NAME, Resource::Value(12345))
            .unwrap();
        assert_eq!(registry.env_value(ENV_VALUE_NAME).unwrap(), 12345);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = ResourceRegistry::new();
        registry.register("x", Resource::Value(1)).unwrap();
        let err = registry.register("x", Resource::Value(2)).unwrap_err();
        assert!(matches!(err, ServerError::Naming { .. }));
        // First binding survives.
        assert_eq!(registry.env_value("x").unwrap(), 1);
    }

    #[test]
    fn test_missing_lookup_fails() {
        let registry = ResourceRegistry::new();
        assert!(registry.data_source(DATA_SOURCE_NAME).is_err());
        assert!(registry.env_value(ENV_VALUE_NAME).is_err());
    }

    #[test]
    fn test_wrong_type_lookup_fails() {
        let registry = ResourceRegistry::new();
        registry.register("n", Resource::Value(7)).unwrap();
        let err = registry.data_source("n").unwrap_err();
        assert!(err.to_string().contains("not a data source"));
    }

    #[test]
    fn test_remove_allows_re_registration() {
        let registry = ResourceRegistry::new();
        registry.register("x", Resource::Value(1)).unwrap();
        assert!(registry.remove("x").is_some());
        registry.register("x", Resource::Value(2)).unwrap();
        assert_eq!(registry.env_value("x").unwrap(), 2);
    }

    #[test]
    fn test_names_sorted() {
        let registry = ResourceRegistry::new();
        registry.register("b", Resource::Value(2)).unwrap();
        registry.register("a", Resource::Value(1)).unwrap();
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
