//! In-process reference host
//!
//! [`MemoryHost`] is a complete host loader and registry whose unit bodies
//! are Rust closures. Redefining a unit's source and reloading it behaves
//! like editing a file on disk: the next re-execution runs the new body.
//!
//! ```ignore
//! let host = MemoryHost::new();
//! host.define("util", UnitSource::new(|scope| {
//!     scope.set("version", 1);
//!     Ok(())
//! }).with_origin("util.vs"));
//! host.define("core", UnitSource::new(|scope| {
//!     scope.load_from("util", &["version"])?;
//!     Ok(())
//! }).with_origin("core.vs"));
//!
//! let tracker = host.tracker();
//! tracker.enable();
//! host.load("core")?;
//! tracker.reload(&host.lookup("util").unwrap())?;
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::{LoadError, UnitError};
use crate::interceptor::LoaderSlot;
use crate::snapshot::NamespaceSnapshot;
use crate::tracker::DependencyTracker;
use crate::unit::{
    Binding, LoadContext, LoadUnit, MigrationHook, Namespace, Scope, UnitBody, UnitHandle, UnitName, UnitRegistry,
};

/// Name of the runtime-internal binding every memory unit carries
pub const HOST_BINDING: &str = "__host__";

type BodyFn = dyn Fn(&mut Scope<'_>) -> Result<(), UnitError> + Send + Sync;

/// Source of a unit: the body closure plus where it "lives"
#[derive(Clone)]
pub struct UnitSource {
    body: Arc<BodyFn>,
    origin: Option<PathBuf>,
    migration: Option<Arc<dyn MigrationHook>>,
}

impl UnitSource {
    /// Create a source from a body closure
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&mut Scope<'_>) -> Result<(), UnitError> + Send + Sync + 'static,
    {
        Self {
            body: Arc::new(body),
            origin: None,
            migration: None,
        }
    }

    /// Give the unit a source origin so it is tracked and reloadable
    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Attach a migration hook
    pub fn with_migration<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Namespace, NamespaceSnapshot) -> Result<(), UnitError> + Send + Sync + 'static,
    {
        let hook: Arc<dyn MigrationHook> = Arc::new(hook);
        self.migration = Some(hook);
        self
    }
}

#[derive(Default)]
struct UnitTable {
    sources: RwLock<HashMap<String, UnitSource>>,
    loaded: RwLock<HashMap<String, Arc<UnitHandle>>>,
}

impl UnitTable {
    fn source(&self, name: &str) -> Option<UnitSource> {
        self.sources.read().get(name).cloned()
    }
}

impl UnitRegistry for UnitTable {
    fn lookup(&self, name: &str) -> Option<Arc<UnitHandle>> {
        self.loaded.read().get(name).cloned()
    }
}

/// Body of a memory unit: looks up the current source each time it runs
struct TableBody {
    name: String,
    table: Weak<UnitTable>,
}

impl TableBody {
    fn source(&self) -> Option<UnitSource> {
        self.table.upgrade()?.source(&self.name)
    }
}

impl UnitBody for TableBody {
    fn execute(&self, scope: &mut Scope<'_>) -> Result<(), UnitError> {
        let source = self
            .source()
            .ok_or_else(|| UnitError::Message(format!("source of '{}' is gone", self.name)))?;
        (source.body)(scope)
    }

    fn migration_hook(&self) -> Option<Arc<dyn MigrationHook>> {
        self.source()?.migration
    }
}

/// The host's base load primitive
struct MemoryLoader {
    table: Arc<UnitTable>,
    slot: Weak<LoaderSlot>,
}

impl LoadUnit for MemoryLoader {
    fn load(&self, name: &str, _context: &LoadContext) -> Result<Arc<UnitHandle>, LoadError> {
        if let Some(unit) = self.table.lookup(name) {
            return Ok(unit);
        }

        let source = self
            .table
            .source(name)
            .ok_or_else(|| LoadError::NotFound(name.to_string()))?;
        let slot = self
            .slot
            .upgrade()
            .ok_or_else(|| LoadError::failed(name, "host has shut down"))?;

        let mut namespace = Namespace::new();
        namespace.set_internal(HOST_BINDING, Binding::from("memory"));
        let body = TableBody {
            name: name.to_string(),
            table: Arc::downgrade(&self.table),
        };
        let mut unit = UnitHandle::new(name, Arc::new(body)).with_namespace(namespace);
        if let Some(origin) = source.origin {
            unit = unit.with_origin(origin);
        }
        let unit = Arc::new(unit);

        // Registered before the body runs so cyclic loads find it
        self.table.loaded.write().insert(name.to_string(), unit.clone());

        if let Err(e) = unit.execute(&*slot) {
            self.table.loaded.write().remove(name);
            return Err(LoadError::execution(name, e));
        }

        log::debug!("Loaded unit: {}", name);
        Ok(unit)
    }
}

/// In-memory host loader and registry
pub struct MemoryHost {
    table: Arc<UnitTable>,
    slot: Arc<LoaderSlot>,
}

impl MemoryHost {
    /// Create an empty host
    pub fn new() -> Self {
        let table = Arc::new(UnitTable::default());
        let slot = Arc::new_cyclic(|weak| {
            LoaderSlot::new(Arc::new(MemoryLoader {
                table: table.clone(),
                slot: weak.clone(),
            }))
        });
        Self { table, slot }
    }

    /// Register or replace the source of a unit
    pub fn define(&self, name: &str, source: UnitSource) {
        self.table.sources.write().insert(name.to_string(), source);
    }

    /// Load a unit through the installed primitive as a top-level request
    pub fn load(&self, name: &str) -> Result<Arc<UnitHandle>, LoadError> {
        self.slot.load(name, &LoadContext::default())
    }

    /// Evict a loaded unit; its source stays defined
    pub fn remove(&self, name: &str) -> Option<Arc<UnitHandle>> {
        self.table.loaded.write().remove(name)
    }

    /// Names of all loaded units, sorted
    pub fn loaded(&self) -> Vec<UnitName> {
        let mut names: Vec<UnitName> = self.table.loaded.read().keys().map(|k| UnitName::new(k.as_str())).collect();
        names.sort();
        names
    }

    /// The slot unit bodies load through
    pub fn slot(&self) -> Arc<LoaderSlot> {
        self.slot.clone()
    }

    /// The host registry
    pub fn registry(&self) -> Arc<dyn UnitRegistry> {
        self.table.clone()
    }

    /// Build a tracker bound to this host
    pub fn tracker(&self) -> DependencyTracker {
        DependencyTracker::new(self.registry(), self.slot())
    }
}

impl UnitRegistry for MemoryHost {
    fn lookup(&self, name: &str) -> Option<Arc<UnitHandle>> {
        self.table.lookup(name)
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_executes_once() {
        let host = MemoryHost::new();
        host.define(
            "config",
            UnitSource::new(|scope| {
                let n = scope.value("loads").and_then(|v| v.as_i64()).unwrap_or(0);
                scope.set("loads", n + 1);
                Ok(())
            }),
        );

        let first = host.load("config").unwrap();
        let second = host.load("config").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.value("loads"), Some(json!(1)));
        assert!(first.namespace().is_internal(HOST_BINDING));
    }

    #[test]
    fn test_unknown_unit() {
        let host = MemoryHost::new();
        assert!(matches!(host.load("nope"), Err(LoadError::NotFound(_))));
    }

    #[test]
    fn test_failed_body_is_deregistered() {
        let host = MemoryHost::new();
        host.define("bad", UnitSource::new(|_| Err("syntax error".into())));

        let err = host.load("bad").unwrap_err();

        assert!(matches!(err, LoadError::Execution { ref name, .. } if name == "bad"));
        assert!(host.lookup("bad").is_none());
    }

    #[test]
    fn test_redefine_takes_effect_on_reinitialize() {
        let host = MemoryHost::new();
        host.define("greeter", UnitSource::new(|scope| {
            scope.set("text", "hello");
            Ok(())
        }));
        let unit = host.load("greeter").unwrap();

        host.define("greeter", UnitSource::new(|scope| {
            scope.set("text", "bonjour");
            Ok(())
        }));
        unit.reinitialize(&*host.slot()).unwrap();

        assert_eq!(unit.value("text"), Some(json!("bonjour")));
    }

    #[test]
    fn test_cyclic_load_sees_partial_unit() {
        let host = MemoryHost::new();
        host.define("a", UnitSource::new(|scope| {
            scope.load("b")?;
            scope.set("ready", true);
            Ok(())
        }));
        host.define("b", UnitSource::new(|scope| {
            let a = scope.load("a")?;
            scope.set("a_ready", a.value("ready").is_some());
            Ok(())
        }));

        host.load("a").unwrap();

        assert_eq!(host.lookup("b").unwrap().value("a_ready"), Some(json!(false)));
        assert_eq!(host.loaded(), vec![UnitName::new("a"), UnitName::new("b")]);
    }

    #[test]
    fn test_nested_load_sees_bindings_made_so_far() {
        let host = MemoryHost::new();
        host.define("a", UnitSource::new(|scope| {
            scope.set("x", 1);
            scope.load("c")?;
            scope.set("done", true);
            Ok(())
        }));
        host.define("c", UnitSource::new(|scope| {
            let a = scope.load_from("a", &["x"])?;
            scope.set("saw_host", a.namespace().is_internal(HOST_BINDING));
            Ok(())
        }));

        host.load("a").unwrap();

        let c = host.lookup("c").unwrap();
        assert_eq!(c.value("x"), Some(json!(1)));
        assert_eq!(c.value("saw_host"), Some(json!(true)));
        assert_eq!(host.lookup("a").unwrap().value("done"), Some(json!(true)));
    }
}
