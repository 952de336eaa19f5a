//! Reload propagation
//!
//! A [`Propagation`] re-executes one unit and then walks the dependency
//! graph depth-first, re-executing every unit that (transitively) loaded
//! it. It owns the visited set, so each top-level reload gets a fresh one
//! and no unit is re-executed twice within it, cycles included.
//!
//! The walk is fail-fast. The first error stops it and units already
//! re-executed stay that way.

use std::collections::HashSet;

use crate::error::{ReloadError, Result};
use crate::interceptor::TrackingState;
use crate::unit::{LoadUnit, UnitHandle, UnitName, UnitRegistry};

/// Outcome of a completed reload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    /// Units re-executed, in the order they ran
    pub reloaded: Vec<UnitName>,
    /// Every unit the walk visited
    pub visited: HashSet<UnitName>,
}

impl ReloadReport {
    pub fn was_reloaded(&self, name: &str) -> bool {
        self.reloaded.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.reloaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reloaded.is_empty()
    }
}

/// One top-level reload walk
pub struct Propagation<'a> {
    state: &'a TrackingState,
    registry: &'a dyn UnitRegistry,
    loader: &'a dyn LoadUnit,
    report: ReloadReport,
}

impl<'a> Propagation<'a> {
    /// Start a walk.
    ///
    /// `loader` is what re-executed bodies load through; pass the host's
    /// slot so nested loads go through the interceptor.
    pub fn new(state: &'a TrackingState, registry: &'a dyn UnitRegistry, loader: &'a dyn LoadUnit) -> Self {
        Self {
            state,
            registry,
            loader,
            report: ReloadReport::default(),
        }
    }

    /// Reload `unit` and everything depending on it
    pub fn run(mut self, unit: &UnitHandle) -> Result<ReloadReport> {
        self.visit(unit)?;
        Ok(self.report)
    }

    fn visit(&mut self, unit: &UnitHandle) -> Result<()> {
        let Some(name) = unit.name().cloned() else {
            return Ok(());
        };

        self.report.visited.insert(name.clone());
        self.reinitialize(&name, unit)?;
        self.report.reloaded.push(name.clone());

        // Re-execution may have recorded new edges, so copy the list out
        // before recursing.
        let dependents: Vec<UnitName> = self
            .state
            .graph
            .read()
            .dependents_of(name.as_str())
            .map(<[UnitName]>::to_vec)
            .unwrap_or_default();

        for dependent in dependents {
            if self.report.visited.contains(&dependent) {
                continue;
            }
            match self.registry.lookup(dependent.as_str()) {
                Some(handle) => self.visit(&handle)?,
                None => {
                    log::warn!("Skipping '{}': no longer registered (depends on '{}')", dependent, name);
                }
            }
        }

        Ok(())
    }

    fn reinitialize(&self, name: &UnitName, unit: &UnitHandle) -> Result<()> {
        let _requester = self.state.requester.enter(name.clone());

        if unit.migration_hook().is_some() {
            let snapshot = unit.snapshot().map_err(|source| ReloadError::Snapshot {
                unit: name.clone(),
                source,
            })?;
            unit.reinitialize(self.loader)
                .map_err(|source| ReloadError::Reinitialize {
                    unit: name.clone(),
                    source,
                })?;
            unit.migrate(snapshot).map_err(|source| ReloadError::Migration {
                unit: name.clone(),
                source,
            })?;
        } else {
            unit.reinitialize(self.loader)
                .map_err(|source| ReloadError::Reinitialize {
                    unit: name.clone(),
                    source,
                })?;
        }

        log::debug!("Reloaded unit: {}", name);
        Ok(())
    }
}

/// Run one propagation starting at `unit`
pub fn reload_unit(
    state: &TrackingState,
    registry: &dyn UnitRegistry,
    loader: &dyn LoadUnit,
    unit: &UnitHandle,
) -> Result<ReloadReport> {
    Propagation::new(state, registry, loader).run(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LoadError, UnitError};
    use crate::unit::{LoadContext, Scope, UnitBody};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Body that logs every run into a shared journal
    struct Journal {
        name: &'static str,
        runs: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl UnitBody for Journal {
        fn execute(&self, _scope: &mut Scope<'_>) -> std::result::Result<(), UnitError> {
            self.runs.lock().push(self.name);
            if self.fail {
                return Err("broken".into());
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Registry(HashMap<&'static str, Arc<UnitHandle>>);

    impl UnitRegistry for Registry {
        fn lookup(&self, name: &str) -> Option<Arc<UnitHandle>> {
            self.0.get(name).cloned()
        }
    }

    impl LoadUnit for Registry {
        fn load(&self, name: &str, _context: &LoadContext) -> std::result::Result<Arc<UnitHandle>, LoadError> {
            self.lookup(name).ok_or_else(|| LoadError::NotFound(name.into()))
        }
    }

    fn build(names: &[&'static str], failing: &[&str]) -> (Registry, Arc<Mutex<Vec<&'static str>>>) {
        let runs = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::default();
        for &name in names {
            let body = Journal {
                name,
                runs: runs.clone(),
                fail: failing.contains(&name),
            };
            registry.0.insert(name, Arc::new(UnitHandle::new(name, Arc::new(body)).with_origin(name)));
        }
        (registry, runs)
    }

    fn edges(state: &TrackingState, pairs: &[(&str, &str)]) {
        let mut graph = state.graph.write();
        for (dependency, dependent) in pairs {
            graph.add_edge((*dependency).into(), (*dependent).into());
        }
    }

    #[test]
    fn test_diamond_reloads_each_once() {
        let (registry, runs) = build(&["base", "left", "right", "top"], &[]);
        let state = TrackingState::new();
        edges(&state, &[("base", "left"), ("base", "right"), ("left", "top"), ("right", "top")]);

        let base = registry.lookup("base").unwrap();
        let report = reload_unit(&state, &registry, &registry, &base).unwrap();

        let mut seen = runs.lock().clone();
        assert_eq!(seen[0], "base");
        seen.sort();
        assert_eq!(seen, ["base", "left", "right", "top"]);
        assert_eq!(report.len(), 4);
    }

    #[test]
    fn test_cycle_terminates() {
        let (registry, runs) = build(&["a", "b"], &[]);
        let state = TrackingState::new();
        edges(&state, &[("a", "b"), ("b", "a")]);

        let a = registry.lookup("a").unwrap();
        reload_unit(&state, &registry, &registry, &a).unwrap();

        assert_eq!(*runs.lock(), ["a", "b"]);
    }

    #[test]
    fn test_failure_stops_walk_without_rollback() {
        let (registry, runs) = build(&["root", "bad", "after"], &["bad"]);
        let state = TrackingState::new();
        edges(&state, &[("root", "bad"), ("bad", "after")]);

        let root = registry.lookup("root").unwrap();
        let err = reload_unit(&state, &registry, &registry, &root).unwrap_err();

        assert!(matches!(err, ReloadError::Reinitialize { ref unit, .. } if unit == "bad"));
        assert_eq!(*runs.lock(), ["root", "bad"]);
        assert_eq!(state.requester.current(), None);
    }

    #[test]
    fn test_anonymous_unit_is_vacuous() {
        let runs = Arc::new(Mutex::new(Vec::new()));
        let body = Journal {
            name: "anon",
            runs: runs.clone(),
            fail: false,
        };
        let unit = Arc::new(UnitHandle::anonymous(Arc::new(body)));
        let registry = Registry::default();
        let state = TrackingState::new();

        let report = reload_unit(&state, &registry, &registry, &unit).unwrap();

        assert!(report.is_empty());
        assert!(runs.lock().is_empty());
    }

    #[test]
    fn test_unregistered_dependent_is_skipped() {
        let (registry, runs) = build(&["lib"], &[]);
        let state = TrackingState::new();
        edges(&state, &[("lib", "gone")]);

        let lib = registry.lookup("lib").unwrap();
        let report = reload_unit(&state, &registry, &registry, &lib).unwrap();

        assert_eq!(*runs.lock(), ["lib"]);
        assert!(!report.was_reloaded("gone"));
    }

    #[test]
    fn test_requester_set_during_reinitialize() {
        struct Probe {
            state: Arc<TrackingState>,
            seen: Arc<Mutex<Option<UnitName>>>,
        }

        impl UnitBody for Probe {
            fn execute(&self, _scope: &mut Scope<'_>) -> std::result::Result<(), UnitError> {
                *self.seen.lock() = self.state.requester.current();
                Ok(())
            }
        }

        let state = Arc::new(TrackingState::new());
        let seen = Arc::new(Mutex::new(None));
        let unit = Arc::new(
            UnitHandle::new(
                "sensor",
                Arc::new(Probe {
                    state: state.clone(),
                    seen: seen.clone(),
                }),
            )
            .with_origin("sensor.vs"),
        );
        let registry = Registry::default();

        reload_unit(&state, &registry, &registry, &unit).unwrap();

        assert_eq!(*seen.lock(), Some(UnitName::new("sensor")));
        assert_eq!(state.requester.current(), None);
    }
}
