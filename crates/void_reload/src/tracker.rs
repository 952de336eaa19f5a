//! Host-facing entry points
//!
//! A [`DependencyTracker`] is bound to one host: its registry and the slot
//! holding its load primitive. `enable` installs the interceptor into the
//! slot, `disable` puts the original primitive back and forgets everything
//! recorded, and `reload` drives the propagator over the recorded graph.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::interceptor::{LoaderSlot, TrackingLoader, TrackingState};
use crate::propagate::{reload_unit, ReloadReport};
use crate::unit::{LoadUnit, UnitHandle, UnitName, UnitRegistry};

/// Dependency tracking and reload propagation for one host
pub struct DependencyTracker {
    registry: Arc<dyn UnitRegistry>,
    slot: Arc<LoaderSlot>,
    state: Arc<TrackingState>,
    /// The host's own primitive, saved while tracking is enabled
    original: Mutex<Option<Arc<dyn LoadUnit>>>,
}

impl DependencyTracker {
    /// Create a tracker; nothing is intercepted until [`enable`](Self::enable)
    pub fn new(registry: Arc<dyn UnitRegistry>, slot: Arc<LoaderSlot>) -> Self {
        Self {
            registry,
            slot,
            state: Arc::new(TrackingState::new()),
            original: Mutex::new(None),
        }
    }

    /// Install the load interceptor.
    ///
    /// Enabling an already enabled tracker leaves the installed interceptor
    /// in place.
    pub fn enable(&self) {
        let mut original = self.original.lock();
        if original.is_some() {
            log::warn!("Dependency tracking already enabled");
            return;
        }

        let current = self.slot.current();
        *original = Some(current.clone());
        let tracking = TrackingLoader::new(current, self.registry.clone(), self.state.clone());
        self.slot.install(Arc::new(tracking));
        log::info!("Dependency tracking enabled");
    }

    /// Restore the original primitive and clear the graph and requester
    pub fn disable(&self) {
        if let Some(original) = self.original.lock().take() {
            self.slot.install(original);
        }
        self.state.reset();
        log::info!("Dependency tracking disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.original.lock().is_some()
    }

    /// Re-execute `unit` and, transitively, every unit that depends on it
    pub fn reload(&self, unit: &UnitHandle) -> Result<ReloadReport> {
        let report = reload_unit(&self.state, self.registry.as_ref(), self.slot.as_ref(), unit)?;
        log::info!(
            "Reloaded {} unit(s) starting at {}",
            report.len(),
            unit.name().map_or("<anonymous>", UnitName::as_str)
        );
        Ok(report)
    }

    /// Reload a unit by name; `Ok(None)` if it is not loaded
    pub fn reload_by_name(&self, name: &str) -> Result<Option<ReloadReport>> {
        match self.registry.lookup(name) {
            Some(unit) => self.reload(&unit).map(Some),
            None => Ok(None),
        }
    }

    /// Handles of the units recorded as depending on `unit`.
    ///
    /// `None` if nothing was ever recorded for it. Dependents that are no
    /// longer registered are left out.
    pub fn get_dependents(&self, unit: &UnitHandle) -> Option<Vec<Arc<UnitHandle>>> {
        let names = self.dependent_names(unit.name()?.as_str())?;
        Some(
            names
                .iter()
                .filter_map(|name| self.registry.lookup(name.as_str()))
                .collect(),
        )
    }

    /// Names recorded as depending on `name`
    pub fn dependent_names(&self, name: &str) -> Option<Vec<UnitName>> {
        self.state.graph.read().dependents_of(name).map(<[UnitName]>::to_vec)
    }

    /// Number of recorded edges
    pub fn edge_count(&self) -> usize {
        self.state.graph.read().edge_count()
    }

    /// The unit whose load or reload is in progress
    pub fn current_requester(&self) -> Option<UnitName> {
        self.state.requester.current()
    }
}

impl Drop for DependencyTracker {
    fn drop(&mut self) {
        // Leave the host with its own primitive
        if let Some(original) = self.original.get_mut().take() {
            self.slot.install(original);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::memory::{MemoryHost, UnitSource};
    use crate::unit::UnitName;

    fn host() -> MemoryHost {
        let host = MemoryHost::new();
        host.define(
            "util",
            UnitSource::new(|scope| {
                scope.set("value", 1);
                Ok(())
            })
            .with_origin("util.vs"),
        );
        host.define(
            "core",
            UnitSource::new(|scope| {
                scope.load("util")?;
                Ok(())
            })
            .with_origin("core.vs"),
        );
        host
    }

    #[test]
    fn test_not_enabled_records_nothing() {
        let host = host();
        let tracker = host.tracker();

        host.load("core").unwrap();

        assert!(!tracker.is_enabled());
        assert_eq!(tracker.edge_count(), 0);
    }

    #[test]
    fn test_enable_disable() {
        let host = host();
        let tracker = host.tracker();

        tracker.enable();
        assert!(tracker.is_enabled());
        host.load("core").unwrap();
        assert_eq!(tracker.edge_count(), 1);

        tracker.disable();
        assert!(!tracker.is_enabled());
        assert_eq!(tracker.edge_count(), 0);
        assert!(tracker.dependent_names("util").is_none());
    }

    #[test]
    fn test_double_enable_is_idempotent() {
        let host = host();
        let tracker = host.tracker();

        tracker.enable();
        tracker.enable();
        host.load("core").unwrap();
        assert_eq!(tracker.dependent_names("util").unwrap(), vec![UnitName::new("core")]);
        assert!(tracker.dependent_names("core").is_none());
        assert_eq!(tracker.edge_count(), 1);

        tracker.disable();
        host.remove("core");
        host.load("core").unwrap();
        assert_eq!(tracker.edge_count(), 0);
    }

    #[test]
    fn test_drop_uninstalls() {
        let host = host();
        {
            let tracker = host.tracker();
            tracker.enable();
        }

        let tracker = host.tracker();
        host.load("core").unwrap();
        assert_eq!(tracker.edge_count(), 0);
    }

    #[test]
    fn test_reload_by_name_unknown() {
        let host = host();
        let tracker = host.tracker();
        assert!(tracker.reload_by_name("ghost").unwrap().is_none());
    }
}
