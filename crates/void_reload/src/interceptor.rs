//! Load interception
//!
//! The host keeps its active load primitive in a [`LoaderSlot`]. Enabling
//! tracking swaps a [`TrackingLoader`] into that slot; the tracking loader
//! forwards every request to the primitive it wraps and records who asked
//! for what along the way.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::context::RequesterContext;
use crate::error::LoadError;
use crate::graph::DependencyGraph;
use crate::unit::{LoadContext, LoadUnit, UnitHandle, UnitName, UnitRegistry};

/// Graph and requester slot shared by the interceptor and the propagator
#[derive(Debug, Default)]
pub struct TrackingState {
    pub graph: RwLock<DependencyGraph>,
    pub requester: RequesterContext,
}

impl TrackingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every recorded edge and any active requester
    pub fn reset(&self) {
        self.graph.write().clear();
        self.requester.clear();
    }
}

/// Holder of the host's currently installed load primitive.
///
/// Unit bodies load through the slot, so whatever is installed sees every
/// nested load without any call site changing.
pub struct LoaderSlot {
    current: RwLock<Arc<dyn LoadUnit>>,
}

impl LoaderSlot {
    /// Create a slot holding the host's base primitive
    pub fn new(base: Arc<dyn LoadUnit>) -> Self {
        Self {
            current: RwLock::new(base),
        }
    }

    /// The primitive currently installed
    pub fn current(&self) -> Arc<dyn LoadUnit> {
        self.current.read().clone()
    }

    /// Install a new primitive, returning the one it replaces
    pub fn install(&self, loader: Arc<dyn LoadUnit>) -> Arc<dyn LoadUnit> {
        std::mem::replace(&mut *self.current.write(), loader)
    }
}

impl LoadUnit for LoaderSlot {
    fn load(&self, name: &str, context: &LoadContext) -> Result<Arc<UnitHandle>, LoadError> {
        // Clone out first so the slot is not locked while the load runs
        let loader = self.current();
        loader.load(name, context)
    }
}

/// Decorating loader that records dependency edges
pub struct TrackingLoader {
    inner: Arc<dyn LoadUnit>,
    registry: Arc<dyn UnitRegistry>,
    state: Arc<TrackingState>,
}

impl TrackingLoader {
    /// Wrap `inner`, recording edges into `state`
    pub fn new(inner: Arc<dyn LoadUnit>, registry: Arc<dyn UnitRegistry>, state: Arc<TrackingState>) -> Self {
        Self {
            inner,
            registry,
            state,
        }
    }

    /// The wrapped primitive
    pub fn inner(&self) -> &Arc<dyn LoadUnit> {
        &self.inner
    }

    fn record(&self, requester: UnitName, name: &str) {
        let Some(entry) = self.registry.lookup(name) else {
            return;
        };
        // Built-in and native units have no origin and are never reloaded
        if !entry.is_source_based() {
            return;
        }
        if self.registry.lookup(requester.as_str()).is_none() {
            return;
        }

        if self.state.graph.write().add_edge(UnitName::new(name), requester.clone()) {
            log::debug!("Recorded dependency: {} -> {}", requester, name);
        }
    }
}

impl LoadUnit for TrackingLoader {
    fn load(&self, name: &str, context: &LoadContext) -> Result<Arc<UnitHandle>, LoadError> {
        let requester = self.state.requester.current();

        let loaded = {
            let _guard = self.state.requester.enter(UnitName::new(name));
            self.inner.load(name, context)?
        };

        if let Some(requester) = requester {
            self.record(requester, name);
        }

        Ok(loaded)
    }
}
