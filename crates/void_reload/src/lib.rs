//! # void_reload - Dependency-Tracked Hot-Reload
//!
//! Records which units load which other units while they run, and uses
//! that graph to re-execute everything downstream of a changed unit.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────┐  load   ┌─────────────────┐  delegate  ┌─────────────────┐
//! │   Unit body     │────────▶│  TrackingLoader │───────────▶│  Host loader    │
//! │  (Scope::load)  │         │  (interceptor)  │            │  (LoadUnit)     │
//! └─────────────────┘         └────────┬────────┘            └─────────────────┘
//!                                      │ record edge
//!                                      ▼
//! ┌─────────────────┐  walk   ┌─────────────────┐
//! │  Propagation    │◀────────│ DependencyGraph │
//! │  (reload)       │         │                 │
//! └─────────────────┘         └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use void_reload::{MemoryHost, UnitRegistry, UnitSource};
//!
//! let host = MemoryHost::new();
//! host.define("util", UnitSource::new(|scope| { scope.set("x", 1); Ok(()) }).with_origin("util.vs"));
//! host.define("core", UnitSource::new(|scope| { scope.load_from("util", &["x"])?; Ok(()) }).with_origin("core.vs"));
//!
//! let tracker = host.tracker();
//! tracker.enable();
//! host.load("core")?;
//!
//! // util changed on disk
//! let report = tracker.reload(&host.lookup("util").unwrap())?;
//! assert_eq!(report.reloaded, ["util", "core"]);
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod interceptor;
pub mod memory;
pub mod propagate;
pub mod snapshot;
pub mod tracker;
pub mod unit;

#[cfg(feature = "watch")]
pub mod watch;

pub use config::ReloadConfig;
pub use context::{RequesterContext, RequesterGuard};
pub use error::{ConfigError, LoadError, ReloadError, Result, SnapshotError, UnitError, WatchError};
pub use graph::DependencyGraph;
pub use interceptor::{LoaderSlot, TrackingLoader, TrackingState};
pub use memory::{MemoryHost, UnitSource, HOST_BINDING};
pub use propagate::{reload_unit, Propagation, ReloadReport};
pub use snapshot::NamespaceSnapshot;
pub use tracker::DependencyTracker;
pub use unit::{
    Binding, LoadContext, LoadUnit, MigrationHook, Namespace, Scope, UnitBody, UnitHandle, UnitName, UnitRegistry,
};

#[cfg(feature = "watch")]
pub use watch::UnitWatcher;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{LoadError, ReloadError, UnitError};
    pub use crate::memory::{MemoryHost, UnitSource};
    pub use crate::tracker::DependencyTracker;
    pub use crate::unit::{Binding, LoadUnit, Namespace, Scope, UnitBody, UnitHandle, UnitName, UnitRegistry};

    #[cfg(feature = "watch")]
    pub use crate::watch::UnitWatcher;
}
