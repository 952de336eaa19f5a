//! Units, their namespaces, and the host-facing seams
//!
//! A unit is an independently loadable piece of code addressed by name.
//! The host owns units through its registry; this crate only ever holds
//! `Arc<UnitHandle>` clones transiently and refers to units by name.
//!
//! The host plugs in through four traits:
//! - [`LoadUnit`] - the loading primitive (resolve, execute, register)
//! - [`UnitRegistry`] - lookup of already-loaded units
//! - [`UnitBody`] - the code a unit runs when it is (re-)executed
//! - [`MigrationHook`] - optional state carry-over after re-execution

use std::any::Any;
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LoadError, SnapshotError, UnitError};
use crate::snapshot::NamespaceSnapshot;

/// Stable name of a unit
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitName(String);

impl UnitName {
    /// Create a new unit name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitName({})", self.0)
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UnitName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for UnitName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for UnitName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for UnitName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A single namespace entry
#[derive(Clone)]
pub enum Binding {
    /// Plain data, deep-copyable
    Value(Value),
    /// Opaque runtime object shared by reference
    Native(Arc<dyn Any + Send + Sync>),
}

impl Binding {
    /// Wrap a native object
    pub fn native<T: Any + Send + Sync>(value: T) -> Self {
        Binding::Native(Arc::new(value))
    }

    /// Get the plain value, if this is not a native binding
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Binding::Value(v) => Some(v),
            Binding::Native(_) => None,
        }
    }

    /// Downcast a native binding
    pub fn downcast_native<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Binding::Native(obj) => obj.downcast_ref(),
            Binding::Value(_) => None,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Binding::Native(_))
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Binding::Native(_) => f.write_str("Native(..)"),
        }
    }
}

impl From<Value> for Binding {
    fn from(v: Value) -> Self {
        Binding::Value(v)
    }
}

impl From<&str> for Binding {
    fn from(s: &str) -> Self {
        Binding::Value(Value::from(s))
    }
}

impl From<String> for Binding {
    fn from(s: String) -> Self {
        Binding::Value(Value::from(s))
    }
}

impl From<i64> for Binding {
    fn from(n: i64) -> Self {
        Binding::Value(Value::from(n))
    }
}

impl From<i32> for Binding {
    fn from(n: i32) -> Self {
        Binding::Value(Value::from(n))
    }
}

impl From<f64> for Binding {
    fn from(n: f64) -> Self {
        Binding::Value(Value::from(n))
    }
}

impl From<bool> for Binding {
    fn from(b: bool) -> Self {
        Binding::Value(Value::from(b))
    }
}

/// The bindings a unit's body produces when it runs.
///
/// Names marked runtime-internal belong to the host (for example a link back
/// to builtins). They are left out of snapshots and survive re-execution.
#[derive(Clone, Debug, Default)]
pub struct Namespace {
    bindings: BTreeMap<String, Binding>,
    internal: BTreeSet<String>,
}

impl Namespace {
    /// Create an empty namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a name, returning the previous binding
    pub fn set(&mut self, key: impl Into<String>, binding: impl Into<Binding>) -> Option<Binding> {
        self.bindings.insert(key.into(), binding.into())
    }

    /// Bind a runtime-internal name
    pub fn set_internal(&mut self, key: impl Into<String>, binding: impl Into<Binding>) {
        let key = key.into();
        self.internal.insert(key.clone());
        self.bindings.insert(key, binding.into());
    }

    pub fn get(&self, key: &str) -> Option<&Binding> {
        self.bindings.get(key)
    }

    /// Get a plain value by name
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.bindings.get(key).and_then(Binding::as_value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Binding> {
        self.internal.remove(key);
        self.bindings.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.bindings.contains_key(key)
    }

    /// Check whether a name is runtime-internal
    pub fn is_internal(&self, key: &str) -> bool {
        self.internal.contains(key)
    }

    /// Iterate over all bindings, internal ones included
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over bindings that are not runtime-internal
    pub fn public(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.iter().filter(|(k, _)| !self.internal.contains(*k))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop every binding that is not runtime-internal
    pub fn clear_public(&mut self) {
        let internal = &self.internal;
        self.bindings.retain(|k, _| internal.contains(k));
    }
}

/// Contextual information a host loader needs for one load request.
///
/// The tracking layer forwards it untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadContext {
    /// Unit whose body issued the request, if any
    pub caller: Option<UnitName>,
    /// Names to pull out of the loaded unit (submodule selection hint)
    pub from_list: Vec<String>,
    /// Relative load depth, 0 for absolute names
    pub level: u32,
}

impl LoadContext {
    /// Context for a load issued by `caller`
    pub fn from_caller(caller: Option<UnitName>) -> Self {
        Self {
            caller,
            ..Self::default()
        }
    }

    /// Add a from-list hint
    pub fn with_from_list<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.from_list = names.into_iter().map(Into::into).collect();
        self
    }
}

/// The host's unit-loading primitive
pub trait LoadUnit: Send + Sync {
    /// Resolve, execute and register a unit, or return it if already loaded
    fn load(&self, name: &str, context: &LoadContext) -> Result<Arc<UnitHandle>, LoadError>;
}

/// The host's registry of already-loaded units
pub trait UnitRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<UnitHandle>>;
}

/// The code a unit runs against its namespace
pub trait UnitBody: Send + Sync {
    /// Run the unit's body
    fn execute(&self, scope: &mut Scope<'_>) -> Result<(), UnitError>;

    /// Optional hook that ports state forward after re-execution
    fn migration_hook(&self) -> Option<Arc<dyn MigrationHook>> {
        None
    }
}

/// Unit-supplied callback run after re-execution.
///
/// Receives the freshly re-executed namespace and an owned snapshot of the
/// namespace as it was right before re-execution.
pub trait MigrationHook: Send + Sync {
    fn migrate(&self, namespace: &mut Namespace, previous: NamespaceSnapshot) -> Result<(), UnitError>;
}

impl<F> MigrationHook for F
where
    F: Fn(&mut Namespace, NamespaceSnapshot) -> Result<(), UnitError> + Send + Sync,
{
    fn migrate(&self, namespace: &mut Namespace, previous: NamespaceSnapshot) -> Result<(), UnitError> {
        self(namespace, previous)
    }
}

/// Execution environment handed to a [`UnitBody`].
///
/// Reads and writes go straight to the unit's live namespace, each under a
/// short lock, so a nested load can read what the body has bound so far.
/// Guards from [`namespace`](Self::namespace) and
/// [`namespace_mut`](Self::namespace_mut) must be dropped before loading.
pub struct Scope<'a> {
    unit: Option<&'a UnitName>,
    namespace: &'a RwLock<Namespace>,
    loader: &'a dyn LoadUnit,
}

impl<'a> Scope<'a> {
    /// Create a scope over a unit's live namespace
    pub fn new(unit: Option<&'a UnitName>, namespace: &'a RwLock<Namespace>, loader: &'a dyn LoadUnit) -> Self {
        Self {
            unit,
            namespace,
            loader,
        }
    }

    /// Name of the unit being executed
    pub fn unit_name(&self) -> Option<&UnitName> {
        self.unit
    }

    /// Load another unit through the host's installed primitive
    pub fn load(&self, name: &str) -> Result<Arc<UnitHandle>, LoadError> {
        self.loader.load(name, &LoadContext::from_caller(self.unit.cloned()))
    }

    /// Load another unit with an explicit context
    pub fn load_with(&self, name: &str, context: &LoadContext) -> Result<Arc<UnitHandle>, LoadError> {
        self.loader.load(name, context)
    }

    /// Load a unit and bind the listed names from it into this namespace
    pub fn load_from(&mut self, name: &str, names: &[&str]) -> Result<Arc<UnitHandle>, UnitError> {
        let context = LoadContext::from_caller(self.unit.cloned()).with_from_list(names.iter().copied());
        let unit = self.loader.load(name, &context)?;
        for key in names {
            let binding = unit
                .get(key)
                .ok_or_else(|| UnitError::Message(format!("cannot import '{}' from '{}'", key, name)))?;
            self.namespace.write().set(*key, binding);
        }
        Ok(unit)
    }

    pub fn set(&mut self, key: impl Into<String>, binding: impl Into<Binding>) {
        self.namespace.write().set(key, binding);
    }

    pub fn get(&self, key: &str) -> Option<Binding> {
        self.namespace.read().get(key).cloned()
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.namespace.read().value(key).cloned()
    }

    pub fn namespace(&self) -> RwLockReadGuard<'_, Namespace> {
        self.namespace.read()
    }

    pub fn namespace_mut(&mut self) -> RwLockWriteGuard<'_, Namespace> {
        self.namespace.write()
    }
}

/// A loaded unit as seen by the host registry
pub struct UnitHandle {
    name: Option<UnitName>,
    origin: Option<PathBuf>,
    namespace: RwLock<Namespace>,
    body: Arc<dyn UnitBody>,
}

impl UnitHandle {
    /// Create a named unit
    pub fn new(name: impl Into<UnitName>, body: Arc<dyn UnitBody>) -> Self {
        Self {
            name: Some(name.into()),
            origin: None,
            namespace: RwLock::new(Namespace::new()),
            body,
        }
    }

    /// Create a unit without an identifiable name
    pub fn anonymous(body: Arc<dyn UnitBody>) -> Self {
        Self {
            name: None,
            origin: None,
            namespace: RwLock::new(Namespace::new()),
            body,
        }
    }

    /// Set the unit's source origin, making it reloadable
    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Seed the namespace (typically with runtime-internal bindings)
    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        *self.namespace.get_mut() = namespace;
        self
    }

    pub fn name(&self) -> Option<&UnitName> {
        self.name.as_ref()
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Whether the unit came from a source file and can be reloaded
    pub fn is_source_based(&self) -> bool {
        self.origin.is_some()
    }

    /// Read access to the live namespace
    pub fn namespace(&self) -> RwLockReadGuard<'_, Namespace> {
        self.namespace.read()
    }

    /// Clone a binding out of the live namespace
    pub fn get(&self, key: &str) -> Option<Binding> {
        self.namespace.read().get(key).cloned()
    }

    /// Clone a plain value out of the live namespace
    pub fn value(&self, key: &str) -> Option<Value> {
        self.namespace.read().value(key).cloned()
    }

    /// Bind a name in the live namespace
    pub fn set(&self, key: impl Into<String>, binding: impl Into<Binding>) {
        self.namespace.write().set(key, binding);
    }

    pub fn migration_hook(&self) -> Option<Arc<dyn MigrationHook>> {
        self.body.migration_hook()
    }

    /// Run the body for the first time, keeping whatever is already bound
    pub fn execute(&self, loader: &dyn LoadUnit) -> Result<(), UnitError> {
        self.run_body(loader, false)
    }

    /// Re-run the body in place.
    ///
    /// Every binding that is not runtime-internal is discarded first and
    /// replaced by what the body binds this time.
    pub fn reinitialize(&self, loader: &dyn LoadUnit) -> Result<(), UnitError> {
        self.run_body(loader, true)
    }

    /// Deep copy of the namespace without runtime-internal bindings
    pub fn snapshot(&self) -> Result<NamespaceSnapshot, SnapshotError> {
        NamespaceSnapshot::capture(&self.namespace.read())
    }

    /// Hand a snapshot to the migration hook, if the unit has one.
    ///
    /// The hook works on a copy of the namespace that is written back when it
    /// returns. No lock is held while it runs.
    pub fn migrate(&self, previous: NamespaceSnapshot) -> Result<(), UnitError> {
        let Some(hook) = self.migration_hook() else {
            return Ok(());
        };
        let mut working = self.namespace.read().clone();
        let result = hook.migrate(&mut working, previous);
        *self.namespace.write() = working;
        result
    }

    fn run_body(&self, loader: &dyn LoadUnit, fresh: bool) -> Result<(), UnitError> {
        if fresh {
            self.namespace.write().clear_public();
        }
        let mut scope = Scope::new(self.name.as_ref(), &self.namespace, loader);
        self.body.execute(&mut scope)
    }
}

impl fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHandle")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .finish()
    }
}
