//! Deep, self-contained copies of a unit's namespace
//!
//! A snapshot owns its data outright. Nothing in it aliases the live
//! namespace, so a migration hook may keep, mutate or drop it freely.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SnapshotError;
use crate::unit::{Binding, Namespace};

/// Copy of a namespace taken right before re-execution
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceSnapshot {
    bindings: BTreeMap<String, Value>,
}

impl NamespaceSnapshot {
    /// Capture every non-internal binding.
    ///
    /// Fails on the first native binding, since those are shared by
    /// reference and cannot be duplicated.
    pub fn capture(namespace: &Namespace) -> Result<Self, SnapshotError> {
        let mut bindings = BTreeMap::new();
        for (key, binding) in namespace.public() {
            match binding {
                Binding::Value(value) => {
                    bindings.insert(key.to_string(), value.clone());
                }
                Binding::Native(_) => {
                    return Err(SnapshotError::NonCopyable {
                        binding: key.to_string(),
                    });
                }
            }
        }
        Ok(Self { bindings })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.bindings.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.bindings.get_mut(key)
    }

    /// Take a value out of the snapshot
    pub fn take(&mut self, key: &str) -> Option<Value> {
        self.bindings.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.bindings.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Consume into the underlying map
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.bindings
    }
}
