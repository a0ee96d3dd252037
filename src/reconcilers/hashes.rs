// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Drift hash register.
//!
//! Digests are SHA-224 encoded as 56 lowercase hex characters, short enough to
//! be used as label values and environment values. Inputs are keyed by name in
//! a `BTreeMap`, so the digest does not depend on insertion order.
//!
//! # Example
//!
//! ```rust
//! use ctlplane::reconcilers::hashes::{hash_of, HashRegister};
//! use std::collections::BTreeMap;
//!
//! let digest = hash_of(&BTreeMap::from([("clouds.yaml", "clouds: {}")]));
//! assert_eq!(digest.len(), 56);
//!
//! let mut register = HashRegister::new(&BTreeMap::new());
//! assert!(register.changed("openstack-config", &digest));
//! register.record("openstack-config", &digest);
//! assert_eq!(register.get("openstack-config"), Some(digest.as_str()));
//! ```

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha224};
use std::collections::BTreeMap;

/// Digest raw bytes.
#[must_use]
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha224::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Digest a named set of inputs.
///
/// Each entry is framed by its name and length so that moving bytes between
/// adjacent entries changes the digest.
#[must_use]
pub fn hash_of<K, V>(inputs: &BTreeMap<K, V>) -> String
where
    K: AsRef<str>,
    V: AsRef<[u8]>,
{
    let mut hasher = Sha224::new();
    for (name, value) in inputs {
        let value = value.as_ref();
        hasher.update(name.as_ref().as_bytes());
        hasher.update([0u8]);
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value);
    }
    format!("{:x}", hasher.finalize())
}

/// Digest any serializable value through its JSON form.
///
/// Object keys are sorted before hashing, so maps hash the same regardless of
/// how they were built.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn hash_of_json<T: Serialize>(value: &T) -> Result<String> {
    let json = canonicalize(serde_json::to_value(value)?);
    Ok(hash_bytes(serde_json::to_string(&json)?.as_bytes()))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Digest a map of digests, e.g. to fold several input hashes into one.
#[must_use]
pub fn hash_of_inputs(hashes: &BTreeMap<String, String>) -> String {
    hash_of(hashes)
}

/// Hashes recorded on a resource's status, plus the changes made during the
/// current reconcile.
#[derive(Debug, Clone, Default)]
pub struct HashRegister {
    previous: BTreeMap<String, String>,
    current: BTreeMap<String, String>,
}

impl HashRegister {
    #[must_use]
    pub fn new(previous: &BTreeMap<String, String>) -> Self {
        Self {
            previous: previous.clone(),
            current: previous.clone(),
        }
    }

    /// Whether `digest` differs from what was recorded when the reconcile began.
    #[must_use]
    pub fn changed(&self, name: &str, digest: &str) -> bool {
        self.previous.get(name).is_none_or(|d| d != digest)
    }

    /// Record `digest` under `name`.
    pub fn record(&mut self, name: &str, digest: &str) {
        self.current.insert(name.to_string(), digest.to_string());
    }

    pub fn remove(&mut self, name: &str) {
        self.current.remove(name);
    }

    /// Remove every entry whose name starts with `prefix`.
    pub fn remove_prefixed(&mut self, prefix: &str) {
        self.current.retain(|k, _| !k.starts_with(prefix));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.current.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn hashes(&self) -> &BTreeMap<String, String> {
        &self.current
    }

    #[must_use]
    pub fn into_hashes(self) -> BTreeMap<String, String> {
        self.current
    }
}

#[cfg(test)]
#[path = "hashes_tests.rs"]
mod hashes_tests;
