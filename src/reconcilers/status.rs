// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Single-write status persistence.
//!
//! Reconcilers build the whole new status in memory and hand it to a
//! [`StatusUpdater`], which writes it with one merge patch of the status
//! subresource at the end of the reconcile. The patch is skipped when the new
//! status equals the status read at the start, so an idle reconcile produces no
//! write and therefore no watch event.
//!
//! Merge patches cannot delete map keys by omission, so the patch body is the
//! RFC 7386 difference between the old and new status: keys dropped from a map
//! (a hash, an endpoint, a container image) are sent as `null`.
//!
//! # Example
//!
//! ```rust,ignore
//! use ctlplane::reconcilers::status::StatusUpdater;
//!
//! async fn reconcile(client: Client, cp: OpenStackControlPlane) -> Result<()> {
//!     let mut updater = StatusUpdater::new(&cp);
//!     updater.status_mut().observed_generation = cp.metadata.generation;
//!     updater.apply(&client).await?;
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt::Debug;
use tracing::debug;

use crate::constants::FIELD_MANAGER;
use crate::crd::{
    OpenStackClient, OpenStackClientStatus, OpenStackControlPlane, OpenStackControlPlaneStatus,
};

/// A namespaced resource with a status subresource.
pub trait HasStatus:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
{
    type Status: Clone + Debug + Default + PartialEq + Serialize;

    fn status(&self) -> Option<&Self::Status>;
}

impl HasStatus for OpenStackControlPlane {
    type Status = OpenStackControlPlaneStatus;

    fn status(&self) -> Option<&Self::Status> {
        self.status.as_ref()
    }
}

impl HasStatus for OpenStackClient {
    type Status = OpenStackClientStatus;

    fn status(&self) -> Option<&Self::Status> {
        self.status.as_ref()
    }
}

/// RFC 7386 merge patch turning `old` into `new`.
///
/// Objects are diffed key by key; keys absent from `new` become `null`. Any
/// other value, arrays included, is replaced whole. Equal inputs produce an
/// empty object.
#[must_use]
pub fn merge_patch_diff(old: &Value, new: &Value) -> Value {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut patch = Map::new();
            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            for (key, new_value) in new_map {
                match old_map.get(key) {
                    Some(old_value) if old_value == new_value => {}
                    Some(old_value @ Value::Object(_)) if new_value.is_object() => {
                        patch.insert(key.clone(), merge_patch_diff(old_value, new_value));
                    }
                    _ => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            Value::Object(patch)
        }
        _ => new.clone(),
    }
}

/// Collects the new status of one resource and persists it once.
#[derive(Debug)]
pub struct StatusUpdater<K: HasStatus> {
    namespace: String,
    name: String,
    current_status: Option<K::Status>,
    new_status: K::Status,
}

impl<K: HasStatus> StatusUpdater<K> {
    /// Start from the status `resource` carries now.
    #[must_use]
    pub fn new(resource: &K) -> Self {
        let current_status = resource.status().cloned();
        let new_status = current_status.clone().unwrap_or_default();
        Self {
            namespace: resource.namespace().unwrap_or_default(),
            name: resource.name_any(),
            current_status,
            new_status,
        }
    }

    #[must_use]
    pub fn status(&self) -> &K::Status {
        &self.new_status
    }

    pub fn status_mut(&mut self) -> &mut K::Status {
        &mut self.new_status
    }

    /// Whether the new status differs from the status read at the start.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.current_status.as_ref() != Some(&self.new_status)
    }

    /// Body of the status patch, or `None` when nothing changed.
    ///
    /// # Errors
    ///
    /// Returns an error if either status cannot be serialized.
    pub fn patch(&self) -> Result<Option<Value>> {
        if !self.has_changes() {
            return Ok(None);
        }
        let new = serde_json::to_value(&self.new_status)?;
        let body = match &self.current_status {
            Some(current) => merge_patch_diff(&serde_json::to_value(current)?, &new),
            None => new,
        };
        Ok(Some(json!({ "status": body })))
    }

    /// Write the collected status, skipping the call when unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the Kubernetes API call fails.
    pub async fn apply(&self, client: &Client) -> Result<()> {
        let Some(patch) = self.patch()? else {
            debug!(
                "{} {}/{} status unchanged, skipping update",
                K::kind(&()),
                self.namespace,
                self.name
            );
            return Ok(());
        };

        let api: Api<K> = Api::namespaced(client.clone(), &self.namespace);
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.patch_status(&self.name, &params, &Patch::Merge(&patch))
            .await?;

        debug!(
            "Updated {} {}/{} status",
            K::kind(&()),
            self.namespace,
            self.name
        );
        Ok(())
    }
}
