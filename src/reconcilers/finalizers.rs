// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic finalizer management for namespaced resources.
//!
//! The control plane carries [`crate::constants::CONTROL_PLANE_FINALIZER`] so
//! that its namespace reservation is released before the object disappears.
//! The reservation `ConfigMap` itself carries
//! [`crate::constants::RESERVATION_FINALIZER`] so nothing else can delete it
//! while its owner still exists.
//!
//! # Example
//!
//! ```rust,ignore
//! use ctlplane::reconcilers::finalizers::{ensure_finalizer, handle_deletion, FinalizerCleanup};
//! use ctlplane::crd::OpenStackControlPlane;
//! use kube::Client;
//! use anyhow::Result;
//!
//! #[async_trait::async_trait]
//! impl FinalizerCleanup for OpenStackControlPlane {
//!     async fn cleanup(&self, client: &Client) -> Result<()> {
//!         // Release external state
//!         Ok(())
//!     }
//! }
//!
//! async fn reconcile(client: Client, cp: OpenStackControlPlane) -> Result<()> {
//!     if cp.metadata.deletion_timestamp.is_some() {
//!         return handle_deletion(&client, &cp, CONTROL_PLANE_FINALIZER).await;
//!     }
//!     ensure_finalizer(&client, &cp, CONTROL_PLANE_FINALIZER).await?;
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, info};

/// Trait for resources that require cleanup operations when being deleted.
///
/// If `cleanup` returns an error the finalizer stays and deletion is retried
/// on the next reconcile.
#[async_trait::async_trait]
pub trait FinalizerCleanup: Resource + Clone {
    /// Perform cleanup operations before the finalizer is removed.
    ///
    /// # Errors
    ///
    /// Should return an error if any cleanup operation fails.
    async fn cleanup(&self, client: &Client) -> Result<()>;
}

/// Whether `resource` carries `finalizer`.
#[must_use]
pub fn has_finalizer<T: Resource>(resource: &T, finalizer: &str) -> bool {
    resource.finalizers().iter().any(|f| f == finalizer)
}

/// Replace the finalizer list of `resource` with a merge patch.
async fn patch_finalizers<T>(client: &Client, resource: &T, finalizers: Vec<String>) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    let api: Api<T> = Api::namespaced(client.clone(), &resource.namespace().unwrap_or_default());
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&resource.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Add `finalizer` to `resource` unless it is already present.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn ensure_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    if has_finalizer(resource, finalizer) {
        return Ok(());
    }
    info!(
        kind = %T::kind(&()),
        namespace = ?resource.namespace(),
        name = %resource.name_any(),
        finalizer,
        "Adding finalizer"
    );

    let mut finalizers = resource.finalizers().to_vec();
    finalizers.push(finalizer.to_string());
    patch_finalizers(client, resource, finalizers).await
}

/// Remove `finalizer` from `resource`. Absent finalizers are a no-op.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn remove_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    if !has_finalizer(resource, finalizer) {
        return Ok(());
    }
    info!(
        kind = %T::kind(&()),
        namespace = ?resource.namespace(),
        name = %resource.name_any(),
        finalizer,
        "Removing finalizer"
    );

    let finalizers = resource
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != finalizer)
        .cloned()
        .collect();
    patch_finalizers(client, resource, finalizers).await
}

/// Run `cleanup` and then remove `finalizer`.
///
/// Does nothing when the finalizer is already gone.
///
/// # Errors
///
/// Returns an error if cleanup or the finalizer removal fails; the finalizer
/// then stays and deletion is retried.
pub async fn handle_deletion<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + FinalizerCleanup
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    if !has_finalizer(resource, finalizer) {
        debug!(name = %resource.name_any(), "Finalizer already removed");
        return Ok(());
    }
    info!(
        kind = %T::kind(&()),
        namespace = ?resource.namespace(),
        name = %resource.name_any(),
        "Running cleanup before deletion"
    );
    resource.cleanup(client).await?;
    remove_finalizer(client, resource, finalizer).await
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
