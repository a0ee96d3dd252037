// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Child resource synchronizer.
//!
//! [`upsert`] reads a child by name, creates it when absent, and otherwise
//! applies a mutate function to the live object and replaces it only when the
//! mutation changed something. Replacement carries the live `resourceVersion`,
//! so concurrent writers surface as `409 Conflict`, which is retried by
//! re-reading (up to [`MAX_CONFLICT_RETRIES`] attempts, without sleeping).
//!
//! Immutable-field rejections, whether raised by the mutate function or
//! returned by the API server, either fail or delete the child so the next
//! reconcile recreates it, depending on [`ImmutablePolicy`].
//!
//! # Example
//!
//! ```rust,no_run
//! use ctlplane::reconcilers::resources::{upsert, ImmutablePolicy};
//! use k8s_openapi::api::core::v1::ConfigMap;
//! use kube::{api::ObjectMeta, Api, Client};
//! use std::collections::BTreeMap;
//!
//! async fn example(client: Client) -> anyhow::Result<()> {
//!     let api: Api<ConfigMap> = Api::namespaced(client, "openstack");
//!     let desired = ConfigMap {
//!         metadata: ObjectMeta {
//!             name: Some("example".into()),
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     };
//!     let (outcome, _) = upsert(&api, desired, ImmutablePolicy::Fail, |cm| {
//!         cm.data = Some(BTreeMap::from([("key".into(), "value".into())]));
//!         Ok(())
//!     })
//!     .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Debug;
use tracing::{debug, info, warn};

use crate::constants::{FIELD_MANAGER, MAX_CONFLICT_RETRIES};
use crate::errors::SyncError;
use crate::metrics;
use crate::reconcilers::retry::{is_conflict, is_immutable_field_error, is_not_found};

/// What to do when a child rejects an in-place update of an immutable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmutablePolicy {
    /// Surface the error. Used for every stateful child.
    Fail,
    /// Delete the child; the next reconcile creates it again.
    DeleteAndRecreate,
}

/// Result of an [`upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
    /// The child was deleted to clear an immutable field and must be recreated
    Recreating,
}

/// Kind of a serialized object, for logs and metrics.
fn kind_of<K: Serialize>(obj: &K) -> String {
    serde_json::to_value(obj)
        .ok()
        .and_then(|v| v.get("kind").and_then(|k| k.as_str()).map(str::to_string))
        .unwrap_or_else(|| "Unknown".to_string())
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

/// Create `desired`, or bring the live object in line with it through `mutate`.
///
/// `mutate` is applied to `desired` before creation and to the live object
/// otherwise. It returns [`SyncError::ImmutableField`] when the live object
/// cannot be converged in place.
///
/// # Errors
///
/// Returns an error when the API rejects the request, when conflicts persist
/// past the retry budget, or on an immutable field under [`ImmutablePolicy::Fail`].
pub async fn upsert<K, F>(
    api: &Api<K>,
    desired: K,
    policy: ImmutablePolicy,
    mut mutate: F,
) -> Result<(UpsertOutcome, Option<K>), SyncError>
where
    K: Resource + Clone + Debug + Serialize + DeserializeOwned,
    F: FnMut(&mut K) -> Result<(), SyncError>,
{
    let kind = kind_of(&desired);
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or_else(|| SyncError::MissingName { kind: kind.clone() })?;

    for attempt in 1..=MAX_CONFLICT_RETRIES {
        let Some(live) = api.get_opt(&name).await? else {
            let mut obj = desired.clone();
            mutate(&mut obj)?;
            match api.create(&post_params(), &obj).await {
                Ok(created) => {
                    info!(kind = %kind, name = %name, "Created child resource");
                    metrics::record_resource_created(&kind);
                    return Ok((UpsertOutcome::Created, Some(created)));
                }
                Err(e) if is_conflict(&e) => {
                    debug!(kind = %kind, name = %name, attempt, "Child appeared concurrently, re-reading");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        };

        let before = serde_json::to_value(&live)?;
        let mut obj = live.clone();
        match mutate(&mut obj) {
            Ok(()) => {}
            Err(SyncError::ImmutableField { detail, .. })
                if policy == ImmutablePolicy::DeleteAndRecreate =>
            {
                info!(kind = %kind, name = %name, detail = %detail, "Immutable field changed, recreating child");
                return recreate(api, &kind, &name).await;
            }
            Err(e) => return Err(e),
        }

        if serde_json::to_value(&obj)? == before {
            debug!(kind = %kind, name = %name, "Child unchanged");
            return Ok((UpsertOutcome::Unchanged, Some(live)));
        }

        match api.replace(&name, &post_params(), &obj).await {
            Ok(updated) => {
                info!(kind = %kind, name = %name, "Updated child resource");
                metrics::record_resource_updated(&kind);
                return Ok((UpsertOutcome::Updated, Some(updated)));
            }
            Err(e) if is_conflict(&e) => {
                debug!(kind = %kind, name = %name, attempt, "Update conflicted, re-reading");
            }
            Err(e) if is_immutable_field_error(&e) => {
                return match policy {
                    ImmutablePolicy::DeleteAndRecreate => recreate(api, &kind, &name).await,
                    ImmutablePolicy::Fail => Err(SyncError::immutable(&kind, &name, e.to_string())),
                };
            }
            Err(e) => return Err(e.into()),
        }
    }

    warn!(kind = %kind, name = %name, "Conflict retries exhausted");
    metrics::record_error(&kind, "conflict");
    Err(SyncError::ConflictRetriesExhausted {
        kind,
        name,
        attempts: MAX_CONFLICT_RETRIES,
    })
}

async fn recreate<K>(
    api: &Api<K>,
    kind: &str,
    name: &str,
) -> Result<(UpsertOutcome, Option<K>), SyncError>
where
    K: Resource + Clone + Debug + DeserializeOwned,
{
    ensure_deleted(api, name).await?;
    metrics::record_resource_recreated(kind);
    Ok((UpsertOutcome::Recreating, None))
}

/// Delete `name`, treating absence as success.
///
/// Returns `true` if a delete was issued. A `404` also covers a child kind
/// whose CRD is not installed.
///
/// # Errors
///
/// Returns any API error other than not-found.
pub async fn ensure_deleted<K>(api: &Api<K>, name: &str) -> Result<bool, SyncError>
where
    K: Resource + Clone + Debug + DeserializeOwned,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!(name = %name, "Deleted child resource");
            Ok(true)
        }
        Err(e) if is_not_found(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Delete every object matching `selector` whose name is not in `keep`.
///
/// Returns the names deleted.
///
/// # Errors
///
/// Returns any API error other than not-found.
pub async fn delete_owned_except<K>(
    api: &Api<K>,
    selector: &str,
    keep: &BTreeSet<String>,
) -> Result<Vec<String>, SyncError>
where
    K: Resource + Clone + Debug + DeserializeOwned,
{
    let existing = match api.list(&ListParams::default().labels(selector)).await {
        Ok(list) => list.items,
        Err(e) if is_not_found(&e) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut deleted = Vec::new();
    for obj in existing {
        let name = obj.name_any();
        if keep.contains(&name) {
            continue;
        }
        if ensure_deleted(api, &name).await? {
            deleted.push(name);
        }
    }
    Ok(deleted)
}

/// Controller owner reference pointing at `owner`.
///
/// # Errors
///
/// Returns an error if `owner` has no name or UID yet.
pub fn controller_reference<O>(owner: &O) -> anyhow::Result<OwnerReference>
where
    O: Resource<DynamicType = ()>,
{
    owner
        .controller_owner_ref(&())
        .ok_or_else(|| anyhow::anyhow!("{} has no name or uid", O::kind(&())))
}

/// Make `owner_ref` the controller of `meta`, replacing any stale reference to
/// the same owner.
pub fn set_controller_reference(meta: &mut ObjectMeta, owner_ref: &OwnerReference) {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    refs.retain(|r| r.uid != owner_ref.uid);
    refs.push(owner_ref.clone());
}

/// Bring the labels, annotations and owner references of `desired` onto `live`.
///
/// Keys `live` carries that `desired` does not are left alone, so labels added
/// by other controllers survive.
pub fn merge_metadata(live: &mut ObjectMeta, desired: &ObjectMeta) {
    if let Some(labels) = &desired.labels {
        live.labels
            .get_or_insert_with(Default::default)
            .extend(labels.clone());
    }
    if let Some(annotations) = &desired.annotations {
        live.annotations
            .get_or_insert_with(Default::default)
            .extend(annotations.clone());
    }
    for owner_ref in desired.owner_references.iter().flatten() {
        set_controller_reference(live, owner_ref);
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
