// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Namespace reservation held by the one `OpenStackControlPlane` allowed per
//! namespace.
//!
//! The reservation is a `ConfigMap` recording the holder's name and UID. It
//! carries its own finalizer so it outlives a forced delete of the control
//! plane, and is only removed by the holder's deletion path.

#![allow(clippy::wildcard_imports)]

use super::types::*;
use crate::constants::{
    RESERVATION_CONFIGMAP_NAME, RESERVATION_FINALIZER, RESERVATION_OWNER_NAME_KEY,
    RESERVATION_OWNER_UID_KEY,
};
use crate::reconcilers::finalizers::{ensure_finalizer, remove_finalizer};
use anyhow::bail;
use kube::api::PostParams;

/// Control plane recorded in a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationHolder {
    pub name: String,
    pub uid: String,
}

/// Holder recorded in `cm`, if it carries one.
#[must_use]
pub fn holder(cm: &ConfigMap) -> Option<ReservationHolder> {
    let data = cm.data.as_ref()?;
    Some(ReservationHolder {
        name: data.get(RESERVATION_OWNER_NAME_KEY)?.clone(),
        uid: data.get(RESERVATION_OWNER_UID_KEY)?.clone(),
    })
}

/// Current holder of the reservation in `namespace`.
///
/// # Errors
///
/// Returns any API error other than not-found.
pub async fn current_holder(client: &Client, namespace: &str) -> Result<Option<ReservationHolder>> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    Ok(api
        .get_opt(RESERVATION_CONFIGMAP_NAME)
        .await?
        .as_ref()
        .and_then(holder))
}

fn reservation_for(cp: &OpenStackControlPlane, namespace: &str, uid: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(RESERVATION_CONFIGMAP_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            finalizers: Some(vec![RESERVATION_FINALIZER.to_string()]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (RESERVATION_OWNER_NAME_KEY.to_string(), cp.name_any()),
            (RESERVATION_OWNER_UID_KEY.to_string(), uid.to_string()),
        ])),
        ..Default::default()
    }
}

/// Take the reservation for `cp`, or confirm it already holds it.
///
/// # Errors
///
/// Returns an error when another control plane holds the reservation, or on
/// API failure.
pub async fn acquire(client: &Client, cp: &OpenStackControlPlane) -> Result<()> {
    let namespace = cp.namespace().unwrap_or_default();
    let Some(uid) = cp.uid() else {
        bail!("OpenStackControlPlane {namespace}/{} has no uid", cp.name_any());
    };
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);

    let Some(existing) = api.get_opt(RESERVATION_CONFIGMAP_NAME).await? else {
        api.create(&PostParams::default(), &reservation_for(cp, &namespace, &uid))
            .await?;
        info!(namespace = %namespace, name = %cp.name_any(), "Reserved namespace for control plane");
        return Ok(());
    };

    match holder(&existing) {
        Some(current) if current.uid == uid => {
            ensure_finalizer(client, &existing, RESERVATION_FINALIZER).await
        }
        Some(current) => bail!(
            "namespace {namespace} is reserved by OpenStackControlPlane {} ({})",
            current.name,
            current.uid
        ),
        None => bail!("reservation {namespace}/{RESERVATION_CONFIGMAP_NAME} has no holder"),
    }
}

/// Drop the reservation if `cp` holds it.
///
/// # Errors
///
/// Returns an error on API failure.
pub async fn release(client: &Client, cp: &OpenStackControlPlane) -> Result<()> {
    let namespace = cp.namespace().unwrap_or_default();
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);

    let Some(existing) = api.get_opt(RESERVATION_CONFIGMAP_NAME).await? else {
        return Ok(());
    };
    if holder(&existing).map(|h| h.uid) != cp.uid() {
        debug!(namespace = %namespace, name = %cp.name_any(), "Reservation held by another control plane");
        return Ok(());
    }

    remove_finalizer(client, &existing, RESERVATION_FINALIZER).await?;
    ensure_deleted(&api, RESERVATION_CONFIGMAP_NAME).await?;
    info!(namespace = %namespace, name = %cp.name_any(), "Released namespace reservation");
    Ok(())
}

#[cfg(test)]
#[path = "reservation_tests.rs"]
mod reservation_tests;
