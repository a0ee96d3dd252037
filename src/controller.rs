// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller wiring for the two owned resource kinds.
//!
//! - The `OpenStackControlPlane` controller owns every child it creates and
//!   re-queues a control plane when a `Topology`, `Secret` or custom `Issuer`
//!   it references changes.
//! - The `OpenStackClient` controller owns the admin pod and its RBAC, and
//!   re-queues a client when a mounted `ConfigMap` or `Secret` changes or the
//!   `KeystoneAPI` in its namespace does.
//!
//! Both share one [`Context`]. Reconcile errors requeue with a per-object
//! exponential backoff that resets on the next success.

use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::{
    api::DynamicObject,
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, Resource, ResourceExt,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::context::{Context, Stores};
use crate::crd::{OpenStackClient, OpenStackControlPlane};
use crate::external::{Certificate, Issuer, Topology};
use crate::metrics;
use crate::reconcilers::{reconcile_controlplane, reconcile_openstackclient};
use crate::services::ServiceKind;

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ReconcileError(#[from] anyhow::Error);

/// Key identifying one object in the backoff counters.
#[must_use]
pub fn backoff_key<K: Resource<DynamicType = ()>>(obj: &K) -> String {
    format!(
        "{}/{}/{}",
        K::kind(&()),
        obj.namespace().unwrap_or_default(),
        obj.name_any()
    )
}

/// Run both controllers until either stops.
///
/// # Errors
///
/// Returns an error if a controller exits, which only happens when its watch
/// stream ends.
pub async fn run_controllers(client: Client, settings: Settings) -> Result<()> {
    let control_planes = Controller::new(
        Api::<OpenStackControlPlane>::all(client.clone()),
        Config::default(),
    );
    let clients = Controller::new(
        Api::<OpenStackClient>::all(client.clone()),
        Config::default(),
    );
    let ctx = Arc::new(Context::new(
        client.clone(),
        Stores {
            control_planes: control_planes.store(),
            clients: clients.store(),
        },
        settings,
    ));

    info!("Starting all controllers");

    tokio::select! {
        result = run_controlplane_controller(control_planes, client.clone(), ctx.clone()) => {
            error!("CRITICAL: OpenStackControlPlane controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("OpenStackControlPlane controller exited unexpectedly without error")
        }
        result = run_openstackclient_controller(clients, client.clone(), ctx.clone()) => {
            error!("CRITICAL: OpenStackClient controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("OpenStackClient controller exited unexpectedly without error")
        }
    }
}

/// Run the `OpenStackControlPlane` controller
async fn run_controlplane_controller(
    controller: Controller<OpenStackControlPlane>,
    client: Client,
    ctx: Arc<Context>,
) -> Result<()> {
    info!("Starting OpenStackControlPlane controller");

    let mut controller = controller
        .owns(Api::<Secret>::all(client.clone()), Config::default())
        .owns(Api::<ConfigMap>::all(client.clone()), Config::default())
        .owns(Api::<Issuer>::all(client.clone()), Config::default())
        .owns(Api::<Certificate>::all(client.clone()), Config::default())
        .owns(Api::<OpenStackClient>::all(client.clone()), Config::default());

    for kind in ServiceKind::ALL {
        let resource = kind.api_resource();
        controller = controller.owns_with(
            Api::<DynamicObject>::all_with(client.clone(), &resource),
            resource,
            Config::default(),
        );
    }

    let topology_stores = ctx.stores.clone();
    let secret_stores = ctx.stores.clone();
    let issuer_stores = ctx.stores.clone();
    controller
        .watches(
            Api::<Topology>::all(client.clone()),
            Config::default(),
            move |topology| {
                let namespace = topology.namespace().unwrap_or_default();
                topology_stores.control_planes_using_topology(&topology.name_any(), &namespace)
            },
        )
        .watches(
            Api::<Secret>::all(client.clone()),
            Config::default(),
            move |secret| {
                let namespace = secret.namespace().unwrap_or_default();
                secret_stores.control_planes_using_secret(&secret.name_any(), &namespace)
            },
        )
        .watches(
            Api::<Issuer>::all(client.clone()),
            Config::default(),
            move |issuer| {
                let namespace = issuer.namespace().unwrap_or_default();
                issuer_stores.control_planes_using_issuer(&issuer.name_any(), &namespace)
            },
        )
        .run(reconcile_controlplane_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Run the `OpenStackClient` controller
async fn run_openstackclient_controller(
    controller: Controller<OpenStackClient>,
    client: Client,
    ctx: Arc<Context>,
) -> Result<()> {
    info!("Starting OpenStackClient controller");

    let keystone = ServiceKind::Keystone.api_resource();
    let configmap_stores = ctx.stores.clone();
    let secret_stores = ctx.stores.clone();
    let keystone_stores = ctx.stores.clone();
    controller
        .owns(Api::<Pod>::all(client.clone()), Config::default())
        .owns(Api::<ServiceAccount>::all(client.clone()), Config::default())
        .owns(Api::<Role>::all(client.clone()), Config::default())
        .owns(Api::<RoleBinding>::all(client.clone()), Config::default())
        .watches(
            Api::<ConfigMap>::all(client.clone()),
            Config::default(),
            move |cm| {
                let namespace = cm.namespace().unwrap_or_default();
                configmap_stores.clients_using_configmap(&cm.name_any(), &namespace)
            },
        )
        .watches(
            Api::<Secret>::all(client.clone()),
            Config::default(),
            move |secret| {
                let namespace = secret.namespace().unwrap_or_default();
                secret_stores.clients_using_secret(&secret.name_any(), &namespace)
            },
        )
        .watches_with(
            Api::<DynamicObject>::all_with(client, &keystone),
            keystone,
            Config::default(),
            move |identity| {
                keystone_stores.clients_in_namespace(&identity.namespace().unwrap_or_default())
            },
        )
        .run(reconcile_openstackclient_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper for `OpenStackControlPlane`
async fn reconcile_controlplane_wrapper(
    cp: Arc<OpenStackControlPlane>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    debug!(
        name = %cp.name_any(),
        namespace = ?cp.namespace(),
        "Reconcile wrapper called for OpenStackControlPlane"
    );
    let start = Instant::now();

    match reconcile_controlplane(ctx.clone(), (*cp).clone()).await {
        Ok(action) => {
            info!("Successfully reconciled OpenStackControlPlane: {}", cp.name_any());
            metrics::record_reconciliation_success(
                OpenStackControlPlane::kind(&()).as_ref(),
                start.elapsed(),
            );
            ctx.backoff.reset(&backoff_key(cp.as_ref()));
            Ok(action)
        }
        Err(e) => {
            error!("Failed to reconcile OpenStackControlPlane: {}", e);
            metrics::record_reconciliation_error(
                OpenStackControlPlane::kind(&()).as_ref(),
                start.elapsed(),
            );
            Err(e.into())
        }
    }
}

/// Reconcile wrapper for `OpenStackClient`
async fn reconcile_openstackclient_wrapper(
    client: Arc<OpenStackClient>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    debug!(
        name = %client.name_any(),
        namespace = ?client.namespace(),
        "Reconcile wrapper called for OpenStackClient"
    );
    let start = Instant::now();

    match reconcile_openstackclient(ctx.clone(), (*client).clone()).await {
        Ok(action) => {
            info!("Successfully reconciled OpenStackClient: {}", client.name_any());
            metrics::record_reconciliation_success(
                OpenStackClient::kind(&()).as_ref(),
                start.elapsed(),
            );
            ctx.backoff.reset(&backoff_key(client.as_ref()));
            Ok(action)
        }
        Err(e) => {
            error!("Failed to reconcile OpenStackClient: {}", e);
            metrics::record_reconciliation_error(
                OpenStackClient::kind(&()).as_ref(),
                start.elapsed(),
            );
            Err(e.into())
        }
    }
}

/// Error policy shared by both controllers
pub fn error_policy<K: Resource<DynamicType = ()>>(
    resource: Arc<K>,
    err: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    let key = backoff_key(resource.as_ref());
    let delay = ctx.backoff.next_delay(&key);
    debug!(resource = %key, error = %err, delay = ?delay, "Requeueing after reconcile error");
    metrics::record_error(K::kind(&()).as_ref(), "reconcile");
    metrics::record_reconciliation_requeue(K::kind(&()).as_ref(), "error");
    Action::requeue(delay)
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;
