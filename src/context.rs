// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers with reflector stores.
//!
//! All controllers receive an `Arc<Context>` that contains:
//! - Kubernetes client
//! - Reflector stores of every `OpenStackControlPlane` and `OpenStackClient`
//! - Reconciler settings from the command line
//! - Per-object error backoff counters
//!
//! The stores let watch mappers find the resources affected by a change to
//! an input they do not own (a `Topology`, a referenced `Secret`, `ConfigMap`
//! or custom `Issuer`) without querying the API server.

use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Client, ResourceExt};
use std::sync::Arc;

use crate::config::Settings;
use crate::crd::{OpenStackClient, OpenStackControlPlane, TopoRef};
use crate::reconcilers::ca::CaDomain;
use crate::reconcilers::retry::ErrorBackoff;
use crate::reconcilers::topology::effective_topologies;

/// Shared context passed to all controllers.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for API operations
    pub client: Client,

    /// Reflector stores for cross-object lookups
    pub stores: Stores,

    /// Reconciler settings
    pub settings: Settings,

    /// Failure counters used by the controllers' error policies
    pub backoff: Arc<ErrorBackoff>,
}

impl Context {
    #[must_use]
    pub fn new(client: Client, stores: Stores, settings: Settings) -> Self {
        Self {
            client,
            stores,
            settings,
            backoff: Arc::new(ErrorBackoff::default()),
        }
    }
}

/// Collection of all reflector stores for cross-controller queries.
#[derive(Clone)]
pub struct Stores {
    pub control_planes: Store<OpenStackControlPlane>,
    pub clients: Store<OpenStackClient>,
}

impl Stores {
    /// Control planes in `namespace`.
    #[must_use]
    pub fn control_planes_in_namespace(&self, namespace: &str) -> Vec<Arc<OpenStackControlPlane>> {
        self.control_planes
            .state()
            .into_iter()
            .filter(|cp| cp.namespace().as_deref() == Some(namespace))
            .collect()
    }

    /// Control planes in `namespace` that reference the topology `name`,
    /// either at the top level or through a service override.
    #[must_use]
    pub fn control_planes_using_topology(
        &self,
        name: &str,
        namespace: &str,
    ) -> Vec<ObjectRef<OpenStackControlPlane>> {
        self.control_planes_in_namespace(namespace)
            .iter()
            .filter(|cp| references_topology(cp, name))
            .map(|cp| ObjectRef::from_obj(cp.as_ref()))
            .collect()
    }

    /// Control planes in `namespace` reading the secret `name`.
    #[must_use]
    pub fn control_planes_using_secret(
        &self,
        name: &str,
        namespace: &str,
    ) -> Vec<ObjectRef<OpenStackControlPlane>> {
        self.control_planes_in_namespace(namespace)
            .iter()
            .filter(|cp| references_secret(cp, name))
            .map(|cp| ObjectRef::from_obj(cp.as_ref()))
            .collect()
    }

    /// Control planes in `namespace` using `name` as a custom CA issuer.
    #[must_use]
    pub fn control_planes_using_issuer(
        &self,
        name: &str,
        namespace: &str,
    ) -> Vec<ObjectRef<OpenStackControlPlane>> {
        self.control_planes_in_namespace(namespace)
            .iter()
            .filter(|cp| {
                CaDomain::ALL
                    .iter()
                    .any(|domain| domain.custom_issuer(&cp.spec.tls) == Some(name))
            })
            .map(|cp| ObjectRef::from_obj(cp.as_ref()))
            .collect()
    }

    /// Clients in `namespace`.
    #[must_use]
    pub fn clients_in_namespace(&self, namespace: &str) -> Vec<ObjectRef<OpenStackClient>> {
        self.clients_matching(namespace, |_| true)
    }

    /// Clients in `namespace` mounting the config map `name`.
    #[must_use]
    pub fn clients_using_configmap(
        &self,
        name: &str,
        namespace: &str,
    ) -> Vec<ObjectRef<OpenStackClient>> {
        self.clients_matching(namespace, |c| c.spec.open_stack_config_map == name)
    }

    /// Clients in `namespace` mounting the secret `name`.
    #[must_use]
    pub fn clients_using_secret(
        &self,
        name: &str,
        namespace: &str,
    ) -> Vec<ObjectRef<OpenStackClient>> {
        self.clients_matching(namespace, |c| {
            c.spec.open_stack_config_secret == name
                || c.spec.ca_bundle_secret_name.as_deref() == Some(name)
        })
    }

    fn clients_matching(
        &self,
        namespace: &str,
        matches: impl Fn(&OpenStackClient) -> bool,
    ) -> Vec<ObjectRef<OpenStackClient>> {
        self.clients
            .state()
            .iter()
            .filter(|c| c.namespace().as_deref() == Some(namespace) && matches(c.as_ref()))
            .map(|c| ObjectRef::from_obj(c.as_ref()))
            .collect()
    }
}

/// Whether `cp` reads the secret `name`: the input secret, the user CA
/// bundle, or the secret of a CA the operator issues itself.
#[must_use]
pub fn references_secret(cp: &OpenStackControlPlane, name: &str) -> bool {
    let tls = &cp.spec.tls;
    cp.spec.secret == name
        || tls.ca_bundle_secret_name.as_deref() == Some(name)
        || CaDomain::enabled(tls)
            .into_iter()
            .any(|domain| domain.custom_issuer(tls).is_none() && domain.ca_name() == name)
}

/// Whether any enabled service of `cp` resolves to the topology `name`.
#[must_use]
pub fn references_topology(cp: &OpenStackControlPlane, name: &str) -> bool {
    let namespace = cp.namespace().unwrap_or_default();
    effective_topologies(&cp.spec, &namespace)
        .iter()
        .any(|r: &TopoRef| r.name == name)
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
