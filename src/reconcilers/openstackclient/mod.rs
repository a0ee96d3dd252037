// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `OpenStackClient` reconciliation logic.
//!
//! The client is an idle pod with the cloud admin credentials mounted. It is
//! only started once the identity service reports ready, and is replaced
//! whenever its image or any mounted input changes.
//!
//! ## Module Structure
//!
//! - [`pod`] - RBAC and pod builders

pub mod pod;

use anyhow::Result;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{
    DEPENDENCY_REQUEUE_SECS, MISSING_INPUT_REQUEUE_SECS, PROGRESSING_REQUEUE_SECS,
};
use crate::context::Context;
use crate::crd::{OpenStackClient, Severity};
use crate::errors::SyncError;
use crate::images::IMAGE_DEFAULTS;
use crate::reconcilers::conditions::ConditionLedger;
use crate::reconcilers::controlplane::desired::child_readiness;
use crate::reconcilers::controlplane::inputs::secret_digest;
use crate::reconcilers::hashes::{hash_of, hash_of_inputs, HashRegister};
use crate::reconcilers::resources::{
    controller_reference, merge_metadata, upsert, ImmutablePolicy, UpsertOutcome,
};
use crate::reconcilers::status::StatusUpdater;
use crate::services::ServiceKind;
use crate::status_reasons::{
    client_error_message, input_waiting_message, CONDITION_TYPE_OPENSTACK_CLIENT_READY,
    CONDITION_TYPE_READY, CONDITION_TYPE_ROLE_BINDING_READY, CONDITION_TYPE_ROLE_READY,
    CONDITION_TYPE_SERVICE_ACCOUNT_READY, MESSAGE_CLIENT_KEYSTONE_WAITING,
    MESSAGE_CLIENT_POD_RECREATING, MESSAGE_CLIENT_READY, MESSAGE_ROLE_BINDING_READY,
    MESSAGE_ROLE_BINDING_RECREATING, MESSAGE_ROLE_READY, MESSAGE_SERVICE_ACCOUNT_READY,
    REASON_ERROR, REASON_REQUESTED,
};

use pod::{
    build_pod, build_role, build_role_binding, build_service_account, pod_fingerprint,
};

/// Hash register key of the combined input digest
pub const INPUT_HASH: &str = "input";

/// Name of the identity service child the client waits for
const KEYSTONE_NAME: &str = "keystone";

/// Digest of a config map's data.
#[must_use]
pub fn configmap_digest(cm: &ConfigMap) -> String {
    let mut data: BTreeMap<String, Vec<u8>> = cm
        .data
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), v.as_bytes().to_vec()))
        .collect();
    data.extend(
        cm.binary_data
            .iter()
            .flatten()
            .map(|(k, v)| (k.clone(), v.0.clone())),
    );
    hash_of(&data)
}

/// State collected during one client reconcile.
struct ClientPass {
    conditions: ConditionLedger,
    hashes: HashRegister,
    pod_name: Option<String>,
}

/// Reconciles an `OpenStackClient` resource.
///
/// Conditions are seeded in the order the work happens: service account,
/// role, role binding, then the pod. The status is written once at the end,
/// whether or not a step failed.
///
/// # Errors
///
/// Returns an error if a Kubernetes API call fails or the status cannot be
/// written.
pub async fn reconcile_openstackclient(
    ctx: Arc<Context>,
    client_cr: OpenStackClient,
) -> Result<Action> {
    let client = ctx.client.clone();
    let namespace = client_cr.namespace().unwrap_or_default();
    let name = client_cr.name_any();

    info!("Reconciling OpenStackClient: {}/{}", namespace, name);

    if client_cr.metadata.deletion_timestamp.is_some() {
        debug!(namespace = %namespace, name = %name, "OpenStackClient is being deleted");
        return Ok(Action::await_change());
    }

    let previous = client_cr.status.clone().unwrap_or_default();
    let mut conditions = ConditionLedger::new(&previous.conditions);
    conditions.init(&[
        CONDITION_TYPE_SERVICE_ACCOUNT_READY,
        CONDITION_TYPE_ROLE_READY,
        CONDITION_TYPE_ROLE_BINDING_READY,
        CONDITION_TYPE_OPENSTACK_CLIENT_READY,
    ]);
    let mut pass = ClientPass {
        conditions,
        hashes: HashRegister::new(&previous.hashes),
        pod_name: previous.pod_name.clone(),
    };

    let result = converge(&client, &client_cr, &ctx, &mut pass).await;
    if let Err(e) = &result {
        warn!(namespace = %namespace, name = %name, error = %e, "OpenStackClient reconcile failed");
        pass.conditions.mark_false(
            CONDITION_TYPE_OPENSTACK_CLIENT_READY,
            REASON_ERROR,
            Severity::Warning,
            client_error_message(&e.to_string()),
        );
    }

    pass.conditions.mirror(CONDITION_TYPE_READY);
    pass.conditions.restore_last_transition_times();

    let mut updater = StatusUpdater::new(&client_cr);
    let status = updater.status_mut();
    status.conditions = pass.conditions.into_conditions();
    status.hashes = pass.hashes.into_hashes();
    status.pod_name = pass.pod_name;
    status.observed_generation = client_cr.metadata.generation;
    if let Err(status_err) = updater.apply(&client).await {
        if result.is_ok() {
            return Err(status_err);
        }
        warn!(namespace = %namespace, name = %name, error = %status_err, "Failed to persist status after reconcile error");
    }

    Ok(Action::requeue(result?))
}

async fn converge(
    client: &Client,
    client_cr: &OpenStackClient,
    ctx: &Context,
    pass: &mut ClientPass,
) -> Result<Duration> {
    let namespace = client_cr.namespace().unwrap_or_default();
    let name = client_cr.name_any();
    let owner = controller_reference(client_cr)?;

    if !ensure_rbac(client, client_cr, &owner, &namespace, pass).await? {
        return Ok(Duration::from_secs(PROGRESSING_REQUEUE_SECS));
    }

    let keystone_api: Api<DynamicObject> = Api::namespaced_with(
        client.clone(),
        &namespace,
        &ServiceKind::Keystone.api_resource(),
    );
    let keystone_ready = keystone_api
        .get_opt(KEYSTONE_NAME)
        .await?
        .is_some_and(|keystone| child_readiness(&keystone).ready);
    if !keystone_ready {
        debug!(namespace = %namespace, name = %name, "Waiting for KeystoneAPI");
        pass.conditions.mark_false(
            CONDITION_TYPE_OPENSTACK_CLIENT_READY,
            REASON_REQUESTED,
            Severity::Info,
            MESSAGE_CLIENT_KEYSTONE_WAITING,
        );
        return Ok(Duration::from_secs(DEPENDENCY_REQUEUE_SECS));
    }

    let Some(inputs) = gather_inputs(client, client_cr, &namespace, pass).await? else {
        return Ok(Duration::from_secs(MISSING_INPUT_REQUEUE_SECS));
    };
    let config_hash = hash_of_inputs(&inputs);
    pass.hashes.record(INPUT_HASH, &config_hash);

    let image = client_cr
        .spec
        .container_image
        .clone()
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| IMAGE_DEFAULTS.client().to_string());
    let desired = build_pod(client_cr, &image, &config_hash, &owner);
    let desired_meta = desired.metadata.clone();

    let pods: Api<Pod> = Api::namespaced(client.clone(), &namespace);
    let (outcome, _) = upsert(&pods, desired, ImmutablePolicy::DeleteAndRecreate, |live| {
        let (live_image, live_hash) = pod_fingerprint(live);
        if live_image != Some(image.as_str()) || live_hash != Some(config_hash.as_str()) {
            return Err(SyncError::immutable(
                "Pod",
                &name,
                "image or CONFIG_HASH changed",
            ));
        }
        merge_metadata(&mut live.metadata, &desired_meta);
        Ok(())
    })
    .await?;

    if outcome == UpsertOutcome::Recreating {
        pass.pod_name = None;
        pass.conditions.mark_false(
            CONDITION_TYPE_OPENSTACK_CLIENT_READY,
            REASON_REQUESTED,
            Severity::Info,
            MESSAGE_CLIENT_POD_RECREATING,
        );
        return Ok(Duration::from_secs(PROGRESSING_REQUEUE_SECS));
    }

    pass.pod_name = Some(name);
    pass.conditions
        .mark_true(CONDITION_TYPE_OPENSTACK_CLIENT_READY, MESSAGE_CLIENT_READY);
    Ok(ctx.settings.ready_requeue)
}

/// Converge the service account, role and binding. Returns `false` while the
/// binding is being recreated.
async fn ensure_rbac(
    client: &Client,
    client_cr: &OpenStackClient,
    owner: &OwnerReference,
    namespace: &str,
    pass: &mut ClientPass,
) -> Result<bool> {
    let service_account = build_service_account(client_cr, owner);
    let sa_meta = service_account.metadata.clone();
    let accounts: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    upsert(&accounts, service_account, ImmutablePolicy::Fail, |live| {
        merge_metadata(&mut live.metadata, &sa_meta);
        Ok(())
    })
    .await?;
    pass.conditions
        .mark_true(CONDITION_TYPE_SERVICE_ACCOUNT_READY, MESSAGE_SERVICE_ACCOUNT_READY);

    let role = build_role(client_cr, owner);
    let role_meta = role.metadata.clone();
    let rules = role.rules.clone();
    let roles: Api<Role> = Api::namespaced(client.clone(), namespace);
    upsert(&roles, role, ImmutablePolicy::Fail, |live| {
        live.rules.clone_from(&rules);
        merge_metadata(&mut live.metadata, &role_meta);
        Ok(())
    })
    .await?;
    pass.conditions
        .mark_true(CONDITION_TYPE_ROLE_READY, MESSAGE_ROLE_READY);

    let binding = build_role_binding(client_cr, owner);
    let binding_meta = binding.metadata.clone();
    let role_ref = binding.role_ref.clone();
    let subjects = binding.subjects.clone();
    let binding_name = binding_meta.name.clone().unwrap_or_default();
    let bindings: Api<RoleBinding> = Api::namespaced(client.clone(), namespace);
    let (outcome, _) = upsert(&bindings, binding, ImmutablePolicy::DeleteAndRecreate, |live| {
        if live.role_ref != role_ref {
            return Err(SyncError::immutable("RoleBinding", &binding_name, "roleRef changed"));
        }
        live.subjects.clone_from(&subjects);
        merge_metadata(&mut live.metadata, &binding_meta);
        Ok(())
    })
    .await?;
    if outcome == UpsertOutcome::Recreating {
        pass.conditions.mark_false(
            CONDITION_TYPE_ROLE_BINDING_READY,
            REASON_REQUESTED,
            Severity::Info,
            MESSAGE_ROLE_BINDING_RECREATING,
        );
        return Ok(false);
    }
    pass.conditions
        .mark_true(CONDITION_TYPE_ROLE_BINDING_READY, MESSAGE_ROLE_BINDING_READY);

    Ok(true)
}

/// Digests of the mounted inputs, or `None` after marking the first missing one.
async fn gather_inputs(
    client: &Client,
    client_cr: &OpenStackClient,
    namespace: &str,
    pass: &mut ClientPass,
) -> Result<Option<BTreeMap<String, String>>> {
    let mut inputs = BTreeMap::new();

    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let cm_name = &client_cr.spec.open_stack_config_map;
    let Some(cm) = config_maps.get_opt(cm_name).await? else {
        mark_input_missing(pass, "configmap", cm_name);
        return Ok(None);
    };
    inputs.insert(input_key("configmap", cm_name), configmap_digest(&cm));

    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let mut secret_names = vec![client_cr.spec.open_stack_config_secret.clone()];
    if let Some(bundle) = client_cr
        .spec
        .ca_bundle_secret_name
        .as_ref()
        .filter(|n| !n.is_empty())
    {
        secret_names.push(bundle.clone());
    }
    for secret_name in secret_names {
        let Some(secret) = secrets.get_opt(&secret_name).await? else {
            mark_input_missing(pass, "secret", &secret_name);
            return Ok(None);
        };
        inputs.insert(input_key("secret", &secret_name), secret_digest(&secret));
    }

    Ok(Some(inputs))
}

/// Inputs are keyed by kind as well as name, since a `ConfigMap` and a
/// `Secret` may share a name.
fn input_key(kind: &str, name: &str) -> String {
    format!("{kind}/{name}")
}

fn mark_input_missing(pass: &mut ClientPass, kind: &str, name: &str) {
    info!(kind = kind, name = %name, "OpenStackClient input not found");
    pass.conditions.mark_false(
        CONDITION_TYPE_OPENSTACK_CLIENT_READY,
        REASON_REQUESTED,
        Severity::Info,
        input_waiting_message(kind, name),
    );
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
