// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common test utilities for integration tests

#![allow(dead_code)]

use ctlplane::crd::{OpenStackControlPlane, OpenStackControlPlaneSpec};
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{Api, DeleteParams, PostParams},
    client::Client,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Create a test namespace
pub async fn create_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let mut labels = BTreeMap::new();
    labels.insert("test".to_string(), "integration".to_string());
    labels.insert("managed-by".to_string(), "ctlplane-test".to_string());

    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    };

    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => {
            println!("Created test namespace: {name}");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            println!("Test namespace already exists: {name}");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Cleanup test namespace
pub async fn cleanup_test_namespace(client: &Client, name: &str) {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) => println!("Deleted test namespace: {name}"),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            println!("Test namespace already deleted: {name}");
        }
        Err(e) => eprintln!("Failed to delete test namespace {name}: {e}"),
    }
}

/// Create the shared service password secret
pub async fn create_osp_secret(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);

    let mut data = BTreeMap::new();
    data.insert("AdminPassword".to_string(), "12345678".to_string());
    data.insert("DbRootPassword".to_string(), "12345678".to_string());

    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        string_data: Some(data),
        ..Default::default()
    };

    secrets.create(&PostParams::default(), &secret).await?;
    println!("Created Secret: {namespace}/{name}");
    Ok(())
}

/// Create an `OpenStackControlPlane` from a JSON spec
pub async fn create_control_plane(
    client: &Client,
    namespace: &str,
    name: &str,
    spec: serde_json::Value,
) -> Result<OpenStackControlPlane, Box<dyn std::error::Error>> {
    let api: Api<OpenStackControlPlane> = Api::namespaced(client.clone(), namespace);

    let spec: OpenStackControlPlaneSpec = serde_json::from_value(spec)?;
    let mut cp = OpenStackControlPlane::new(name, spec);
    cp.metadata.namespace = Some(namespace.to_string());

    let created = api.create(&PostParams::default(), &cp).await?;
    println!("Created OpenStackControlPlane: {namespace}/{name}");
    Ok(created)
}

/// Poll a control plane until `check` accepts it or `timeout` elapses
pub async fn wait_for_control_plane<F>(
    client: &Client,
    namespace: &str,
    name: &str,
    timeout: Duration,
    check: F,
) -> Option<OpenStackControlPlane>
where
    F: Fn(&OpenStackControlPlane) -> bool,
{
    let api: Api<OpenStackControlPlane> = Api::namespaced(client.clone(), namespace);
    let step = Duration::from_secs(2);
    let mut waited = Duration::ZERO;

    while waited < timeout {
        if let Ok(cp) = api.get(name).await {
            if check(&cp) {
                return Some(cp);
            }
        }
        sleep(step).await;
        waited += step;
    }
    None
}
