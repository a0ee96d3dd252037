// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired state of service children and how their readiness is read back.
//!
//! A child spec starts from the template's opaque `settings` and is then
//! overlaid with the fields the control plane owns: image, secret, node
//! selector, topology, storage class, the shared infrastructure instances,
//! replicas and the trust bundle name.

#![allow(clippy::wildcard_imports)]

use super::types::*;
use crate::constants::{
    DEFAULT_DATABASE_INSTANCE, DEFAULT_MEMCACHED_INSTANCE, DEFAULT_RABBITMQ_CLUSTER,
};
use crate::images::ImageDefaults;
use crate::reconcilers::topology::effective_topology;
use serde_json::Map;

fn non_empty<'a>(value: Option<&'a str>) -> Option<&'a str> {
    value.filter(|v| !v.is_empty())
}

/// Child spec of one instance of `kind`.
///
/// # Errors
///
/// Returns an error if a derived field cannot be serialized.
pub fn desired_child_spec(
    kind: ServiceKind,
    template: &ServiceTemplate,
    spec: &OpenStackControlPlaneSpec,
    namespace: &str,
    ca_bundle_secret_name: Option<&str>,
    images: &ImageDefaults,
) -> Result<Value> {
    let consumes = kind.descriptor().consumes;
    let mut child = match &template.settings {
        Some(Value::Object(settings)) => settings.clone(),
        _ => Map::new(),
    };

    let image = non_empty(template.container_image.as_deref()).unwrap_or(images.service(kind));
    child.insert("containerImage".into(), json!(image));

    if consumes.secret {
        let secret = non_empty(template.secret.as_deref()).unwrap_or(&spec.secret);
        child.insert("secret".into(), json!(secret));
    }

    if let Some(selector) = template.node_selector.as_ref() {
        child.insert("nodeSelector".into(), json!(selector));
    } else if !spec.node_selector.is_empty() {
        child.insert("nodeSelector".into(), json!(spec.node_selector));
    }

    match effective_topology(template.topology_ref.as_ref(), spec.topology_ref.as_ref(), namespace) {
        Some(topology) => {
            child.insert("topologyRef".into(), serde_json::to_value(topology)?);
        }
        None => {
            child.remove("topologyRef");
        }
    }

    if consumes.storage {
        let storage_class = non_empty(template.storage_class.as_deref())
            .or_else(|| non_empty(Some(spec.storage_class.as_str())));
        if let Some(storage_class) = storage_class {
            child.insert("storageClass".into(), json!(storage_class));
        }
    }

    if consumes.database {
        let instance = non_empty(template.database_instance.as_deref())
            .unwrap_or(DEFAULT_DATABASE_INSTANCE);
        child.insert("databaseInstance".into(), json!(instance));
    }
    if consumes.messaging {
        let cluster = non_empty(template.rabbit_mq_cluster_name.as_deref())
            .unwrap_or(DEFAULT_RABBITMQ_CLUSTER);
        child.insert("rabbitMqClusterName".into(), json!(cluster));
    }
    if consumes.cache {
        let instance = non_empty(template.memcached_instance.as_deref())
            .unwrap_or(DEFAULT_MEMCACHED_INSTANCE);
        child.insert("memcachedInstance".into(), json!(instance));
    }

    if let Some(replicas) = template.replicas {
        child.insert("replicas".into(), json!(replicas));
    }

    if let Some(bundle) = non_empty(ca_bundle_secret_name) {
        let tls = child
            .entry("tls")
            .or_insert_with(|| Value::Object(Map::new()));
        if !tls.is_object() {
            *tls = Value::Object(Map::new());
        }
        if let Some(tls) = tls.as_object_mut() {
            tls.insert("caBundleSecretName".into(), json!(bundle));
        }
    }

    Ok(Value::Object(child))
}

/// The child object for `instance`, labelled, owned and stamped with the
/// digest of `child_spec`.
#[must_use]
pub fn desired_child(
    kind: ServiceKind,
    instance: &str,
    child_spec: Value,
    digest: &str,
    ctx: &StepContext<'_>,
) -> DynamicObject {
    let mut obj = DynamicObject::new(instance, &kind.api_resource())
        .within(&ctx.namespace)
        .data(json!({ "spec": child_spec }));
    obj.metadata.labels = Some(child_labels(&ctx.name, kind.name()));
    obj.metadata.annotations = Some(BTreeMap::from([(
        SPEC_HASH_ANNOTATION.to_string(),
        digest.to_string(),
    )]));
    obj.metadata.owner_references = Some(vec![ctx.owner.clone()]);
    obj
}

/// What a child reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildReadiness {
    /// The child observed its current generation and reports `Ready=True`
    pub ready: bool,
    /// `status.apiEndpoints`, keyed by endpoint type
    pub endpoints: BTreeMap<String, String>,
}

/// Read readiness from a child's status.
#[must_use]
pub fn child_readiness(obj: &DynamicObject) -> ChildReadiness {
    let status = obj.data.get("status");

    let observed = status
        .and_then(|s| s.get("observedGeneration"))
        .and_then(Value::as_i64);
    let current = obj.metadata.generation;

    let ready_condition = status
        .and_then(|s| s.get("conditions"))
        .and_then(Value::as_array)
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some(CONDITION_TYPE_READY)
                    && c.get("status").and_then(Value::as_str) == Some("True")
            })
        });

    let endpoints = status
        .and_then(|s| s.get("apiEndpoints"))
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|url| (k.clone(), url.to_string())))
                .collect()
        })
        .unwrap_or_default();

    ChildReadiness {
        ready: current.is_some() && observed == current && ready_condition,
        endpoints,
    }
}

#[cfg(test)]
#[path = "desired_tests.rs"]
mod desired_tests;
