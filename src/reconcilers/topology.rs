// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Topology propagation.
//!
//! A control plane may name a `Topology` once at the top level and override it
//! per service. The effective reference of a service is its override when one
//! is set, otherwise the top-level reference. An override with an empty name
//! explicitly opts the service out of any topology.
//!
//! The orchestrator resolves the distinct effective references of all enabled
//! services before touching any child, and every child spec carries its own
//! effective reference under `topologyRef`.

use anyhow::Result;
use kube::{Api, Client};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::crd::{OpenStackControlPlaneSpec, TopoRef};
use crate::external::Topology;
use crate::reconcilers::hashes::hash_of_json;
use crate::services::ServiceKind;

/// Hash register prefix for resolved topologies
pub const TOPOLOGY_HASH_PREFIX: &str = "topology-";

/// Effective topology of one service template.
///
/// The namespace is filled in with `namespace` when the reference leaves it out.
#[must_use]
pub fn effective_topology(
    service_override: Option<&TopoRef>,
    top_level: Option<&TopoRef>,
    namespace: &str,
) -> Option<TopoRef> {
    let chosen = service_override.or(top_level)?;
    if chosen.name.is_empty() {
        return None;
    }
    Some(TopoRef {
        name: chosen.name.clone(),
        namespace: Some(
            chosen
                .namespace
                .clone()
                .filter(|ns| !ns.is_empty())
                .unwrap_or_else(|| namespace.to_string()),
        ),
    })
}

/// Distinct effective topologies of every enabled service.
#[must_use]
pub fn effective_topologies(spec: &OpenStackControlPlaneSpec, namespace: &str) -> BTreeSet<TopoRef> {
    let top_level = spec.topology_ref.as_ref();
    ServiceKind::ALL
        .into_iter()
        .flat_map(|kind| kind.instances(spec))
        .filter_map(|(_, template)| {
            effective_topology(template.topology_ref.as_ref(), top_level, namespace)
        })
        .collect()
}

/// Result of resolving every referenced topology.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyResolution {
    /// Digest of each resolved topology's spec, keyed by topology name
    pub resolved: BTreeMap<String, String>,
    /// References that do not exist
    pub missing: Vec<TopoRef>,
}

/// Look up a single topology. `None` when it does not exist.
///
/// # Errors
///
/// Returns any API error other than not-found.
pub async fn resolve(client: &Client, topology: &TopoRef) -> Result<Option<Topology>> {
    let namespace = topology.namespace.as_deref().unwrap_or_default();
    let api: Api<Topology> = Api::namespaced(client.clone(), namespace);
    let found = api.get_opt(&topology.name).await?;
    debug!(
        namespace = %namespace,
        topology = %topology.name,
        found = found.is_some(),
        "Resolved topology reference"
    );
    Ok(found)
}

/// Resolve every reference in `refs`.
///
/// # Errors
///
/// Returns any API error other than not-found.
pub async fn resolve_all(client: &Client, refs: &BTreeSet<TopoRef>) -> Result<TopologyResolution> {
    let mut resolution = TopologyResolution::default();
    for topology in refs {
        match resolve(client, topology).await? {
            Some(found) => {
                resolution
                    .resolved
                    .insert(topology.name.clone(), hash_of_json(&found.spec)?);
            }
            None => resolution.missing.push(topology.clone()),
        }
    }
    Ok(resolution)
}

#[cfg(test)]
#[path = "topology_tests.rs"]
mod topology_tests;
