// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed views of resources owned by other controllers.
//!
//! cert-manager owns [`Issuer`] and [`Certificate`]; the topology API owns
//! [`Topology`]. Only the fields this operator reads or writes are modelled,
//! and CRD schema generation is disabled since these CRDs are installed by
//! their owners.

use kube::CustomResource;
use serde::{Deserialize, Serialize};

use crate::status_reasons::CONDITION_TYPE_READY;

/// Minimal condition shape shared by cert-manager resources.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCondition {
    pub r#type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn ready_in(conditions: &[ExternalCondition]) -> bool {
    conditions
        .iter()
        .any(|c| c.r#type == CONDITION_TYPE_READY && c.status == "True")
}

// ============================================================================
// cert-manager
// ============================================================================

/// Marker for a self-signed issuer.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SelfSignedIssuer {}

/// Issuer backed by a CA key pair stored in a secret.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaIssuer {
    pub secret_name: String,
}

#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Issuer",
    namespaced,
    status = "IssuerStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_signed: Option<SelfSignedIssuer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<CaIssuer>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct IssuerStatus {
    #[serde(default)]
    pub conditions: Vec<ExternalCondition>,
}

impl Issuer {
    /// Whether cert-manager reports the issuer `Ready`.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| ready_in(&s.conditions))
    }

    /// Secret holding the CA key pair, for CA issuers.
    #[must_use]
    pub fn ca_secret_name(&self) -> Option<&str> {
        self.spec.ca.as_ref().map(|ca| ca.secret_name.as_str())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateKey {
    pub algorithm: String,
    pub size: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRef {
    pub name: String,
    pub kind: String,
    pub group: String,
}

#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Certificate",
    namespaced,
    status = "CertificateStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    #[serde(rename = "isCA", default)]
    pub is_ca: bool,
    pub common_name: String,
    pub secret_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PrivateKey>,
    pub issuer_ref: IssuerRef,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CertificateStatus {
    #[serde(default)]
    pub conditions: Vec<ExternalCondition>,
}

// ============================================================================
// Topology
// ============================================================================

#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[kube(
    group = "topology.openstack.org",
    version = "v1beta1",
    kind = "Topology",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct TopologySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology_spread_constraints: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<serde_json::Value>,
}
