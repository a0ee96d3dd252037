// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) owned by the control plane operator.
//!
//! # Resource Types
//!
//! - [`OpenStackControlPlane`] - The single declarative object describing every
//!   service of a control plane in one namespace
//! - [`OpenStackClient`] - The administrative client pod, created by the control
//!   plane and reconciled by its own controller
//!
//! # Example: Minimum Viable Control Plane
//!
//! ```rust
//! use ctlplane::crd::OpenStackControlPlaneSpec;
//!
//! let spec: OpenStackControlPlaneSpec = serde_json::from_value(serde_json::json!({
//!     "secret": "osp-secret",
//!     "galera": {"enabled": true},
//!     "rabbitmq": {"enabled": true},
//!     "memcached": {"enabled": true},
//!     "keystone": {"enabled": true}
//! })).unwrap();
//!
//! assert!(spec.keystone.enabled);
//! assert!(!spec.nova.enabled);
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{
    DEFAULT_CA_DURATION, DEFAULT_OPENSTACK_CONFIG_MAP, DEFAULT_OPENSTACK_CONFIG_SECRET,
};

/// Default leaf certificate duration handed to service operators (5 years)
pub const DEFAULT_CERT_DURATION: &str = "43800h";

fn default_true() -> bool {
    true
}

fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "nullable": true,
        "x-kubernetes-preserve-unknown-fields": true
    })
}

// ============================================================================
// Conditions
// ============================================================================

/// Tri-state status of a [`Condition`].
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// How bad a `False` condition is.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Condition represents an observation of a resource's current state.
///
/// `lastTransitionTime` only moves when `status` changes. Watchers should key
/// off the aggregate `Ready` condition plus the specific sub-condition they
/// depend on.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition, e.g. `Ready` or `OpenStackControlPlaneKeystoneAPIReady`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: ConditionStatus,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(default)]
    pub reason: String,

    /// Severity of a `False` condition. Absent for `True` and `Unknown`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Human-readable message indicating details about the transition.
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

// ============================================================================
// Shared Types
// ============================================================================

/// Reference to a `Topology` resource.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct TopoRef {
    /// Name of the topology. An empty name on a per-service override clears
    /// the top-level reference for that service.
    pub name: String,

    /// Namespace of the topology. Defaults to the control plane namespace and
    /// must equal it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Per-service template. Every field is optional; unset fields fall back to
/// the top-level spec or to operator defaults.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTemplate {
    /// Topology override for this service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology_ref: Option<TopoRef>,

    /// Node selector override for this service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Container image override. Defaults to the `RELATED_IMAGE_*` environment value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<String>,

    /// Secret override. Defaults to `spec.secret`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Storage class override. Defaults to `spec.storageClass`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Galera instance this service uses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_instance: Option<String>,

    /// `RabbitMq` instance this service uses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rabbit_mq_cluster_name: Option<String>,

    /// Memcached instance this service uses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memcached_instance: Option<String>,

    /// Replica count passed to the child
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0, max = 32))]
    pub replicas: Option<i32>,

    /// Service-specific settings, copied verbatim into the child spec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub settings: Option<serde_json::Value>,
}

/// A service with exactly one child.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSection {
    /// Whether the service is deployed
    #[serde(default)]
    pub enabled: bool,

    /// Template for the child
    #[serde(default)]
    pub template: ServiceTemplate,
}

/// A service with one child per named template (galera, rabbitmq, memcached).
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MultiInstanceSection {
    /// Whether the service is deployed
    #[serde(default)]
    pub enabled: bool,

    /// Templates keyed by instance name. Names must be DNS-1123 labels of at
    /// most 52 characters.
    #[serde(default)]
    pub templates: BTreeMap<String, ServiceTemplate>,
}

/// The admin client created by the control plane.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientSection {
    /// Whether the admin client is deployed
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Template for the `OpenStackClient`
    #[serde(default)]
    pub template: ClientTemplate,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            enabled: true,
            template: ClientTemplate::default(),
        }
    }
}

/// Overrides for the `OpenStackClient` the control plane creates.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientTemplate {
    /// Container image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<String>,

    /// Node selector override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// `ConfigMap` holding `clouds.yaml`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_stack_config_map: Option<String>,

    /// `Secret` holding `secure.yaml`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_stack_config_secret: Option<String>,
}

// ============================================================================
// TLS
// ============================================================================

/// CA settings for one trust domain.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaConfig {
    /// CA certificate duration. Defaults to `87600h`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// CA renewal window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_before: Option<String>,

    /// Existing issuer to use instead of creating a CA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_issuer: Option<String>,
}

impl CaConfig {
    /// Effective CA duration.
    #[must_use]
    pub fn duration(&self) -> &str {
        self.duration.as_deref().unwrap_or(DEFAULT_CA_DURATION)
    }
}

/// Leaf certificate settings service operators read from the issuer.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertConfig {
    /// Leaf certificate duration. Defaults to `43800h`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// Leaf certificate renewal window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_before: Option<String>,
}

impl CertConfig {
    /// Effective leaf certificate duration.
    #[must_use]
    pub fn duration(&self) -> &str {
        self.duration.as_deref().unwrap_or(DEFAULT_CERT_DURATION)
    }
}

/// CA and leaf settings for one trust domain.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsDomainConfig {
    #[serde(default)]
    pub ca: CaConfig,
    #[serde(default)]
    pub cert: CertConfig,
}

/// Public endpoint TLS.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsIngressConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub ca: CaConfig,
    #[serde(default)]
    pub cert: CertConfig,
}

impl Default for TlsIngressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ca: CaConfig::default(),
            cert: CertConfig::default(),
        }
    }
}

/// Pod-level TLS for internal, libvirt and OVN traffic.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsPodLevelConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub internal: TlsDomainConfig,
    #[serde(default)]
    pub libvirt: TlsDomainConfig,
    #[serde(default)]
    pub ovn: TlsDomainConfig,
}

impl Default for TlsPodLevelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            internal: TlsDomainConfig::default(),
            libvirt: TlsDomainConfig::default(),
            ovn: TlsDomainConfig::default(),
        }
    }
}

/// TLS policy of the control plane.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsSection {
    #[serde(default)]
    pub ingress: TlsIngressConfig,

    #[serde(default)]
    pub pod_level: TlsPodLevelConfig,

    /// Secret with extra CA certificates to add to the trust bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle_secret_name: Option<String>,
}

// ============================================================================
// OpenStackControlPlane
// ============================================================================

/// `OpenStackControlPlane` describes every service of a control plane.
///
/// Only one instance may exist per namespace.
///
/// # Example
///
/// ```yaml
/// apiVersion: core.openstack.org/v1beta1
/// kind: OpenStackControlPlane
/// metadata:
///   name: openstack
///   namespace: openstack
/// spec:
///   secret: osp-secret
///   topologyRef:
///     name: spread-zones
///   galera:
///     enabled: true
///   rabbitmq:
///     enabled: true
///   memcached:
///     enabled: true
///   keystone:
///     enabled: true
///     template:
///       replicas: 3
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[kube(
    group = "core.openstack.org",
    version = "v1beta1",
    kind = "OpenStackControlPlane",
    namespaced,
    shortname = "osctlplane",
    doc = "OpenStackControlPlane is the declarative description of a whole OpenStack control plane. The operator derives one child resource per enabled service and aggregates their readiness into ordered conditions."
)]
#[kube(status = "OpenStackControlPlaneStatus")]
#[serde(rename_all = "camelCase")]
pub struct OpenStackControlPlaneSpec {
    /// Secret holding service passwords, shared by every service by default
    pub secret: String,

    /// Storage class for services that persist data
    #[serde(default)]
    pub storage_class: String,

    /// Node selector applied to every service without an override
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    /// Topology applied to every service without an override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology_ref: Option<TopoRef>,

    #[serde(default)]
    pub tls: TlsSection,

    #[serde(default)]
    pub galera: MultiInstanceSection,
    #[serde(default)]
    pub rabbitmq: MultiInstanceSection,
    #[serde(default)]
    pub memcached: MultiInstanceSection,

    #[serde(default)]
    pub keystone: ServiceSection,
    #[serde(default)]
    pub placement: ServiceSection,
    #[serde(default)]
    pub glance: ServiceSection,
    #[serde(default)]
    pub cinder: ServiceSection,
    #[serde(default)]
    pub ovn: ServiceSection,
    #[serde(default)]
    pub neutron: ServiceSection,
    #[serde(default)]
    pub nova: ServiceSection,
    #[serde(default)]
    pub heat: ServiceSection,
    #[serde(default)]
    pub horizon: ServiceSection,
    #[serde(default)]
    pub barbican: ServiceSection,
    #[serde(default)]
    pub swift: ServiceSection,
    #[serde(default)]
    pub octavia: ServiceSection,
    #[serde(default)]
    pub manila: ServiceSection,
    #[serde(default)]
    pub designate: ServiceSection,
    #[serde(default)]
    pub ironic: ServiceSection,
    #[serde(default)]
    pub telemetry: ServiceSection,

    #[serde(default)]
    pub openstackclient: ClientSection,
}

/// One CA in the trust bundle.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaStatus {
    /// Common name of the CA
    pub name: String,
    /// Expiry (RFC3339)
    pub expires: String,
}

/// TLS state reported by the control plane.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TlsStatus {
    #[serde(default)]
    pub ca_list: Vec<CaStatus>,

    /// Name of the generated trust bundle secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle_secret_name: Option<String>,
}

/// `OpenStackControlPlane` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenStackControlPlaneStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Drift hashes keyed by logical input name
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,

    #[serde(default)]
    pub tls: TlsStatus,

    /// Endpoints reported by ready services, keyed by service then endpoint type
    #[serde(default)]
    pub endpoints: BTreeMap<String, BTreeMap<String, String>>,

    /// Images running in ready services
    #[serde(default)]
    pub container_images: BTreeMap<String, String>,
}

// ============================================================================
// OpenStackClient
// ============================================================================

fn default_config_map() -> String {
    DEFAULT_OPENSTACK_CONFIG_MAP.to_string()
}

fn default_config_secret() -> String {
    DEFAULT_OPENSTACK_CONFIG_SECRET.to_string()
}

/// `OpenStackClient` runs an idle pod with admin credentials mounted, for
/// interactive use of the `openstack` CLI.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "client.openstack.org",
    version = "v1beta1",
    kind = "OpenStackClient",
    namespaced,
    shortname = "osclient",
    doc = "OpenStackClient is an administrative pod with the cloud credentials of the control plane mounted."
)]
#[kube(status = "OpenStackClientStatus")]
#[serde(rename_all = "camelCase")]
pub struct OpenStackClientSpec {
    /// `ConfigMap` holding `clouds.yaml`
    #[serde(default = "default_config_map")]
    pub open_stack_config_map: String,

    /// `Secret` holding `secure.yaml` and `cloudrc`
    #[serde(default = "default_config_secret")]
    pub open_stack_config_secret: String,

    /// Container image. Defaults to the `RELATED_IMAGE_OPENSTACK_CLIENT_*` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Secret with the CA bundle to mount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle_secret_name: Option<String>,
}

impl Default for OpenStackClientSpec {
    fn default() -> Self {
        Self {
            open_stack_config_map: default_config_map(),
            open_stack_config_secret: default_config_secret(),
            container_image: None,
            node_selector: None,
            ca_bundle_secret_name: None,
        }
    }
}

/// `OpenStackClient` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenStackClientStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub hashes: BTreeMap<String, String>,

    /// Name of the admin pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
}
