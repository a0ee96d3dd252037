// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the control plane operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API version shared by all owned and child CRDs
pub const API_VERSION: &str = "v1beta1";

/// Kind name for `OpenStackControlPlane` resource
pub const KIND_CONTROL_PLANE: &str = "OpenStackControlPlane";

/// Kind name for `OpenStackClient` resource
pub const KIND_OPENSTACK_CLIENT: &str = "OpenStackClient";

/// Field manager name used for patches issued by this operator
pub const FIELD_MANAGER: &str = "ctlplane-operator";

// ============================================================================
// Finalizers and Reservation
// ============================================================================

/// Finalizer placed on every `OpenStackControlPlane`
pub const CONTROL_PLANE_FINALIZER: &str = "core.openstack.org/openstackcontrolplane";

/// Name of the per-namespace reservation `ConfigMap`
pub const RESERVATION_CONFIGMAP_NAME: &str = "openstack-controlplane-reservation";

/// Finalizer that keeps the reservation alive until the control plane releases it
pub const RESERVATION_FINALIZER: &str = "core.openstack.org/reservation";

/// Reservation data key holding the owning control plane name
pub const RESERVATION_OWNER_NAME_KEY: &str = "owner-name";

/// Reservation data key holding the owning control plane UID
pub const RESERVATION_OWNER_UID_KEY: &str = "owner-uid";

// ============================================================================
// Defaults for Child Specs
// ============================================================================

/// Default Galera instance name and `databaseInstance` reference
pub const DEFAULT_DATABASE_INSTANCE: &str = "openstack";

/// Default `RabbitMq` instance name and `rabbitMqClusterName` reference
pub const DEFAULT_RABBITMQ_CLUSTER: &str = "rabbitmq";

/// Default Memcached instance name and `memcachedInstance` reference
pub const DEFAULT_MEMCACHED_INSTANCE: &str = "memcached";

/// Maximum length of a multi-instance template name
pub const MAX_TEMPLATE_NAME_LENGTH: usize = 52;

/// Name of the `OpenStackClient` created by the control plane
pub const OPENSTACK_CLIENT_NAME: &str = "openstackclient";

/// Default `ConfigMap` holding `clouds.yaml`
pub const DEFAULT_OPENSTACK_CONFIG_MAP: &str = "openstack-config";

/// Default `Secret` holding `secure.yaml`
pub const DEFAULT_OPENSTACK_CONFIG_SECRET: &str = "openstack-config-secret";

// ============================================================================
// TLS / CA Chain
// ============================================================================

/// Self-signed root issuer that signs every default CA
pub const SELFSIGNED_ISSUER_NAME: &str = "selfsigned-issuer";

/// Name of the generated trust bundle `Secret`
pub const CA_BUNDLE_SECRET_NAME: &str = "combined-ca-bundle";

/// Key holding every trusted CA in the trust bundle
pub const CA_BUNDLE_KEY: &str = "tls-ca-bundle.pem";

/// Key holding only the internal CA in the trust bundle
pub const INTERNAL_CA_BUNDLE_KEY: &str = "internal-ca-bundle.pem";

/// Secret key for a certificate
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Secret key for a CA certificate
pub const CA_CERT_KEY: &str = "ca.crt";

/// Default duration of a CA certificate (10 years)
pub const DEFAULT_CA_DURATION: &str = "87600h";

/// RSA key size for generated CA certificates
pub const CA_KEY_SIZE: i64 = 3072;

/// Default location of the system trust bundle
pub const DEFAULT_SYSTEM_CA_BUNDLE: &str = "/etc/pki/ca-trust/extracted/pem/tls-ca-bundle.pem";

// ============================================================================
// Admin Client Pod
// ============================================================================

/// User and group id the admin client runs as
pub const CLOUD_ADMIN_UID: i64 = 42401;

/// Mount path for `clouds.yaml` and `secure.yaml`
pub const OPENSTACK_CONFIG_MOUNT_PATH: &str = "/home/cloud-admin/.config/openstack";

/// Mount path for the CA bundle inside the admin client
pub const CA_BUNDLE_MOUNT_PATH: &str = "/etc/pki/ca-trust/extracted/pem";

/// Toleration for `not-ready` and `unreachable` taints
pub const CLIENT_TOLERATION_SECONDS: i64 = 120;

/// Home directory of the admin client user
pub const CLOUD_ADMIN_HOME: &str = "/home/cloud-admin";

/// Name of the telemetry metric storage whose Prometheus the admin client points at
pub const METRIC_STORAGE_NAME: &str = "metric-storage";

/// Prometheus port of the telemetry metric storage
pub const PROMETHEUS_PORT: u16 = 9090;

// ============================================================================
// Controller Requeue Intervals
// ============================================================================

/// Requeue interval when everything is ready (5 minutes)
pub const DEFAULT_READY_REQUEUE_SECS: u64 = 300;

/// Requeue interval while a step is progressing
pub const PROGRESSING_REQUEUE_SECS: u64 = 10;

/// Requeue interval while a step waits on a dependency or collaborator
pub const DEPENDENCY_REQUEUE_SECS: u64 = 5;

/// Requeue interval when an input object is missing
pub const MISSING_INPUT_REQUEUE_SECS: u64 = 10;

/// Base delay for error backoff
pub const ERROR_REQUEUE_MIN_SECS: u64 = 5;

/// Ceiling for error backoff
pub const ERROR_REQUEUE_MAX_SECS: u64 = 300;

/// Jitter applied to error backoff (±10%)
pub const ERROR_REQUEUE_JITTER: f64 = 0.1;

/// Attempts made by the synchronizer before surfacing a conflict
pub const MAX_CONFLICT_RETRIES: u32 = 3;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for the Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Default port for metrics, health and the admission webhook
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default lease name for leader election
pub const DEFAULT_LEASE_NAME: &str = "ctlplane-leader";

/// Default leader election lease duration (15 seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Default leader election grace period (5 seconds)
pub const DEFAULT_LEASE_GRACE_SECS: u64 = 5;

/// Path of the `OpenStackControlPlane` validating webhook
pub const WEBHOOK_VALIDATE_PATH: &str = "/validate-core-openstack-org-v1beta1-openstackcontrolplane";
