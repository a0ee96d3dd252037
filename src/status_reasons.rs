// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Condition types, reasons and messages for control plane resources.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why a condition has
//! a particular status. Service-specific condition types live with the service
//! descriptor table in [`crate::services`]; the types here are shared by the
//! orchestrator and the admin client controller.
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   conditions:
//!     - type: Ready
//!       status: "False"
//!       reason: Requested
//!       severity: Info
//!       message: "OpenStackControlPlane KeystoneAPI in progress"
//!     - type: OpenStackControlPlaneMariaDBReady
//!       status: "True"
//!       reason: Ready
//!       message: "OpenStackControlPlane MariaDB completed"
//!     - type: OpenStackControlPlaneKeystoneAPIReady
//!       status: "False"
//!       reason: Requested
//!       severity: Info
//!       message: "OpenStackControlPlane KeystoneAPI in progress"
//! ```

// ============================================================================
// Shared Condition Types
// ============================================================================

/// Aggregate readiness of the whole resource
pub const CONDITION_TYPE_READY: &str = "Ready";

/// The shared input secret is present
pub const CONDITION_TYPE_INPUT_READY: &str = "InputReady";

/// Every referenced topology resolves
pub const CONDITION_TYPE_TOPOLOGY_READY: &str = "TopologyReady";

/// The CA chain and trust bundle are in place
pub const CONDITION_TYPE_CA_READY: &str = "OpenStackControlPlaneCAReady";

/// The admin client created by the control plane is ready
pub const CONDITION_TYPE_CLIENT_READY: &str = "OpenStackControlPlaneClientReady";

/// Admin client `ServiceAccount` exists
pub const CONDITION_TYPE_SERVICE_ACCOUNT_READY: &str = "ServiceAccountReady";

/// Admin client `Role` exists
pub const CONDITION_TYPE_ROLE_READY: &str = "RoleReady";

/// Admin client `RoleBinding` exists
pub const CONDITION_TYPE_ROLE_BINDING_READY: &str = "RoleBindingReady";

/// Admin client pod is created
pub const CONDITION_TYPE_OPENSTACK_CLIENT_READY: &str = "OpenStackClientReady";

// ============================================================================
// Reasons
// ============================================================================

/// Condition has been seeded but not evaluated yet
pub const REASON_INIT: &str = "Init";

/// Work was requested from a collaborator and is not finished
pub const REASON_REQUESTED: &str = "Requested";

/// An unexpected error occurred
pub const REASON_ERROR: &str = "Error";

/// Condition is satisfied
pub const REASON_READY: &str = "Ready";

// ============================================================================
// Messages
// ============================================================================

/// Message for the aggregate `Ready` condition when every sub-condition is true
pub const MESSAGE_SETUP_COMPLETE: &str = "Setup complete";

/// Message for a freshly seeded condition
pub const MESSAGE_INIT: &str = "Init";

/// Message when the shared input secret is present
pub const MESSAGE_INPUT_READY: &str = "Input data complete";

/// Message when every topology reference resolves
pub const MESSAGE_TOPOLOGY_READY: &str = "Topology resolved";

/// Message when the CA chain is in place
pub const MESSAGE_CA_READY: &str = "CA chain ready";

/// Message for the admin client waiting on the identity service
pub const MESSAGE_CLIENT_KEYSTONE_WAITING: &str = "OpenStack Client keystone API not yet ready";

/// Message while the CA chain is being issued
pub const MESSAGE_CA_RUNNING: &str = "OpenStackControlPlane CAs in progress";

/// Message when the admin client service account exists
pub const MESSAGE_SERVICE_ACCOUNT_READY: &str = "Service account create completed";

/// Message when the admin client role exists
pub const MESSAGE_ROLE_READY: &str = "Role create completed";

/// Message when the admin client role binding exists
pub const MESSAGE_ROLE_BINDING_READY: &str = "Role Binding create completed";

/// Role binding deleted to change its role reference
pub const MESSAGE_ROLE_BINDING_RECREATING: &str = "Role Binding recreating";

/// Message while the admin client pod is replaced
pub const MESSAGE_CLIENT_POD_RECREATING: &str = "OpenStack Client pod recreating";

/// Message when the admin client pod exists
pub const MESSAGE_CLIENT_READY: &str = "OpenStack Client created";

/// Message for a service whose children report ready.
#[must_use]
pub fn service_ready_message(display: &str) -> String {
    format!("OpenStackControlPlane {display} completed")
}

/// Message for a service whose children are still converging.
#[must_use]
pub fn service_running_message(display: &str) -> String {
    format!("OpenStackControlPlane {display} in progress")
}

/// Message for a service whose step failed.
#[must_use]
pub fn service_error_message(display: &str, error: &str) -> String {
    format!("OpenStackControlPlane {display} error occurred {error}")
}

/// Message for a service blocked on other services.
#[must_use]
pub fn service_waiting_message(display: &str, dependencies: &[&str]) -> String {
    format!(
        "OpenStackControlPlane {display} waiting for {}",
        dependencies.join(", ")
    )
}

/// Message for a topology that cannot be found.
#[must_use]
pub fn topology_not_found_message(namespace: &str, name: &str) -> String {
    format!("Topology {namespace}/{name} not found")
}

/// Message for a missing input object.
#[must_use]
pub fn input_waiting_message(kind: &str, name: &str) -> String {
    format!("waiting for {kind} {name}")
}

/// Message for a custom CA issuer that does not exist.
#[must_use]
pub fn ca_issuer_not_found_message(domain: &str, issuer: &str) -> String {
    format!("{domain} CA issuer {issuer} not found")
}

/// Message for an admin client whose reconcile failed.
#[must_use]
pub fn client_error_message(error: &str) -> String {
    format!("OpenStack Client error occurred {error}")
}
