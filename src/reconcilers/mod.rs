// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation controllers for the control plane resources.
//!
//! Each reconciler converges the children of one resource kind and reports
//! the result through ordered conditions on the resource's status.
//!
//! # Reconciliation Architecture
//!
//! ctlplane follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - Monitor the owned resource and every child it creates
//! 2. **Reconcile** - Derive the desired children from the spec and upsert them
//! 3. **Aggregate** - Fold child readiness into sub-conditions and `Ready`
//! 4. **Status** - Persist conditions and drift hashes in one patch
//!
//! # Available Reconcilers
//!
//! - [`reconcile_controlplane`] - Drives every service of an `OpenStackControlPlane`
//! - [`reconcile_openstackclient`] - Runs the admin pod of an `OpenStackClient`
//!
//! # Shared Building Blocks
//!
//! - [`conditions`] - Ordered condition ledger with `Ready` aggregation
//! - [`hashes`] - Input digests and the drift hash register
//! - [`resources`] - Create-or-update of child resources
//! - [`status`] - Status diffing and patching
//! - [`finalizers`] - Finalizer add/remove and deletion handling
//! - [`retry`] - API error classification and error backoff
//! - [`topology`] - Topology resolution and label moves
//! - [`ca`] - CA chain and trust bundle

pub mod ca;
pub mod conditions;
pub mod controlplane;
pub mod finalizers;
pub mod hashes;
pub mod openstackclient;
pub mod resources;
pub mod retry;
pub mod status;
pub mod topology;


pub use controlplane::reconcile_controlplane;
pub use openstackclient::reconcile_openstackclient;
