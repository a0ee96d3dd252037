// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # ctlplane - OpenStack Control Plane Operator for Kubernetes
//!
//! ctlplane converges a whole OpenStack control plane from one declarative
//! `OpenStackControlPlane` resource. It derives one child resource per enabled
//! service, hands each to its service operator, and folds their readiness back
//! into ordered conditions.
//!
//! ## Overview
//!
//! This library provides the core functionality of the operator, including:
//!
//! - Custom Resource Definitions for the control plane and the admin client
//! - A dependency-ordered reconcile plan over every managed service
//! - The CA chain and combined trust bundle for TLS
//! - Admission validation of control plane specs
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`services`] - Descriptor table of every managed service
//! - [`reconcilers`] - Reconciliation logic for each resource type
//! - [`context`] - Shared context and reflector stores for controllers
//! - [`controller`] - Controller wiring and error policy
//! - [`validation`] - Admission rules for `OpenStackControlPlane`
//! - [`webhook`] - Validating webhook, health and metrics endpoints
//!
//! ## Example
//!
//! ```rust
//! use ctlplane::crd::OpenStackControlPlaneSpec;
//! use ctlplane::services::ServiceKind;
//!
//! let spec: OpenStackControlPlaneSpec = serde_json::from_value(serde_json::json!({
//!     "secret": "osp-secret",
//!     "galera": {"enabled": true},
//!     "memcached": {"enabled": true},
//!     "rabbitmq": {"enabled": true},
//!     "keystone": {"enabled": true}
//! })).unwrap();
//!
//! let enabled: Vec<_> = ServiceKind::ALL
//!     .into_iter()
//!     .filter(|kind| kind.is_enabled(&spec))
//!     .map(ServiceKind::name)
//!     .collect();
//! assert_eq!(enabled, ["galera", "rabbitmq", "memcached", "keystone"]);
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod controller;
pub mod crd;
pub mod errors;
pub mod external;
pub mod images;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod services;
pub mod status_reasons;
pub mod validation;
pub mod webhook;

#[cfg(test)]
mod services_tests;
#[cfg(test)]
mod status_reasons_tests;
