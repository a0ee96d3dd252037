// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared types and imports for `OpenStackControlPlane` reconciliation.
//!
//! This module provides common type re-exports used across the controlplane
//! reconciliation modules.

#![allow(clippy::wildcard_imports)]

// Re-export commonly used types from parent modules
pub use crate::config::Settings;
pub use crate::context::Context;
pub use crate::crd::{
    OpenStackClient, OpenStackClientSpec, OpenStackControlPlane, OpenStackControlPlaneSpec,
    OpenStackControlPlaneStatus, ServiceTemplate, Severity, TlsStatus,
};
pub use crate::labels::{child_labels, child_selector, SPEC_HASH_ANNOTATION};
pub use crate::reconcilers::conditions::ConditionLedger;
pub use crate::reconcilers::hashes::{hash_of, hash_of_inputs, hash_of_json, HashRegister};
pub use crate::reconcilers::resources::{
    delete_owned_except, ensure_deleted, merge_metadata, upsert, ImmutablePolicy, UpsertOutcome,
};
pub use crate::services::{Instances, ServiceKind};
pub use crate::status_reasons::{
    CONDITION_TYPE_READY, REASON_ERROR, REASON_READY, REASON_REQUESTED,
};

pub use super::steps::{ServiceStep, StepContext, StepOutcome};

// Re-export commonly used Kubernetes types
pub use k8s_openapi::{
    api::core::v1::{ConfigMap, Secret},
    apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference},
};

// Re-export kube-rs types
pub use kube::{
    api::{ApiResource, DynamicObject},
    client::Client,
    runtime::controller::Action,
    Api, Resource, ResourceExt,
};

// Re-export common utilities
pub use anyhow::Result;
pub use async_trait::async_trait;
pub use serde_json::{json, Value};
pub use std::collections::{BTreeMap, BTreeSet};
pub use std::sync::Arc;
pub use std::time::Duration;
pub use tracing::{debug, error, info, warn};
