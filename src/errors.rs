// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the control plane operator.
//!
//! This module provides specialized error types for:
//! - Child resource synchronization (conflicts and immutable fields)
//! - Admission validation of `OpenStackControlPlane` specs
//! - PEM and X.509 parsing while building the trust bundle
//!
//! Reconcilers otherwise propagate `anyhow::Error`; these types exist where a
//! caller needs to branch on the failure.

use std::fmt;
use thiserror::Error;

/// Errors raised by the child resource synchronizer.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A field that cannot change in place differs between desired and live state.
    ///
    /// Raised either by a mutate function that compares live state, or mapped
    /// from a `422 Invalid` / `403 Forbidden` API response.
    #[error("immutable field changed on {kind} {name}: {detail}")]
    ImmutableField {
        /// Kind of the child resource
        kind: String,
        /// Name of the child resource
        name: String,
        /// What changed
        detail: String,
    },

    /// The optimistic-concurrency retry budget was exhausted.
    #[error("{kind} {name} still conflicting after {attempts} attempts")]
    ConflictRetriesExhausted {
        /// Kind of the child resource
        kind: String,
        /// Name of the child resource
        name: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// A desired object has no name.
    #[error("{kind} has no name in its metadata")]
    MissingName {
        /// Kind of the child resource
        kind: String,
    },

    /// Kubernetes API error
    #[error(transparent)]
    Kube(#[from] kube::Error),

    /// Serialization error while diffing objects
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Build an [`SyncError::ImmutableField`] from inside a mutate function.
    #[must_use]
    pub fn immutable(kind: &str, name: &str, detail: impl Into<String>) -> Self {
        Self::ImmutableField {
            kind: kind.to_string(),
            name: name.to_string(),
            detail: detail.into(),
        }
    }
}

/// Kind of a single field validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// The value is not permitted at all
    Forbidden,
    /// The value is malformed or refers to something that does not exist
    Invalid,
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forbidden => write!(f, "Forbidden"),
            Self::Invalid => write!(f, "Invalid value"),
        }
    }
}

/// A single failed validation rule, tied to a field path like `spec.keystone.enabled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the offending field
    pub path: String,
    /// Failure kind
    pub kind: FieldErrorKind,
    /// Human-readable detail, returned verbatim to the user
    pub detail: String,
}

impl FieldError {
    /// A forbidden value at `path`.
    #[must_use]
    pub fn forbidden(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FieldErrorKind::Forbidden,
            detail: detail.into(),
        }
    }

    /// An invalid value at `path`.
    #[must_use]
    pub fn invalid(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FieldErrorKind::Invalid,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.path, self.kind, self.detail)
    }
}

/// An admission rejection, aggregating every failed rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} \"{name}\" is invalid: {}", render_field_errors(.errors))]
pub struct ValidationError {
    /// Kind of the rejected object
    pub kind: String,
    /// Name of the rejected object
    pub name: String,
    /// Every failed rule
    pub errors: Vec<FieldError>,
}

fn render_field_errors(errors: &[FieldError]) -> String {
    match errors {
        [single] => single.to_string(),
        many => format!(
            "[{}]",
            many.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Errors raised while parsing CA material for the trust bundle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BundleError {
    /// The input is not valid PEM
    #[error("invalid PEM in {source_name}: {reason}")]
    Pem {
        /// Where the PEM came from (secret or file name)
        source_name: String,
        /// Parser message
        reason: String,
    },

    /// A PEM block does not hold a valid X.509 certificate
    #[error("invalid certificate in {source_name}: {reason}")]
    Certificate {
        /// Where the PEM came from (secret or file name)
        source_name: String,
        /// Parser message
        reason: String,
    },
}

/// Errors raised while ordering the steps of a reconcile plan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A step depends on a step that is not in the plan
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency {
        /// Declaring step
        step: String,
        /// Missing dependency
        dependency: String,
    },

    /// Two step names collide
    #[error("step {0} is declared twice")]
    DuplicateStep(String),

    /// The dependencies of these steps form a cycle
    #[error("dependency cycle between steps: {}", .0.join(", "))]
    Cycle(Vec<String>),
}
