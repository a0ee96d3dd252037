// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Admission rules for `OpenStackControlPlane`.
//!
//! These are pure checks over the defaulted spec. Rules that need the API
//! server (one control plane per namespace, the namespace reservation) live in
//! the webhook handler.
//!
//! # Example
//!
//! ```rust
//! use ctlplane::crd::{OpenStackControlPlane, OpenStackControlPlaneSpec};
//! use ctlplane::validation::validate_control_plane;
//!
//! let mut cp = OpenStackControlPlane::new("openstack", OpenStackControlPlaneSpec::default());
//! cp.metadata.namespace = Some("openstack".into());
//! cp.spec.keystone.enabled = true;
//!
//! let err = validate_control_plane(&cp).unwrap_err();
//! assert!(err.to_string().contains("Keystone requires these services to be enabled"));
//! ```

use kube::ResourceExt;

use crate::constants::{KIND_CONTROL_PLANE, MAX_TEMPLATE_NAME_LENGTH};
use crate::crd::{OpenStackControlPlane, OpenStackControlPlaneSpec, ServiceTemplate, TopoRef};
use crate::errors::{FieldError, ValidationError};
use crate::services::{apply_defaults, SectionRef, ServiceKind};

/// Run every admission rule against `cp`.
///
/// # Errors
///
/// Returns a [`ValidationError`] listing every failed rule.
pub fn validate_control_plane(cp: &OpenStackControlPlane) -> Result<(), ValidationError> {
    let namespace = cp.namespace().unwrap_or_default();
    let mut spec = cp.spec.clone();
    apply_defaults(&mut spec);

    let mut errors = Vec::new();
    errors.extend(validate_topology_namespaces(&spec, &namespace));
    errors.extend(validate_template_names(&spec));
    errors.extend(validate_instance_references(&spec));
    errors.extend(validate_service_dependencies(&spec));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError {
            kind: KIND_CONTROL_PLANE.to_string(),
            name: cp.name_any(),
            errors,
        })
    }
}

/// Where a service's templates sit in the spec, for field paths.
fn template_paths(
    kind: ServiceKind,
    spec: &OpenStackControlPlaneSpec,
) -> Vec<(String, &ServiceTemplate)> {
    let name = kind.name();
    match kind.section(spec) {
        SectionRef::Single(s) => vec![(format!("spec.{name}.template"), &s.template)],
        SectionRef::Multi(m) => m
            .templates
            .iter()
            .map(|(instance, t)| (format!("spec.{name}.templates[{instance}]"), t))
            .collect(),
    }
}

fn check_topology_namespace(
    topology: Option<&TopoRef>,
    path: &str,
    namespace: &str,
) -> Option<FieldError> {
    let ns = topology?.namespace.as_deref().filter(|ns| !ns.is_empty())?;
    (ns != namespace).then(|| {
        FieldError::invalid(
            format!("{path}.topologyRef.namespace"),
            format!("Customizing namespace field is not supported: {ns}"),
        )
    })
}

/// Topology references may only point at the control plane's own namespace.
#[must_use]
pub fn validate_topology_namespaces(
    spec: &OpenStackControlPlaneSpec,
    namespace: &str,
) -> Vec<FieldError> {
    let mut errors: Vec<FieldError> =
        check_topology_namespace(spec.topology_ref.as_ref(), "spec", namespace)
            .into_iter()
            .collect();
    for kind in ServiceKind::ALL {
        for (path, template) in template_paths(kind, spec) {
            errors.extend(check_topology_namespace(
                template.topology_ref.as_ref(),
                &path,
                namespace,
            ));
        }
    }
    errors
}

/// Whether `name` is a DNS-1123 label.
#[must_use]
pub fn is_dns_label(name: &str) -> bool {
    let bytes = name.as_bytes();
    let valid_char = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-';
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes.iter().all(valid_char)
        }
        _ => false,
    }
}

/// Multi-instance template names become child names and must be short DNS labels.
#[must_use]
pub fn validate_template_names(spec: &OpenStackControlPlaneSpec) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for kind in ServiceKind::ALL {
        let SectionRef::Multi(section) = kind.section(spec) else {
            continue;
        };
        for instance in section.templates.keys() {
            let path = format!("spec.{}.templates[{instance}]", kind.name());
            if instance.len() > MAX_TEMPLATE_NAME_LENGTH {
                errors.push(FieldError::invalid(
                    path,
                    format!("name must be no more than {MAX_TEMPLATE_NAME_LENGTH} characters"),
                ));
            } else if !is_dns_label(instance) {
                errors.push(FieldError::invalid(
                    path,
                    "name must consist of lower case alphanumeric characters or '-', and must start and end with an alphanumeric character",
                ));
            }
        }
    }
    errors
}

/// `databaseInstance`, `rabbitMqClusterName` and `memcachedInstance` must name
/// a declared instance of an enabled infrastructure service.
#[must_use]
pub fn validate_instance_references(spec: &OpenStackControlPlaneSpec) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for kind in ServiceKind::ALL.into_iter().filter(|k| k.is_enabled(spec)) {
        for (path, template) in template_paths(kind, spec) {
            let references = [
                (
                    "databaseInstance",
                    template.database_instance.as_deref(),
                    ServiceKind::Galera,
                ),
                (
                    "rabbitMqClusterName",
                    template.rabbit_mq_cluster_name.as_deref(),
                    ServiceKind::RabbitMq,
                ),
                (
                    "memcachedInstance",
                    template.memcached_instance.as_deref(),
                    ServiceKind::Memcached,
                ),
            ];
            for (field, value, target) in references {
                let Some(value) = value.filter(|v| !v.is_empty()) else {
                    continue;
                };
                if !declares_instance(spec, target, value) {
                    errors.push(FieldError::invalid(
                        format!("{path}.{field}"),
                        format!(
                            "{field} must match an existing {} instance name: {value}",
                            target.descriptor().display
                        ),
                    ));
                }
            }
        }
    }
    errors
}

fn declares_instance(spec: &OpenStackControlPlaneSpec, kind: ServiceKind, name: &str) -> bool {
    kind.instances(spec).iter().any(|(instance, _)| instance == name)
}

/// Message for a service enabled without the services it depends on.
#[must_use]
pub fn dependency_message(kind: ServiceKind) -> String {
    let d = kind.descriptor();
    let required: Vec<&str> = d.dependencies.iter().map(|k| k.descriptor().display).collect();
    format!(
        "{} requires these services to be enabled: {}.",
        d.display,
        required.join(", ")
    )
}

/// Every enabled service needs all of its dependencies enabled.
#[must_use]
pub fn validate_service_dependencies(spec: &OpenStackControlPlaneSpec) -> Vec<FieldError> {
    ServiceKind::ALL
        .into_iter()
        .filter(|kind| kind.is_enabled(spec))
        .filter(|kind| {
            kind.descriptor()
                .dependencies
                .iter()
                .any(|dep| !dep.is_enabled(spec))
        })
        .map(|kind| {
            FieldError::invalid(
                format!("spec.{}.enabled", kind.name()),
                dependency_message(kind),
            )
        })
        .collect()
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod validation_tests;
