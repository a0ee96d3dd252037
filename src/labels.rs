// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! This module defines standard Kubernetes labels and control-plane specific
//! labels/annotations to ensure consistency across all resources created by the controller.

use std::collections::BTreeMap;

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/part-of`
pub const PART_OF_OPENSTACK: &str = "openstack";

/// Value for `app.kubernetes.io/managed-by` on resources owned by the control plane
pub const MANAGED_BY_CONTROL_PLANE: &str = "OpenStackControlPlane";

/// Value for `app.kubernetes.io/managed-by` on resources owned by the admin client
pub const MANAGED_BY_OPENSTACK_CLIENT: &str = "OpenStackClient";

/// Component value for the admin client pod
pub const COMPONENT_OPENSTACK_CLIENT: &str = "openstackclient";

// ============================================================================
// Control Plane Labels
// ============================================================================

/// Label naming the control plane that owns a child resource.
///
/// Used to find owned instances of multi-instance services that are no
/// longer declared in the templates.
pub const CONTROL_PLANE_LABEL: &str = "core.openstack.org/controlplane";

/// Label naming the logical service a child belongs to
pub const SERVICE_LABEL: &str = "core.openstack.org/service";

// ============================================================================
// Annotations
// ============================================================================

/// Annotation carrying the drift hash of the spec last written to a child
pub const SPEC_HASH_ANNOTATION: &str = "core.openstack.org/spec-hash";

/// Issuer annotation read by service operators for leaf certificate duration
pub const CERT_DURATION_ANNOTATION: &str = "cert-duration";

/// Issuer annotation read by service operators for leaf certificate renewal
pub const CERT_RENEW_BEFORE_ANNOTATION: &str = "cert-renew-before";

// ============================================================================
// Root CA Issuer Labels
// ============================================================================

/// Label designating the issuer for public endpoints
pub const ROOTCA_PUBLIC_ISSUER_LABEL: &str = "osp-rootca-issuer-public";

/// Label designating the issuer for internal endpoints
pub const ROOTCA_INTERNAL_ISSUER_LABEL: &str = "osp-rootca-issuer-internal";

/// Label designating the issuer for libvirt
pub const ROOTCA_LIBVIRT_ISSUER_LABEL: &str = "osp-rootca-issuer-libvirt";

/// Label designating the issuer for OVN
pub const ROOTCA_OVN_ISSUER_LABEL: &str = "osp-rootca-issuer-ovn";

/// Labels placed on every child of a control plane.
#[must_use]
pub fn child_labels(control_plane: &str, service: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_PART_OF.to_string(), PART_OF_OPENSTACK.to_string()),
        (
            K8S_MANAGED_BY.to_string(),
            MANAGED_BY_CONTROL_PLANE.to_string(),
        ),
        (CONTROL_PLANE_LABEL.to_string(), control_plane.to_string()),
        (SERVICE_LABEL.to_string(), service.to_string()),
    ])
}

/// Label selector matching every child a control plane created for a service.
#[must_use]
pub fn child_selector(control_plane: &str, service: &str) -> String {
    format!("{CONTROL_PLANE_LABEL}={control_plane},{SERVICE_LABEL}={service}")
}
