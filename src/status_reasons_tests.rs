// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `status_reasons` module

#[cfg(test)]
mod tests {
    use crate::status_reasons::*;

    #[test]
    fn test_shared_condition_types() {
        assert_eq!(CONDITION_TYPE_READY, "Ready");
        assert_eq!(CONDITION_TYPE_CA_READY, "OpenStackControlPlaneCAReady");
        assert_eq!(CONDITION_TYPE_CLIENT_READY, "OpenStackControlPlaneClientReady");
    }

    #[test]
    fn test_service_messages() {
        assert_eq!(
            service_ready_message("KeystoneAPI"),
            "OpenStackControlPlane KeystoneAPI completed"
        );
        assert_eq!(
            service_running_message("MariaDB"),
            "OpenStackControlPlane MariaDB in progress"
        );
        assert_eq!(
            service_error_message("Nova", "boom"),
            "OpenStackControlPlane Nova error occurred boom"
        );
    }

    #[test]
    fn test_waiting_message_lists_dependencies() {
        assert_eq!(
            service_waiting_message("Nova", &["keystone", "placement"]),
            "OpenStackControlPlane Nova waiting for keystone, placement"
        );
    }

    #[test]
    fn test_lookup_messages() {
        assert_eq!(
            topology_not_found_message("openstack", "zones"),
            "Topology openstack/zones not found"
        );
        assert_eq!(
            input_waiting_message("Secret", "osp-secret"),
            "waiting for Secret osp-secret"
        );
        assert_eq!(
            ca_issuer_not_found_message("internal", "my-issuer"),
            "internal CA issuer my-issuer not found"
        );
        assert_eq!(
            client_error_message("denied"),
            "OpenStack Client error occurred denied"
        );
    }
}
