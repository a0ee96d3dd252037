// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `webhook.rs`

#[cfg(test)]
mod tests {
    use super::super::{review, SINGLETON_MESSAGE};
    use crate::constants::RESERVATION_CONFIGMAP_NAME;
    use crate::crd::OpenStackControlPlane;
    use kube::core::admission::{AdmissionRequest, AdmissionReview};
    use kube::Client;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONTROL_PLANES: &str =
        "/apis/core.openstack.org/v1beta1/namespaces/openstack/openstackcontrolplanes";

    fn mock_client(server: &MockServer) -> Client {
        let config = kube::Config::new(server.uri().parse().expect("valid uri"));
        Client::try_from(config).expect("client")
    }

    fn not_found() -> ResponseTemplate {
        ResponseTemplate::new(404).set_body_json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": "not found",
            "reason": "NotFound",
            "code": 404
        }))
    }

    fn control_plane(name: &str, uid: &str, spec: Value) -> Value {
        json!({
            "apiVersion": "core.openstack.org/v1beta1",
            "kind": "OpenStackControlPlane",
            "metadata": {"name": name, "namespace": "openstack", "uid": uid},
            "spec": spec
        })
    }

    fn minimal_spec() -> Value {
        json!({
            "secret": "osp-secret",
            "galera": {"enabled": true},
            "rabbitmq": {"enabled": true},
            "memcached": {"enabled": true},
            "keystone": {"enabled": true}
        })
    }

    fn request(operation: &str, object: Option<Value>) -> AdmissionRequest<OpenStackControlPlane> {
        let review: AdmissionReview<OpenStackControlPlane> = serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "review-1",
                "kind": {"group": "core.openstack.org", "version": "v1beta1", "kind": "OpenStackControlPlane"},
                "resource": {"group": "core.openstack.org", "version": "v1beta1", "resource": "openstackcontrolplanes"},
                "name": "openstack",
                "namespace": "openstack",
                "operation": operation,
                "userInfo": {},
                "object": object,
                "oldObject": null,
                "dryRun": false
            }
        }))
        .expect("valid review");
        review.try_into().expect("request present")
    }

    async fn mount_list(server: &MockServer, items: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(CONTROL_PLANES))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "core.openstack.org/v1beta1",
                "kind": "OpenStackControlPlaneList",
                "metadata": {},
                "items": items
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_delete_is_always_allowed() {
        let server = MockServer::start().await;
        let req = request("DELETE", None);

        let response = review(&mock_client(&server), &req).await;

        assert!(response.allowed);
        assert!(server.received_requests().await.expect("recorded").is_empty());
    }

    #[tokio::test]
    async fn test_create_allowed_in_empty_namespace() {
        let server = MockServer::start().await;
        mount_list(&server, vec![]).await;
        Mock::given(method("GET"))
            .and(path(format!(
                "/api/v1/namespaces/openstack/configmaps/{RESERVATION_CONFIGMAP_NAME}"
            )))
            .respond_with(not_found())
            .mount(&server)
            .await;
        let req = request("CREATE", Some(control_plane("openstack", "uid-1", minimal_spec())));

        let response = review(&mock_client(&server), &req).await;

        assert!(response.allowed);
    }

    #[tokio::test]
    async fn test_second_control_plane_denied() {
        let server = MockServer::start().await;
        mount_list(&server, vec![control_plane("first", "uid-0", minimal_spec())]).await;
        let req = request("CREATE", Some(control_plane("openstack", "uid-1", minimal_spec())));

        let response = review(&mock_client(&server), &req).await;

        assert!(!response.allowed);
        assert_eq!(response.result.message, SINGLETON_MESSAGE);
    }

    #[tokio::test]
    async fn test_reserved_namespace_denied() {
        let server = MockServer::start().await;
        mount_list(&server, vec![]).await;
        Mock::given(method("GET"))
            .and(path(format!(
                "/api/v1/namespaces/openstack/configmaps/{RESERVATION_CONFIGMAP_NAME}"
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": RESERVATION_CONFIGMAP_NAME, "namespace": "openstack"},
                "data": {"owner-name": "first", "owner-uid": "uid-0"}
            })))
            .mount(&server)
            .await;
        let req = request("CREATE", Some(control_plane("openstack", "uid-1", minimal_spec())));

        let response = review(&mock_client(&server), &req).await;

        assert!(!response.allowed);
        assert_eq!(
            response.result.message,
            "namespace openstack is reserved by OpenStackControlPlane first (uid-0)"
        );
    }

    #[tokio::test]
    async fn test_update_runs_spec_rules_only() {
        let server = MockServer::start().await;
        let spec = json!({"secret": "osp-secret", "keystone": {"enabled": true}});
        let req = request("UPDATE", Some(control_plane("openstack", "uid-1", spec)));

        let response = review(&mock_client(&server), &req).await;

        assert!(!response.allowed);
        assert!(response
            .result
            .message
            .contains("Keystone requires these services to be enabled: Galera, Memcached, RabbitMQ."));
        assert!(server.received_requests().await.expect("recorded").is_empty());
    }
}
