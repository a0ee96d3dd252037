// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `mod.rs`

#[cfg(test)]
mod tests {
    use super::super::reconcile_controlplane;
    use crate::config::Settings;
    use crate::constants::{CONTROL_PLANE_FINALIZER, RESERVATION_CONFIGMAP_NAME, RESERVATION_FINALIZER};
    use crate::context::{Context, Stores};
    use crate::crd::OpenStackControlPlane;
    use kube::api::ObjectMeta;
    use kube::runtime::controller::Action;
    use kube::runtime::reflector;
    use kube::Client;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONTROL_PLANES: &str =
        "/apis/core.openstack.org/v1beta1/namespaces/openstack/openstackcontrolplanes";
    const CONFIGMAPS: &str = "/api/v1/namespaces/openstack/configmaps";

    fn context(server: &MockServer) -> Arc<Context> {
        let config = kube::Config::new(server.uri().parse().expect("valid uri"));
        let client = Client::try_from(config).expect("client");
        let (control_planes, _writer) = reflector::store();
        let (clients, _writer) = reflector::store();
        Arc::new(Context::new(
            client,
            Stores {
                control_planes,
                clients,
            },
            Settings::default(),
        ))
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

    fn control_plane(deleting: bool) -> OpenStackControlPlane {
        OpenStackControlPlane {
            metadata: ObjectMeta {
                name: Some("openstack".to_string()),
                namespace: Some("openstack".to_string()),
                uid: Some("uid-1".to_string()),
                generation: Some(4),
                finalizers: Some(vec![CONTROL_PLANE_FINALIZER.to_string()]),
                deletion_timestamp: deleting.then(|| {
                    serde_json::from_value(json!("2026-01-01T00:00:00Z")).expect("timestamp")
                }),
                ..Default::default()
            },
            spec: serde_json::from_value(json!({"secret": "osp-secret"})).expect("valid spec"),
            status: None,
        }
    }

    fn reservation() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": RESERVATION_CONFIGMAP_NAME,
                "namespace": "openstack",
                "finalizers": [RESERVATION_FINALIZER]
            },
            "data": {"owner-name": "openstack", "owner-uid": "uid-1"}
        })
    }

    #[tokio::test]
    async fn test_deletion_releases_reservation_and_finalizer() {
        let server = MockServer::start().await;
        let reservation_path = format!("{CONFIGMAPS}/{RESERVATION_CONFIGMAP_NAME}");
        Mock::given(method("GET"))
            .and(path(reservation_path.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(reservation()))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(reservation_path.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(reservation()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(reservation_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(reservation()))
            .expect(1)
            .mount(&server)
            .await;
        let cp = control_plane(true);
        Mock::given(method("PATCH"))
            .and(path(format!("{CONTROL_PLANES}/openstack")))
            .respond_with(ResponseTemplate::new(200).set_body_json(&cp))
            .expect(1)
            .mount(&server)
            .await;

        let action = reconcile_controlplane(context(&server), cp)
            .await
            .expect("deletion handled");

        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn test_missing_secret_persists_status_and_requeues() {
        let server = MockServer::start().await;
        let cp = control_plane(false);
        Mock::given(method("GET"))
            .and(path(format!("{CONFIGMAPS}/{RESERVATION_CONFIGMAP_NAME}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(reservation()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/openstack/secrets/osp-secret"))
            .respond_with(not_found())
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(format!("{CONTROL_PLANES}/openstack/status")))
            .respond_with(ResponseTemplate::new(200).set_body_json(&cp))
            .expect(1)
            .mount(&server)
            .await;

        let action = reconcile_controlplane(context(&server), cp)
            .await
            .expect("reconcile succeeds while waiting");

        assert_eq!(action, Action::requeue(Duration::from_secs(5)));

        let requests = server.received_requests().await.expect("recorded");
        let patch = requests
            .iter()
            .find(|r| r.url.path().ends_with("/status"))
            .expect("status patch");
        let body: Value = serde_json::from_slice(&patch.body).expect("json body");
        let status = &body["status"];
        assert_eq!(status["observedGeneration"], json!(4));

        let conditions = status["conditions"].as_array().expect("conditions");
        let types: Vec<_> = conditions.iter().filter_map(|c| c["type"].as_str()).collect();
        assert_eq!(types.first(), Some(&"InputReady"));
        assert_eq!(types.last(), Some(&"Ready"));

        let ready = conditions.last().expect("ready");
        assert_eq!(ready["status"], json!("False"));
        assert_eq!(ready["message"], json!("waiting for secret osp-secret"));

        let ca = conditions
            .iter()
            .find(|c| c["type"] == json!("OpenStackControlPlaneCAReady"))
            .expect("ca condition");
        assert_eq!(ca["message"], json!("OpenStackControlPlane CAs waiting for inputs"));
    }

    #[tokio::test]
    async fn test_finalizer_failure_still_persists_status() {
        let server = MockServer::start().await;
        let mut cp = control_plane(false);
        cp.metadata.finalizers = None;
        cp.spec = serde_json::from_value(json!({
            "secret": "osp-secret",
            "keystone": {"enabled": true}
        }))
        .expect("valid spec");
        cp.status = Some(
            serde_json::from_value(json!({
                "observedGeneration": 3,
                "conditions": [
                    {
                        "type": "OpenStackControlPlaneKeystoneAPIReady",
                        "status": "True",
                        "reason": "Ready",
                        "message": "Setup complete",
                        "lastTransitionTime": "2026-01-01T00:00:00+00:00"
                    },
                    {
                        "type": "Ready",
                        "status": "True",
                        "reason": "Ready",
                        "message": "Setup complete",
                        "lastTransitionTime": "2026-01-01T00:00:00+00:00"
                    }
                ]
            }))
            .expect("valid status"),
        );
        Mock::given(method("PATCH"))
            .and(path(format!("{CONTROL_PLANES}/openstack")))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Failure",
                "message": "etcd unavailable",
                "reason": "InternalError",
                "code": 500
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(format!("{CONTROL_PLANES}/openstack/status")))
            .respond_with(ResponseTemplate::new(200).set_body_json(&cp))
            .expect(1)
            .mount(&server)
            .await;

        let result = reconcile_controlplane(context(&server), cp).await;
        assert!(result.is_err(), "finalizer error is returned");

        let requests = server.received_requests().await.expect("recorded");
        assert!(
            !requests.iter().any(|r| r.url.path().starts_with(CONFIGMAPS)),
            "reservation is not taken after a finalizer failure"
        );
        let patch = requests
            .iter()
            .find(|r| r.url.path().ends_with("/status"))
            .expect("status patch");
        let body: Value = serde_json::from_slice(&patch.body).expect("json body");
        let conditions = body["status"]["conditions"].as_array().expect("conditions");

        let input = conditions
            .iter()
            .find(|c| c["type"] == json!("InputReady"))
            .expect("input condition");
        assert_eq!(input["status"], json!("False"));
        assert_eq!(input["reason"], json!("Error"));

        let keystone = conditions
            .iter()
            .find(|c| c["type"] == json!("OpenStackControlPlaneKeystoneAPIReady"))
            .expect("service conditions survive a failure before the steps run");
        assert_eq!(keystone["status"], json!("Unknown"));
        assert!(conditions
            .iter()
            .any(|c| c["type"] == json!("OpenStackControlPlaneCAReady")));

        let ready = conditions.last().expect("ready");
        assert_eq!(ready["type"], json!("Ready"));
        assert_eq!(ready["status"], json!("False"));
        assert_eq!(ready["message"], input["message"]);
    }
}
