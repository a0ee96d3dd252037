// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `reservation.rs`

#[cfg(test)]
mod tests {
    use super::super::{acquire, holder, release, ReservationHolder};
    use crate::constants::{RESERVATION_CONFIGMAP_NAME, RESERVATION_FINALIZER};
    use crate::crd::{OpenStackControlPlane, OpenStackControlPlaneSpec};
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;
    use kube::Client;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONFIGMAPS: &str = "/api/v1/namespaces/openstack/configmaps";

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

    fn control_plane(name: &str, uid: &str) -> OpenStackControlPlane {
        let mut cp = OpenStackControlPlane::new(name, OpenStackControlPlaneSpec::default());
        cp.metadata.namespace = Some("openstack".to_string());
        cp.metadata.uid = Some(uid.to_string());
        cp
    }

    fn reservation(name: &str, uid: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": RESERVATION_CONFIGMAP_NAME,
                "namespace": "openstack",
                "finalizers": [RESERVATION_FINALIZER]
            },
            "data": {"owner-name": name, "owner-uid": uid}
        })
    }

    #[test]
    fn test_holder_requires_name_and_uid() {
        let cm: ConfigMap = serde_json::from_value(reservation("openstack", "uid-1")).expect("cm");
        assert_eq!(
            holder(&cm),
            Some(ReservationHolder {
                name: "openstack".to_string(),
                uid: "uid-1".to_string(),
            })
        );

        let partial = ConfigMap {
            metadata: ObjectMeta::default(),
            data: Some(BTreeMap::from([("owner-name".to_string(), "openstack".to_string())])),
            ..Default::default()
        };
        assert_eq!(holder(&partial), None);
        assert_eq!(holder(&ConfigMap::default()), None);
    }

    #[tokio::test]
    async fn test_acquire_creates_reservation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{CONFIGMAPS}/{RESERVATION_CONFIGMAP_NAME}")))
            .respond_with(not_found())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(CONFIGMAPS))
            .respond_with(ResponseTemplate::new(201).set_body_json(reservation("openstack", "uid-1")))
            .expect(1)
            .mount(&server)
            .await;

        acquire(&mock_client(&server), &control_plane("openstack", "uid-1"))
            .await
            .expect("reservation taken");

        let requests = server.received_requests().await.expect("recorded");
        let created: Value = serde_json::from_slice(&requests[1].body).expect("json body");
        assert_eq!(created["data"]["owner-uid"], json!("uid-1"));
        assert_eq!(created["metadata"]["finalizers"], json!([RESERVATION_FINALIZER]));
    }

    #[tokio::test]
    async fn test_acquire_held_by_self_is_noop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{CONFIGMAPS}/{RESERVATION_CONFIGMAP_NAME}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(reservation("openstack", "uid-1")))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        acquire(&mock_client(&server), &control_plane("openstack", "uid-1"))
            .await
            .expect("already held");
    }

    #[tokio::test]
    async fn test_acquire_held_by_other_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{CONFIGMAPS}/{RESERVATION_CONFIGMAP_NAME}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(reservation("first", "uid-0")))
            .mount(&server)
            .await;

        let err = acquire(&mock_client(&server), &control_plane("second", "uid-2"))
            .await
            .expect_err("reserved by another control plane");
        assert!(err.to_string().contains("reserved by OpenStackControlPlane first"));
    }

    #[tokio::test]
    async fn test_release_leaves_foreign_reservation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{CONFIGMAPS}/{RESERVATION_CONFIGMAP_NAME}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(reservation("first", "uid-0")))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        release(&mock_client(&server), &control_plane("second", "uid-2"))
            .await
            .expect("nothing to release");
    }

    #[tokio::test]
    async fn test_release_drops_finalizer_then_deletes() {
        let server = MockServer::start().await;
        let item = format!("{CONFIGMAPS}/{RESERVATION_CONFIGMAP_NAME}");
        Mock::given(method("GET"))
            .and(path(item.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(reservation("openstack", "uid-1")))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(item.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(reservation("openstack", "uid-1")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(item))
            .respond_with(ResponseTemplate::new(200).set_body_json(reservation("openstack", "uid-1")))
            .expect(1)
            .mount(&server)
            .await;

        release(&mock_client(&server), &control_plane("openstack", "uid-1"))
            .await
            .expect("released");

        let requests = server.received_requests().await.expect("recorded");
        let methods: Vec<_> = requests.iter().map(|r| r.method.to_string()).collect();
        assert_eq!(methods, vec!["GET", "PATCH", "DELETE"]);
    }
}
