// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `finalizers.rs`

#[cfg(test)]
mod tests {
    use crate::constants::CONTROL_PLANE_FINALIZER;
    use crate::crd::{OpenStackControlPlane, OpenStackControlPlaneSpec};
    use crate::reconcilers::finalizers::{ensure_finalizer, has_finalizer, remove_finalizer};
    use kube::api::ObjectMeta;
    use kube::Client;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_NAMESPACE: &str = "openstack";
    const TEST_NAME: &str = "openstack";
    const RESOURCE_PATH: &str =
        "/apis/core.openstack.org/v1beta1/namespaces/openstack/openstackcontrolplanes/openstack";

    fn control_plane(finalizers: Option<Vec<String>>) -> OpenStackControlPlane {
        OpenStackControlPlane {
            metadata: ObjectMeta {
                name: Some(TEST_NAME.to_string()),
                namespace: Some(TEST_NAMESPACE.to_string()),
                finalizers,
                generation: Some(1),
                ..Default::default()
            },
            spec: OpenStackControlPlaneSpec::default(),
            status: None,
        }
    }

    fn mock_client(server: &MockServer) -> Client {
        let config = kube::Config::new(server.uri().parse().expect("valid uri"));
        Client::try_from(config).expect("client")
    }

    #[test]
    fn test_has_finalizer() {
        assert!(!has_finalizer(&control_plane(None), CONTROL_PLANE_FINALIZER));
        assert!(!has_finalizer(
            &control_plane(Some(vec!["other/finalizer".to_string()])),
            CONTROL_PLANE_FINALIZER
        ));
        assert!(has_finalizer(
            &control_plane(Some(vec![CONTROL_PLANE_FINALIZER.to_string()])),
            CONTROL_PLANE_FINALIZER
        ));
    }

    #[tokio::test]
    async fn test_ensure_finalizer_patches_when_missing() {
        let server = MockServer::start().await;
        let cp = control_plane(Some(vec!["other/finalizer".to_string()]));
        let patched = control_plane(Some(vec![
            "other/finalizer".to_string(),
            CONTROL_PLANE_FINALIZER.to_string(),
        ]));

        Mock::given(method("PATCH"))
            .and(path(RESOURCE_PATH))
            .and(body_json(json!({
                "metadata": {"finalizers": ["other/finalizer", CONTROL_PLANE_FINALIZER]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&patched))
            .expect(1)
            .mount(&server)
            .await;

        ensure_finalizer(&mock_client(&server), &cp, CONTROL_PLANE_FINALIZER)
            .await
            .expect("finalizer added");
    }

    #[tokio::test]
    async fn test_ensure_finalizer_noop_when_present() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let cp = control_plane(Some(vec![CONTROL_PLANE_FINALIZER.to_string()]));
        ensure_finalizer(&mock_client(&server), &cp, CONTROL_PLANE_FINALIZER)
            .await
            .expect("no call expected");
    }

    #[tokio::test]
    async fn test_remove_finalizer_keeps_others() {
        let server = MockServer::start().await;
        let cp = control_plane(Some(vec![
            CONTROL_PLANE_FINALIZER.to_string(),
            "other/finalizer".to_string(),
        ]));

        Mock::given(method("PATCH"))
            .and(path(RESOURCE_PATH))
            .and(body_json(json!({
                "metadata": {"finalizers": ["other/finalizer"]}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(control_plane(Some(vec!["other/finalizer".to_string()]))),
            )
            .expect(1)
            .mount(&server)
            .await;

        remove_finalizer(&mock_client(&server), &cp, CONTROL_PLANE_FINALIZER)
            .await
            .expect("finalizer removed");
    }
}
