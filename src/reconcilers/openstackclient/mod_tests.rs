// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `mod.rs`

#[cfg(test)]
mod tests {
    use super::super::pod::{build_pod, build_role, build_role_binding, build_service_account};
    use super::super::{configmap_digest, reconcile_openstackclient, INPUT_HASH};
    use crate::config::Settings;
    use crate::context::{Context, Stores};
    use crate::crd::{OpenStackClient, OpenStackClientSpec};
    use crate::images::IMAGE_DEFAULTS;
    use crate::reconcilers::resources::controller_reference;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::ByteString;
    use kube::runtime::controller::Action;
    use kube::runtime::reflector;
    use kube::Client;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CORE: &str = "/api/v1/namespaces/openstack";
    const RBAC: &str = "/apis/rbac.authorization.k8s.io/v1/namespaces/openstack";
    const KEYSTONE: &str =
        "/apis/keystone.openstack.org/v1beta1/namespaces/openstack/keystoneapis/keystone";
    const CLIENT_STATUS: &str =
        "/apis/client.openstack.org/v1beta1/namespaces/openstack/openstackclients/openstackclient/status";

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

    fn openstack_client() -> OpenStackClient {
        let mut client = OpenStackClient::new("openstackclient", OpenStackClientSpec::default());
        client.metadata.namespace = Some("openstack".to_string());
        client.metadata.uid = Some("client-uid".to_string());
        client.metadata.generation = Some(2);
        client
    }

    const RBAC_NAME: &str = "openstackclient-openstackclient";

    /// Expect `body` to be created in `collection` once.
    async fn mount_created(server: &MockServer, collection: String, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("{collection}/{RBAC_NAME}")))
            .respond_with(not_found())
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path(collection))
            .respond_with(ResponseTemplate::new(201).set_body_json(body))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_rbac(server: &MockServer, client: &OpenStackClient) {
        let owner = controller_reference(client).expect("owner");
        mount_created(
            server,
            format!("{CORE}/serviceaccounts"),
            serde_json::to_value(build_service_account(client, &owner)).expect("sa"),
        )
        .await;
        mount_created(
            server,
            format!("{RBAC}/roles"),
            serde_json::to_value(build_role(client, &owner)).expect("role"),
        )
        .await;
        mount_created(
            server,
            format!("{RBAC}/rolebindings"),
            serde_json::to_value(build_role_binding(client, &owner)).expect("binding"),
        )
        .await;
    }

    async fn mount_keystone_ready(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(KEYSTONE))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "keystone.openstack.org/v1beta1",
                "kind": "KeystoneAPI",
                "metadata": {"name": "keystone", "namespace": "openstack", "generation": 1},
                "spec": {},
                "status": {
                    "observedGeneration": 1,
                    "conditions": [{"type": "Ready", "status": "True"}]
                }
            })))
            .mount(server)
            .await;
    }

    async fn mount_config_map(server: &MockServer, clouds: &str) {
        Mock::given(method("GET"))
            .and(path(format!("{CORE}/configmaps/openstack-config")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": "openstack-config"},
                "data": {"clouds.yaml": clouds}
            })))
            .mount(server)
            .await;
    }

    async fn mount_config_secret(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(format!("{CORE}/secrets/openstack-config-secret")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": {"name": "openstack-config-secret"},
                "data": {"secure.yaml": "Y2xvdWRzOiB7fQ=="}
            })))
            .mount(server)
            .await;
    }

    async fn expect_no_pod_created(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(format!("{CORE}/pods")))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(server)
            .await;
    }

    async fn mount_status(server: &MockServer, client: &OpenStackClient) {
        Mock::given(method("PATCH"))
            .and(path(CLIENT_STATUS))
            .respond_with(ResponseTemplate::new(200).set_body_json(client))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn status_patch(server: &MockServer) -> Value {
        let requests = server.received_requests().await.expect("recorded");
        let patch = requests
            .iter()
            .find(|r| r.url.path() == CLIENT_STATUS)
            .expect("status patch");
        let body: Value = serde_json::from_slice(&patch.body).expect("json body");
        body["status"].clone()
    }

    fn condition<'a>(status: &'a Value, condition_type: &str) -> &'a Value {
        status["conditions"]
            .as_array()
            .and_then(|c| c.iter().find(|c| c["type"] == json!(condition_type)))
            .expect("condition present")
    }

    #[test]
    fn test_configmap_digest_covers_binary_data() {
        let text = ConfigMap {
            data: Some(BTreeMap::from([(
                "clouds.yaml".to_string(),
                "clouds: {}".to_string(),
            )])),
            ..Default::default()
        };
        let with_binary = ConfigMap {
            binary_data: Some(BTreeMap::from([(
                "extra".to_string(),
                ByteString(vec![1, 2, 3]),
            )])),
            ..text.clone()
        };
        assert_ne!(configmap_digest(&text), configmap_digest(&with_binary));
        assert_eq!(configmap_digest(&text), configmap_digest(&text.clone()));
    }

    #[tokio::test]
    async fn test_waits_for_keystone_after_rbac() {
        let server = MockServer::start().await;
        let client = openstack_client();
        mount_rbac(&server, &client).await;
        Mock::given(method("GET"))
            .and(path(KEYSTONE))
            .respond_with(not_found())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{CORE}/pods")))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(CLIENT_STATUS))
            .respond_with(ResponseTemplate::new(200).set_body_json(&client))
            .expect(1)
            .mount(&server)
            .await;

        let action = reconcile_openstackclient(context(&server), client)
            .await
            .expect("reconcile succeeds while waiting");
        assert_eq!(action, Action::requeue(Duration::from_secs(5)));

        let status = status_patch(&server).await;
        assert_eq!(status["observedGeneration"], json!(2));
        assert_eq!(condition(&status, "ServiceAccountReady")["status"], json!("True"));
        assert_eq!(condition(&status, "RoleReady")["status"], json!("True"));
        assert_eq!(condition(&status, "RoleBindingReady")["status"], json!("True"));

        let client_ready = condition(&status, "OpenStackClientReady");
        assert_eq!(client_ready["status"], json!("False"));
        assert_eq!(
            client_ready["message"],
            json!("OpenStack Client keystone API not yet ready")
        );
        assert_eq!(condition(&status, "Ready")["message"], client_ready["message"]);
    }

    #[tokio::test]
    async fn test_creates_pod_once_keystone_ready() {
        let server = MockServer::start().await;
        let client = openstack_client();
        mount_rbac(&server, &client).await;
        mount_keystone_ready(&server).await;
        mount_config_map(&server, "clouds: {}").await;
        mount_config_secret(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{CORE}/pods/openstackclient")))
            .respond_with(not_found())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{CORE}/pods")))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "openstackclient", "namespace": "openstack"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(CLIENT_STATUS))
            .respond_with(ResponseTemplate::new(200).set_body_json(&client))
            .expect(1)
            .mount(&server)
            .await;

        let action = reconcile_openstackclient(context(&server), client)
            .await
            .expect("client converged");
        assert_eq!(action, Action::requeue(Settings::default().ready_requeue));

        let status = status_patch(&server).await;
        assert_eq!(status["podName"], json!("openstackclient"));
        assert!(status["hashes"][INPUT_HASH].is_string());
        assert_eq!(condition(&status, "OpenStackClientReady")["status"], json!("True"));
        assert_eq!(condition(&status, "Ready")["status"], json!("True"));
    }

    #[tokio::test]
    async fn test_missing_config_map_blocks_pod() {
        let server = MockServer::start().await;
        let client = openstack_client();
        mount_rbac(&server, &client).await;
        mount_keystone_ready(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{CORE}/configmaps/openstack-config")))
            .respond_with(not_found())
            .mount(&server)
            .await;
        expect_no_pod_created(&server).await;
        mount_status(&server, &client).await;

        let action = reconcile_openstackclient(context(&server), client)
            .await
            .expect("reconcile succeeds while waiting");
        assert_eq!(action, Action::requeue(Duration::from_secs(10)));

        let status = status_patch(&server).await;
        let client_ready = condition(&status, "OpenStackClientReady");
        assert_eq!(client_ready["status"], json!("False"));
        assert_eq!(client_ready["reason"], json!("Requested"));
        assert_eq!(
            client_ready["message"],
            json!("waiting for configmap openstack-config")
        );
        assert!(status.get("podName").map_or(true, Value::is_null));
    }

    #[tokio::test]
    async fn test_missing_config_secret_blocks_pod() {
        let server = MockServer::start().await;
        let client = openstack_client();
        mount_rbac(&server, &client).await;
        mount_keystone_ready(&server).await;
        mount_config_map(&server, "clouds: {}").await;
        Mock::given(method("GET"))
            .and(path(format!("{CORE}/secrets/openstack-config-secret")))
            .respond_with(not_found())
            .mount(&server)
            .await;
        expect_no_pod_created(&server).await;
        mount_status(&server, &client).await;

        reconcile_openstackclient(context(&server), client)
            .await
            .expect("reconcile succeeds while waiting");

        let status = status_patch(&server).await;
        let client_ready = condition(&status, "OpenStackClientReady");
        assert_eq!(client_ready["status"], json!("False"));
        assert_eq!(client_ready["reason"], json!("Requested"));
        assert_eq!(
            client_ready["message"],
            json!("waiting for secret openstack-config-secret")
        );
        assert_eq!(condition(&status, "Ready")["status"], json!("False"));
    }

    #[tokio::test]
    async fn test_changed_inputs_replace_pod() {
        let server = MockServer::start().await;
        let client = openstack_client();
        let owner = controller_reference(&client).expect("owner");
        let live = build_pod(&client, IMAGE_DEFAULTS.client(), "stale-config-hash", &owner);
        mount_rbac(&server, &client).await;
        mount_keystone_ready(&server).await;
        mount_config_map(&server, "clouds: {openstack: {}}").await;
        mount_config_secret(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{CORE}/pods/openstackclient")))
            .respond_with(ResponseTemplate::new(200).set_body_json(&live))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{CORE}/pods/openstackclient")))
            .respond_with(ResponseTemplate::new(200).set_body_json(&live))
            .expect(1)
            .mount(&server)
            .await;
        expect_no_pod_created(&server).await;
        mount_status(&server, &client).await;

        let action = reconcile_openstackclient(context(&server), client)
            .await
            .expect("pod replacement started");
        assert_eq!(action, Action::requeue(Duration::from_secs(10)));

        let status = status_patch(&server).await;
        assert!(status.get("podName").map_or(true, Value::is_null));
        let client_ready = condition(&status, "OpenStackClientReady");
        assert_eq!(client_ready["status"], json!("False"));
        assert_eq!(client_ready["message"], json!("OpenStack Client pod recreating"));
    }

    #[tokio::test]
    async fn test_role_binding_recreation_holds_pod() {
        let server = MockServer::start().await;
        let client = openstack_client();
        let owner = controller_reference(&client).expect("owner");
        mount_created(
            &server,
            format!("{CORE}/serviceaccounts"),
            serde_json::to_value(build_service_account(&client, &owner)).expect("sa"),
        )
        .await;
        mount_created(
            &server,
            format!("{RBAC}/roles"),
            serde_json::to_value(build_role(&client, &owner)).expect("role"),
        )
        .await;

        let mut live = build_role_binding(&client, &owner);
        live.role_ref.name = "previous-role".to_string();
        let binding_path = format!("{RBAC}/rolebindings/{RBAC_NAME}");
        Mock::given(method("GET"))
            .and(path(binding_path.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(&live))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(binding_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(&live))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(KEYSTONE))
            .respond_with(not_found())
            .expect(0)
            .mount(&server)
            .await;
        expect_no_pod_created(&server).await;
        mount_status(&server, &client).await;

        let action = reconcile_openstackclient(context(&server), client)
            .await
            .expect("binding recreation requeues");
        assert_eq!(action, Action::requeue(Duration::from_secs(10)));

        let status = status_patch(&server).await;
        let binding = condition(&status, "RoleBindingReady");
        assert_eq!(binding["status"], json!("False"));
        assert_eq!(binding["message"], json!("Role Binding recreating"));
        assert_eq!(condition(&status, "Ready")["message"], binding["message"]);
    }

    /// Converge a client whose config secret shares the config map's name and
    /// return the input hash it persisted.
    async fn input_hash_with_shared_name(clouds: &str) -> String {
        let server = MockServer::start().await;
        let mut client = openstack_client();
        client.spec.open_stack_config_secret = "openstack-config".to_string();
        mount_rbac(&server, &client).await;
        mount_keystone_ready(&server).await;
        mount_config_map(&server, clouds).await;
        Mock::given(method("GET"))
            .and(path(format!("{CORE}/secrets/openstack-config")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": {"name": "openstack-config"},
                "data": {"secure.yaml": "Y2xvdWRzOiB7fQ=="}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{CORE}/pods/openstackclient")))
            .respond_with(not_found())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{CORE}/pods")))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "openstackclient", "namespace": "openstack"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_status(&server, &client).await;

        reconcile_openstackclient(context(&server), client)
            .await
            .expect("client converged");
        let status = status_patch(&server).await;
        status["hashes"][INPUT_HASH]
            .as_str()
            .expect("input hash")
            .to_string()
    }

    #[tokio::test]
    async fn test_config_map_change_tracked_when_secret_shares_name() {
        let before = input_hash_with_shared_name("clouds: {}").await;
        let after = input_hash_with_shared_name("clouds: {openstack: {}}").await;
        assert_ne!(before, after);
        assert_eq!(before, input_hash_with_shared_name("clouds: {}").await);
    }
}
