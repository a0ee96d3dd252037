// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `controller.rs`

#[cfg(test)]
mod tests {
    use super::super::{backoff_key, error_policy, ReconcileError};
    use crate::config::Settings;
    use crate::context::{Context, Stores};
    use crate::crd::{OpenStackClient, OpenStackClientSpec, OpenStackControlPlane};
    use kube::runtime::controller::Action;
    use kube::runtime::reflector;
    use kube::Client;
    use std::sync::Arc;

    fn context() -> Arc<Context> {
        let config = kube::Config::new("http://127.0.0.1:1".parse().expect("valid uri"));
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

    fn control_plane() -> Arc<OpenStackControlPlane> {
        let mut cp = OpenStackControlPlane::new("openstack", Default::default());
        cp.metadata.namespace = Some("openstack".to_string());
        Arc::new(cp)
    }

    fn failure() -> ReconcileError {
        ReconcileError::from(anyhow::anyhow!("API server unavailable"))
    }

    #[test]
    fn test_backoff_key_includes_kind() {
        let mut client = OpenStackClient::new("openstackclient", OpenStackClientSpec::default());
        client.metadata.namespace = Some("openstack".to_string());

        assert_eq!(
            backoff_key(control_plane().as_ref()),
            "OpenStackControlPlane/openstack/openstack"
        );
        assert_eq!(
            backoff_key(&client),
            "OpenStackClient/openstack/openstackclient"
        );
    }

    #[tokio::test]
    async fn test_error_policy_backs_off_per_object() {
        let ctx = context();
        let cp = control_plane();

        let first = error_policy(cp.clone(), &failure(), ctx.clone());
        assert_eq!(ctx.backoff.failures(&backoff_key(cp.as_ref())), 1);
        let second = error_policy(cp.clone(), &failure(), ctx.clone());
        assert_eq!(ctx.backoff.failures(&backoff_key(cp.as_ref())), 2);

        assert_ne!(first, Action::await_change());
        assert_ne!(first, second);

        ctx.backoff.reset(&backoff_key(cp.as_ref()));
        assert_eq!(ctx.backoff.failures(&backoff_key(cp.as_ref())), 0);
    }
}
