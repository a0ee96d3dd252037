// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Admin client resource builders.
//!
//! Pure functions producing the `ServiceAccount`, `Role`, `RoleBinding` and
//! `Pod` of one `OpenStackClient`.

use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMapVolumeSource, Container, EnvVar, KeyToPath, Pod, PodSpec,
    SecretVolumeSource, SecurityContext, ServiceAccount, Toleration, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::constants::{
    CA_BUNDLE_KEY, CA_BUNDLE_MOUNT_PATH, CLIENT_TOLERATION_SECONDS, CLOUD_ADMIN_HOME,
    CLOUD_ADMIN_UID, METRIC_STORAGE_NAME, OPENSTACK_CLIENT_NAME, OPENSTACK_CONFIG_MOUNT_PATH,
    PROMETHEUS_PORT,
};
use crate::crd::OpenStackClient;
use crate::labels::{
    COMPONENT_OPENSTACK_CLIENT, K8S_COMPONENT, K8S_INSTANCE, K8S_MANAGED_BY, K8S_PART_OF,
    MANAGED_BY_OPENSTACK_CLIENT, PART_OF_OPENSTACK,
};

/// Environment variable carrying the digest of every mounted input
pub const CONFIG_HASH_ENV: &str = "CONFIG_HASH";

const CONTAINER_NAME: &str = "openstackclient";
const VOLUME_CONFIG: &str = "openstack-config";
const VOLUME_CONFIG_SECRET: &str = "openstack-config-secret";
const VOLUME_CA_BUNDLE: &str = "combined-ca-bundle";

const CLOUDS_YAML: &str = "clouds.yaml";
const SECURE_YAML: &str = "secure.yaml";
const CLOUDRC: &str = "cloudrc";

/// Name shared by the client's `ServiceAccount`, `Role` and `RoleBinding`.
#[must_use]
pub fn rbac_resource_name(client: &OpenStackClient) -> String {
    format!("{OPENSTACK_CLIENT_NAME}-{}", client.name_any())
}

/// Labels placed on every object created for `client`.
#[must_use]
pub fn build_labels(client: &OpenStackClient) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_COMPONENT.to_string(), COMPONENT_OPENSTACK_CLIENT.to_string()),
        (K8S_INSTANCE.to_string(), client.name_any()),
        (
            K8S_MANAGED_BY.to_string(),
            MANAGED_BY_OPENSTACK_CLIENT.to_string(),
        ),
        (K8S_PART_OF.to_string(), PART_OF_OPENSTACK.to_string()),
    ])
}

fn object_meta(client: &OpenStackClient, name: String, owner: &OwnerReference) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: client.namespace(),
        labels: Some(build_labels(client)),
        owner_references: Some(vec![owner.clone()]),
        ..Default::default()
    }
}

#[must_use]
pub fn build_service_account(client: &OpenStackClient, owner: &OwnerReference) -> ServiceAccount {
    ServiceAccount {
        metadata: object_meta(client, rbac_resource_name(client), owner),
        ..Default::default()
    }
}

/// Role letting the client pod run as its fixed uid under the `anyuid` SCC.
#[must_use]
pub fn build_role(client: &OpenStackClient, owner: &OwnerReference) -> Role {
    Role {
        metadata: object_meta(client, rbac_resource_name(client), owner),
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec!["security.openshift.io".to_string()]),
                resource_names: Some(vec!["anyuid".to_string()]),
                resources: Some(vec!["securitycontextconstraints".to_string()]),
                verbs: vec!["use".to_string()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["pods".to_string()]),
                verbs: vec![
                    "create".to_string(),
                    "get".to_string(),
                    "list".to_string(),
                    "watch".to_string(),
                    "update".to_string(),
                    "patch".to_string(),
                    "delete".to_string(),
                ],
                ..Default::default()
            },
        ]),
    }
}

#[must_use]
pub fn build_role_binding(client: &OpenStackClient, owner: &OwnerReference) -> RoleBinding {
    let name = rbac_resource_name(client);
    RoleBinding {
        metadata: object_meta(client, name.clone(), owner),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: name.clone(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name,
            namespace: client.namespace(),
            ..Default::default()
        }]),
    }
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn build_volumes(client: &OpenStackClient) -> Vec<Volume> {
    let mut volumes = vec![
        Volume {
            name: VOLUME_CONFIG.into(),
            config_map: Some(ConfigMapVolumeSource {
                name: client.spec.open_stack_config_map.clone(),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: VOLUME_CONFIG_SECRET.into(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(client.spec.open_stack_config_secret.clone()),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];

    if let Some(bundle) = ca_bundle_secret(client) {
        volumes.push(Volume {
            name: VOLUME_CA_BUNDLE.into(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(bundle.to_string()),
                default_mode: Some(0o444),
                items: Some(vec![KeyToPath {
                    key: CA_BUNDLE_KEY.to_string(),
                    path: CA_BUNDLE_KEY.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    volumes
}

fn build_volume_mounts(client: &OpenStackClient) -> Vec<VolumeMount> {
    let mut mounts = vec![
        VolumeMount {
            name: VOLUME_CONFIG.into(),
            mount_path: format!("{OPENSTACK_CONFIG_MOUNT_PATH}/{CLOUDS_YAML}"),
            sub_path: Some(CLOUDS_YAML.into()),
            ..Default::default()
        },
        VolumeMount {
            name: VOLUME_CONFIG_SECRET.into(),
            mount_path: format!("{OPENSTACK_CONFIG_MOUNT_PATH}/{SECURE_YAML}"),
            sub_path: Some(SECURE_YAML.into()),
            ..Default::default()
        },
        VolumeMount {
            name: VOLUME_CONFIG_SECRET.into(),
            mount_path: format!("{CLOUD_ADMIN_HOME}/{CLOUDRC}"),
            sub_path: Some(CLOUDRC.into()),
            ..Default::default()
        },
    ];

    if ca_bundle_secret(client).is_some() {
        mounts.push(VolumeMount {
            name: VOLUME_CA_BUNDLE.into(),
            mount_path: format!("{CA_BUNDLE_MOUNT_PATH}/{CA_BUNDLE_KEY}"),
            sub_path: Some(CA_BUNDLE_KEY.into()),
            read_only: Some(true),
            ..Default::default()
        });
    }

    mounts
}

fn ca_bundle_secret(client: &OpenStackClient) -> Option<&str> {
    client
        .spec
        .ca_bundle_secret_name
        .as_deref()
        .filter(|name| !name.is_empty())
}

fn toleration(key: &str) -> Toleration {
    Toleration {
        key: Some(key.to_string()),
        operator: Some("Exists".to_string()),
        effect: Some("NoExecute".to_string()),
        toleration_seconds: Some(CLIENT_TOLERATION_SECONDS),
        ..Default::default()
    }
}

/// The idle admin pod, named after the `OpenStackClient`.
#[must_use]
pub fn build_pod(
    client: &OpenStackClient,
    image: &str,
    config_hash: &str,
    owner: &OwnerReference,
) -> Pod {
    let namespace = client.namespace().unwrap_or_default();

    let container = Container {
        name: CONTAINER_NAME.into(),
        image: Some(image.to_string()),
        command: Some(vec!["/bin/sleep".into()]),
        args: Some(vec!["infinity".into()]),
        env: Some(vec![
            env("OS_CLOUD", "default"),
            env(CONFIG_HASH_ENV, config_hash),
            env(
                "PROMETHEUS_HOST",
                format!("{METRIC_STORAGE_NAME}-prometheus.{namespace}.svc"),
            ),
            env("PROMETHEUS_PORT", PROMETHEUS_PORT.to_string()),
        ]),
        volume_mounts: Some(build_volume_mounts(client)),
        security_context: Some(SecurityContext {
            run_as_user: Some(CLOUD_ADMIN_UID),
            run_as_group: Some(CLOUD_ADMIN_UID),
            run_as_non_root: Some(true),
            allow_privilege_escalation: Some(false),
            capabilities: Some(Capabilities {
                drop: Some(vec!["ALL".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    Pod {
        metadata: object_meta(client, client.name_any(), owner),
        spec: Some(PodSpec {
            termination_grace_period_seconds: Some(0),
            service_account_name: Some(rbac_resource_name(client)),
            volumes: Some(build_volumes(client)),
            containers: vec![container],
            tolerations: Some(vec![
                toleration("node.kubernetes.io/not-ready"),
                toleration("node.kubernetes.io/unreachable"),
            ]),
            node_selector: client.spec.node_selector.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Image and `CONFIG_HASH` of the client container in a live pod.
#[must_use]
pub fn pod_fingerprint(pod: &Pod) -> (Option<&str>, Option<&str>) {
    let container = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.containers.iter().find(|c| c.name == CONTAINER_NAME));
    let image = container.and_then(|c| c.image.as_deref());
    let config_hash = container
        .and_then(|c| c.env.as_ref())
        .and_then(|env| env.iter().find(|e| e.name == CONFIG_HASH_ENV))
        .and_then(|e| e.value.as_deref());
    (image, config_hash)
}

#[cfg(test)]
#[path = "pod_tests.rs"]
mod pod_tests;
