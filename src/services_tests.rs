// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `services.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{OpenStackControlPlaneSpec, ServiceTemplate};
    use crate::services::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn spec(value: serde_json::Value) -> OpenStackControlPlaneSpec {
        serde_json::from_value(value).expect("valid spec")
    }

    #[test]
    fn test_descriptor_table_matches_kinds() {
        for kind in ServiceKind::ALL {
            assert_eq!(kind.descriptor().kind, kind);
        }
    }

    #[test]
    fn test_names_and_conditions_unique() {
        let names: HashSet<_> = ServiceKind::ALL.iter().map(|k| k.name()).collect();
        let conditions: HashSet<_> = ServiceKind::ALL
            .iter()
            .map(|k| k.descriptor().condition_type)
            .collect();

        assert_eq!(names.len(), ServiceKind::ALL.len());
        assert_eq!(conditions.len(), ServiceKind::ALL.len());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(ServiceKind::from_name("keystone"), Some(ServiceKind::Keystone));
        assert_eq!(ServiceKind::from_name("rabbitmq"), Some(ServiceKind::RabbitMq));
        assert_eq!(ServiceKind::from_name("ca"), None);
        assert_eq!(ServiceKind::Ovn.to_string(), "ovn");
    }

    #[test]
    fn test_dependencies_declared_earlier() {
        for kind in ServiceKind::ALL {
            for dep in kind.descriptor().dependencies {
                assert!(dep < &kind, "{kind} depends on later service {dep}");
            }
        }
    }

    #[test]
    fn test_infrastructure_needs_no_ca() {
        assert!(!ServiceKind::Galera.descriptor().needs_ca);
        assert!(!ServiceKind::Keystone.descriptor().needs_ca);
        assert!(ServiceKind::Nova.descriptor().needs_ca);
    }

    #[test]
    fn test_disabled_service_has_no_instances() {
        let spec = spec(json!({"secret": "osp-secret"}));

        assert!(ServiceKind::Keystone.instances(&spec).is_empty());
        assert!(ServiceKind::Galera.instances(&spec).is_empty());
    }

    #[test]
    fn test_single_instance_child_name() {
        let spec = spec(json!({"secret": "osp-secret", "ovn": {"enabled": true}}));

        let instances = ServiceKind::Ovn.instances(&spec);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].0, "ovnnorthd");
    }

    #[test]
    fn test_multi_instance_default_when_no_templates() {
        let spec = spec(json!({"secret": "osp-secret", "galera": {"enabled": true}}));

        let instances = ServiceKind::Galera.instances(&spec);
        assert_eq!(
            instances,
            vec![("openstack".to_string(), ServiceTemplate::default())]
        );
    }

    #[test]
    fn test_multi_instance_declared_templates() {
        let spec = spec(json!({
            "secret": "osp-secret",
            "galera": {"enabled": true, "templates": {"openstack": {}, "openstack-cell1": {}}}
        }));

        let names: Vec<_> = ServiceKind::Galera
            .instances(&spec)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["openstack", "openstack-cell1"]);
    }

    #[test]
    fn test_apply_defaults_only_for_enabled_empty_sections() {
        let mut spec = spec(json!({
            "secret": "osp-secret",
            "galera": {"enabled": true},
            "rabbitmq": {"enabled": true, "templates": {"rabbitmq-cell1": {}}},
            "memcached": {"enabled": false}
        }));

        apply_defaults(&mut spec);

        assert!(spec.galera.templates.contains_key("openstack"));
        assert!(!spec.rabbitmq.templates.contains_key("rabbitmq"));
        assert!(spec.memcached.templates.is_empty());
    }

    #[test]
    fn test_api_resource() {
        let resource = ServiceKind::Keystone.api_resource();

        assert_eq!(resource.group, "keystone.openstack.org");
        assert_eq!(resource.version, "v1beta1");
        assert_eq!(resource.kind, "KeystoneAPI");
        assert_eq!(resource.plural, "keystoneapis");
        assert_eq!(resource.api_version, "keystone.openstack.org/v1beta1");
    }
}
