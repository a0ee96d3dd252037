// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Descriptor table of every service a control plane manages.
//!
//! Each [`ServiceKind`] maps to one [`ServiceDescriptor`] naming the child
//! resource kind, the condition it owns, the image it defaults to, the shared
//! infrastructure it consumes and the services it depends on. The orchestrator,
//! the admission validator and the image defaults all read this table instead
//! of matching on service names.

use kube::api::{ApiResource, GroupVersionKind};
use std::fmt;

use crate::constants::{
    API_VERSION, DEFAULT_DATABASE_INSTANCE, DEFAULT_MEMCACHED_INSTANCE, DEFAULT_RABBITMQ_CLUSTER,
};
use crate::crd::{MultiInstanceSection, OpenStackControlPlaneSpec, ServiceSection, ServiceTemplate};

/// Every managed service, in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKind {
    Galera,
    RabbitMq,
    Memcached,
    Keystone,
    Placement,
    Glance,
    Cinder,
    Ovn,
    Neutron,
    Nova,
    Heat,
    Horizon,
    Barbican,
    Swift,
    Octavia,
    Manila,
    Designate,
    Ironic,
    Telemetry,
}

/// How many children a service has.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instances {
    /// One child with a fixed name
    Single(&'static str),
    /// One child per template; `default_instance` is used when none are declared
    Multi { default_instance: &'static str },
}

/// Shared inputs a service's child spec receives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Consumes {
    pub secret: bool,
    pub database: bool,
    pub messaging: bool,
    pub cache: bool,
    pub storage: bool,
}

/// Static description of one managed service.
#[derive(Debug)]
pub struct ServiceDescriptor {
    pub kind: ServiceKind,
    /// Step name, spec field name and status map key
    pub name: &'static str,
    /// Name used in admission messages
    pub display: &'static str,
    /// Name used in condition messages
    pub condition_display: &'static str,
    pub api_group: &'static str,
    pub api_kind: &'static str,
    pub plural: &'static str,
    pub condition_type: &'static str,
    pub instances: Instances,
    pub image_env: &'static str,
    pub image_name: &'static str,
    pub consumes: Consumes,
    /// Services that must be enabled and ready first
    pub dependencies: &'static [ServiceKind],
    /// Whether the service waits for the CA chain
    pub needs_ca: bool,
}

const NONE: Consumes = Consumes {
    secret: false,
    database: false,
    messaging: false,
    cache: false,
    storage: false,
};

const API: Consumes = Consumes {
    secret: true,
    database: true,
    messaging: true,
    cache: true,
    storage: false,
};

use ServiceKind as K;

static SERVICES: [ServiceDescriptor; 19] = [
    ServiceDescriptor {
        kind: K::Galera,
        name: "galera",
        display: "Galera",
        condition_display: "MariaDB",
        api_group: "mariadb.openstack.org",
        api_kind: "Galera",
        plural: "galeras",
        condition_type: "OpenStackControlPlaneMariaDBReady",
        instances: Instances::Multi {
            default_instance: DEFAULT_DATABASE_INSTANCE,
        },
        image_env: "RELATED_IMAGE_MARIADB_IMAGE_URL_DEFAULT",
        image_name: "mariadb",
        consumes: Consumes {
            secret: true,
            storage: true,
            ..NONE
        },
        dependencies: &[],
        needs_ca: false,
    },
    ServiceDescriptor {
        kind: K::RabbitMq,
        name: "rabbitmq",
        display: "RabbitMQ",
        condition_display: "RabbitMQ",
        api_group: "rabbitmq.openstack.org",
        api_kind: "RabbitMq",
        plural: "rabbitmqs",
        condition_type: "OpenStackControlPlaneRabbitMQReady",
        instances: Instances::Multi {
            default_instance: DEFAULT_RABBITMQ_CLUSTER,
        },
        image_env: "RELATED_IMAGE_RABBITMQ_IMAGE_URL_DEFAULT",
        image_name: "rabbitmq",
        consumes: Consumes {
            storage: true,
            ..NONE
        },
        dependencies: &[],
        needs_ca: false,
    },
    ServiceDescriptor {
        kind: K::Memcached,
        name: "memcached",
        display: "Memcached",
        condition_display: "Memcached",
        api_group: "memcached.openstack.org",
        api_kind: "Memcached",
        plural: "memcacheds",
        condition_type: "OpenStackControlPlaneMemcachedReady",
        instances: Instances::Multi {
            default_instance: DEFAULT_MEMCACHED_INSTANCE,
        },
        image_env: "RELATED_IMAGE_INFRA_MEMCACHED_IMAGE_URL_DEFAULT",
        image_name: "memcached",
        consumes: NONE,
        dependencies: &[],
        needs_ca: false,
    },
    ServiceDescriptor {
        kind: K::Keystone,
        name: "keystone",
        display: "Keystone",
        condition_display: "KeystoneAPI",
        api_group: "keystone.openstack.org",
        api_kind: "KeystoneAPI",
        plural: "keystoneapis",
        condition_type: "OpenStackControlPlaneKeystoneAPIReady",
        instances: Instances::Single("keystone"),
        image_env: "RELATED_IMAGE_KEYSTONE_API_IMAGE_URL_DEFAULT",
        image_name: "keystone",
        consumes: API,
        dependencies: &[K::Galera, K::Memcached, K::RabbitMq],
        needs_ca: false,
    },
    ServiceDescriptor {
        kind: K::Placement,
        name: "placement",
        display: "Placement",
        condition_display: "PlacementAPI",
        api_group: "placement.openstack.org",
        api_kind: "PlacementAPI",
        plural: "placementapis",
        condition_type: "OpenStackControlPlanePlacementAPIReady",
        instances: Instances::Single("placement"),
        image_env: "RELATED_IMAGE_PLACEMENT_API_IMAGE_URL_DEFAULT",
        image_name: "placement-api",
        consumes: Consumes {
            messaging: false,
            ..API
        },
        dependencies: &[K::Galera, K::Memcached, K::Keystone],
        needs_ca: true,
    },
    ServiceDescriptor {
        kind: K::Glance,
        name: "glance",
        display: "Glance",
        condition_display: "Glance",
        api_group: "glance.openstack.org",
        api_kind: "Glance",
        plural: "glances",
        condition_type: "OpenStackControlPlaneGlanceReady",
        instances: Instances::Single("glance"),
        image_env: "RELATED_IMAGE_GLANCE_API_IMAGE_URL_DEFAULT",
        image_name: "glance-api",
        consumes: Consumes {
            messaging: false,
            storage: true,
            ..API
        },
        dependencies: &[K::Galera, K::Memcached, K::Keystone],
        needs_ca: true,
    },
    ServiceDescriptor {
        kind: K::Cinder,
        name: "cinder",
        display: "Cinder",
        condition_display: "Cinder",
        api_group: "cinder.openstack.org",
        api_kind: "Cinder",
        plural: "cinders",
        condition_type: "OpenStackControlPlaneCinderReady",
        instances: Instances::Single("cinder"),
        image_env: "RELATED_IMAGE_CINDER_API_IMAGE_URL_DEFAULT",
        image_name: "cinder-api",
        consumes: API,
        dependencies: &[K::Galera, K::Memcached, K::RabbitMq, K::Keystone],
        needs_ca: true,
    },
    ServiceDescriptor {
        kind: K::Ovn,
        name: "ovn",
        display: "OVN",
        condition_display: "OVN",
        api_group: "ovn.openstack.org",
        api_kind: "OVNNorthd",
        plural: "ovnnorthds",
        condition_type: "OpenStackControlPlaneOVNReady",
        instances: Instances::Single("ovnnorthd"),
        image_env: "RELATED_IMAGE_OVN_NORTHD_IMAGE_URL_DEFAULT",
        image_name: "ovn-northd",
        consumes: NONE,
        dependencies: &[],
        needs_ca: true,
    },
    ServiceDescriptor {
        kind: K::Neutron,
        name: "neutron",
        display: "Neutron",
        condition_display: "Neutron",
        api_group: "neutron.openstack.org",
        api_kind: "NeutronAPI",
        plural: "neutronapis",
        condition_type: "OpenStackControlPlaneNeutronReady",
        instances: Instances::Single("neutron"),
        image_env: "RELATED_IMAGE_NEUTRON_API_IMAGE_URL_DEFAULT",
        image_name: "neutron-server",
        consumes: API,
        dependencies: &[K::Galera, K::RabbitMq, K::Keystone],
        needs_ca: true,
    },
    ServiceDescriptor {
        kind: K::Nova,
        name: "nova",
        display: "Nova",
        condition_display: "Nova",
        api_group: "nova.openstack.org",
        api_kind: "Nova",
        plural: "novas",
        condition_type: "OpenStackControlPlaneNovaReady",
        instances: Instances::Single("nova"),
        image_env: "RELATED_IMAGE_NOVA_API_IMAGE_URL_DEFAULT",
        image_name: "nova-api",
        consumes: API,
        dependencies: &[
            K::Galera,
            K::Memcached,
            K::RabbitMq,
            K::Keystone,
            K::Glance,
            K::Neutron,
            K::Placement,
        ],
        needs_ca: true,
    },
    ServiceDescriptor {
        kind: K::Heat,
        name: "heat",
        display: "Heat",
        condition_display: "Heat",
        api_group: "heat.openstack.org",
        api_kind: "Heat",
        plural: "heats",
        condition_type: "OpenStackControlPlaneHeatReady",
        instances: Instances::Single("heat"),
        image_env: "RELATED_IMAGE_HEAT_API_IMAGE_URL_DEFAULT",
        image_name: "heat-api",
        consumes: API,
        dependencies: &[K::Galera, K::Memcached, K::RabbitMq, K::Keystone],
        needs_ca: true,
    },
    ServiceDescriptor {
        kind: K::Horizon,
        name: "horizon",
        display: "Horizon",
        condition_display: "Horizon",
        api_group: "horizon.openstack.org",
        api_kind: "Horizon",
        plural: "horizons",
        condition_type: "OpenStackControlPlaneHorizonReady",
        instances: Instances::Single("horizon"),
        image_env: "RELATED_IMAGE_HORIZON_IMAGE_URL_DEFAULT",
        image_name: "horizon",
        consumes: Consumes {
            secret: true,
            cache: true,
            ..NONE
        },
        dependencies: &[K::Galera, K::Memcached, K::Keystone],
        needs_ca: true,
    },
    ServiceDescriptor {
        kind: K::Barbican,
        name: "barbican",
        display: "Barbican",
        condition_display: "Barbican",
        api_group: "barbican.openstack.org",
        api_kind: "Barbican",
        plural: "barbicans",
        condition_type: "OpenStackControlPlaneBarbicanReady",
        instances: Instances::Single("barbican"),
        image_env: "RELATED_IMAGE_BARBICAN_API_IMAGE_URL_DEFAULT",
        image_name: "barbican-api",
        consumes: Consumes {
            cache: false,
            ..API
        },
        dependencies: &[K::Galera, K::Keystone],
        needs_ca: true,
    },
    ServiceDescriptor {
        kind: K::Swift,
        name: "swift",
        display: "Swift",
        condition_display: "Swift",
        api_group: "swift.openstack.org",
        api_kind: "Swift",
        plural: "swifts",
        condition_type: "OpenStackControlPlaneSwiftReady",
        instances: Instances::Single("swift"),
        image_env: "RELATED_IMAGE_SWIFT_PROXY_IMAGE_URL_DEFAULT",
        image_name: "swift-proxy-server",
        consumes: Consumes {
            secret: true,
            cache: true,
            storage: true,
            ..NONE
        },
        dependencies: &[K::Memcached, K::Keystone],
        needs_ca: true,
    },
    ServiceDescriptor {
        kind: K::Octavia,
        name: "octavia",
        display: "Octavia",
        condition_display: "Octavia",
        api_group: "octavia.openstack.org",
        api_kind: "Octavia",
        plural: "octavias",
        condition_type: "OpenStackControlPlaneOctaviaReady",
        instances: Instances::Single("octavia"),
        image_env: "RELATED_IMAGE_OCTAVIA_API_IMAGE_URL_DEFAULT",
        image_name: "octavia-api",
        consumes: API,
        dependencies: &[
            K::Galera,
            K::Memcached,
            K::RabbitMq,
            K::Keystone,
            K::Glance,
            K::Neutron,
            K::Nova,
            K::Ovn,
        ],
        needs_ca: true,
    },
    ServiceDescriptor {
        kind: K::Manila,
        name: "manila",
        display: "Manila",
        condition_display: "Manila",
        api_group: "manila.openstack.org",
        api_kind: "Manila",
        plural: "manilas",
        condition_type: "OpenStackControlPlaneManilaReady",
        instances: Instances::Single("manila"),
        image_env: "RELATED_IMAGE_MANILA_API_IMAGE_URL_DEFAULT",
        image_name: "manila-api",
        consumes: API,
        dependencies: &[K::Galera, K::Memcached, K::RabbitMq, K::Keystone],
        needs_ca: true,
    },
    ServiceDescriptor {
        kind: K::Designate,
        name: "designate",
        display: "Designate",
        condition_display: "Designate",
        api_group: "designate.openstack.org",
        api_kind: "Designate",
        plural: "designates",
        condition_type: "OpenStackControlPlaneDesignateReady",
        instances: Instances::Single("designate"),
        image_env: "RELATED_IMAGE_DESIGNATE_API_IMAGE_URL_DEFAULT",
        image_name: "designate-api",
        consumes: Consumes {
            cache: false,
            ..API
        },
        dependencies: &[K::Galera, K::RabbitMq, K::Keystone],
        needs_ca: true,
    },
    ServiceDescriptor {
        kind: K::Ironic,
        name: "ironic",
        display: "Ironic",
        condition_display: "Ironic",
        api_group: "ironic.openstack.org",
        api_kind: "Ironic",
        plural: "ironics",
        condition_type: "OpenStackControlPlaneIronicReady",
        instances: Instances::Single("ironic"),
        image_env: "RELATED_IMAGE_IRONIC_API_IMAGE_URL_DEFAULT",
        image_name: "ironic-api",
        consumes: Consumes {
            cache: false,
            storage: true,
            ..API
        },
        dependencies: &[K::Galera, K::RabbitMq, K::Keystone],
        needs_ca: true,
    },
    ServiceDescriptor {
        kind: K::Telemetry,
        name: "telemetry",
        display: "Telemetry",
        condition_display: "Telemetry",
        api_group: "telemetry.openstack.org",
        api_kind: "Telemetry",
        plural: "telemetries",
        condition_type: "OpenStackControlPlaneTelemetryReady",
        instances: Instances::Single("telemetry"),
        image_env: "RELATED_IMAGE_CEILOMETER_CENTRAL_IMAGE_URL_DEFAULT",
        image_name: "ceilometer-central",
        consumes: Consumes {
            secret: true,
            messaging: true,
            ..NONE
        },
        dependencies: &[K::RabbitMq, K::Keystone],
        needs_ca: true,
    },
];

/// Borrowed view of a service's section in the spec.
#[derive(Clone, Copy, Debug)]
pub enum SectionRef<'a> {
    Single(&'a ServiceSection),
    Multi(&'a MultiInstanceSection),
}

impl ServiceKind {
    /// Every service, in declaration order.
    pub const ALL: [ServiceKind; 19] = [
        K::Galera,
        K::RabbitMq,
        K::Memcached,
        K::Keystone,
        K::Placement,
        K::Glance,
        K::Cinder,
        K::Ovn,
        K::Neutron,
        K::Nova,
        K::Heat,
        K::Horizon,
        K::Barbican,
        K::Swift,
        K::Octavia,
        K::Manila,
        K::Designate,
        K::Ironic,
        K::Telemetry,
    ];

    #[must_use]
    pub fn descriptor(self) -> &'static ServiceDescriptor {
        &SERVICES[self as usize]
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Look a service up by its step name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// The section of `spec` describing this service.
    #[must_use]
    pub fn section(self, spec: &OpenStackControlPlaneSpec) -> SectionRef<'_> {
        match self {
            K::Galera => SectionRef::Multi(&spec.galera),
            K::RabbitMq => SectionRef::Multi(&spec.rabbitmq),
            K::Memcached => SectionRef::Multi(&spec.memcached),
            K::Keystone => SectionRef::Single(&spec.keystone),
            K::Placement => SectionRef::Single(&spec.placement),
            K::Glance => SectionRef::Single(&spec.glance),
            K::Cinder => SectionRef::Single(&spec.cinder),
            K::Ovn => SectionRef::Single(&spec.ovn),
            K::Neutron => SectionRef::Single(&spec.neutron),
            K::Nova => SectionRef::Single(&spec.nova),
            K::Heat => SectionRef::Single(&spec.heat),
            K::Horizon => SectionRef::Single(&spec.horizon),
            K::Barbican => SectionRef::Single(&spec.barbican),
            K::Swift => SectionRef::Single(&spec.swift),
            K::Octavia => SectionRef::Single(&spec.octavia),
            K::Manila => SectionRef::Single(&spec.manila),
            K::Designate => SectionRef::Single(&spec.designate),
            K::Ironic => SectionRef::Single(&spec.ironic),
            K::Telemetry => SectionRef::Single(&spec.telemetry),
        }
    }

    #[must_use]
    pub fn is_enabled(self, spec: &OpenStackControlPlaneSpec) -> bool {
        match self.section(spec) {
            SectionRef::Single(s) => s.enabled,
            SectionRef::Multi(m) => m.enabled,
        }
    }

    /// Declared children as `(name, template)` pairs, empty when disabled.
    ///
    /// A multi-instance service with no templates yields its default instance.
    #[must_use]
    pub fn instances(self, spec: &OpenStackControlPlaneSpec) -> Vec<(String, ServiceTemplate)> {
        if !self.is_enabled(spec) {
            return Vec::new();
        }
        match (self.section(spec), self.descriptor().instances) {
            (SectionRef::Single(s), Instances::Single(child)) => {
                vec![(child.to_string(), s.template.clone())]
            }
            (SectionRef::Multi(m), Instances::Multi { default_instance }) => {
                if m.templates.is_empty() {
                    vec![(default_instance.to_string(), ServiceTemplate::default())]
                } else {
                    m.templates
                        .iter()
                        .map(|(name, t)| (name.clone(), t.clone()))
                        .collect()
                }
            }
            _ => Vec::new(),
        }
    }

    /// Templates that carry per-service settings consulted across services
    /// (topology override, node selector).
    #[must_use]
    pub fn templates(self, spec: &OpenStackControlPlaneSpec) -> Vec<&ServiceTemplate> {
        match self.section(spec) {
            SectionRef::Single(s) => vec![&s.template],
            SectionRef::Multi(m) => m.templates.values().collect(),
        }
    }

    /// `ApiResource` for the dynamic child kind.
    #[must_use]
    pub fn api_resource(self) -> ApiResource {
        let d = self.descriptor();
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(d.api_group, API_VERSION, d.api_kind),
            d.plural,
        )
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fill in defaults the API server does not apply.
///
/// Multi-instance sections that are enabled without templates get their
/// default instance, so references like `databaseInstance: openstack` resolve.
pub fn apply_defaults(spec: &mut OpenStackControlPlaneSpec) {
    for (section, default_instance) in [
        (&mut spec.galera, DEFAULT_DATABASE_INSTANCE),
        (&mut spec.rabbitmq, DEFAULT_RABBITMQ_CLUSTER),
        (&mut spec.memcached, DEFAULT_MEMCACHED_INSTANCE),
    ] {
        if section.enabled && section.templates.is_empty() {
            section
                .templates
                .insert(default_instance.to_string(), ServiceTemplate::default());
        }
    }
}
