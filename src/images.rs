// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Container image defaults.
//!
//! Each service reads `RELATED_IMAGE_<SERVICE>_IMAGE_URL_DEFAULT` once at first
//! use and falls back to the upstream podified image. Values are cached for the
//! life of the process; changing them requires a restart.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::services::ServiceKind;

/// Registry and namespace of the fallback images
pub const DEFAULT_IMAGE_REGISTRY: &str = "quay.io/podified-antelope-centos9";

/// Tag of the fallback images
pub const DEFAULT_IMAGE_TAG: &str = "current-podified";

/// Environment variable overriding the admin client image
pub const CLIENT_IMAGE_ENV: &str = "RELATED_IMAGE_OPENSTACK_CLIENT_IMAGE_URL_DEFAULT";

/// Resolved default images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDefaults {
    services: BTreeMap<ServiceKind, String>,
    client: String,
}

impl ImageDefaults {
    /// Resolve every default through `lookup`, falling back to the upstream image.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolve = |env: &str, image: &str| {
            lookup(env)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| fallback_image(image))
        };

        let services = ServiceKind::ALL
            .into_iter()
            .map(|kind| {
                let d = kind.descriptor();
                (kind, resolve(d.image_env, d.image_name))
            })
            .collect();

        Self {
            services,
            client: resolve(CLIENT_IMAGE_ENV, "openstackclient"),
        }
    }

    /// Resolve every default from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    #[must_use]
    pub fn service(&self, kind: ServiceKind) -> &str {
        self.services
            .get(&kind)
            .map_or("", String::as_str)
    }

    #[must_use]
    pub fn client(&self) -> &str {
        &self.client
    }
}

fn fallback_image(image: &str) -> String {
    format!("{DEFAULT_IMAGE_REGISTRY}/openstack-{image}:{DEFAULT_IMAGE_TAG}")
}

/// Process-wide image defaults, read from the environment on first use.
pub static IMAGE_DEFAULTS: LazyLock<ImageDefaults> = LazyLock::new(ImageDefaults::from_env);
