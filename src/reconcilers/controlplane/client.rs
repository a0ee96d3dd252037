// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The `openstackclient` step: one `OpenStackClient` per control plane.

#![allow(clippy::wildcard_imports)]

use super::types::*;
use crate::constants::{KIND_OPENSTACK_CLIENT, OPENSTACK_CLIENT_NAME};
use crate::crd::ConditionStatus;
use crate::images::IMAGE_DEFAULTS;
use crate::metrics;
use crate::status_reasons::{
    service_ready_message, service_running_message, CONDITION_TYPE_CLIENT_READY,
};

const DISPLAY: &str = "OpenStackClient";

/// Spec of the `OpenStackClient` derived from the control plane.
#[must_use]
pub fn desired_client_spec(
    spec: &OpenStackControlPlaneSpec,
    ca_bundle_secret_name: Option<&str>,
    default_image: &str,
) -> OpenStackClientSpec {
    let template = &spec.openstackclient.template;
    let defaults = OpenStackClientSpec::default();
    OpenStackClientSpec {
        open_stack_config_map: template
            .open_stack_config_map
            .clone()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.open_stack_config_map),
        open_stack_config_secret: template
            .open_stack_config_secret
            .clone()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.open_stack_config_secret),
        container_image: Some(
            template
                .container_image
                .clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default_image.to_string()),
        ),
        node_selector: template.node_selector.clone().or_else(|| {
            (!spec.node_selector.is_empty()).then(|| spec.node_selector.clone())
        }),
        ca_bundle_secret_name: ca_bundle_secret_name
            .filter(|v| !v.is_empty())
            .map(str::to_string),
    }
}

/// Whether the client observed its current generation and reports `Ready=True`.
#[must_use]
pub fn client_is_ready(client: &OpenStackClient) -> bool {
    let Some(status) = client.status.as_ref() else {
        return false;
    };
    client.metadata.generation.is_some()
        && status.observed_generation == client.metadata.generation
        && status.conditions.iter().any(|c| {
            c.r#type == CONDITION_TYPE_READY && c.status == ConditionStatus::True
        })
}

pub struct ClientStep;

#[async_trait]
impl ServiceStep for ClientStep {
    fn name(&self) -> &'static str {
        OPENSTACK_CLIENT_NAME
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec!["inputs", "ca"]
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE_CLIENT_READY
    }

    fn display(&self) -> &'static str {
        DISPLAY
    }

    fn evaluates(&self, spec: &OpenStackControlPlaneSpec) -> bool {
        spec.openstackclient.enabled
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
        let api: Api<OpenStackClient> = Api::namespaced(ctx.client.clone(), &ctx.namespace);

        if !ctx.spec.openstackclient.enabled {
            if ensure_deleted(&api, OPENSTACK_CLIENT_NAME).await? {
                metrics::record_resource_deleted(KIND_OPENSTACK_CLIENT);
                info!(namespace = %ctx.namespace, "Deleted disabled OpenStackClient");
            }
            ctx.status.container_images.remove(OPENSTACK_CLIENT_NAME);
            return Ok(StepOutcome::Disabled);
        }

        let spec = desired_client_spec(
            &ctx.spec,
            ctx.status.tls.ca_bundle_secret_name.as_deref(),
            IMAGE_DEFAULTS.client(),
        );
        let image = spec.container_image.clone();

        let mut desired = OpenStackClient::new(OPENSTACK_CLIENT_NAME, spec.clone());
        desired.metadata.namespace = Some(ctx.namespace.clone());
        desired.metadata.labels = Some(child_labels(&ctx.name, OPENSTACK_CLIENT_NAME));
        desired.metadata.owner_references = Some(vec![ctx.owner.clone()]);
        let desired_meta = desired.metadata.clone();

        let (outcome, live) = upsert(&api, desired, ImmutablePolicy::Fail, |live| {
            live.spec = spec.clone();
            merge_metadata(&mut live.metadata, &desired_meta);
            Ok(())
        })
        .await?;
        debug!(namespace = %ctx.namespace, outcome = ?outcome, "Synchronized OpenStackClient");

        if !live.as_ref().is_some_and(client_is_ready) {
            ctx.conditions.mark_false(
                CONDITION_TYPE_CLIENT_READY,
                REASON_REQUESTED,
                Severity::Info,
                service_running_message(DISPLAY),
            );
            return Ok(StepOutcome::Progressing);
        }

        if let Some(image) = image {
            ctx.status
                .container_images
                .insert(OPENSTACK_CLIENT_NAME.to_string(), image);
        }
        ctx.conditions
            .mark_true(CONDITION_TYPE_CLIENT_READY, service_ready_message(DISPLAY));
        Ok(StepOutcome::Ready)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
