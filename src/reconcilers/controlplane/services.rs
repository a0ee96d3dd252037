// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic service step, driven by the descriptor table.
//!
//! An enabled service gets one child per declared instance. Each child spec is
//! digested, and the live spec is only replaced when the digest stamped on the
//! child differs, so fields the child's own controller defaults are left alone
//! between spec changes. Children of multi-instance services that are no
//! longer declared are deleted.
//!
//! A disabled service deletes every child it owns and drops its condition,
//! hash, image and endpoints from the status.

#![allow(clippy::wildcard_imports)]

use super::desired::{child_readiness, desired_child, desired_child_spec};
use super::types::*;
use crate::images::IMAGE_DEFAULTS;
use crate::metrics;
use crate::status_reasons::{service_ready_message, service_running_message};

/// Hash register prefix of the per-service child digests
pub const SERVICE_HASH_PREFIX: &str = "service-";

/// Step converging the children of one service.
pub struct ServiceChildStep {
    pub kind: ServiceKind,
}

impl ServiceChildStep {
    fn hash_key(&self) -> String {
        format!("{SERVICE_HASH_PREFIX}{}", self.kind.name())
    }

    fn forget(&self, ctx: &mut StepContext<'_>) {
        let name = self.kind.name();
        ctx.hashes.remove(&self.hash_key());
        ctx.status.container_images.remove(name);
        ctx.status.endpoints.remove(name);
    }
}

#[async_trait]
impl ServiceStep for ServiceChildStep {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn dependencies(&self) -> Vec<&'static str> {
        let descriptor = self.kind.descriptor();
        let mut dependencies = vec!["inputs", "topology"];
        if descriptor.needs_ca {
            dependencies.push("ca");
        }
        dependencies.extend(descriptor.dependencies.iter().map(|k| k.name()));
        dependencies
    }

    fn condition_type(&self) -> &'static str {
        self.kind.descriptor().condition_type
    }

    fn display(&self) -> &'static str {
        self.kind.descriptor().condition_display
    }

    fn evaluates(&self, spec: &OpenStackControlPlaneSpec) -> bool {
        self.kind.is_enabled(spec)
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
        let descriptor = self.kind.descriptor();
        let api: Api<DynamicObject> = Api::namespaced_with(
            ctx.client.clone(),
            &ctx.namespace,
            &self.kind.api_resource(),
        );
        let selector = child_selector(&ctx.name, descriptor.name);

        if !self.kind.is_enabled(&ctx.spec) {
            let deleted = delete_owned_except(&api, &selector, &BTreeSet::new()).await?;
            for _ in &deleted {
                metrics::record_resource_deleted(descriptor.api_kind);
            }
            if !deleted.is_empty() {
                info!(
                    namespace = %ctx.namespace,
                    service = descriptor.name,
                    children = ?deleted,
                    "Deleted children of disabled service"
                );
            }
            self.forget(ctx);
            return Ok(StepOutcome::Disabled);
        }

        let instances = self.kind.instances(&ctx.spec);
        let mut digests = BTreeMap::new();
        let mut all_ready = true;
        let mut image = None;
        let mut endpoints = BTreeMap::new();

        for (instance, template) in &instances {
            let child_spec = desired_child_spec(
                self.kind,
                template,
                &ctx.spec,
                &ctx.namespace,
                ctx.status.tls.ca_bundle_secret_name.as_deref(),
                &IMAGE_DEFAULTS,
            )?;
            let digest = hash_of_json(&child_spec)?;
            let child_image = child_spec
                .get("containerImage")
                .and_then(Value::as_str)
                .map(str::to_string);
            let desired = desired_child(self.kind, instance, child_spec.clone(), &digest, ctx);

            let (outcome, live) = upsert(&api, desired.clone(), ImmutablePolicy::Fail, |live| {
                let stamped = live.annotations().get(SPEC_HASH_ANNOTATION) == Some(&digest);
                if !stamped {
                    live.data["spec"] = child_spec.clone();
                }
                merge_metadata(&mut live.metadata, &desired.metadata);
                Ok(())
            })
            .await?;
            debug!(
                namespace = %ctx.namespace,
                service = descriptor.name,
                instance = %instance,
                outcome = ?outcome,
                "Synchronized service child"
            );

            let readiness = live.as_ref().map(child_readiness).unwrap_or_default();
            all_ready &= readiness.ready;
            if image.is_none() {
                image = child_image;
            }
            endpoints.extend(readiness.endpoints);
            digests.insert(instance.clone(), digest);
        }

        if matches!(descriptor.instances, Instances::Multi { .. }) {
            let keep: BTreeSet<String> = digests.keys().cloned().collect();
            let pruned = delete_owned_except(&api, &selector, &keep).await?;
            for _ in &pruned {
                metrics::record_resource_deleted(descriptor.api_kind);
            }
            if !pruned.is_empty() {
                info!(
                    namespace = %ctx.namespace,
                    service = descriptor.name,
                    children = ?pruned,
                    "Deleted undeclared service instances"
                );
            }
        }

        ctx.hashes
            .record(&self.hash_key(), &hash_of_inputs(&digests));

        if !all_ready {
            ctx.conditions.mark_false(
                descriptor.condition_type,
                REASON_REQUESTED,
                Severity::Info,
                service_running_message(descriptor.condition_display),
            );
            return Ok(StepOutcome::Progressing);
        }

        if let Some(image) = image {
            ctx.status
                .container_images
                .insert(descriptor.name.to_string(), image);
        }
        if endpoints.is_empty() {
            ctx.status.endpoints.remove(descriptor.name);
        } else {
            ctx.status
                .endpoints
                .insert(descriptor.name.to_string(), endpoints);
        }
        ctx.conditions.mark_true(
            descriptor.condition_type,
            service_ready_message(descriptor.condition_display),
        );
        Ok(StepOutcome::Ready)
    }
}

#[cfg(test)]
#[path = "services_tests.rs"]
mod services_tests;
