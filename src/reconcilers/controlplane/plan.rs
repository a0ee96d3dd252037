// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The reconcile plan of an `OpenStackControlPlane`.
//!
//! ```text
//! inputs -> topology -> galera, rabbitmq, memcached -> keystone -> ca
//!        -> placement ... telemetry -> openstackclient
//! ```
//!
//! Every service step depends on `inputs` and `topology`, on the services its
//! descriptor names and, for services that terminate TLS, on `ca`.

#![allow(clippy::wildcard_imports)]

use super::client::ClientStep;
use super::inputs::InputsStep;
use super::services::ServiceChildStep;
use super::steps::order_steps;
use super::types::*;
use crate::constants::MISSING_INPUT_REQUEUE_SECS;
use crate::errors::PlanError;
use crate::reconcilers::ca::{reconcile_cas, CaDomain, CaProgress, CaRequest};
use crate::reconcilers::topology::{effective_topologies, resolve_all, TOPOLOGY_HASH_PREFIX};
use crate::status_reasons::{
    topology_not_found_message, CONDITION_TYPE_CA_READY, CONDITION_TYPE_TOPOLOGY_READY,
    MESSAGE_CA_READY, MESSAGE_TOPOLOGY_READY,
};

/// Resolves every topology referenced by an enabled service.
pub struct TopologyStep;

#[async_trait]
impl ServiceStep for TopologyStep {
    fn name(&self) -> &'static str {
        "topology"
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec!["inputs"]
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE_TOPOLOGY_READY
    }

    fn display(&self) -> &'static str {
        "Topology"
    }

    fn evaluates(&self, spec: &OpenStackControlPlaneSpec) -> bool {
        spec.topology_ref.as_ref().is_some_and(|t| !t.name.is_empty())
            || ServiceKind::ALL
                .into_iter()
                .flat_map(|kind| kind.instances(spec))
                .any(|(_, template)| template.topology_ref.is_some_and(|t| !t.name.is_empty()))
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
        let refs = effective_topologies(&ctx.spec, &ctx.namespace);
        if refs.is_empty() {
            ctx.hashes.remove_prefixed(TOPOLOGY_HASH_PREFIX);
            return Ok(StepOutcome::Disabled);
        }

        let resolution = resolve_all(&ctx.client, &refs).await?;
        if let Some(missing) = resolution.missing.first() {
            let namespace = missing.namespace.as_deref().unwrap_or(&ctx.namespace);
            info!(
                namespace = %namespace,
                topology = %missing.name,
                "Referenced topology not found"
            );
            ctx.conditions.mark_false(
                CONDITION_TYPE_TOPOLOGY_READY,
                REASON_REQUESTED,
                Severity::Info,
                topology_not_found_message(namespace, &missing.name),
            );
            return Ok(StepOutcome::Waiting(Duration::from_secs(
                MISSING_INPUT_REQUEUE_SECS,
            )));
        }

        ctx.hashes.remove_prefixed(TOPOLOGY_HASH_PREFIX);
        for (name, digest) in &resolution.resolved {
            ctx.hashes
                .record(&format!("{TOPOLOGY_HASH_PREFIX}{name}"), digest);
        }
        ctx.conditions
            .mark_true(CONDITION_TYPE_TOPOLOGY_READY, MESSAGE_TOPOLOGY_READY);
        Ok(StepOutcome::Ready)
    }
}

/// Issues the CA chain and writes the combined trust bundle.
pub struct CaStep;

#[async_trait]
impl ServiceStep for CaStep {
    fn name(&self) -> &'static str {
        "ca"
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec!["inputs"]
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE_CA_READY
    }

    fn display(&self) -> &'static str {
        "CAs"
    }

    fn evaluates(&self, spec: &OpenStackControlPlaneSpec) -> bool {
        !CaDomain::enabled(&spec.tls).is_empty()
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
        let request = CaRequest {
            client: &ctx.client,
            namespace: &ctx.namespace,
            owner: &ctx.owner,
            tls: &ctx.spec.tls,
            system_bundle: ctx.settings.system_ca_bundle.as_deref(),
        };

        match reconcile_cas(&request, &mut ctx.hashes).await? {
            CaProgress::Disabled => {
                ctx.status.tls = TlsStatus::default();
                Ok(StepOutcome::Disabled)
            }
            CaProgress::Waiting {
                severity,
                message,
                after,
            } => {
                debug!(namespace = %ctx.namespace, message = %message, "CA chain not ready");
                ctx.conditions.mark_false(
                    CONDITION_TYPE_CA_READY,
                    REASON_REQUESTED,
                    severity,
                    message,
                );
                Ok(StepOutcome::Waiting(after))
            }
            CaProgress::Ready(tls) => {
                ctx.status.tls = tls;
                ctx.conditions
                    .mark_true(CONDITION_TYPE_CA_READY, MESSAGE_CA_READY);
                Ok(StepOutcome::Ready)
            }
        }
    }
}

/// The ordered steps of one control plane reconcile.
///
/// # Errors
///
/// Returns [`PlanError`] if the step graph is inconsistent.
pub fn build_plan() -> Result<Vec<Box<dyn ServiceStep>>, PlanError> {
    let mut steps: Vec<Box<dyn ServiceStep>> = vec![Box::new(InputsStep), Box::new(TopologyStep)];
    for kind in ServiceKind::ALL {
        steps.push(Box::new(ServiceChildStep { kind }));
        if kind == ServiceKind::Keystone {
            steps.push(Box::new(CaStep));
        }
    }
    steps.push(Box::new(ClientStep));
    order_steps(steps)
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod plan_tests;
