// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `OpenStackControlPlane` reconciliation logic.
//!
//! One reconcile walks the fixed plan of service steps against the defaulted
//! spec, folds the outcome into conditions and hashes, and persists the status
//! exactly once, including when a step failed.
//!
//! ## Module Structure
//!
//! - [`steps`] - Step trait, plan ordering and the step runner
//! - [`plan`] - Topology and CA steps, and the full plan
//! - [`inputs`] - Input secret step
//! - [`services`] - Generic step for every descriptor-driven service
//! - [`desired`] - Child spec derivation and readiness
//! - [`client`] - `OpenStackClient` step
//! - [`reservation`] - One control plane per namespace
//! - [`types`] - Shared types and imports

// Submodules
pub mod client;
pub mod desired;
pub mod inputs;
pub mod plan;
pub mod reservation;
pub mod services;
pub mod steps;
pub mod types;

pub use plan::build_plan;
pub use steps::{order_steps, run_steps, StepOutcome};

use steps::evaluated_condition_types;
#[allow(clippy::wildcard_imports)]
use types::*;

use crate::constants::CONTROL_PLANE_FINALIZER;
use crate::reconcilers::finalizers::{ensure_finalizer, handle_deletion, FinalizerCleanup};
use crate::reconcilers::resources::controller_reference;
use crate::reconcilers::status::StatusUpdater;
use crate::services::apply_defaults;
use crate::status_reasons::{service_error_message, CONDITION_TYPE_INPUT_READY};

/// Release the namespace reservation before the finalizer goes.
#[async_trait]
impl FinalizerCleanup for OpenStackControlPlane {
    async fn cleanup(&self, client: &Client) -> Result<()> {
        reservation::release(client, self).await
    }
}

/// Reconciles an `OpenStackControlPlane` resource.
///
/// 1. A deleting control plane releases its reservation and finalizer; the
///    children go with the owner-reference cascade.
/// 2. Conditions are seeded for every step the spec evaluates, then the
///    finalizer is added and the namespace reservation taken. A failure here
///    is reported on `InputReady` alone.
/// 3. The plan runs once (see [`run_steps`]).
/// 4. `Ready` is derived and the status written, whether or not a step failed.
///
/// # Returns
///
/// The requeue action the plan asked for.
///
/// # Errors
///
/// Returns the first step error, or an error if the status cannot be written.
pub async fn reconcile_controlplane(
    ctx: Arc<Context>,
    cp: OpenStackControlPlane,
) -> Result<Action> {
    let client = ctx.client.clone();
    let namespace = cp.namespace().unwrap_or_default();
    let name = cp.name_any();

    info!("Reconciling OpenStackControlPlane: {}/{}", namespace, name);
    debug!(
        namespace = %namespace,
        name = %name,
        generation = ?cp.metadata.generation,
        "Starting OpenStackControlPlane reconciliation"
    );

    if cp.metadata.deletion_timestamp.is_some() {
        handle_deletion(&client, &cp, CONTROL_PLANE_FINALIZER).await?;
        return Ok(Action::await_change());
    }

    let mut spec = cp.spec.clone();
    apply_defaults(&mut spec);

    let previous = cp.status.clone().unwrap_or_default();
    let mut step_ctx = StepContext {
        client: client.clone(),
        control_plane: &cp,
        spec,
        namespace: namespace.clone(),
        name: name.clone(),
        owner: OwnerReference::default(),
        settings: &ctx.settings,
        conditions: ConditionLedger::new(&previous.conditions),
        hashes: HashRegister::new(&previous.hashes),
        status: previous,
    };

    let result = converge(&mut step_ctx).await;

    step_ctx.conditions.mirror(CONDITION_TYPE_READY);
    step_ctx.conditions.restore_last_transition_times();

    let StepContext {
        conditions,
        hashes,
        mut status,
        ..
    } = step_ctx;
    status.conditions = conditions.into_conditions();
    status.hashes = hashes.into_hashes();
    status.observed_generation = cp.metadata.generation;

    let mut updater = StatusUpdater::new(&cp);
    *updater.status_mut() = status;
    if let Err(status_err) = updater.apply(&client).await {
        if result.is_err() {
            error!(
                namespace = %namespace,
                name = %name,
                error = %status_err,
                "Failed to persist status after reconcile error"
            );
        } else {
            return Err(status_err);
        }
    }

    let requeue = result?;
    debug!(
        namespace = %namespace,
        name = %name,
        requeue_secs = requeue.as_secs(),
        "OpenStackControlPlane reconciliation complete"
    );
    Ok(Action::requeue(requeue))
}

/// Seed the conditions, take the finalizer and the reservation, then run the plan.
///
/// The plan is built and every condition it evaluates is seeded before any
/// API call, so a failure before the steps run only rewrites `InputReady`.
async fn converge(ctx: &mut StepContext<'_>) -> Result<Duration> {
    let cp = ctx.control_plane;
    ctx.conditions.init(&[CONDITION_TYPE_INPUT_READY]);

    let plan = match build_plan() {
        Ok(plan) => plan,
        Err(e) => {
            let e = anyhow::Error::from(e);
            mark_input_error(ctx, "Failed to build reconcile plan", &e);
            return Err(e);
        }
    };
    let seeded: Vec<&str> = std::iter::once(CONDITION_TYPE_INPUT_READY)
        .chain(
            evaluated_condition_types(&plan, &ctx.spec)
                .into_iter()
                .filter(|t| *t != CONDITION_TYPE_INPUT_READY),
        )
        .collect();
    ctx.conditions.init(&seeded);

    match prepare(&ctx.client, cp).await {
        Ok(owner) => ctx.owner = owner,
        Err(e) => {
            mark_input_error(ctx, "Failed to prepare reconcile", &e);
            return Err(e);
        }
    }

    if let Err(e) = reservation::acquire(&ctx.client, cp).await {
        mark_input_error(ctx, "Namespace reservation failed", &e);
        return Err(e);
    }

    run_steps(&plan, ctx).await
}

async fn prepare(client: &Client, cp: &OpenStackControlPlane) -> Result<OwnerReference> {
    ensure_finalizer(client, cp, CONTROL_PLANE_FINALIZER).await?;
    controller_reference(cp)
}

fn mark_input_error(ctx: &mut StepContext<'_>, what: &str, e: &anyhow::Error) {
    warn!(namespace = %ctx.namespace, name = %ctx.name, error = %e, "{}", what);
    ctx.conditions.mark_false(
        CONDITION_TYPE_INPUT_READY,
        REASON_ERROR,
        Severity::Warning,
        service_error_message("Input", &e.to_string()),
    );
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
