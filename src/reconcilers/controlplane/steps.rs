// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ordered service steps and the runner that drives them.
//!
//! A reconcile is a fixed list of named steps, each owning one condition.
//! Steps declare the steps they depend on; [`order_steps`] rejects unknown
//! names and cycles and keeps declaration order wherever dependencies allow.
//!
//! [`run_steps`] evaluates every step once:
//!
//! - A dependency is satisfied when it finished `Ready` or `Disabled`.
//! - A step with an unsatisfied dependency is not run. Its condition reports
//!   what it waits for and a short requeue is requested.
//! - A step the spec does not evaluate only cleans up, so it runs whatever
//!   the state of its dependencies.
//! - A failing step marks its condition `False/Error` and stops the pass.
//! - The requeue is the shortest one requested, or the ready interval when
//!   every step is done.

#![allow(clippy::wildcard_imports)]

use super::types::*;
use crate::constants::{DEPENDENCY_REQUEUE_SECS, PROGRESSING_REQUEUE_SECS};
use crate::errors::PlanError;
use crate::metrics;
use crate::status_reasons::{service_error_message, service_waiting_message};

/// Result of running one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Converged
    Ready,
    /// Children exist and are converging
    Progressing,
    /// Blocked on something outside the control plane; check again after the delay
    Waiting(Duration),
    /// Not requested by the spec; the step cleaned up after itself
    Disabled,
}

impl StepOutcome {
    /// Whether steps depending on this one may run.
    #[must_use]
    pub fn satisfies_dependents(self) -> bool {
        matches!(self, Self::Ready | Self::Disabled)
    }

    /// Requeue this outcome asks for, if any.
    #[must_use]
    pub fn requeue(self) -> Option<Duration> {
        match self {
            Self::Ready | Self::Disabled => None,
            Self::Progressing => Some(Duration::from_secs(PROGRESSING_REQUEUE_SECS)),
            Self::Waiting(after) => Some(after),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Progressing => "progressing",
            Self::Waiting(_) => "waiting",
            Self::Disabled => "disabled",
        }
    }
}

/// Everything a step reads and writes during one reconcile.
pub struct StepContext<'a> {
    pub client: Client,
    pub control_plane: &'a OpenStackControlPlane,
    /// Spec with defaults applied
    pub spec: OpenStackControlPlaneSpec,
    pub namespace: String,
    pub name: String,
    /// Controller reference for every child
    pub owner: OwnerReference,
    pub settings: &'a Settings,
    pub conditions: ConditionLedger,
    pub hashes: HashRegister,
    /// Working copy of the status; conditions and hashes are folded in at the end
    pub status: OpenStackControlPlaneStatus,
}

/// One named unit of convergence owning one condition.
#[async_trait]
pub trait ServiceStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Steps that must be `Ready` or `Disabled` before this one runs.
    fn dependencies(&self) -> Vec<&'static str>;

    fn condition_type(&self) -> &'static str;

    /// Name used in condition messages.
    fn display(&self) -> &'static str;

    /// Whether the step does anything for `spec`. Only evaluated steps get an
    /// initial condition.
    fn evaluates(&self, spec: &OpenStackControlPlaneSpec) -> bool;

    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome>;
}

/// Order `steps` so that every step follows its dependencies.
///
/// Among the steps that are ready to be placed, the one declared first wins,
/// so a plan already in dependency order comes back unchanged.
///
/// # Errors
///
/// Returns [`PlanError`] for duplicate names, unknown dependencies and cycles.
pub fn order_steps(
    steps: Vec<Box<dyn ServiceStep>>,
) -> Result<Vec<Box<dyn ServiceStep>>, PlanError> {
    let mut names = BTreeSet::new();
    for step in &steps {
        if !names.insert(step.name()) {
            return Err(PlanError::DuplicateStep(step.name().to_string()));
        }
    }
    for step in &steps {
        if let Some(unknown) = step.dependencies().into_iter().find(|d| !names.contains(d)) {
            return Err(PlanError::UnknownDependency {
                step: step.name().to_string(),
                dependency: unknown.to_string(),
            });
        }
    }

    let mut pending: Vec<Option<Box<dyn ServiceStep>>> = steps.into_iter().map(Some).collect();
    let mut placed: BTreeSet<&'static str> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(pending.len());

    while ordered.len() < pending.len() {
        let next = pending.iter().position(|slot| {
            slot.as_ref().is_some_and(|step| {
                step.dependencies().iter().all(|d| placed.contains(d))
            })
        });
        let Some(index) = next else {
            let stuck = pending
                .iter()
                .flatten()
                .map(|step| step.name().to_string())
                .collect();
            return Err(PlanError::Cycle(stuck));
        };
        if let Some(step) = pending[index].take() {
            placed.insert(step.name());
            ordered.push(step);
        }
    }

    Ok(ordered)
}

/// Condition types of the steps that evaluate `spec`, in plan order.
#[must_use]
pub fn evaluated_condition_types(
    steps: &[Box<dyn ServiceStep>],
    spec: &OpenStackControlPlaneSpec,
) -> Vec<&'static str> {
    steps
        .iter()
        .filter(|step| step.evaluates(spec))
        .map(|step| step.condition_type())
        .collect()
}

/// Run an ordered plan once and return the requeue it asks for.
///
/// # Errors
///
/// Returns the first step error, after marking that step's condition.
pub async fn run_steps(
    steps: &[Box<dyn ServiceStep>],
    ctx: &mut StepContext<'_>,
) -> Result<Duration> {
    let mut outcomes: BTreeMap<&'static str, StepOutcome> = BTreeMap::new();
    let mut requeue: Option<Duration> = None;

    for step in steps {
        let blocked: Vec<&str> = step
            .dependencies()
            .into_iter()
            .filter(|d| !outcomes.get(d).is_some_and(|o| o.satisfies_dependents()))
            .collect();

        let outcome = if blocked.is_empty() || !step.evaluates(&ctx.spec) {
            match step.run(ctx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        namespace = %ctx.namespace,
                        name = %ctx.name,
                        step = step.name(),
                        error = %e,
                        "Step failed"
                    );
                    ctx.conditions.mark_false(
                        step.condition_type(),
                        REASON_ERROR,
                        Severity::Warning,
                        service_error_message(step.display(), &e.to_string()),
                    );
                    metrics::record_step_outcome(step.name(), "error");
                    return Err(e);
                }
            }
        } else {
            debug!(
                namespace = %ctx.namespace,
                name = %ctx.name,
                step = step.name(),
                waiting_for = ?blocked,
                "Step blocked on dependencies"
            );
            ctx.conditions.mark_false(
                step.condition_type(),
                REASON_REQUESTED,
                Severity::Info,
                service_waiting_message(step.display(), &blocked),
            );
            StepOutcome::Waiting(Duration::from_secs(DEPENDENCY_REQUEUE_SECS))
        };

        if outcome == StepOutcome::Disabled {
            ctx.conditions.remove(step.condition_type());
        }
        if let Some(after) = outcome.requeue() {
            requeue = Some(requeue.map_or(after, |r| r.min(after)));
        }
        metrics::record_step_outcome(step.name(), outcome.label());
        outcomes.insert(step.name(), outcome);
    }

    Ok(requeue.unwrap_or(ctx.settings.ready_requeue))
}

#[cfg(test)]
#[path = "steps_tests.rs"]
mod steps_tests;
