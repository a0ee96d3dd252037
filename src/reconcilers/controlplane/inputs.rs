// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The `inputs` step: the shared service secret must exist.

#![allow(clippy::wildcard_imports)]

use super::types::*;
use crate::constants::MISSING_INPUT_REQUEUE_SECS;
use crate::status_reasons::{
    input_waiting_message, CONDITION_TYPE_INPUT_READY, MESSAGE_INPUT_READY,
};

/// Hash register key of `spec.secret`
pub const INPUT_SECRET_HASH: &str = "input-secret";

/// Digest of a secret's data.
#[must_use]
pub fn secret_digest(secret: &Secret) -> String {
    let data: BTreeMap<&str, &[u8]> = secret
        .data
        .iter()
        .flatten()
        .map(|(k, v)| (k.as_str(), v.0.as_slice()))
        .collect();
    hash_of(&data)
}

pub struct InputsStep;

#[async_trait]
impl ServiceStep for InputsStep {
    fn name(&self) -> &'static str {
        "inputs"
    }

    fn dependencies(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE_INPUT_READY
    }

    fn display(&self) -> &'static str {
        "Input"
    }

    fn evaluates(&self, _spec: &OpenStackControlPlaneSpec) -> bool {
        true
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
        let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
        let Some(secret) = api.get_opt(&ctx.spec.secret).await? else {
            info!(
                namespace = %ctx.namespace,
                secret = %ctx.spec.secret,
                "Input secret not found"
            );
            ctx.conditions.mark_false(
                CONDITION_TYPE_INPUT_READY,
                REASON_REQUESTED,
                Severity::Info,
                input_waiting_message("secret", &ctx.spec.secret),
            );
            return Ok(StepOutcome::Waiting(Duration::from_secs(
                MISSING_INPUT_REQUEUE_SECS,
            )));
        };

        ctx.hashes.record(INPUT_SECRET_HASH, &secret_digest(&secret));
        ctx.conditions
            .mark_true(CONDITION_TYPE_INPUT_READY, MESSAGE_INPUT_READY);
        Ok(StepOutcome::Ready)
    }
}
