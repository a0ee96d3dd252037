// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error classification and per-object error backoff.
//!
//! Reconcile steps never sleep. Transient collaborator errors propagate to the
//! controller's `error_policy`, which asks [`ErrorBackoff`] for an exponentially
//! growing requeue delay per object. The classifiers below let the synchronizer
//! tell optimistic-concurrency conflicts and immutable-field rejections apart
//! from everything else.

use rand::random_range;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::constants::{ERROR_REQUEUE_JITTER, ERROR_REQUEUE_MAX_SECS, ERROR_REQUEUE_MIN_SECS};

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: u32 = 2;

/// Category of a Kubernetes API failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    /// 404
    NotFound,
    /// 409 on update, or `AlreadyExists` on create
    Conflict,
    /// 422 / 403 rejecting a change to a field that cannot be updated in place
    ImmutableField,
    /// 429 or 5xx
    Transient,
    /// Anything else
    Other,
}

/// Classify an API status by code, reason and message.
///
/// A `422` is an immutable-field rejection when its message says the field is
/// immutable or the update is forbidden. A `403` only counts when the message
/// mentions immutability, so RBAC denials stay in [`ApiErrorClass::Other`].
#[must_use]
pub fn classify(code: u16, reason: &str, message: &str) -> ApiErrorClass {
    let message = message.to_ascii_lowercase();
    match code {
        404 => ApiErrorClass::NotFound,
        409 => ApiErrorClass::Conflict,
        422 if message.contains("immutable") || message.contains("forbidden") => {
            ApiErrorClass::ImmutableField
        }
        403 if reason == "Forbidden" && message.contains("immutable") => {
            ApiErrorClass::ImmutableField
        }
        429 | 500..=599 => ApiErrorClass::Transient,
        _ => ApiErrorClass::Other,
    }
}

/// Classify a `kube::Error`. Transport failures count as transient.
#[must_use]
pub fn classify_error(err: &kube::Error) -> ApiErrorClass {
    match err {
        kube::Error::Api(ae) => classify(ae.code, &ae.reason, &ae.message),
        kube::Error::Service(_) => ApiErrorClass::Transient,
        _ => ApiErrorClass::Other,
    }
}

#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    classify_error(err) == ApiErrorClass::NotFound
}

#[must_use]
pub fn is_conflict(err: &kube::Error) -> bool {
    classify_error(err) == ApiErrorClass::Conflict
}

#[must_use]
pub fn is_immutable_field_error(err: &kube::Error) -> bool {
    classify_error(err) == ApiErrorClass::ImmutableField
}

/// Delay before retry number `attempt` (1-based), without jitter.
#[must_use]
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(BACKOFF_MULTIPLIER.saturating_pow(exponent))
        .min(max)
}

/// Apply ±`factor` randomization to an interval.
#[must_use]
pub fn apply_jitter(interval: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return interval;
    }
    let secs = interval.as_secs_f64();
    let delta = secs * factor;
    Duration::from_secs_f64(random_range((secs - delta)..=(secs + delta)).max(0.0))
}

/// Per-object failure counters driving the controller's error requeue delay.
#[derive(Debug)]
pub struct ErrorBackoff {
    base: Duration,
    max: Duration,
    jitter: f64,
    failures: Mutex<HashMap<String, u32>>,
}

impl Default for ErrorBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(ERROR_REQUEUE_MIN_SECS),
            Duration::from_secs(ERROR_REQUEUE_MAX_SECS),
            ERROR_REQUEUE_JITTER,
        )
    }
}

impl ErrorBackoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            jitter,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Count a failure for `key` and return the delay before the next attempt.
    pub fn next_delay(&self, key: &str) -> Duration {
        let attempt = {
            let mut failures = self
                .failures
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let count = failures.entry(key.to_string()).or_insert(0);
            *count = count.saturating_add(1);
            *count
        };
        apply_jitter(backoff_delay(self.base, self.max, attempt), self.jitter).min(self.max)
    }

    /// Forget failures for `key` after a successful reconcile.
    pub fn reset(&self, key: &str) {
        self.failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
    }

    #[must_use]
    pub fn failures(&self, key: &str) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
