// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ordered condition ledger.
//!
//! Every reconcile rebuilds the condition list from scratch: [`ConditionLedger::init`]
//! seeds each condition type the current spec evaluates as `Unknown`, steps set
//! their own entries, [`ConditionLedger::mirror`] derives the aggregate `Ready`
//! condition, and [`ConditionLedger::restore_last_transition_times`] carries the
//! previous transition times forward for every condition whose status did not
//! change. The result is persisted once per reconcile by
//! [`crate::reconcilers::status`].
//!
//! # Ready rollup
//!
//! `Ready` takes the worst not-true condition, ranked
//! `False/Error` > `False/Warning` > `False/Info` > `Unknown`, ties going to
//! the condition declared first. When every condition is `True`, `Ready` is
//! `True` with the message `Setup complete`.

use chrono::Utc;

use crate::crd::{Condition, ConditionStatus, Severity};
use crate::status_reasons::{
    CONDITION_TYPE_READY, MESSAGE_INIT, MESSAGE_SETUP_COMPLETE, REASON_INIT, REASON_READY,
};

/// Mutable set of conditions for one reconcile, diffed against the conditions
/// the resource carried on entry.
#[derive(Debug, Clone, Default)]
pub struct ConditionLedger {
    conditions: Vec<Condition>,
    snapshot: Vec<Condition>,
}

impl ConditionLedger {
    /// Start a ledger for a resource currently carrying `existing`.
    #[must_use]
    pub fn new(existing: &[Condition]) -> Self {
        Self {
            conditions: Vec::new(),
            snapshot: existing.to_vec(),
        }
    }

    /// Seed `types` as `Unknown/Init` in order, followed by `Ready`.
    pub fn init(&mut self, types: &[&str]) {
        self.conditions.clear();
        for t in types
            .iter()
            .copied()
            .filter(|t| *t != CONDITION_TYPE_READY)
            .chain(std::iter::once(CONDITION_TYPE_READY))
        {
            self.conditions.push(Condition {
                r#type: t.to_string(),
                status: ConditionStatus::Unknown,
                reason: REASON_INIT.to_string(),
                severity: None,
                message: MESSAGE_INIT.to_string(),
                last_transition_time: Some(Utc::now().to_rfc3339()),
            });
        }
    }

    /// Upsert by type. The transition time is kept when the status is unchanged.
    pub fn set(&mut self, mut condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            Some(existing) => {
                condition.last_transition_time = if existing.status == condition.status {
                    existing.last_transition_time.take()
                } else {
                    Some(Utc::now().to_rfc3339())
                };
                *existing = condition;
            }
            None => {
                condition.last_transition_time = Some(Utc::now().to_rfc3339());
                self.conditions.push(condition);
            }
        }
    }

    pub fn mark_true(&mut self, condition_type: &str, message: impl Into<String>) {
        self.set(Condition {
            r#type: condition_type.to_string(),
            status: ConditionStatus::True,
            reason: REASON_READY.to_string(),
            severity: None,
            message: message.into(),
            last_transition_time: None,
        });
    }

    pub fn mark_false(
        &mut self,
        condition_type: &str,
        reason: &str,
        severity: Severity,
        message: impl Into<String>,
    ) {
        self.set(Condition {
            r#type: condition_type.to_string(),
            status: ConditionStatus::False,
            reason: reason.to_string(),
            severity: Some(severity),
            message: message.into(),
            last_transition_time: None,
        });
    }

    pub fn mark_unknown(&mut self, condition_type: &str, reason: &str, message: impl Into<String>) {
        self.set(Condition {
            r#type: condition_type.to_string(),
            status: ConditionStatus::Unknown,
            reason: reason.to_string(),
            severity: None,
            message: message.into(),
            last_transition_time: None,
        });
    }

    pub fn remove(&mut self, condition_type: &str) {
        self.conditions.retain(|c| c.r#type != condition_type);
    }

    #[must_use]
    pub fn get(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    #[must_use]
    pub fn is_true(&self, condition_type: &str) -> bool {
        self.get(condition_type)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Derive the aggregate `ready_type` condition from every other condition.
    pub fn mirror(&mut self, ready_type: &str) {
        let worst = self
            .conditions
            .iter()
            .filter(|c| c.r#type != ready_type && c.status != ConditionStatus::True)
            .min_by_key(|c| severity_rank(c))
            .cloned();

        match worst {
            None => self.mark_true(ready_type, MESSAGE_SETUP_COMPLETE),
            Some(w) => self.set(Condition {
                r#type: ready_type.to_string(),
                status: w.status,
                reason: w.reason,
                severity: w.severity,
                message: w.message,
                last_transition_time: None,
            }),
        }
    }

    /// Carry transition times over from the entry snapshot for every condition
    /// whose status matches its previous status.
    pub fn restore_last_transition_times(&mut self) {
        for condition in &mut self.conditions {
            if let Some(previous) = self
                .snapshot
                .iter()
                .find(|p| p.r#type == condition.r#type && p.status == condition.status)
            {
                if previous.last_transition_time.is_some() {
                    condition
                        .last_transition_time
                        .clone_from(&previous.last_transition_time);
                }
            }
        }
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    #[must_use]
    pub fn into_conditions(self) -> Vec<Condition> {
        self.conditions
    }
}

fn severity_rank(condition: &Condition) -> u8 {
    match (condition.status, condition.severity) {
        (ConditionStatus::False, Some(Severity::Error)) => 0,
        (ConditionStatus::False, Some(Severity::Warning)) => 1,
        (ConditionStatus::False, _) => 2,
        _ => 3,
    }
}

#[cfg(test)]
#[path = "conditions_tests.rs"]
mod conditions_tests;
