// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `steps.rs`

#[cfg(test)]
mod tests {
    use super::super::{order_steps, run_steps, ServiceStep, StepContext, StepOutcome};
    use crate::config::Settings;
    use crate::crd::{ConditionStatus, OpenStackControlPlane, OpenStackControlPlaneSpec, Severity};
    use crate::errors::PlanError;
    use crate::reconcilers::conditions::ConditionLedger;
    use crate::reconcilers::hashes::HashRegister;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::Client;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct FakeStep {
        name: &'static str,
        dependencies: Vec<&'static str>,
        outcome: Option<StepOutcome>,
        evaluates: bool,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ServiceStep for FakeStep {
        fn name(&self) -> &'static str {
            self.name
        }

        fn dependencies(&self) -> Vec<&'static str> {
            self.dependencies.clone()
        }

        fn condition_type(&self) -> &'static str {
            self.name
        }

        fn display(&self) -> &'static str {
            self.name
        }

        fn evaluates(&self, _spec: &OpenStackControlPlaneSpec) -> bool {
            self.evaluates
        }

        async fn run(&self, _ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.outcome.ok_or_else(|| anyhow!("boom"))
        }
    }

    fn step(
        name: &'static str,
        dependencies: &[&'static str],
        outcome: Option<StepOutcome>,
    ) -> (Box<dyn ServiceStep>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let step = FakeStep {
            name,
            dependencies: dependencies.to_vec(),
            outcome,
            evaluates: true,
            runs: runs.clone(),
        };
        (Box::new(step), runs)
    }

    fn names(steps: &[Box<dyn ServiceStep>]) -> Vec<&'static str> {
        steps.iter().map(|s| s.name()).collect()
    }

    fn client() -> Client {
        let config = kube::Config::new("http://127.0.0.1:1".parse().expect("valid uri"));
        Client::try_from(config).expect("client")
    }

    fn context<'a>(
        cp: &'a OpenStackControlPlane,
        settings: &'a Settings,
        types: &[&str],
    ) -> StepContext<'a> {
        let mut conditions = ConditionLedger::new(&[]);
        conditions.init(types);
        StepContext {
            client: client(),
            control_plane: cp,
            spec: cp.spec.clone(),
            namespace: "openstack".to_string(),
            name: "openstack".to_string(),
            owner: OwnerReference::default(),
            settings,
            conditions,
            hashes: HashRegister::default(),
            status: Default::default(),
        }
    }

    #[test]
    fn test_order_keeps_declaration_order() {
        let plan = vec![
            step("inputs", &[], None).0,
            step("galera", &["inputs"], None).0,
            step("keystone", &["inputs", "galera"], None).0,
        ];
        let ordered = order_steps(plan).expect("valid plan");
        assert_eq!(names(&ordered), vec!["inputs", "galera", "keystone"]);
    }

    #[test]
    fn test_order_moves_dependencies_first() {
        let plan = vec![
            step("keystone", &["galera"], None).0,
            step("memcached", &[], None).0,
            step("galera", &[], None).0,
        ];
        let ordered = order_steps(plan).expect("valid plan");
        assert_eq!(names(&ordered), vec!["memcached", "galera", "keystone"]);
    }

    #[test]
    fn test_order_rejects_unknown_dependency() {
        let plan = vec![step("keystone", &["galera"], None).0];
        assert_eq!(
            order_steps(plan).err(),
            Some(PlanError::UnknownDependency {
                step: "keystone".to_string(),
                dependency: "galera".to_string(),
            })
        );
    }

    #[test]
    fn test_order_rejects_cycles_and_duplicates() {
        let plan = vec![
            step("inputs", &[], None).0,
            step("a", &["b"], None).0,
            step("b", &["a"], None).0,
        ];
        assert_eq!(
            order_steps(plan).err(),
            Some(PlanError::Cycle(vec!["a".to_string(), "b".to_string()]))
        );

        let plan = vec![step("a", &[], None).0, step("a", &[], None).0];
        assert_eq!(
            order_steps(plan).err(),
            Some(PlanError::DuplicateStep("a".to_string()))
        );
    }

    #[tokio::test]
    async fn test_all_ready_requeues_at_ready_interval() {
        let cp = OpenStackControlPlane::new("openstack", OpenStackControlPlaneSpec::default());
        let settings = Settings::default();
        let plan = vec![
            step("a", &[], Some(StepOutcome::Ready)).0,
            step("b", &["a"], Some(StepOutcome::Disabled)).0,
            step("c", &["b"], Some(StepOutcome::Ready)).0,
        ];
        let mut ctx = context(&cp, &settings, &["a", "b", "c"]);

        let requeue = run_steps(&plan, &mut ctx).await.expect("no errors");

        assert_eq!(requeue, settings.ready_requeue);
        assert!(ctx.conditions.get("b").is_none(), "disabled step drops its condition");
    }

    #[tokio::test]
    async fn test_blocked_step_is_not_run() {
        let cp = OpenStackControlPlane::new("openstack", OpenStackControlPlaneSpec::default());
        let settings = Settings::default();
        let (galera, _) = step("galera", &[], Some(StepOutcome::Progressing));
        let (memcached, _) = step("memcached", &[], Some(StepOutcome::Waiting(Duration::from_secs(3))));
        let (keystone, keystone_runs) =
            step("keystone", &["galera", "memcached"], Some(StepOutcome::Ready));
        let plan = vec![galera, memcached, keystone];
        let mut ctx = context(&cp, &settings, &["galera", "memcached", "keystone"]);

        let requeue = run_steps(&plan, &mut ctx).await.expect("no errors");

        assert_eq!(requeue, Duration::from_secs(3));
        assert_eq!(keystone_runs.load(Ordering::SeqCst), 0);
        let condition = ctx.conditions.get("keystone").expect("condition");
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.severity, Some(Severity::Info));
        assert_eq!(
            condition.message,
            "OpenStackControlPlane keystone waiting for galera, memcached"
        );
    }

    #[tokio::test]
    async fn test_step_error_aborts_pass() {
        let cp = OpenStackControlPlane::new("openstack", OpenStackControlPlaneSpec::default());
        let settings = Settings::default();
        let (inputs, _) = step("inputs", &[], None);
        let (independent, independent_runs) = step("independent", &[], Some(StepOutcome::Ready));
        let plan = vec![inputs, independent];
        let mut ctx = context(&cp, &settings, &["inputs", "independent"]);

        let err = run_steps(&plan, &mut ctx).await.expect_err("step fails");

        assert_eq!(err.to_string(), "boom");
        assert_eq!(independent_runs.load(Ordering::SeqCst), 0);
        let condition = ctx.conditions.get("inputs").expect("condition");
        assert_eq!(condition.reason, "Error");
        assert_eq!(condition.severity, Some(Severity::Warning));
        assert_eq!(condition.message, "OpenStackControlPlane inputs error occurred boom");
    }

    #[test]
    fn test_outcome_requeues() {
        assert_eq!(StepOutcome::Ready.requeue(), None);
        assert_eq!(StepOutcome::Disabled.requeue(), None);
        assert_eq!(StepOutcome::Progressing.requeue(), Some(Duration::from_secs(10)));
        assert!(StepOutcome::Disabled.satisfies_dependents());
        assert!(!StepOutcome::Progressing.satisfies_dependents());
    }

    #[tokio::test]
    async fn test_disabled_step_cleans_up_while_dependency_waits() {
        let cp = OpenStackControlPlane::new("openstack", OpenStackControlPlaneSpec::default());
        let settings = Settings::default();
        let (galera, _) = step("galera", &[], Some(StepOutcome::Progressing));
        let runs = Arc::new(AtomicUsize::new(0));
        let nova = Box::new(FakeStep {
            name: "nova",
            dependencies: vec!["galera"],
            outcome: Some(StepOutcome::Disabled),
            evaluates: false,
            runs: runs.clone(),
        });
        let plan: Vec<Box<dyn ServiceStep>> = vec![galera, nova];
        let mut ctx = context(&cp, &settings, &["galera"]);

        let requeue = run_steps(&plan, &mut ctx).await.expect("no errors");

        assert_eq!(requeue, Duration::from_secs(10));
        assert_eq!(runs.load(Ordering::SeqCst), 1, "cleanup runs despite galera");
        assert!(ctx.conditions.get("nova").is_none());
    }
}
