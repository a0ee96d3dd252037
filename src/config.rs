// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command line and environment configuration of the operator process.
//!
//! Every flag can also be set through the environment variable named in its
//! help text, so the same binary runs unchanged under a Deployment manifest.
//!
//! ```text
//! ctlplane --metrics-port 8080 --lease-namespace openstack-operators
//! ctlplane completions bash > /etc/bash_completion.d/ctlplane
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_GRACE_SECS, DEFAULT_LEASE_NAME,
    DEFAULT_READY_REQUEUE_SECS, DEFAULT_SYSTEM_CA_BUNDLE,
};

/// OpenStack control plane operator
#[derive(Parser, Debug, Clone)]
#[command(name = "ctlplane", version, about, long_about = None)]
pub struct Cli {
    /// Port serving /metrics, /healthz and the admission webhook
    #[arg(long, env = "METRICS_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub metrics_port: u16,

    /// Only run controllers while holding the leader lease
    #[arg(
        long,
        env = "ENABLE_LEADER_ELECTION",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub leader_election: bool,

    /// Name of the leader election lease
    #[arg(long, env = "LEASE_NAME", default_value = DEFAULT_LEASE_NAME)]
    pub lease_name: String,

    /// Namespace of the leader election lease
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    pub lease_namespace: String,

    /// Holder identity written to the lease. Defaults to the hostname.
    #[arg(long, env = "POD_NAME")]
    pub identity: Option<String>,

    /// Lease duration in seconds
    #[arg(long, env = "LEASE_DURATION_SECONDS", default_value_t = DEFAULT_LEASE_DURATION_SECS)]
    pub lease_duration_secs: u64,

    /// Grace period in seconds before the lease is renewed
    #[arg(long, env = "LEASE_GRACE_SECONDS", default_value_t = DEFAULT_LEASE_GRACE_SECS)]
    pub lease_grace_secs: u64,

    /// System trust bundle appended to the generated CA bundle
    #[arg(long, env = "SYSTEM_CA_BUNDLE", default_value = DEFAULT_SYSTEM_CA_BUNDLE)]
    pub system_ca_bundle: PathBuf,

    /// Requeue interval once a control plane is fully ready
    #[arg(long, env = "READY_REQUEUE_SECONDS", default_value_t = DEFAULT_READY_REQUEUE_SECS)]
    pub ready_requeue_secs: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print shell completions and exit
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Lease holder identity, falling back to `HOSTNAME`.
    #[must_use]
    pub fn identity(&self) -> String {
        self.identity
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "ctlplane-operator".to_string())
    }

    /// Settings handed to the reconcilers.
    #[must_use]
    pub fn settings(&self) -> Settings {
        Settings {
            ready_requeue: Duration::from_secs(self.ready_requeue_secs),
            system_ca_bundle: Some(self.system_ca_bundle.clone()),
        }
    }
}

/// Write completions for `shell` to `out`.
pub fn write_completions(shell: Shell, out: &mut dyn std::io::Write) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, out);
}

/// Reconciler settings derived from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Requeue interval when every step is ready
    pub ready_requeue: Duration,
    /// System trust bundle; `None` skips it
    pub system_ca_bundle: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ready_requeue: Duration::from_secs(DEFAULT_READY_REQUEUE_SECS),
            system_ca_bundle: Some(PathBuf::from(DEFAULT_SYSTEM_CA_BUNDLE)),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
