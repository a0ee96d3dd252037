// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CA chain bootstrapping and trust bundle distribution.
//!
//! One self-signed root issuer signs a CA certificate per enabled trust
//! domain (public, internal, libvirt, ovn). Each CA gets a `CA` issuer that
//! service operators discover through the domain label. A domain can instead
//! name a custom issuer, which is labelled in place and whose CA secret is
//! read as is.
//!
//! Every CA, the user-supplied bundle and the operator's system bundle are
//! combined into the `combined-ca-bundle` secret, which is rewritten only when
//! its content hash moves.
//!
//! ## Module Structure
//!
//! - [`bundle`] - PEM parsing and trust bundle rendering
//! - [`issuers`] - cert-manager objects and the domain label hand-over

pub mod bundle;
pub mod issuers;

use anyhow::{bail, Context as _, Result};
use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::ByteString;
use kube::{Api, Client, Resource};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{
    CA_BUNDLE_KEY, CA_BUNDLE_SECRET_NAME, CA_CERT_KEY, DEPENDENCY_REQUEUE_SECS,
    INTERNAL_CA_BUNDLE_KEY, MISSING_INPUT_REQUEUE_SECS, TLS_CERT_KEY,
};
use crate::crd::{CaConfig, CaStatus, CertConfig, Severity, TlsSection, TlsStatus};
use crate::external::{Certificate, Issuer};
use crate::labels::{
    child_labels, CERT_RENEW_BEFORE_ANNOTATION, ROOTCA_INTERNAL_ISSUER_LABEL,
    ROOTCA_LIBVIRT_ISSUER_LABEL, ROOTCA_OVN_ISSUER_LABEL, ROOTCA_PUBLIC_ISSUER_LABEL,
};
use crate::reconcilers::hashes::{hash_of, HashRegister};
use crate::reconcilers::resources::{merge_metadata, upsert, ImmutablePolicy};
use crate::status_reasons::{ca_issuer_not_found_message, input_waiting_message, MESSAGE_CA_RUNNING};

use bundle::{parse_certificates, TrustBundle};
use issuers::{
    ca_certificate, ca_issuer, issuer_annotations, label_custom_issuer, selfsigned_issuer,
    strip_label_from_others,
};

/// Hash register key of the rendered trust bundle
pub const CA_BUNDLE_HASH: &str = "ca-bundle";

/// Service label value of the CA chain's objects
const CA_SERVICE: &str = "ca";

/// A trust domain with its own CA.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CaDomain {
    Public,
    Internal,
    Libvirt,
    Ovn,
}

impl CaDomain {
    /// Every domain, in the order CAs are issued.
    pub const ALL: [CaDomain; 4] = [Self::Public, Self::Internal, Self::Libvirt, Self::Ovn];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Libvirt => "libvirt",
            Self::Ovn => "ovn",
        }
    }

    /// Name of the CA certificate, its secret and its default issuer.
    #[must_use]
    pub fn ca_name(self) -> &'static str {
        match self {
            Self::Public => "rootca-public",
            Self::Internal => "rootca-internal",
            Self::Libvirt => "rootca-libvirt",
            Self::Ovn => "rootca-ovn",
        }
    }

    /// Label marking the issuer service operators use for this domain.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Public => ROOTCA_PUBLIC_ISSUER_LABEL,
            Self::Internal => ROOTCA_INTERNAL_ISSUER_LABEL,
            Self::Libvirt => ROOTCA_LIBVIRT_ISSUER_LABEL,
            Self::Ovn => ROOTCA_OVN_ISSUER_LABEL,
        }
    }

    #[must_use]
    pub fn is_enabled(self, tls: &TlsSection) -> bool {
        match self {
            Self::Public => tls.ingress.enabled,
            Self::Internal | Self::Libvirt | Self::Ovn => tls.pod_level.enabled,
        }
    }

    #[must_use]
    pub fn ca_config(self, tls: &TlsSection) -> &CaConfig {
        match self {
            Self::Public => &tls.ingress.ca,
            Self::Internal => &tls.pod_level.internal.ca,
            Self::Libvirt => &tls.pod_level.libvirt.ca,
            Self::Ovn => &tls.pod_level.ovn.ca,
        }
    }

    #[must_use]
    pub fn cert_config(self, tls: &TlsSection) -> &CertConfig {
        match self {
            Self::Public => &tls.ingress.cert,
            Self::Internal => &tls.pod_level.internal.cert,
            Self::Libvirt => &tls.pod_level.libvirt.cert,
            Self::Ovn => &tls.pod_level.ovn.cert,
        }
    }

    /// Custom issuer name, when one is configured.
    #[must_use]
    pub fn custom_issuer(self, tls: &TlsSection) -> Option<&str> {
        self.ca_config(tls)
            .custom_issuer
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    /// Enabled domains of `tls`, in issue order.
    #[must_use]
    pub fn enabled(tls: &TlsSection) -> Vec<CaDomain> {
        Self::ALL
            .into_iter()
            .filter(|domain| domain.is_enabled(tls))
            .collect()
    }
}

impl fmt::Display for CaDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the CA chain stands after one pass.
#[derive(Debug, Clone, PartialEq)]
pub enum CaProgress {
    /// No domain is enabled
    Disabled,
    /// A member is not issued yet
    Waiting {
        severity: Severity,
        message: String,
        after: Duration,
    },
    /// Every CA is issued and the bundle is written
    Ready(TlsStatus),
}

impl CaProgress {
    fn waiting(severity: Severity, message: impl Into<String>, after_secs: u64) -> Self {
        Self::Waiting {
            severity,
            message: message.into(),
            after: Duration::from_secs(after_secs),
        }
    }
}

/// Inputs of one CA chain pass.
#[derive(Clone, Copy)]
pub struct CaRequest<'a> {
    pub client: &'a Client,
    pub namespace: &'a str,
    /// Owner of every object the chain creates
    pub owner: &'a OwnerReference,
    pub tls: &'a TlsSection,
    /// Operator image trust store, skipped when absent
    pub system_bundle: Option<&'a Path>,
}

enum DomainCa {
    Issued(Vec<u8>),
    Pending(CaProgress),
}

/// Drive the CA chain one step further and refresh the trust bundle.
///
/// Records [`CA_BUNDLE_HASH`] in `hashes` once the bundle is written, and
/// drops it when every domain is disabled.
///
/// # Errors
///
/// Returns an error on any API failure and when CA material cannot be parsed.
pub async fn reconcile_cas(req: &CaRequest<'_>, hashes: &mut HashRegister) -> Result<CaProgress> {
    let domains = CaDomain::enabled(req.tls);
    if domains.is_empty() {
        debug!(namespace = %req.namespace, "No TLS domain enabled, skipping CA chain");
        hashes.remove(CA_BUNDLE_HASH);
        return Ok(CaProgress::Disabled);
    }

    let issuer_api: Api<Issuer> = Api::namespaced(req.client.clone(), req.namespace);
    let secret_api: Api<Secret> = Api::namespaced(req.client.clone(), req.namespace);

    let desired = selfsigned_issuer(req.namespace, req.owner);
    let (_, root) = upsert(&issuer_api, desired.clone(), ImmutablePolicy::Fail, |live| {
        live.spec = desired.spec.clone();
        merge_metadata(live.meta_mut(), desired.meta());
        Ok(())
    })
    .await?;
    if !root.as_ref().is_some_and(Issuer::is_ready) {
        info!(namespace = %req.namespace, "Self-signed issuer not ready yet");
        return Ok(CaProgress::waiting(
            Severity::Info,
            MESSAGE_CA_RUNNING,
            DEPENDENCY_REQUEUE_SECS,
        ));
    }

    let now = Utc::now();
    let mut full = TrustBundle::new();
    let mut chain = TrustBundle::new();

    if let Some(existing) = secret_api.get_opt(CA_BUNDLE_SECRET_NAME).await? {
        carry_over(&existing, CA_BUNDLE_KEY, &mut full, now);
        carry_over(&existing, INTERNAL_CA_BUNDLE_KEY, &mut chain, now);
    }

    let mut ca_list = Vec::new();
    for domain in domains {
        let pem = match domain.custom_issuer(req.tls) {
            Some(issuer) => custom_domain_ca(req, &issuer_api, &secret_api, domain, issuer).await?,
            None => default_domain_ca(req, &issuer_api, &secret_api, domain).await?,
        };
        let pem = match pem {
            DomainCa::Issued(pem) => pem,
            DomainCa::Pending(progress) => return Ok(progress),
        };

        for cert in parse_certificates(domain.ca_name(), &pem)? {
            ca_list.push(CaStatus {
                name: if cert.common_name.is_empty() {
                    domain.ca_name().to_string()
                } else {
                    cert.common_name.clone()
                },
                expires: cert.not_after.to_rfc3339_opts(SecondsFormat::Secs, true),
            });
            chain.add(cert.clone(), now);
            full.add(cert, now);
        }
    }

    if let Some(user_bundle) = req
        .tls
        .ca_bundle_secret_name
        .as_deref()
        .filter(|name| !name.is_empty())
    {
        let Some(secret) = secret_api.get_opt(user_bundle).await? else {
            info!(namespace = %req.namespace, secret = %user_bundle, "CA bundle secret not found");
            return Ok(CaProgress::waiting(
                Severity::Info,
                input_waiting_message("secret", user_bundle),
                MISSING_INPUT_REQUEUE_SECS,
            ));
        };
        for (key, value) in secret.data.iter().flatten() {
            full.add_pem(&format!("{user_bundle}/{key}"), &value.0, now)?;
        }
    }

    if let Some(path) = req.system_bundle {
        match tokio::fs::read(path).await {
            Ok(data) => {
                full.add_pem(&path.display().to_string(), &data, now)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "System CA bundle not found, skipping");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        }
    }

    write_bundle(req, &secret_api, &full, &chain, hashes).await?;

    Ok(CaProgress::Ready(TlsStatus {
        ca_list,
        ca_bundle_secret_name: Some(CA_BUNDLE_SECRET_NAME.to_string()),
    }))
}

/// Keep the unexpired certificates of the previous bundle, so a rotated CA
/// stays trusted until it expires.
fn carry_over(secret: &Secret, key: &str, bundle: &mut TrustBundle, now: chrono::DateTime<Utc>) {
    let Some(data) = secret.data.as_ref().and_then(|d| d.get(key)) else {
        return;
    };
    if let Err(e) = bundle.add_pem(CA_BUNDLE_SECRET_NAME, &data.0, now) {
        warn!(key = %key, error = %e, "Ignoring unreadable previous CA bundle");
    }
}

async fn secret_value(
    api: &Api<Secret>,
    name: &str,
    keys: &[&str],
) -> Result<Option<Vec<u8>>> {
    let Some(secret) = api.get_opt(name).await? else {
        return Ok(None);
    };
    let data = secret.data.unwrap_or_default();
    Ok(keys
        .iter()
        .find_map(|key| data.get(*key))
        .map(|value| value.0.clone()))
}

async fn custom_domain_ca(
    req: &CaRequest<'_>,
    issuer_api: &Api<Issuer>,
    secret_api: &Api<Secret>,
    domain: CaDomain,
    issuer_name: &str,
) -> Result<DomainCa> {
    let Some(issuer) = issuer_api.get_opt(issuer_name).await? else {
        warn!(
            namespace = %req.namespace,
            domain = %domain,
            issuer = %issuer_name,
            "Custom CA issuer not found"
        );
        return Ok(DomainCa::Pending(CaProgress::waiting(
            Severity::Warning,
            ca_issuer_not_found_message(domain.name(), issuer_name),
            MISSING_INPUT_REQUEUE_SECS,
        )));
    };

    let Some(secret_name) = issuer.ca_secret_name() else {
        bail!("issuer {issuer_name} is not a CA issuer");
    };

    strip_label_from_others(issuer_api, domain.label(), issuer_name).await?;
    label_custom_issuer(
        issuer_api,
        &issuer,
        domain.label(),
        &issuer_annotations(domain.cert_config(req.tls)),
    )
    .await?;

    match secret_value(secret_api, secret_name, &[CA_CERT_KEY, TLS_CERT_KEY]).await? {
        Some(pem) => Ok(DomainCa::Issued(pem)),
        None => Ok(DomainCa::Pending(CaProgress::waiting(
            Severity::Info,
            MESSAGE_CA_RUNNING,
            DEPENDENCY_REQUEUE_SECS,
        ))),
    }
}

async fn default_domain_ca(
    req: &CaRequest<'_>,
    issuer_api: &Api<Issuer>,
    secret_api: &Api<Secret>,
    domain: CaDomain,
) -> Result<DomainCa> {
    let ca = domain.ca_config(req.tls);
    let certificate = ca_certificate(
        domain,
        ca.duration(),
        ca.renew_before.as_deref().filter(|r| !r.is_empty()),
        req.namespace,
        req.owner,
    );
    let cert_api: Api<Certificate> = Api::namespaced(req.client.clone(), req.namespace);
    upsert(&cert_api, certificate.clone(), ImmutablePolicy::Fail, |live| {
        live.spec = certificate.spec.clone();
        merge_metadata(live.meta_mut(), certificate.meta());
        Ok(())
    })
    .await?;

    let Some(pem) = secret_value(secret_api, domain.ca_name(), &[TLS_CERT_KEY, CA_CERT_KEY]).await?
    else {
        debug!(domain = %domain, "CA secret not issued yet");
        return Ok(DomainCa::Pending(CaProgress::waiting(
            Severity::Info,
            MESSAGE_CA_RUNNING,
            DEPENDENCY_REQUEUE_SECS,
        )));
    };

    strip_label_from_others(issuer_api, domain.label(), domain.ca_name()).await?;

    let desired = ca_issuer(domain, domain.cert_config(req.tls), req.namespace, req.owner);
    let keeps_renew_before = desired
        .meta()
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(CERT_RENEW_BEFORE_ANNOTATION));
    upsert(issuer_api, desired.clone(), ImmutablePolicy::Fail, |live| {
        live.spec = desired.spec.clone();
        if !keeps_renew_before {
            if let Some(annotations) = live.meta_mut().annotations.as_mut() {
                annotations.remove(CERT_RENEW_BEFORE_ANNOTATION);
            }
        }
        merge_metadata(live.meta_mut(), desired.meta());
        Ok(())
    })
    .await?;

    Ok(DomainCa::Issued(pem))
}

async fn write_bundle(
    req: &CaRequest<'_>,
    secret_api: &Api<Secret>,
    full: &TrustBundle,
    chain: &TrustBundle,
    hashes: &mut HashRegister,
) -> Result<()> {
    let full_pem = full.to_pem();
    let chain_pem = chain.to_pem();
    let digest = hash_of(&BTreeMap::from([
        (CA_BUNDLE_KEY, full_pem.as_str()),
        (INTERNAL_CA_BUNDLE_KEY, chain_pem.as_str()),
    ]));

    let present = secret_api.get_opt(CA_BUNDLE_SECRET_NAME).await?.is_some();
    if present && !hashes.changed(CA_BUNDLE_HASH, &digest) {
        debug!(namespace = %req.namespace, "Trust bundle unchanged");
        hashes.record(CA_BUNDLE_HASH, &digest);
        return Ok(());
    }

    let desired = Secret {
        metadata: ObjectMeta {
            name: Some(CA_BUNDLE_SECRET_NAME.to_string()),
            namespace: Some(req.namespace.to_string()),
            labels: Some(child_labels(&req.owner.name, CA_SERVICE)),
            owner_references: Some(vec![req.owner.clone()]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (CA_BUNDLE_KEY.to_string(), ByteString(full_pem.into_bytes())),
            (
                INTERNAL_CA_BUNDLE_KEY.to_string(),
                ByteString(chain_pem.into_bytes()),
            ),
        ])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };
    upsert(secret_api, desired.clone(), ImmutablePolicy::Fail, |live| {
        live.data.clone_from(&desired.data);
        merge_metadata(live.meta_mut(), desired.meta());
        Ok(())
    })
    .await?;

    info!(
        namespace = %req.namespace,
        certificates = full.len(),
        "Wrote trust bundle"
    );
    hashes.record(CA_BUNDLE_HASH, &digest);
    Ok(())
}
