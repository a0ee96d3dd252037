// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! cert-manager objects of the CA chain and the domain label hand-over.
//!
//! Each trust domain is discoverable through a label on exactly one issuer.
//! Moving the label to a new issuer always strips it from every other issuer
//! first, so no observer ever sees two issuers holding it.

use anyhow::Result;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, ResourceExt};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::info;

use crate::constants::{CA_KEY_SIZE, FIELD_MANAGER, SELFSIGNED_ISSUER_NAME};
use crate::crd::CertConfig;
use crate::external::{
    CaIssuer, Certificate, CertificateSpec, Issuer, IssuerRef, IssuerSpec, PrivateKey,
    SelfSignedIssuer,
};
use crate::labels::{CERT_DURATION_ANNOTATION, CERT_RENEW_BEFORE_ANNOTATION};

use super::CaDomain;

const CERT_MANAGER_GROUP: &str = "cert-manager.io";

fn metadata(
    name: &str,
    namespace: &str,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    owner: &OwnerReference,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: (!labels.is_empty()).then_some(labels),
        annotations: (!annotations.is_empty()).then_some(annotations),
        owner_references: Some(vec![owner.clone()]),
        ..Default::default()
    }
}

/// The root issuer every default CA certificate is signed by.
#[must_use]
pub fn selfsigned_issuer(namespace: &str, owner: &OwnerReference) -> Issuer {
    Issuer {
        metadata: metadata(
            SELFSIGNED_ISSUER_NAME,
            namespace,
            BTreeMap::new(),
            BTreeMap::new(),
            owner,
        ),
        spec: IssuerSpec {
            self_signed: Some(SelfSignedIssuer {}),
            ca: None,
        },
        status: None,
    }
}

/// CA certificate backing the default issuer of `domain`.
#[must_use]
pub fn ca_certificate(
    domain: CaDomain,
    duration: &str,
    renew_before: Option<&str>,
    namespace: &str,
    owner: &OwnerReference,
) -> Certificate {
    let name = domain.ca_name();
    Certificate {
        metadata: metadata(name, namespace, BTreeMap::new(), BTreeMap::new(), owner),
        spec: CertificateSpec {
            is_ca: true,
            common_name: name.to_string(),
            secret_name: name.to_string(),
            duration: Some(duration.to_string()),
            renew_before: renew_before.map(str::to_string),
            private_key: Some(PrivateKey {
                algorithm: "RSA".to_string(),
                size: CA_KEY_SIZE,
            }),
            issuer_ref: IssuerRef {
                name: SELFSIGNED_ISSUER_NAME.to_string(),
                kind: "Issuer".to_string(),
                group: CERT_MANAGER_GROUP.to_string(),
            },
        },
        status: None,
    }
}

/// Annotations telling service operators how long their leaf certificates live.
#[must_use]
pub fn issuer_annotations(cert: &CertConfig) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::from([(
        CERT_DURATION_ANNOTATION.to_string(),
        cert.duration().to_string(),
    )]);
    if let Some(renew_before) = cert.renew_before.as_deref().filter(|r| !r.is_empty()) {
        annotations.insert(
            CERT_RENEW_BEFORE_ANNOTATION.to_string(),
            renew_before.to_string(),
        );
    }
    annotations
}

/// Default CA issuer of `domain`, bound to the secret of its CA certificate.
#[must_use]
pub fn ca_issuer(
    domain: CaDomain,
    cert: &CertConfig,
    namespace: &str,
    owner: &OwnerReference,
) -> Issuer {
    let name = domain.ca_name();
    Issuer {
        metadata: metadata(
            name,
            namespace,
            BTreeMap::from([(domain.label().to_string(), String::new())]),
            issuer_annotations(cert),
            owner,
        ),
        spec: IssuerSpec {
            self_signed: None,
            ca: Some(CaIssuer {
                secret_name: name.to_string(),
            }),
        },
        status: None,
    }
}

/// Which issuers lose a domain label and whether the target still needs it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMove {
    /// Issuers to strip the label from, in name order
    pub strip: Vec<String>,
    /// The target, when it does not hold the label yet
    pub add: Option<String>,
}

/// Plan moving `label` onto `target`, given every issuer that holds it now.
#[must_use]
pub fn plan_label_move(labeled: &[Issuer], label: &str, target: &str) -> LabelMove {
    let holders: Vec<String> = labeled
        .iter()
        .filter(|issuer| issuer.labels().contains_key(label))
        .map(ResourceExt::name_any)
        .collect();

    let mut strip: Vec<String> = holders
        .iter()
        .filter(|name| name.as_str() != target)
        .cloned()
        .collect();
    strip.sort();

    LabelMove {
        strip,
        add: (!holders.iter().any(|name| name == target)).then(|| target.to_string()),
    }
}

fn patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

/// Strip `label` from every issuer that holds it, except `target`.
///
/// Returns the plan that was carried out; the caller adds the label to the
/// target afterwards.
///
/// # Errors
///
/// Returns an error if listing or patching issuers fails.
pub async fn strip_label_from_others(
    api: &Api<Issuer>,
    label: &str,
    target: &str,
) -> Result<LabelMove> {
    let labeled = api.list(&ListParams::default().labels(label)).await?.items;
    let plan = plan_label_move(&labeled, label, target);

    for name in &plan.strip {
        info!(issuer = %name, label = %label, "Removing CA label from superseded issuer");
        let patch = json!({ "metadata": { "labels": { label: Value::Null } } });
        api.patch(name, &patch_params(), &Patch::Merge(&patch))
            .await?;
    }
    Ok(plan)
}

/// Put `label` and `annotations` on a user-supplied issuer, patching only what differs.
///
/// # Errors
///
/// Returns an error if the patch fails.
pub async fn label_custom_issuer(
    api: &Api<Issuer>,
    issuer: &Issuer,
    label: &str,
    annotations: &BTreeMap<String, String>,
) -> Result<()> {
    let mut labels = Map::new();
    if !issuer.labels().contains_key(label) {
        labels.insert(label.to_string(), Value::String(String::new()));
    }
    let changed_annotations: Map<String, Value> = annotations
        .iter()
        .filter(|(k, v)| issuer.annotations().get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    if labels.is_empty() && changed_annotations.is_empty() {
        return Ok(());
    }

    let name = issuer.name_any();
    info!(issuer = %name, label = %label, "Labelling custom CA issuer");
    let patch = json!({
        "metadata": {
            "labels": labels,
            "annotations": changed_annotations
        }
    });
    api.patch(&name, &patch_params(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "issuers_tests.rs"]
mod issuers_tests;
