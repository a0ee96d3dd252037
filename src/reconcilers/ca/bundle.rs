// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Trust bundle assembly.
//!
//! A [`TrustBundle`] is an ordered, de-duplicated set of CA certificates.
//! Certificates are identified by the SHA-256 fingerprint of their DER
//! encoding, so the same CA reached through several sources appears once, in
//! the position it was first seen. Expired certificates are dropped on the way
//! in. Every PEM block must be a `CERTIFICATE`; anything else rejects the
//! whole source.
//!
//! The rendered bundle precedes each certificate with a `# <CN>` comment line:
//!
//! ```text
//! # rootca-public
//! -----BEGIN CERTIFICATE-----
//! MIIB...
//! -----END CERTIFICATE-----
//! ```

use chrono::{DateTime, Utc};
use ::pem::{EncodeConfig, LineEnding, Pem};
use sha2::{Digest, Sha256};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::errors::BundleError;

const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// One parsed CA certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaCertificate {
    /// Hex SHA-256 of the DER encoding
    pub fingerprint: String,
    /// Subject common name, or empty when the subject has none
    pub common_name: String,
    pub not_after: DateTime<Utc>,
    pub der: Vec<u8>,
}

impl CaCertificate {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.not_after <= now
    }
}

/// Parse every certificate in `data`.
///
/// `source_name` only labels errors.
///
/// # Errors
///
/// Returns [`BundleError::Pem`] for malformed PEM or a non-certificate block,
/// and [`BundleError::Certificate`] when a block is not valid X.509.
pub fn parse_certificates(
    source_name: &str,
    data: &[u8],
) -> Result<Vec<CaCertificate>, BundleError> {
    let blocks = ::pem::parse_many(data).map_err(|e| BundleError::Pem {
        source_name: source_name.to_string(),
        reason: e.to_string(),
    })?;

    blocks
        .iter()
        .map(|block| {
            if block.tag() != CERTIFICATE_TAG {
                return Err(BundleError::Pem {
                    source_name: source_name.to_string(),
                    reason: format!(
                        "only {CERTIFICATE_TAG} blocks are permitted, found '{}'",
                        block.tag()
                    ),
                });
            }
            parse_der(source_name, block.contents())
        })
        .collect()
}

fn parse_der(source_name: &str, der: &[u8]) -> Result<CaCertificate, BundleError> {
    let invalid = |reason: String| BundleError::Certificate {
        source_name: source_name.to_string(),
        reason,
    };

    let (_, cert) = X509Certificate::from_der(der).map_err(|e| invalid(e.to_string()))?;

    let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| invalid("expiry out of range".to_string()))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();

    Ok(CaCertificate {
        fingerprint: format!("{:x}", Sha256::digest(der)),
        common_name,
        not_after,
        der: der.to_vec(),
    })
}

/// Ordered, de-duplicated set of unexpired CA certificates.
#[derive(Debug, Clone, Default)]
pub struct TrustBundle {
    certs: Vec<CaCertificate>,
}

impl TrustBundle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one certificate. Returns `false` if it was expired or already present.
    pub fn add(&mut self, cert: CaCertificate, now: DateTime<Utc>) -> bool {
        if cert.is_expired(now) || self.contains(&cert.fingerprint) {
            return false;
        }
        self.certs.push(cert);
        true
    }

    /// Parse `data` and add every certificate in it. Returns how many were added.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` holds anything but valid certificates.
    pub fn add_pem(
        &mut self,
        source_name: &str,
        data: &[u8],
        now: DateTime<Utc>,
    ) -> Result<usize, BundleError> {
        let added = parse_certificates(source_name, data)?
            .into_iter()
            .filter(|cert| self.add(cert.clone(), now))
            .count();
        Ok(added)
    }

    #[must_use]
    pub fn contains(&self, fingerprint: &str) -> bool {
        self.certs.iter().any(|c| c.fingerprint == fingerprint)
    }

    #[must_use]
    pub fn certs(&self) -> &[CaCertificate] {
        &self.certs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Render the bundle as commented PEM with LF line endings.
    #[must_use]
    pub fn to_pem(&self) -> String {
        self.certs
            .iter()
            .map(|cert| {
                format!(
                    "# {}\n{}",
                    cert.common_name,
                    ::pem::encode_config(
                        &Pem::new(CERTIFICATE_TAG, cert.der.clone()),
                        EncodeConfig::new().set_line_ending(LineEnding::LF)
                    )
                )
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "bundle_tests.rs"]
mod bundle_tests;
