// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Writes the CRDs of the operator, generated from `src/crd.rs`, plus a
//! `kustomization.yaml` listing them.
//!
//! Usage:
//!   cargo run --bin crdgen [OUTPUT_DIR]
//!
//! `OUTPUT_DIR` defaults to `deploy/crds`.

use ctlplane::crd::{OpenStackClient, OpenStackControlPlane};
use kube::CustomResourceExt;
use std::fs;
use std::path::{Path, PathBuf};

const GENERATED_HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("deploy/crds"), PathBuf::from);
    fs::create_dir_all(&output_dir)?;

    println!("Generating CRD YAML files in {}...", output_dir.display());

    let files = [
        write_crd::<OpenStackControlPlane>(&output_dir)?,
        write_crd::<OpenStackClient>(&output_dir)?,
    ];

    let kustomization = format!(
        "{GENERATED_HEADER}apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\nresources:\n{}",
        files
            .iter()
            .map(|f| format!("  - {f}\n"))
            .collect::<String>()
    );
    fs::write(output_dir.join("kustomization.yaml"), kustomization)?;

    println!("✓ Generated {} CRDs", files.len());
    println!("  Deploy with: kubectl apply -k {}", output_dir.display());

    Ok(())
}

/// Write the CRD of `T` as `<plural>.crd.yaml` and return the file name.
fn write_crd<T>(output_dir: &Path) -> Result<String, Box<dyn std::error::Error>>
where
    T: CustomResourceExt,
{
    let filename = format!("{}.crd.yaml", T::api_resource().plural);
    let yaml = serde_yaml::to_string(&T::crd())?;
    fs::write(output_dir.join(&filename), format!("{GENERATED_HEADER}{yaml}"))?;

    println!("  ✓ {} -> {filename}", T::crd_name());
    Ok(filename)
}
