// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP surface of the operator: Prometheus metrics, health, and the
//! `OpenStackControlPlane` validating admission webhook.
//!
//! TLS is terminated in front of the pod, so the router speaks plain HTTP.
//!
//! | Path | Method | Purpose |
//! |------|--------|---------|
//! | `/metrics` | GET | Prometheus text exposition |
//! | `/healthz` | GET | Liveness check |
//! | [`WEBHOOK_VALIDATE_PATH`] | POST | `AdmissionReview` for control planes |

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use kube::{
    api::{DynamicObject, ListParams},
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation},
    Api, Client, ResourceExt,
};
use tracing::{debug, error, info, warn};

use crate::constants::WEBHOOK_VALIDATE_PATH;
use crate::crd::OpenStackControlPlane;
use crate::metrics;
use crate::reconcilers::controlplane::reservation::current_holder;
use crate::validation::validate_control_plane;

/// Detail returned when a second control plane is created in a namespace
pub const SINGLETON_MESSAGE: &str =
    "Only one OpenStackControlPlane instance per namespace is supported at this time.";

/// State shared by the HTTP handlers.
#[derive(Clone)]
pub struct WebhookState {
    pub client: Client,
}

/// Build the router serving metrics, health and admission.
pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route(WEBHOOK_VALIDATE_PATH, post(validate_handler))
        .with_state(state)
}

/// Serve the router on `0.0.0.0:port` until the listener fails.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server stops.
pub async fn serve(state: Arc<WebhookState>, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Serving metrics, health and admission webhook");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Handle a validating `AdmissionReview` for `OpenStackControlPlane`.
pub async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<OpenStackControlPlane>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<OpenStackControlPlane> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = review(&state.client, &req).await;
    metrics::record_admission(operation_label(&req.operation), response.allowed);
    Json(response.into_review())
}

fn operation_label(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "create",
        Operation::Update => "update",
        Operation::Delete => "delete",
        _ => "connect",
    }
}

/// Decide one admission request.
pub async fn review(
    client: &Client,
    req: &AdmissionRequest<OpenStackControlPlane>,
) -> AdmissionResponse {
    let allowed = AdmissionResponse::from(req);

    if matches!(req.operation, Operation::Delete | Operation::Connect) {
        return allowed;
    }
    let Some(cp) = req.object.as_ref() else {
        debug!(uid = %req.uid, "No object in admission request, allowing");
        return allowed;
    };
    let namespace = cp
        .namespace()
        .or_else(|| req.namespace.clone())
        .unwrap_or_default();

    if req.operation == Operation::Create {
        match creation_conflict(client, cp, &namespace).await {
            Ok(None) => {}
            Ok(Some(reason)) => {
                info!(namespace = %namespace, name = %cp.name_any(), reason = %reason, "Denying OpenStackControlPlane create");
                return allowed.deny(reason);
            }
            Err(e) => {
                warn!(namespace = %namespace, name = %cp.name_any(), error = %e, "Admission lookup failed");
                return allowed.deny(e.to_string());
            }
        }
    }

    let mut scoped = cp.clone();
    scoped.metadata.namespace = Some(namespace);
    match validate_control_plane(&scoped) {
        Ok(()) => allowed,
        Err(e) => {
            info!(name = %cp.name_any(), error = %e, "Rejecting invalid OpenStackControlPlane");
            allowed.deny(e.to_string())
        }
    }
}

/// Reason a new control plane may not be created in `namespace`, if any.
async fn creation_conflict(
    client: &Client,
    cp: &OpenStackControlPlane,
    namespace: &str,
) -> anyhow::Result<Option<String>> {
    let api: Api<OpenStackControlPlane> = Api::namespaced(client.clone(), namespace);
    let existing = api.list(&ListParams::default()).await?;
    if existing.items.iter().any(|other| other.name_any() != cp.name_any()) {
        return Ok(Some(SINGLETON_MESSAGE.to_string()));
    }

    if let Some(holder) = current_holder(client, namespace).await? {
        if cp.uid().as_deref() != Some(holder.uid.as_str()) {
            return Ok(Some(format!(
                "namespace {namespace} is reserved by OpenStackControlPlane {} ({})",
                holder.name, holder.uid
            )));
        }
    }

    Ok(None)
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod webhook_tests;
