//! Admission envelope: transport decoding/encoding around the pipeline.
//!
//! Always the outermost stage. Decodes the posted `AdmissionReview`,
//! stamps the start time, invokes the decorated chain, wraps the returned
//! response back into a review, and logs outcome and latency.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::http::StatusCode;
use axum::routing::{MethodRouter, post};
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use tracing::{debug, error};

use super::{AdmissionHandler, FailurePolicy};

/// POST route wrapping a handler chain in the admission envelope.
///
/// The failure-policy mode is bound here, at registration time, and
/// passed unchanged to the chain on every request.
pub(crate) fn admission_route(
    endpoint: &'static str,
    chain: Arc<dyn AdmissionHandler>,
    mode: Option<FailurePolicy>,
) -> MethodRouter {
    post(move |Json(review): Json<AdmissionReview<DynamicObject>>| {
        let chain = chain.clone();
        async move { serve(endpoint, &*chain, mode, review).await }
    })
}

async fn serve(
    endpoint: &'static str,
    chain: &dyn AdmissionHandler,
    mode: Option<FailurePolicy>,
    review: AdmissionReview<DynamicObject>,
) -> (StatusCode, Json<AdmissionReview<DynamicObject>>) {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!(endpoint, error = %e, "failed to extract admission request");
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    AdmissionResponse::invalid(format!("invalid admission review: {e}"))
                        .into_review(),
                ),
            );
        }
    };

    let started_at = Instant::now();
    let response = chain.handle(&request, mode, started_at).await;
    debug!(
        endpoint,
        uid = %request.uid,
        operation = ?request.operation,
        allowed = response.allowed,
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "admission request processed"
    );
    (StatusCode::OK, Json(response.into_review()))
}
