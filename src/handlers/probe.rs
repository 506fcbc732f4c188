//! Liveness and readiness probe handlers.
//!
//! Trivial GET routes delegating to a runtime predicate. Probes bypass
//! the admission pipeline entirely: no body processing, no middleware.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{MethodRouter, get};

/// GET route answering 200 when the predicate holds, 503 otherwise.
///
/// The predicate is evaluated on every request.
pub fn probe_route<F>(check: F) -> MethodRouter
where
    F: Fn() -> bool + Clone + Send + Sync + 'static,
{
    get(move || {
        let ok = check();
        async move {
            if ok {
                (StatusCode::OK, "ok").into_response()
            } else {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable").into_response()
            }
        }
    })
}
