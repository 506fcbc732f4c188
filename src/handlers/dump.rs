//! Dump stage: verbatim payload logging for troubleshooting.
//!
//! Constructed only when payload dumping is enabled; otherwise the stage
//! is absent from the chain. Runs outside Protect and Filter so the
//! logged response reflects what the client actually receives.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use tracing::{debug, info};

use super::{AdmissionHandler, FailurePolicy};

/// Logs the raw admission request and the outgoing response.
pub struct Dump {
    inner: Arc<dyn AdmissionHandler>,
}

impl Dump {
    /// Wrap an inner handler with payload logging.
    pub fn wrap(inner: Arc<dyn AdmissionHandler>) -> Arc<dyn AdmissionHandler> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl AdmissionHandler for Dump {
    async fn handle(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        mode: Option<FailurePolicy>,
        started_at: Instant,
    ) -> AdmissionResponse {
        match serde_json::to_string(request) {
            Ok(payload) => info!(uid = %request.uid, payload, "admission request dump"),
            Err(e) => debug!(uid = %request.uid, error = %e, "failed to serialize request for dump"),
        }
        let response = self.inner.handle(request, mode, started_at).await;
        match serde_json::to_string(&response) {
            Ok(payload) => info!(uid = %request.uid, payload, "admission response dump"),
            Err(e) => debug!(uid = %request.uid, error = %e, "failed to serialize response for dump"),
        }
        response
    }
}
