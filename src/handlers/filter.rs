//! Filter stage: configuration-defined request exclusion.
//!
//! Applied at registration time for policy and resource webhook routes
//! only; the verification endpoint is never filtered. An excluded request
//! is answered with an unconditional allow and the inner handler never
//! runs.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use tracing::debug;

use crate::config::FilterRules;

use super::{AdmissionHandler, FailurePolicy};

/// Short-circuits excluded requests with an allow/no-op response.
pub struct Filter {
    rules: FilterRules,
    inner: Arc<dyn AdmissionHandler>,
}

impl Filter {
    /// Wrap an inner handler with the given exclusion rules.
    pub fn wrap(rules: FilterRules, inner: Arc<dyn AdmissionHandler>) -> Arc<dyn AdmissionHandler> {
        Arc::new(Self { rules, inner })
    }
}

#[async_trait]
impl AdmissionHandler for Filter {
    async fn handle(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        mode: Option<FailurePolicy>,
        started_at: Instant,
    ) -> AdmissionResponse {
        if self.rules.is_excluded(request) {
            debug!(
                uid = %request.uid,
                kind = %request.kind.kind,
                namespace = ?request.namespace,
                "request matches an exclusion rule, allowing without processing"
            );
            return AdmissionResponse::from(request);
        }
        self.inner.handle(request, mode, started_at).await
    }
}
