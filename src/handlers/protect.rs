//! Protect stage: blocks external mutation of gateway-managed resources.
//!
//! Constructed only when the protect toggle is enabled, independent of
//! Filter and Dump configuration. Mutating operations (UPDATE/DELETE)
//! targeting objects labelled as managed by the gateway are denied unless
//! the requester is the gateway's own service account.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use tracing::warn;

use crate::config::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};

use super::{AdmissionHandler, FailurePolicy};

/// Denies mutating operations on managed resources from non-exempt users.
pub struct Protect {
    exempt_username: String,
    inner: Arc<dyn AdmissionHandler>,
}

impl Protect {
    /// Wrap an inner handler, letting only `exempt_username` mutate
    /// managed resources.
    pub fn wrap(
        exempt_username: String,
        inner: Arc<dyn AdmissionHandler>,
    ) -> Arc<dyn AdmissionHandler> {
        Arc::new(Self {
            exempt_username,
            inner,
        })
    }

    fn is_managed(request: &AdmissionRequest<DynamicObject>) -> bool {
        request
            .object
            .as_ref()
            .or(request.old_object.as_ref())
            .and_then(|object| object.metadata.labels.as_ref())
            .and_then(|labels| labels.get(MANAGED_BY_LABEL))
            .is_some_and(|value| value == MANAGED_BY_VALUE)
    }
}

#[async_trait]
impl AdmissionHandler for Protect {
    async fn handle(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        mode: Option<FailurePolicy>,
        started_at: Instant,
    ) -> AdmissionResponse {
        let mutating = matches!(request.operation, Operation::Update | Operation::Delete);
        let requester = request.user_info.username.as_deref().unwrap_or_default();
        if mutating && requester != self.exempt_username && Self::is_managed(request) {
            warn!(
                uid = %request.uid,
                username = requester,
                name = %request.name,
                namespace = ?request.namespace,
                "denying modification of a gateway-managed resource"
            );
            return AdmissionResponse::from(request)
                .deny("this resource is managed by the admission gateway and cannot be modified");
        }
        self.inner.handle(request, mode, started_at).await
    }
}
