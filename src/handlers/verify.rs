//! Verification webhook handler.
//!
//! Answers the internal verification endpoint with an allow carrying a
//! JSON patch that stamps a last-request-time annotation on the target
//! object, proving the admission path is live end to end.

use std::time::Instant;

use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use serde_json::json;
use tracing::error;

use crate::config::LAST_REQUEST_TIME_ANNOTATION;

use super::{AdmissionHandler, FailurePolicy};

/// Stamps the verification annotation on the admitted object.
pub struct VerifyHandler;

#[async_trait]
impl AdmissionHandler for VerifyHandler {
    async fn handle(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        _mode: Option<FailurePolicy>,
        _started_at: Instant,
    ) -> AdmissionResponse {
        let response = AdmissionResponse::from(request);
        let Some(object) = &request.object else {
            return response;
        };

        let now = chrono::Utc::now().to_rfc3339();
        // JSON pointer tokens escape "/" as "~1".
        let escaped_key = LAST_REQUEST_TIME_ANNOTATION.replace('/', "~1");
        let ops = if object.metadata.annotations.is_some() {
            json!([{
                "op": "add",
                "path": format!("/metadata/annotations/{escaped_key}"),
                "value": now,
            }])
        } else {
            json!([{
                "op": "add",
                "path": "/metadata/annotations",
                "value": { LAST_REQUEST_TIME_ANNOTATION: now },
            }])
        };

        let patch = match serde_json::from_value::<json_patch::Patch>(ops) {
            Ok(patch) => patch,
            Err(e) => {
                error!(uid = %request.uid, error = %e, "failed to build verification patch");
                return response;
            }
        };
        match response.with_patch(patch) {
            Ok(patched) => patched,
            Err(e) => {
                error!(uid = %request.uid, error = %e, "failed to attach verification patch");
                AdmissionResponse::from(request)
            }
        }
    }
}
