//! Gateway configuration.
//!
//! Path constants, the names of the cluster-registered objects the gateway
//! removes on permanent shutdown, and the request-filtering rules consumed
//! by the middleware pipeline. All values are fixed at server construction;
//! nothing here is read from process-global mutable state.

use kube::core::DynamicObject;
use kube::core::admission::AdmissionRequest;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Default webhook listen port
pub const DEFAULT_PORT: u16 = 9443;

/// Base path for resource mutation webhooks (also serves `/fail` and `/ignore` variants)
pub const RESOURCE_MUTATING_PATH: &str = "/mutate";
/// Base path for resource validation webhooks (also serves `/fail` and `/ignore` variants)
pub const RESOURCE_VALIDATING_PATH: &str = "/validate";
/// Path for policy-resource mutation webhooks
pub const POLICY_MUTATING_PATH: &str = "/policymutate";
/// Path for policy-resource validation webhooks
pub const POLICY_VALIDATING_PATH: &str = "/policyvalidate";
/// Path for the internal verification webhook
pub const VERIFY_MUTATING_PATH: &str = "/verifymutate";
/// Liveness probe path
pub const LIVENESS_PATH: &str = "/health/liveness";
/// Readiness probe path
pub const READINESS_PATH: &str = "/health/readiness";

/// Lease taken by the init container before the gateway starts
pub const INIT_LEASE: &str = "admission-gateway-init-lock";
/// Lease used for replica health signalling
pub const HEALTH_LEASE: &str = "admission-gateway-health";
/// Validating webhook configuration for cluster resources
pub const RESOURCE_VALIDATING_WEBHOOK_CONFIG: &str = "admission-gateway-resource-validating-webhook-cfg";
/// Validating webhook configuration for policy resources
pub const POLICY_VALIDATING_WEBHOOK_CONFIG: &str = "admission-gateway-policy-validating-webhook-cfg";
/// Mutating webhook configuration for cluster resources
pub const RESOURCE_MUTATING_WEBHOOK_CONFIG: &str = "admission-gateway-resource-mutating-webhook-cfg";
/// Mutating webhook configuration for policy resources
pub const POLICY_MUTATING_WEBHOOK_CONFIG: &str = "admission-gateway-policy-mutating-webhook-cfg";
/// Mutating webhook configuration for the verification endpoint
pub const VERIFY_MUTATING_WEBHOOK_CONFIG: &str = "admission-gateway-verify-mutating-webhook-cfg";

/// Label key marking resources managed by the gateway's own controllers
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Label value marking resources managed by the gateway's own controllers
pub const MANAGED_BY_VALUE: &str = "admission-gateway";
/// Annotation stamped by the verification webhook
pub const LAST_REQUEST_TIME_ANNOTATION: &str = "admission-gateway.dev/last-request-time";

/// Options to configure debug mode
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct DebugModeOptions {
    /// Log raw admission request/response payloads for troubleshooting.
    /// Immutable per server instance; the verification endpoint always
    /// runs with this disabled.
    pub dump_payload: bool,
}

/// Exclusion rules consumed by the Filter pipeline stage.
///
/// A request matching any rule is answered with an unconditional allow
/// without reaching the decision handlers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Namespaces whose resources are never processed
    pub namespaces: Vec<String>,
    /// Resource kinds that are never processed
    pub kinds: Vec<String>,
    /// Requesting usernames whose operations are never processed
    pub usernames: Vec<String>,
}

impl FilterRules {
    /// Check whether an admission request matches any exclusion rule.
    pub fn is_excluded(&self, request: &AdmissionRequest<DynamicObject>) -> bool {
        if let Some(namespace) = &request.namespace {
            if self.namespaces.iter().any(|n| n == namespace) {
                return true;
            }
        }
        if self.kinds.iter().any(|k| k == &request.kind.kind) {
            return true;
        }
        if let Some(username) = &request.user_info.username {
            if self.usernames.iter().any(|u| u == username) {
                return true;
            }
        }
        false
    }
}

/// Gateway configuration, fixed at server construction
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Address the TLS listener binds to
    pub addr: SocketAddr,
    /// Request exclusion rules for the Filter stage
    pub filters: FilterRules,
    /// Deny external mutation of gateway-managed resources
    pub protect_managed_resources: bool,
    /// Username allowed through the Protect stage (the gateway's own
    /// service account)
    pub exempt_username: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            filters: FilterRules::default(),
            protect_managed_resources: false,
            exempt_username: format!(
                "system:serviceaccount:{}:{}",
                MANAGED_BY_VALUE, MANAGED_BY_VALUE
            ),
        }
    }
}
