//! Best-effort teardown of cluster-registered configuration objects.
//!
//! On permanent shutdown the gateway deletes the leases and webhook
//! configurations it registered with the cluster. Each deletion is
//! independent: a not-found outcome counts as success and any other error
//! is logged without aborting the remaining deletions. The completion
//! signal closes exactly once, whether or not any deletion ran.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::coordination::v1::Lease;
use kube::Api;
use kube::api::DeleteParams;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::config;
use crate::error::is_not_found;

/// Delete-by-name client for a single resource type, tolerant of absence
/// at the call site.
#[async_trait]
pub trait DeleteClient<K>: Send + Sync {
    /// Delete the named object.
    async fn delete(&self, name: &str) -> Result<(), kube::Error>;
}

#[async_trait]
impl<K> DeleteClient<K> for Api<K>
where
    K: Clone + DeserializeOwned + Debug + Send + Sync,
{
    async fn delete(&self, name: &str) -> Result<(), kube::Error> {
        Api::delete(self, name, &DeleteParams::default())
            .await
            .map(|_| ())
    }
}

/// Clients for the fixed set of cluster-registered objects eligible for
/// cleanup: 2 leases, 2 validating webhook configurations, 3 mutating
/// webhook configurations.
pub(crate) struct RegisteredObjects {
    pub lease_client: Arc<dyn DeleteClient<Lease>>,
    pub vwc_client: Arc<dyn DeleteClient<ValidatingWebhookConfiguration>>,
    pub mwc_client: Arc<dyn DeleteClient<MutatingWebhookConfiguration>>,
}

impl RegisteredObjects {
    /// Attempt deletion of every registered object, sequentially and
    /// best-effort. No ordering is relied on between deletions beyond
    /// each being attempted regardless of prior outcomes.
    pub(crate) async fn delete_all(&self) {
        delete(&*self.lease_client, "lease", config::INIT_LEASE).await;
        delete(&*self.lease_client, "lease", config::HEALTH_LEASE).await;
        delete(
            &*self.vwc_client,
            "validating webhook configuration",
            config::RESOURCE_VALIDATING_WEBHOOK_CONFIG,
        )
        .await;
        delete(
            &*self.vwc_client,
            "validating webhook configuration",
            config::POLICY_VALIDATING_WEBHOOK_CONFIG,
        )
        .await;
        delete(
            &*self.mwc_client,
            "mutating webhook configuration",
            config::RESOURCE_MUTATING_WEBHOOK_CONFIG,
        )
        .await;
        delete(
            &*self.mwc_client,
            "mutating webhook configuration",
            config::POLICY_MUTATING_WEBHOOK_CONFIG,
        )
        .await;
        delete(
            &*self.mwc_client,
            "mutating webhook configuration",
            config::VERIFY_MUTATING_WEBHOOK_CONFIG,
        )
        .await;
    }
}

async fn delete<K>(client: &dyn DeleteClient<K>, kind: &str, name: &str) {
    match client.delete(name).await {
        Ok(()) => debug!(kind, name, "cleaned up registered object"),
        Err(e) if is_not_found(&e) => debug!(kind, name, "registered object already absent"),
        Err(e) => error!(error = %e, kind, name, "failed to clean up registered object"),
    }
}

/// One-shot completion event for cleanup.
///
/// Created at server construction, closed exactly once, never reopened.
/// Repeated close calls are no-ops.
pub(crate) struct CompletionSignal {
    tx: watch::Sender<bool>,
    closed: AtomicBool,
}

impl CompletionSignal {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx,
            closed: AtomicBool::new(false),
        }
    }

    /// Close the signal. Idempotent; only the first call has any effect.
    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.tx.send_replace(true);
        }
    }

    pub(crate) fn handle(&self) -> CompletionHandle {
        CompletionHandle {
            rx: self.tx.subscribe(),
        }
    }
}

/// Awaitable handle on the cleanup completion signal.
#[derive(Clone)]
pub struct CompletionHandle {
    rx: watch::Receiver<bool>,
}

impl CompletionHandle {
    /// Wait until cleanup has finished (successfully or not).
    ///
    /// Returns immediately if the signal is already closed, or if the
    /// owning server has been dropped.
    pub async fn wait(mut self) {
        let _ = self.rx.wait_for(|closed| *closed).await;
    }

    /// Check whether cleanup has finished without blocking.
    pub fn is_complete(&self) -> bool {
        *self.rx.borrow()
    }
}
