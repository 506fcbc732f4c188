//! Webhook server lifecycle and route table.
//!
//! Construction wires the middleware pipeline around the decision
//! handlers and builds the TLS listener configuration; `run` serves in
//! the background and returns immediately; `stop` runs cleanup, then
//! drains gracefully within the caller's deadline, forcing the listener
//! closed if the drain does not finish in time.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::coordination::v1::Lease;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error, info, warn};

use crate::cleanup::{CompletionHandle, CompletionSignal, DeleteClient, RegisteredObjects};
use crate::config::{self, Config, DebugModeOptions};
use crate::handlers::admission::admission_route;
use crate::handlers::{
    AdmissionHandler, FailurePolicy, PipelineBuilder, PolicyAdapter, PolicyHandlers,
    ResourceAdapter, ResourceHandlers, Verb, VerifyHandler, probe,
};
use crate::runtime::Runtime;
use crate::tls::{self, TlsProvider};

/// Uniform read/write bound applied to every request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// How long an idle keep-alive connection may sit waiting for its next
/// request. hyper starts its header-read timer the moment it begins
/// waiting for a request, so this single knob covers the idle wait;
/// kept separate from the per-request bound above.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPING: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// TLS-terminating admission dispatcher.
///
/// Owns the listener, the route table, and the cleanup completion signal.
/// `stop` transitions `running → stopping → stopped`; repeated or
/// concurrent stop calls are no-ops after the first.
pub struct WebhookServer {
    router: Router,
    tls: RustlsConfig,
    addr: SocketAddr,
    handle: Handle,
    serving: Mutex<Option<JoinHandle<()>>>,
    state: AtomicU8,
    runtime: Arc<dyn Runtime>,
    objects: RegisteredObjects,
    cleanup_done: CompletionSignal,
}

impl WebhookServer {
    /// Create a new server from its collaborators and configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        policy_handlers: Arc<dyn PolicyHandlers>,
        resource_handlers: Arc<dyn ResourceHandlers>,
        config: Config,
        debug: DebugModeOptions,
        tls_provider: Arc<dyn TlsProvider>,
        mwc_client: Arc<dyn DeleteClient<MutatingWebhookConfiguration>>,
        vwc_client: Arc<dyn DeleteClient<ValidatingWebhookConfiguration>>,
        lease_client: Arc<dyn DeleteClient<Lease>>,
        runtime: Arc<dyn Runtime>,
    ) -> Self {
        let router = build_router(
            policy_handlers,
            resource_handlers,
            &config,
            debug,
            runtime.clone(),
        );
        Self {
            router,
            tls: RustlsConfig::from_config(Arc::new(tls::server_config(tls_provider))),
            addr: config.addr,
            handle: Handle::new(),
            serving: Mutex::new(None),
            state: AtomicU8::new(STATE_IDLE),
            runtime,
            objects: RegisteredObjects {
                lease_client,
                vwc_client,
                mwc_client,
            },
            cleanup_done: CompletionSignal::new(),
        }
    }

    /// Start the TLS listener on a background task and return immediately.
    ///
    /// An unexpected serving termination is logged but never propagated;
    /// the listener is not restarted.
    pub async fn run(&self) {
        if self
            .state
            .compare_exchange(STATE_IDLE, STATE_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("webhook server already started");
            return;
        }

        let mut server = axum_server::bind_rustls(self.addr, self.tls.clone());
        server
            .http_builder()
            .http1()
            .header_read_timeout(IDLE_TIMEOUT);
        let server = server.handle(self.handle.clone());
        let app = self.router.clone();
        let task = tokio::spawn(async move {
            debug!("started serving admission requests");
            if let Err(e) = server.serve(app.into_make_service()).await {
                error!(error = %e, "webhook listener terminated unexpectedly");
            }
        });
        *self.serving.lock().await = Some(task);
        info!(addr = %self.addr, "starting webhook server");
    }

    /// Stop the server: clean up cluster-registered objects, then shut the
    /// listener down, all bounded by `timeout`.
    ///
    /// Cleanup strictly precedes listener shutdown. If the graceful drain
    /// does not finish within the deadline the listener is closed
    /// immediately. Repeated calls are no-ops.
    pub async fn stop(&self, timeout: Duration) {
        let from_running = self
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_STOPPING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        let from_idle = !from_running
            && self
                .state
                .compare_exchange(
                    STATE_IDLE,
                    STATE_STOPPING,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok();
        if !from_running && !from_idle {
            debug!("webhook server already stopping or stopped");
            return;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        self.cleanup(deadline).await;

        self.handle.graceful_shutdown(None);
        if let Some(mut task) = self.serving.lock().await.take() {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "webhook serving task failed during shutdown"),
                Err(_) => {
                    error!("graceful shutdown deadline expired, forcing listener close");
                    self.handle.shutdown();
                    if let Err(e) = (&mut task).await {
                        error!(error = %e, "forced listener close failed");
                    }
                }
            }
        }
        self.state.store(STATE_STOPPED, Ordering::SeqCst);
        info!("webhook server stopped");
    }

    /// Handle on the cleanup completion signal.
    ///
    /// Awaiting it does not trigger cleanup; it only observes it.
    pub fn cleanup_signal(&self) -> CompletionHandle {
        self.cleanup_done.handle()
    }

    /// The server's route table, for in-process exercising in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Delete cluster-registered objects if the process is permanently
    /// going down, then close the completion signal exactly once.
    async fn cleanup(&self, deadline: tokio::time::Instant) {
        if self.runtime.is_going_down() {
            if tokio::time::timeout_at(deadline, self.objects.delete_all())
                .await
                .is_err()
            {
                warn!("shutdown deadline expired during cleanup, skipping remaining deletions");
            }
        } else {
            debug!("transient shutdown, keeping cluster-registered objects");
        }
        self.cleanup_done.close();
    }
}

fn build_router(
    policy_handlers: Arc<dyn PolicyHandlers>,
    resource_handlers: Arc<dyn ResourceHandlers>,
    config: &Config,
    debug: DebugModeOptions,
    runtime: Arc<dyn Runtime>,
) -> Router {
    let pipeline = PipelineBuilder::new(config.clone(), debug);
    let resource_mutate =
        pipeline.webhook(ResourceAdapter::new(resource_handlers.clone(), Verb::Mutate));
    let resource_validate =
        pipeline.webhook(ResourceAdapter::new(resource_handlers, Verb::Validate));
    let policy_mutate = pipeline.webhook(PolicyAdapter::new(policy_handlers.clone(), Verb::Mutate));
    let policy_validate = pipeline.webhook(PolicyAdapter::new(policy_handlers, Verb::Validate));
    let verify = pipeline.verify(Arc::new(VerifyHandler));

    let mut router = Router::new();
    router = register_resource_routes(
        router,
        config::RESOURCE_MUTATING_PATH,
        "resource/mutate",
        resource_mutate,
    );
    router = register_resource_routes(
        router,
        config::RESOURCE_VALIDATING_PATH,
        "resource/validate",
        resource_validate,
    );
    router
        .route(
            config::POLICY_MUTATING_PATH,
            admission_route("policy/mutate", policy_mutate, None),
        )
        .route(
            config::POLICY_VALIDATING_PATH,
            admission_route("policy/validate", policy_validate, None),
        )
        .route(
            config::VERIFY_MUTATING_PATH,
            admission_route("verify/mutate", verify, None),
        )
        .route(config::LIVENESS_PATH, probe::probe_route({
            let runtime = runtime.clone();
            move || runtime.is_live()
        }))
        .route(
            config::READINESS_PATH,
            probe::probe_route(move || runtime.is_ready()),
        )
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
}

/// Register the base path and its `/fail` and `/ignore` variants, binding
/// the matching failure-policy mode to each route.
fn register_resource_routes(
    mut router: Router,
    base: &str,
    endpoint: &'static str,
    chain: Arc<dyn AdmissionHandler>,
) -> Router {
    for mode in [FailurePolicy::All, FailurePolicy::Fail, FailurePolicy::Ignore] {
        let path = format!("{base}{}", mode.path_suffix());
        router = router.route(&path, admission_route(endpoint, chain.clone(), Some(mode)));
    }
    router
}
