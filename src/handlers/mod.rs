//! Admission middleware pipeline.
//!
//! A handler answers a decoded admission request; decorator stages wrap it
//! in a fixed order. Outer to inner, the composition is
//! `Admission envelope → Dump → Protect → Filter → decision handler` for
//! policy and resource endpoints, and the same without Filter for the
//! verification endpoint. Dump sees the already filtered/protected result
//! at return time; Filter has first refusal on exclusion before any
//! handler executes.

pub mod admission;
pub mod dump;
pub mod filter;
pub mod probe;
pub mod protect;
pub mod verify;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};

use crate::config::{Config, DebugModeOptions};
use self::dump::Dump;
use self::filter::Filter;
use self::protect::Protect;

pub use self::verify::VerifyHandler;

/// Failure-policy mode selected by URL path suffix.
///
/// A cluster-level webhook configuration's failure policy applies to the
/// whole configuration, so one physical server answers for several
/// configurations by dispatching on suffix: the base path serves every
/// registration, `/fail` the fail-closed subset, `/ignore` the fail-open
/// subset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Every registration, regardless of failure policy
    All,
    /// Registrations with a fail-closed failure policy
    Fail,
    /// Registrations with a fail-open failure policy
    Ignore,
}

impl FailurePolicy {
    /// Wire string passed to resource handlers.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::All => "all",
            FailurePolicy::Fail => "fail",
            FailurePolicy::Ignore => "ignore",
        }
    }

    /// Route suffix registering this mode under a base path.
    pub fn path_suffix(&self) -> &'static str {
        match self {
            FailurePolicy::All => "",
            FailurePolicy::Fail => "/fail",
            FailurePolicy::Ignore => "/ignore",
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single admission-handling capability shared by decision handlers and
/// pipeline stages.
///
/// The failure-policy mode is bound at route registration for resource
/// endpoints and absent for policy and verification endpoints, which
/// ignore it.
#[async_trait]
pub trait AdmissionHandler: Send + Sync {
    /// Answer an admission request.
    async fn handle(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        mode: Option<FailurePolicy>,
        started_at: Instant,
    ) -> AdmissionResponse;
}

/// Decision handlers for policy resources (external collaborator).
#[async_trait]
pub trait PolicyHandlers: Send + Sync {
    /// Mutate a policy resource.
    async fn mutate(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        started_at: Instant,
    ) -> AdmissionResponse;

    /// Validate a policy resource.
    async fn validate(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        started_at: Instant,
    ) -> AdmissionResponse;
}

/// Decision handlers for cluster resources (external collaborator).
///
/// The failure-policy mode selects which subset of registrations the
/// handler must answer for.
#[async_trait]
pub trait ResourceHandlers: Send + Sync {
    /// Mutate a cluster resource.
    async fn mutate(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        mode: FailurePolicy,
        started_at: Instant,
    ) -> AdmissionResponse;

    /// Validate a cluster resource.
    async fn validate(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        mode: FailurePolicy,
        started_at: Instant,
    ) -> AdmissionResponse;
}

#[derive(Clone, Copy)]
pub(crate) enum Verb {
    Mutate,
    Validate,
}

/// Adapts [`PolicyHandlers`] to the unified handler shape; the mode is
/// ignored.
pub(crate) struct PolicyAdapter {
    handlers: Arc<dyn PolicyHandlers>,
    verb: Verb,
}

impl PolicyAdapter {
    pub(crate) fn new(handlers: Arc<dyn PolicyHandlers>, verb: Verb) -> Arc<dyn AdmissionHandler> {
        Arc::new(Self { handlers, verb })
    }
}

#[async_trait]
impl AdmissionHandler for PolicyAdapter {
    async fn handle(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        _mode: Option<FailurePolicy>,
        started_at: Instant,
    ) -> AdmissionResponse {
        match self.verb {
            Verb::Mutate => self.handlers.mutate(request, started_at).await,
            Verb::Validate => self.handlers.validate(request, started_at).await,
        }
    }
}

/// Adapts [`ResourceHandlers`] to the unified handler shape.
pub(crate) struct ResourceAdapter {
    handlers: Arc<dyn ResourceHandlers>,
    verb: Verb,
}

impl ResourceAdapter {
    pub(crate) fn new(
        handlers: Arc<dyn ResourceHandlers>,
        verb: Verb,
    ) -> Arc<dyn AdmissionHandler> {
        Arc::new(Self { handlers, verb })
    }
}

#[async_trait]
impl AdmissionHandler for ResourceAdapter {
    async fn handle(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        mode: Option<FailurePolicy>,
        started_at: Instant,
    ) -> AdmissionResponse {
        let mode = mode.unwrap_or(FailurePolicy::All);
        match self.verb {
            Verb::Mutate => self.handlers.mutate(request, mode, started_at).await,
            Verb::Validate => self.handlers.validate(request, mode, started_at).await,
        }
    }
}

/// Builds decorated handler chains with the stage order fixed.
///
/// Stage activation is decided here, from configuration passed in at
/// construction: Protect is present only when the protect toggle is on,
/// Dump only when payload dumping is on. Inactive stages are simply not
/// part of the chain.
pub(crate) struct PipelineBuilder {
    config: Config,
    debug: DebugModeOptions,
}

impl PipelineBuilder {
    pub(crate) fn new(config: Config, debug: DebugModeOptions) -> Self {
        Self { config, debug }
    }

    /// Chain for policy and resource webhook endpoints:
    /// `Dump → Protect → Filter → inner`.
    pub(crate) fn webhook(&self, inner: Arc<dyn AdmissionHandler>) -> Arc<dyn AdmissionHandler> {
        self.envelope_stages(
            Filter::wrap(self.config.filters.clone(), inner),
            self.debug.dump_payload,
        )
    }

    /// Chain for the verification endpoint: `Protect → inner`.
    /// Verify requests are never excluded and always run with payload
    /// dumping disabled.
    pub(crate) fn verify(&self, inner: Arc<dyn AdmissionHandler>) -> Arc<dyn AdmissionHandler> {
        self.envelope_stages(inner, false)
    }

    fn envelope_stages(
        &self,
        inner: Arc<dyn AdmissionHandler>,
        dump_payload: bool,
    ) -> Arc<dyn AdmissionHandler> {
        let chain = if self.config.protect_managed_resources {
            Protect::wrap(self.config.exempt_username.clone(), inner)
        } else {
            inner
        };
        if dump_payload { Dump::wrap(chain) } else { chain }
    }
}
