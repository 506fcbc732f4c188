//! admission-gateway library crate
//!
//! A TLS-terminating HTTP dispatcher sitting between the cluster control
//! plane and a set of policy/resource decision handlers. It routes
//! admission requests through a fixed middleware pipeline, encodes
//! failure-policy variants into the route table, rotates its serving
//! certificate per handshake, and coordinates best-effort teardown of
//! cluster-registered configuration objects on permanent shutdown.
//!
//! Decision logic lives outside this crate: callers supply
//! [`PolicyHandlers`], [`ResourceHandlers`], a [`TlsProvider`], a
//! [`Runtime`], and delete clients for the registered objects.

pub mod cleanup;
pub mod config;
pub mod error;
pub mod handlers;
pub mod runtime;
pub mod server;
pub mod tls;

pub use cleanup::{CompletionHandle, DeleteClient};
pub use config::{Config, DebugModeOptions, FilterRules};
pub use error::{Error, Result};
pub use handlers::{
    AdmissionHandler, FailurePolicy, PolicyHandlers, ResourceHandlers, VerifyHandler,
};
pub use runtime::Runtime;
pub use server::WebhookServer;
pub use tls::{FileTlsProvider, PemPair, TlsProvider};
