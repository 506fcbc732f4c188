//! Runtime predicates consumed by the probe endpoints and the cleanup
//! orchestrator. Implemented by the surrounding operator process.

/// Boolean predicates describing the state of the surrounding process.
pub trait Runtime: Send + Sync {
    /// The process is alive and able to serve requests.
    fn is_live(&self) -> bool;

    /// The process is ready to receive traffic.
    fn is_ready(&self) -> bool;

    /// The process is permanently going down, as opposed to a transient
    /// restart. Controls whether cluster-registered objects are deleted
    /// during shutdown.
    fn is_going_down(&self) -> bool;
}
