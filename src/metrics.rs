use std::time::Duration;

/// Instrumentation sink invoked by the pool at well-defined points.
///
/// All methods default to no-ops so implementations only override the sinks
/// they care about. The pool only ever writes to the recorder; it never reads
/// back from it.
pub trait PoolMetricsRecorder: Send + Sync {
    /// A resource was allocated successfully, after `duration`.
    fn record_allocation_success(&self, duration: Duration) {
        let _ = duration;
    }

    /// A resource allocation failed, after `duration`.
    fn record_allocation_failure(&self, duration: Duration) {
        let _ = duration;
    }

    /// The release handler finished resetting a resource.
    fn record_reset(&self, duration: Duration) {
        let _ = duration;
    }

    /// The destroy handler finished tearing a resource down.
    fn record_destroy(&self, duration: Duration) {
        let _ = duration;
    }

    /// How long a destroyed resource had been alive.
    fn record_lifetime_on_destroy(&self, lifetime: Duration) {
        let _ = lifetime;
    }

    /// How long a recycled resource had been sitting idle.
    fn record_idle_on_recycle(&self, idle: Duration) {
        let _ = idle;
    }

    /// An idle resource was handed to a borrower instead of allocating.
    fn record_recycled(&self) {}

    /// A freed resource was matched to a borrower waiting on the same thread.
    fn record_fast_path(&self) {}

    /// A freed resource was matched to a borrower waiting on another thread.
    fn record_slow_path(&self) {}
}

/// The recorder used when none is configured.
pub(crate) struct NoopRecorder;

impl PoolMetricsRecorder for NoopRecorder {}
