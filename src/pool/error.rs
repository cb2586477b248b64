use thiserror::Error;

/// Failure modes of an acquisition or release.
#[derive(Debug, Error)]
pub enum PoolError<E> {
    /// The pool was disposed at the moment the operation was registered, or
    /// the delivery channel was torn down before a verdict was produced.
    #[error("pool has been shut down")]
    Shutdown,

    /// The pending acquire queue was at its configured capacity.
    #[error("pending acquire queue is at capacity")]
    PendingLimitReached,

    /// The allocator or release handler reported an error.
    #[error("resource operation failed")]
    Resource(E),
}

impl<E> PoolError<E> {
    /// Returns the inner resource error, if any.
    pub fn into_resource_error(self) -> Option<E> {
        match self {
            Self::Resource(err) => Some(err),
            _ => None,
        }
    }
}

/// Failure to assemble a pool from its builder.
#[derive(Debug, Error)]
pub enum BuildError {
    /// No executor was configured and the `global-exec` feature providing the
    /// default is disabled.
    #[error("no executor is configured and no default is available")]
    NoExecutor,
}
