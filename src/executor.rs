use futures_lite::future::Boxed as BoxFuture;

use crate::pool::BuildError;

/// Defines a pluggable executor for futures evaluated within the context of
/// the resource pool: allocations, destroy pipelines, orphaned release
/// pipelines, and (when configured) borrower delivery.
pub trait Executor: Send + Sync {
    /// Spawn a static, boxed future with no return value.
    fn spawn_obj(&self, task: BoxFuture<()>);
}

#[cfg(feature = "global-exec")]
/// An [`Executor`] backed by the process-wide global executor.
pub struct GlobalExecutor;

#[cfg(feature = "global-exec")]
impl Executor for GlobalExecutor {
    fn spawn_obj(&self, task: BoxFuture<()>) {
        async_global_executor::spawn(task).detach()
    }
}

#[cfg(feature = "global-exec")]
/// Returns a default [`Executor`] instance to use when constructing a
/// resource pool.
pub fn default_executor() -> Result<Box<dyn Executor>, BuildError> {
    Ok(Box::new(GlobalExecutor))
}

#[cfg(not(feature = "global-exec"))]
/// Returns a default [`Executor`] instance to use when constructing a
/// resource pool.
pub fn default_executor() -> Result<Box<dyn Executor>, BuildError> {
    Err(BuildError::NoExecutor)
}
