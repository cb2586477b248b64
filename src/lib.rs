//! A generic, non-blocking pool of expensive-to-create resources (database
//! connections, network channels, large buffers), multiplexed among many
//! concurrent borrowers.
//!
//! Acquisition, allocation, reset and teardown are all asynchronous; the
//! coordination between waiting borrowers, idle resources and the allocation
//! budget runs through a lock-free drain loop, so no caller ever blocks on
//! pool-internal state.
//!
//! ```no_run
//! use slotpool::{PoolBuilder, PoolError};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PoolBuilder::<Vec<u8>, std::io::Error>::new(|| async {
//!     Ok(Vec::with_capacity(1024))
//! })
//! .size_max(16)
//! .build()?;
//!
//! futures_executor::block_on(async {
//!     let mut buf = pool.acquire().await?;
//!     buf.extend_from_slice(b"hello");
//!     buf.release().await?;
//!     Ok::<_, PoolError<std::io::Error>>(())
//! })?;
//! # Ok(())
//! # }
//! ```

mod executor;
#[cfg(feature = "global-exec")]
pub use self::executor::GlobalExecutor;
pub use self::executor::{default_executor, Executor};

mod metrics;
pub use self::metrics::PoolMetricsRecorder;

mod pool;
pub use self::pool::{
    Acquire, AllocFn, AllocFuture, BuildError, DestroyFn, DestroyFuture, EvictFn, Pool,
    PoolBuilder, PoolError, PoolStatus, ResetFn, ResetFuture,
};

mod resource;
pub use self::resource::{Invalidate, PooledRef, RefMetadata, Release};

mod strategy;
pub use self::strategy::{AllocationStrategy, Bounded, Unbounded};
