use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_lite::future::Boxed as BoxFuture;
use futures_lite::FutureExt;

use super::borrower::{OrderedQueue, PendingSet};
use super::error::BuildError;
use super::Pool;
use crate::executor::{default_executor, Executor};
use crate::metrics::{NoopRecorder, PoolMetricsRecorder};
use crate::resource::RefMetadata;
use crate::strategy::{AllocationStrategy, Bounded, Unbounded};

/// Future produced by one allocator invocation.
pub type AllocFuture<R, E> = BoxFuture<Result<R, E>>;

/// Future produced by the release handler, borrowing the resource it resets.
pub type ResetFuture<'a, E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'a>>;

/// Future produced by the destroy handler.
pub type DestroyFuture<E> = BoxFuture<Result<(), E>>;

pub type AllocFn<R, E> = Box<dyn Fn() -> AllocFuture<R, E> + Send + Sync>;
pub type ResetFn<R, E> = Box<dyn for<'a> Fn(&'a mut R) -> ResetFuture<'a, E> + Send + Sync>;
pub type DestroyFn<R, E> = Box<dyn Fn(R) -> DestroyFuture<E> + Send + Sync>;
pub type EvictFn<R> = Box<dyn Fn(&R, &RefMetadata) -> bool + Send + Sync>;

fn noop_reset<R, E>(_resource: &mut R) -> ResetFuture<'_, E> {
    Box::pin(async { Ok(()) })
}

fn drop_destroy<R, E>(resource: R) -> DestroyFuture<E> {
    drop(resource);
    Box::pin(async { Ok(()) })
}

fn never_evict<R>(_resource: &R, _meta: &RefMetadata) -> bool {
    false
}

/// The settled configuration a pool runs with.
pub(crate) struct PoolConfig<R: Send + 'static, E: Send + 'static> {
    pub(crate) allocator: AllocFn<R, E>,
    pub(crate) strategy: Arc<dyn AllocationStrategy>,
    pub(crate) max_pending: Option<usize>,
    pub(crate) reset: ResetFn<R, E>,
    pub(crate) destroy: DestroyFn<R, E>,
    pub(crate) evict: EvictFn<R>,
    pub(crate) executor: Box<dyn Executor>,
    pub(crate) delivery: Option<Box<dyn Executor>>,
    pub(crate) recorder: Arc<dyn PoolMetricsRecorder>,
}

/// Accumulates pool settings and produces a [`Pool`].
///
/// Defaults: unbounded allocation, unbounded pending queue, no-op release
/// handler, drop-the-resource destroy handler, never-evict predicate,
/// in-place delivery, FIFO pending order, thread affinity off, initial size
/// zero.
pub struct PoolBuilder<R: Send + 'static, E: Send + 'static> {
    allocator: AllocFn<R, E>,
    strategy: Option<Arc<dyn AllocationStrategy>>,
    max_pending: Option<usize>,
    reset: ResetFn<R, E>,
    destroy: DestroyFn<R, E>,
    evict: EvictFn<R>,
    executor: Option<Box<dyn Executor>>,
    delivery: Option<Box<dyn Executor>>,
    recorder: Option<Arc<dyn PoolMetricsRecorder>>,
    lifo: bool,
    thread_affinity: bool,
    initial_size: usize,
}

impl<R: Send, E: Send> PoolBuilder<R, E> {
    /// Start building a pool around an asynchronous allocator, invoked once
    /// per resource to create.
    pub fn new<C, F>(allocator: C) -> Self
    where
        C: Fn() -> F + Send + Sync + 'static,
        F: Future<Output = Result<R, E>> + Send + 'static,
    {
        Self {
            allocator: Box::new(move || allocator().boxed()),
            strategy: None,
            max_pending: None,
            reset: Box::new(noop_reset::<R, E>),
            destroy: Box::new(drop_destroy::<R, E>),
            evict: Box::new(never_evict::<R>),
            executor: None,
            delivery: None,
            recorder: None,
            lifo: false,
            thread_affinity: false,
            initial_size: 0,
        }
    }

    /// Limit how many resources may live at once through a custom strategy.
    pub fn allocation_strategy(mut self, strategy: impl AllocationStrategy + 'static) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    /// Allocate at most `max` resources, rejecting further allocations until
    /// some have been released.
    pub fn size_max(self, max: usize) -> Self {
        self.allocation_strategy(Bounded::new(max))
    }

    /// Allocate a new resource whenever no idle one is available, without
    /// limit. This is the default.
    pub fn size_unbounded(self) -> Self {
        self.allocation_strategy(Unbounded::new())
    }

    /// Cap the number of acquisitions allowed to wait for a resource.
    ///
    /// A cap of zero makes acquisitions fail fast whenever no idle resource
    /// and no allocation permit is immediately available.
    pub fn max_pending(mut self, cap: usize) -> Self {
        self.max_pending = Some(cap);
        self
    }

    /// Let any number of acquisitions wait. This is the default.
    pub fn max_pending_unbounded(mut self) -> Self {
        self.max_pending = None;
        self
    }

    /// Reset pipeline applied to a resource on release, before the eviction
    /// predicate is consulted. If it errors, the resource is destroyed and
    /// the error forwarded to the release subscriber.
    pub fn release_handler<F>(mut self, reset: F) -> Self
    where
        F: for<'a> Fn(&'a mut R) -> ResetFuture<'a, E> + Send + Sync + 'static,
    {
        self.reset = Box::new(reset);
        self
    }

    /// Teardown pipeline applied to a resource leaving the pool. Errors are
    /// swallowed. Defaults to dropping the resource.
    pub fn destroy_handler<D, F>(mut self, destroy: D) -> Self
    where
        D: Fn(R) -> F + Send + Sync + 'static,
        F: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.destroy = Box::new(move |resource| destroy(resource).boxed());
        self
    }

    /// Decide whether a resource should be destroyed (`true`) instead of
    /// recycled. Consulted after the release handler and again before an idle
    /// resource is handed to a borrower.
    pub fn eviction_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&R, &RefMetadata) -> bool + Send + Sync + 'static,
    {
        self.evict = Box::new(predicate);
        self
    }

    /// Evict resources that have been idle for `max_idle` or longer.
    pub fn evict_idle(self, max_idle: Duration) -> Self {
        self.eviction_predicate(move |_, meta| meta.idle_time >= max_idle)
    }

    /// Executor running the pool's background futures: allocations, destroy
    /// pipelines and orphaned release pipelines. Defaults to the global
    /// executor when the `global-exec` feature is enabled.
    pub fn executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Some(Box::new(executor));
        self
    }

    /// Deliver acquired resources on the given executor instead of on the
    /// thread running the drain loop.
    pub fn acquisition_executor(mut self, executor: impl Executor + 'static) -> Self {
        self.delivery = Some(Box::new(executor));
        self
    }

    /// Instrumentation sink for pool events.
    pub fn metrics_recorder(mut self, recorder: impl PoolMetricsRecorder + 'static) -> Self {
        self.recorder = Some(Arc::new(recorder));
        self
    }

    /// Serve pending acquisitions last-in first-out instead of the default
    /// first-in first-out.
    pub fn lifo(mut self, lifo: bool) -> Self {
        self.lifo = lifo;
        self
    }

    /// Prefer handing freed resources to borrowers that subscribed on the
    /// releasing thread, sacrificing FIFO/LIFO fairness for locality.
    pub fn thread_affinity(mut self, affinity: bool) -> Self {
        self.thread_affinity = affinity;
        self
    }

    /// How many resources to allocate up front when the pool is built.
    pub fn initial_size(mut self, count: usize) -> Self {
        self.initial_size = count;
        self
    }

    /// Assemble the pool.
    pub fn build(self) -> Result<Pool<R, E>, BuildError> {
        let executor = match self.executor {
            Some(executor) => executor,
            None => default_executor()?,
        };
        let config = PoolConfig {
            allocator: self.allocator,
            strategy: self
                .strategy
                .unwrap_or_else(|| Arc::new(Unbounded::new())),
            max_pending: self.max_pending,
            reset: self.reset,
            destroy: self.destroy,
            evict: self.evict,
            executor,
            delivery: self.delivery,
            recorder: self.recorder.unwrap_or_else(|| Arc::new(NoopRecorder)),
        };
        // Thread affinity selects its own pending shape; otherwise the
        // pending queue and the idle store share the configured order.
        let pending = if self.thread_affinity {
            PendingSet::affinity()
        } else if self.lifo {
            PendingSet::lifo()
        } else {
            PendingSet::fifo()
        };
        let idle = if self.lifo && !self.thread_affinity {
            OrderedQueue::lifo()
        } else {
            OrderedQueue::fifo()
        };
        let pool = Pool::create(config, pending, idle);
        if self.initial_size > 0 {
            pool.inner().warm_up(self.initial_size);
        }
        Ok(pool)
    }
}
