use std::fmt::{self, Debug, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_channel::oneshot;
use futures_lite::future::Boxed as BoxFuture;
use futures_util::future::FutureExt as _;
use tracing::{debug, warn};

mod acquire;
pub use self::acquire::Acquire;

pub(crate) mod borrower;
use self::borrower::{Borrower, HandoffPath, OrderedQueue, PendingSet, Verdict};

mod config;
pub use self::config::{
    AllocFn, AllocFuture, DestroyFn, DestroyFuture, EvictFn, PoolBuilder, ResetFn, ResetFuture,
};
use self::config::PoolConfig;

mod error;
pub use self::error::{BuildError, PoolError};

use crate::resource::{PooledRef, Slot};

/// A snapshot of the pool's counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStatus {
    /// Resources allocated or mid-allocation.
    pub live: usize,
    /// Resources currently checked out to borrowers.
    pub acquired: usize,
    /// Resources sitting in the idle store.
    pub idle: usize,
    /// Acquisitions waiting for a resource.
    pub pending: usize,
    /// Allocations in flight.
    pub inflight: usize,
}

pub(crate) struct PoolInner<R: Send + 'static, E: Send + 'static> {
    config: PoolConfig<R, E>,
    idle: OrderedQueue<Slot<R>>,
    pending: PendingSet<R, E>,
    pending_size: AtomicUsize,
    live: AtomicUsize,
    acquired: AtomicUsize,
    inflight: AtomicUsize,
    wip: AtomicUsize,
    disposed: AtomicBool,
}

impl<R: Send, E: Send> PoolInner<R, E> {
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Register one borrower, applying the pending-queue policy.
    pub(crate) fn subscribe(
        self: &Arc<Self>,
    ) -> Result<oneshot::Receiver<Verdict<R, E>>, PoolError<E>> {
        if self.is_disposed() {
            return Err(PoolError::Shutdown);
        }
        match self.config.max_pending {
            Some(0) => {
                // Fail-fast mode: only borrowers that can be served from the
                // idle store or a fresh allocation may register.
                if self.idle.len() == 0 && self.config.strategy.estimate_permits() == 0 {
                    return Err(PoolError::PendingLimitReached);
                }
                self.pending_size.fetch_add(1, Ordering::AcqRel);
            }
            Some(cap) => {
                let admitted = self
                    .pending_size
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < cap).then(|| n + 1)
                    })
                    .is_ok();
                if !admitted {
                    return Err(PoolError::PendingLimitReached);
                }
            }
            None => {
                self.pending_size.fetch_add(1, Ordering::AcqRel);
            }
        }

        let (borrower, receiver) = Borrower::channel();
        self.pending.push(borrower);
        // Always re-enter the drain after enqueueing: if a dispose raced the
        // checks above, the sweep at the top of the loop fails this borrower.
        self.drain();
        Ok(receiver)
    }

    /// Work-stealing serializer around [`drain_loop`](Self::drain_loop): the
    /// caller flipping `wip` from zero becomes the executor, everyone else
    /// just marks missed work and returns.
    pub(crate) fn drain(self: &Arc<Self>) {
        if self.wip.fetch_add(1, Ordering::AcqRel) == 0 {
            self.drain_loop();
        }
    }

    fn drain_loop(self: &Arc<Self>) {
        let mut missed = 1;
        loop {
            loop {
                if self.is_disposed() {
                    self.sweep_terminated();
                    break;
                }
                let pending_count = self.pending_size.load(Ordering::Acquire);
                if pending_count == 0 {
                    break;
                }

                if self.idle.len() > 0 {
                    // An idle resource is preferred over a new allocation.
                    let slot = match self.idle.poll() {
                        Some(slot) => slot,
                        None => continue,
                    };
                    // Opportunistic eviction: the waiting borrower is not
                    // consumed, so it stays first in line for the replacement
                    // allocated on the next pass. A panicking predicate
                    // counts as eviction.
                    let evicted = catch_unwind(AssertUnwindSafe(|| {
                        (self.config.evict)(&slot.resource, &slot.info.metadata())
                    }))
                    .unwrap_or(true);
                    if evicted {
                        self.live.fetch_sub(1, Ordering::AcqRel);
                        self.config.strategy.return_permits(1);
                        self.spawn_destroy(slot);
                        continue;
                    }
                    let (borrower, path) = match self.pending.poll() {
                        Some(polled) => polled,
                        None => {
                            self.idle.push(slot);
                            continue;
                        }
                    };
                    self.pending_size.fetch_sub(1, Ordering::AcqRel);
                    if borrower.is_cancelled() {
                        self.idle.push(slot);
                        continue;
                    }
                    self.acquired.fetch_add(1, Ordering::AcqRel);
                    match path {
                        HandoffPath::Fast => self.config.recorder.record_fast_path(),
                        HandoffPath::Slow => self.config.recorder.record_slow_path(),
                        HandoffPath::Direct => (),
                    }
                    self.config.recorder.record_recycled();
                    if let Some(released_at) = slot.info.released_at {
                        self.config
                            .recorder
                            .record_idle_on_recycle(released_at.elapsed());
                    }
                    self.deliver(borrower, slot);
                } else {
                    // No idle resource: allocate under the permit budget.
                    if self.config.strategy.try_get_permits(1) == 0 {
                        break;
                    }
                    let borrower = match self.pending.poll() {
                        Some((borrower, _)) => borrower,
                        None => {
                            self.config.strategy.return_permits(1);
                            continue;
                        }
                    };
                    self.pending_size.fetch_sub(1, Ordering::AcqRel);
                    if borrower.is_cancelled() {
                        self.config.strategy.return_permits(1);
                        continue;
                    }
                    self.acquired.fetch_add(1, Ordering::AcqRel);
                    self.live.fetch_add(1, Ordering::AcqRel);
                    self.inflight.fetch_add(1, Ordering::AcqRel);
                    self.spawn_allocation(borrower);
                }
            }

            let wip = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if wip == 0 {
                return;
            }
            missed = wip;
        }
    }

    /// Fail every waiting borrower and destroy every idle resource.
    fn sweep_terminated(self: &Arc<Self>) {
        while let Some((borrower, _)) = self.pending.poll() {
            self.pending_size.fetch_sub(1, Ordering::AcqRel);
            borrower.fail(PoolError::Shutdown);
        }
        while let Some(slot) = self.idle.poll() {
            self.live.fetch_sub(1, Ordering::AcqRel);
            self.config.strategy.return_permits(1);
            self.spawn_destroy(slot);
        }
    }

    fn spawn_allocation(self: &Arc<Self>, borrower: Borrower<R, E>) {
        let pool = self.clone();
        self.spawn_obj(Box::pin(async move {
            let started = Instant::now();
            match AssertUnwindSafe((pool.config.allocator)()).catch_unwind().await {
                Ok(Ok(resource)) => {
                    pool.inflight.fetch_sub(1, Ordering::AcqRel);
                    pool.config
                        .recorder
                        .record_allocation_success(started.elapsed());
                    pool.deliver(borrower, Slot::new(resource));
                }
                Ok(Err(err)) => {
                    pool.allocation_failed(started);
                    borrower.fail(PoolError::Resource(err));
                    pool.drain();
                }
                Err(_panic) => {
                    pool.allocation_failed(started);
                    warn!("resource allocator panicked");
                    // The waiter observes the dropped channel as a shutdown.
                    drop(borrower);
                    pool.drain();
                }
            }
        }));
    }

    fn allocation_failed(&self, started: Instant) {
        self.inflight.fetch_sub(1, Ordering::AcqRel);
        self.acquired.fetch_sub(1, Ordering::AcqRel);
        self.live.fetch_sub(1, Ordering::AcqRel);
        self.config.strategy.return_permits(1);
        self.config
            .recorder
            .record_allocation_failure(started.elapsed());
    }

    fn deliver(self: &Arc<Self>, borrower: Borrower<R, E>, mut slot: Slot<R>) {
        slot.info.acquire_count += 1;
        let pooled = PooledRef::new(self.clone(), slot);
        match &self.config.delivery {
            None => borrower.deliver(pooled),
            Some(executor) => {
                executor.spawn_obj(Box::pin(async move { borrower.deliver(pooled) }));
            }
        }
    }

    /// The release side of the state machine: reset, vet, recycle or destroy,
    /// then re-enter the drain. Cold until awaited.
    pub(crate) fn release_pipeline(
        self: &Arc<Self>,
        slot: Slot<R>,
    ) -> BoxFuture<Result<(), PoolError<E>>> {
        let pool = self.clone();
        Box::pin(async move {
            let mut slot = slot;
            pool.acquired.fetch_sub(1, Ordering::AcqRel);
            if pool.is_disposed() {
                // Pass-through mode: references outliving the pool are
                // destroyed instead of recycled.
                pool.live.fetch_sub(1, Ordering::AcqRel);
                pool.config.strategy.return_permits(1);
                pool.destroy_now(slot).await;
                return Ok(());
            }

            let started = Instant::now();
            let outcome = AssertUnwindSafe((pool.config.reset)(&mut slot.resource))
                .catch_unwind()
                .await;
            pool.config.recorder.record_reset(started.elapsed());
            match outcome {
                Ok(Ok(())) => {
                    slot.info.released_at = Some(Instant::now());
                    let evicted = catch_unwind(AssertUnwindSafe(|| {
                        (pool.config.evict)(&slot.resource, &slot.info.metadata())
                    }))
                    .unwrap_or(true);
                    if evicted {
                        pool.live.fetch_sub(1, Ordering::AcqRel);
                        pool.config.strategy.return_permits(1);
                        pool.destroy_now(slot).await;
                    } else {
                        pool.idle.push(slot);
                    }
                    pool.drain();
                    Ok(())
                }
                Ok(Err(err)) => {
                    // A failed reset evicts: destroy, then surface the error.
                    pool.live.fetch_sub(1, Ordering::AcqRel);
                    pool.config.strategy.return_permits(1);
                    pool.destroy_now(slot).await;
                    pool.drain();
                    Err(PoolError::Resource(err))
                }
                Err(panic) => {
                    pool.live.fetch_sub(1, Ordering::AcqRel);
                    pool.config.strategy.return_permits(1);
                    pool.destroy_now(slot).await;
                    pool.drain();
                    std::panic::resume_unwind(panic)
                }
            }
        })
    }

    /// Unconditional destroy path used by `PooledRef::invalidate`.
    pub(crate) fn invalidate_pipeline(self: &Arc<Self>, slot: Slot<R>) -> BoxFuture<()> {
        let pool = self.clone();
        Box::pin(async move {
            pool.acquired.fetch_sub(1, Ordering::AcqRel);
            pool.live.fetch_sub(1, Ordering::AcqRel);
            pool.config.strategy.return_permits(1);
            pool.destroy_now(slot).await;
            pool.drain();
        })
    }

    async fn destroy_now(&self, slot: Slot<R>) {
        self.config
            .recorder
            .record_lifetime_on_destroy(slot.info.created_at.elapsed());
        let started = Instant::now();
        match AssertUnwindSafe((self.config.destroy)(slot.resource))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => (),
            Ok(Err(_err)) => warn!("destroy handler failed"),
            Err(_panic) => warn!("destroy handler panicked"),
        }
        self.config.recorder.record_destroy(started.elapsed());
    }

    fn spawn_destroy(self: &Arc<Self>, slot: Slot<R>) {
        let pool = self.clone();
        self.spawn_obj(Box::pin(async move { pool.destroy_now(slot).await }));
    }

    pub(crate) fn spawn_obj(&self, task: BoxFuture<()>) {
        self.config.executor.spawn_obj(task);
    }

    pub(crate) fn spawn_detached(&self, task: BoxFuture<Result<(), PoolError<E>>>) {
        self.spawn_obj(Box::pin(async move {
            let _ = task.await;
        }));
    }

    /// Take permits and start allocations for the configured initial size.
    pub(crate) fn warm_up(self: &Arc<Self>, count: usize) {
        for _ in 0..count {
            if self.config.strategy.try_get_permits(1) == 0 {
                break;
            }
            self.live.fetch_add(1, Ordering::AcqRel);
            self.inflight.fetch_add(1, Ordering::AcqRel);
            let pool = self.clone();
            self.spawn_obj(Box::pin(async move {
                let started = Instant::now();
                match AssertUnwindSafe((pool.config.allocator)()).catch_unwind().await {
                    Ok(Ok(resource)) => {
                        pool.inflight.fetch_sub(1, Ordering::AcqRel);
                        pool.config
                            .recorder
                            .record_allocation_success(started.elapsed());
                        pool.idle.push(Slot::new(resource));
                        pool.drain();
                    }
                    Ok(Err(_)) | Err(_) => {
                        pool.inflight.fetch_sub(1, Ordering::AcqRel);
                        pool.live.fetch_sub(1, Ordering::AcqRel);
                        pool.config.strategy.return_permits(1);
                        pool.config
                            .recorder
                            .record_allocation_failure(started.elapsed());
                        warn!("initial resource allocation failed");
                    }
                }
            }));
        }
    }
}

/// A handle to a resource pool, cheap to clone and share between tasks.
pub struct Pool<R: Send + 'static, E: Send + 'static> {
    inner: Arc<PoolInner<R, E>>,
}

impl<R: Send, E: Send> Pool<R, E> {
    pub(crate) fn create(
        config: PoolConfig<R, E>,
        pending: PendingSet<R, E>,
        idle: OrderedQueue<Slot<R>>,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                idle,
                pending,
                pending_size: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                acquired: AtomicUsize::new(0),
                inflight: AtomicUsize::new(0),
                wip: AtomicUsize::new(0),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<PoolInner<R, E>> {
        &self.inner
    }

    /// Request a resource. The returned future does nothing until polled.
    pub fn acquire(&self) -> Acquire<R, E> {
        Acquire::new(self.inner.clone())
    }

    /// Shut the pool down: pending acquisitions fail, idle resources are
    /// destroyed, and later acquisitions fail immediately. References still
    /// checked out keep working and are destroyed on release.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("pool disposed");
        self.inner.drain();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// A point-in-time view of the pool's counters.
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            live: self.inner.live.load(Ordering::Acquire),
            acquired: self.inner.acquired.load(Ordering::Acquire),
            idle: self.inner.idle.len(),
            pending: self.inner.pending_size.load(Ordering::Acquire),
            inflight: self.inner.inflight.load(Ordering::Acquire),
        }
    }
}

impl<R: Send, E: Send> Clone for Pool<R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Send, E: Send> Debug for Pool<R, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let status = self.status();
        f.debug_struct("Pool")
            .field("live", &status.live)
            .field("acquired", &status.acquired)
            .field("idle", &status.idle)
            .field("pending", &status.pending)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
