use std::fmt::{self, Debug, Display, Formatter};
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_lite::future::Boxed as BoxFuture;

use crate::pool::{PoolError, PoolInner};

/// Book-keeping carried with a resource across its recycles.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RefInfo {
    pub(crate) acquire_count: usize,
    pub(crate) created_at: Instant,
    pub(crate) released_at: Option<Instant>,
}

impl RefInfo {
    pub(crate) fn new() -> Self {
        Self {
            acquire_count: 0,
            created_at: Instant::now(),
            released_at: None,
        }
    }

    pub(crate) fn metadata(&self) -> RefMetadata {
        let now = Instant::now();
        RefMetadata {
            acquire_count: self.acquire_count,
            lifetime: now.duration_since(self.created_at),
            idle_time: now.duration_since(self.released_at.unwrap_or(self.created_at)),
            allocated_at: self.created_at,
            released_at: self.released_at,
        }
    }
}

/// A point-in-time view of a pooled resource's life within the pool.
#[derive(Clone, Copy, Debug)]
pub struct RefMetadata {
    /// How many times the resource has been handed to a borrower.
    pub acquire_count: usize,
    /// Time elapsed since the resource was allocated.
    pub lifetime: Duration,
    /// Time elapsed since the resource was last released (or allocated, if it
    /// was never released).
    pub idle_time: Duration,
    /// When the resource was allocated.
    pub allocated_at: Instant,
    /// When the resource was last released, if ever.
    pub released_at: Option<Instant>,
}

/// A resource together with its pool book-keeping, as stored in the idle
/// queue and moved through the release pipelines.
pub(crate) struct Slot<R> {
    pub(crate) resource: R,
    pub(crate) info: RefInfo,
}

impl<R> Slot<R> {
    pub(crate) fn new(resource: R) -> Self {
        Self {
            resource,
            info: RefInfo::new(),
        }
    }
}

/// Exclusive handle to a pooled resource, valid until released or
/// invalidated.
///
/// Dropping the handle without calling [`release`](Self::release) or
/// [`invalidate`](Self::invalidate) releases it back to the pool through the
/// normal reset pipeline, fire-and-forget.
pub struct PooledRef<R: Send + 'static, E: Send + 'static> {
    slot: Option<Slot<R>>,
    pool: Arc<PoolInner<R, E>>,
}

impl<R: Send, E: Send> PooledRef<R, E> {
    pub(crate) fn new(pool: Arc<PoolInner<R, E>>, slot: Slot<R>) -> Self {
        Self {
            slot: Some(slot),
            pool,
        }
    }

    /// The pooled resource.
    pub fn resource(&self) -> &R {
        self.deref()
    }

    /// Mutable access to the pooled resource.
    pub fn resource_mut(&mut self) -> &mut R {
        self.deref_mut()
    }

    /// A snapshot of the resource's metadata.
    pub fn metadata(&self) -> RefMetadata {
        // The slot is only taken by the consuming terminal calls below.
        self.slot.as_ref().unwrap().info.metadata()
    }

    /// Return the resource to the pool.
    ///
    /// The returned future is cold: the reset pipeline only starts once it is
    /// polled. Dropping it mid-flight hands the remaining work to the pool's
    /// executor.
    pub fn release(mut self) -> Release<R, E> {
        let slot = self.slot.take().unwrap();
        Release {
            state: Some(TerminalState::Init {
                pool: self.pool.clone(),
                slot,
            }),
        }
    }

    /// Remove the resource from the pool and destroy it unconditionally.
    pub fn invalidate(mut self) -> Invalidate<R, E> {
        let slot = self.slot.take().unwrap();
        Invalidate {
            state: Some(TerminalState::Init {
                pool: self.pool.clone(),
                slot,
            }),
        }
    }
}

impl<R: Send + Debug, E: Send> Debug for PooledRef<R, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledRef")
            .field("resource", &self.deref())
            .finish()
    }
}

impl<R: Send + Display, E: Send> Display for PooledRef<R, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self.deref(), f)
    }
}

impl<R: Send, E: Send> Deref for PooledRef<R, E> {
    type Target = R;
    fn deref(&self) -> &Self::Target {
        // note: the slot is present for the whole life of the handle
        &self.slot.as_ref().unwrap().resource
    }
}

impl<R: Send, E: Send> DerefMut for PooledRef<R, E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.slot.as_mut().unwrap().resource
    }
}

impl<R: Send, E: Send> Drop for PooledRef<R, E> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            let pipeline = self.pool.release_pipeline(slot);
            self.pool.spawn_detached(pipeline);
        }
    }
}

enum TerminalState<R: Send + 'static, E: Send + 'static, T> {
    Init {
        pool: Arc<PoolInner<R, E>>,
        slot: Slot<R>,
    },
    Running {
        pool: Arc<PoolInner<R, E>>,
        fut: BoxFuture<T>,
    },
}

/// Future returned by [`PooledRef::release`].
pub struct Release<R: Send + 'static, E: Send + 'static> {
    state: Option<TerminalState<R, E, Result<(), PoolError<E>>>>,
}

// The resource is only ever moved, never borrowed across a suspension, so
// the future stays freely movable even for !Unpin resources.
impl<R: Send, E: Send> Unpin for Release<R, E> {}

impl<R: Send, E: Send> Future for Release<R, E> {
    type Output = Result<(), PoolError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match self.state.take() {
                None => return Poll::Ready(Ok(())),
                Some(TerminalState::Init { pool, slot }) => {
                    let fut = pool.release_pipeline(slot);
                    self.state = Some(TerminalState::Running { pool, fut });
                }
                Some(TerminalState::Running { pool, mut fut }) => {
                    match fut.as_mut().poll(cx) {
                        Poll::Pending => {
                            self.state = Some(TerminalState::Running { pool, fut });
                            return Poll::Pending;
                        }
                        Poll::Ready(result) => return Poll::Ready(result),
                    }
                }
            }
        }
    }
}

impl<R: Send, E: Send> Drop for Release<R, E> {
    fn drop(&mut self) {
        match self.state.take() {
            Some(TerminalState::Init { pool, slot }) => {
                let fut = pool.release_pipeline(slot);
                pool.spawn_detached(fut);
            }
            Some(TerminalState::Running { pool, fut }) => {
                pool.spawn_detached(fut);
            }
            None => (),
        }
    }
}

/// Future returned by [`PooledRef::invalidate`].
pub struct Invalidate<R: Send + 'static, E: Send + 'static> {
    state: Option<TerminalState<R, E, ()>>,
}

impl<R: Send, E: Send> Unpin for Invalidate<R, E> {}

impl<R: Send, E: Send> Future for Invalidate<R, E> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match self.state.take() {
                None => return Poll::Ready(()),
                Some(TerminalState::Init { pool, slot }) => {
                    let fut = pool.invalidate_pipeline(slot);
                    self.state = Some(TerminalState::Running { pool, fut });
                }
                Some(TerminalState::Running { pool, mut fut }) => {
                    match fut.as_mut().poll(cx) {
                        Poll::Pending => {
                            self.state = Some(TerminalState::Running { pool, fut });
                            return Poll::Pending;
                        }
                        Poll::Ready(()) => return Poll::Ready(()),
                    }
                }
            }
        }
    }
}

impl<R: Send, E: Send> Drop for Invalidate<R, E> {
    fn drop(&mut self) {
        match self.state.take() {
            Some(TerminalState::Init { pool, slot }) => {
                let fut = pool.invalidate_pipeline(slot);
                pool.spawn_obj(fut);
            }
            Some(TerminalState::Running { pool, fut }) => {
                pool.spawn_obj(fut);
            }
            None => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn metadata_idle_time_tracks_release() {
        let mut info = RefInfo::new();
        thread::sleep(Duration::from_millis(10));

        // never released: idle time equals lifetime
        let meta = info.metadata();
        assert_eq!(meta.acquire_count, 0);
        assert!(meta.lifetime >= Duration::from_millis(10));
        assert!(meta.idle_time >= Duration::from_millis(10));
        assert!(meta.released_at.is_none());

        info.released_at = Some(Instant::now());
        let meta = info.metadata();
        assert!(meta.idle_time < meta.lifetime);
        assert!(meta.released_at.is_some());
    }
}
