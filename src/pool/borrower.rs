use std::collections::VecDeque;
use std::thread::{self, ThreadId};

use concurrent_queue::ConcurrentQueue;
use dashmap::DashMap;
use futures_channel::oneshot;
use parking_lot::Mutex;

use super::error::PoolError;
use crate::resource::PooledRef;

pub(crate) type Verdict<R, E> = Result<PooledRef<R, E>, PoolError<E>>;

/// One outstanding acquisition, enqueued until matched, failed or cancelled.
///
/// The delivery channel doubles as the borrower state machine: dropping the
/// receiver marks the borrower cancelled, a successful send delivers, and a
/// send of an error fails it.
pub(crate) struct Borrower<R: Send + 'static, E: Send + 'static> {
    sender: oneshot::Sender<Verdict<R, E>>,
    thread: ThreadId,
}

impl<R: Send, E: Send> Borrower<R, E> {
    pub fn channel() -> (Self, oneshot::Receiver<Verdict<R, E>>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender,
                thread: thread::current().id(),
            },
            receiver,
        )
    }

    /// True once the matching receiver has been dropped.
    pub fn is_cancelled(&self) -> bool {
        self.sender.is_canceled()
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Hand a pooled reference to the waiting subscriber.
    ///
    /// If cancellation won the race the reference comes back out of the
    /// channel and is dropped here, which auto-releases it to the pool.
    pub fn deliver(self, pooled: PooledRef<R, E>) {
        let _ = self.sender.send(Ok(pooled));
    }

    pub fn fail(self, error: PoolError<E>) {
        let _ = self.sender.send(Err(error));
    }
}

/// How a borrower was matched with a freed resource.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum HandoffPath {
    /// Plain FIFO/LIFO poll.
    Direct,
    /// Thread-affinity match on the draining thread.
    Fast,
    /// Thread-affinity fallback to another thread's sub-queue.
    Slow,
}

/// Multi-producer container with a configurable poll order.
///
/// The lock-free queue only supports FIFO order; LIFO access goes through a
/// mutex-guarded deque with push/pop-sized critical sections.
pub(crate) enum OrderedQueue<T> {
    Fifo(ConcurrentQueue<T>),
    Lifo(Mutex<VecDeque<T>>),
}

impl<T> OrderedQueue<T> {
    pub fn fifo() -> Self {
        Self::Fifo(ConcurrentQueue::unbounded())
    }

    pub fn lifo() -> Self {
        Self::Lifo(Mutex::new(VecDeque::new()))
    }

    pub fn push(&self, value: T) {
        match self {
            // The queue is never closed or full, so this cannot fail.
            Self::Fifo(queue) => queue.push(value).unwrap_or(()),
            Self::Lifo(deque) => deque.lock().push_back(value),
        }
    }

    pub fn poll(&self) -> Option<T> {
        match self {
            Self::Fifo(queue) => queue.pop().ok(),
            Self::Lifo(deque) => deque.lock().pop_back(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Fifo(queue) => queue.len(),
            Self::Lifo(deque) => deque.lock().len(),
        }
    }
}

/// The set of waiting borrowers, in one of the three configured shapes.
pub(crate) enum PendingSet<R: Send + 'static, E: Send + 'static> {
    Ordered(OrderedQueue<Borrower<R, E>>),
    Affinity(AffinityQueue<R, E>),
}

impl<R: Send, E: Send> PendingSet<R, E> {
    pub fn fifo() -> Self {
        Self::Ordered(OrderedQueue::fifo())
    }

    pub fn lifo() -> Self {
        Self::Ordered(OrderedQueue::lifo())
    }

    pub fn affinity() -> Self {
        Self::Affinity(AffinityQueue::new())
    }

    pub fn push(&self, borrower: Borrower<R, E>) {
        match self {
            Self::Ordered(queue) => queue.push(borrower),
            Self::Affinity(queue) => queue.push(borrower),
        }
    }

    pub fn poll(&self) -> Option<(Borrower<R, E>, HandoffPath)> {
        match self {
            Self::Ordered(queue) => queue.poll().map(|b| (b, HandoffPath::Direct)),
            Self::Affinity(queue) => queue.poll(),
        }
    }
}

/// Pending borrowers indexed by subscribing thread.
///
/// Each sub-queue is LIFO so a freed resource lands on the borrower most
/// likely to still have its state in cache. The cross-thread fallback takes
/// the first non-empty sub-queue it finds; fairness is not a goal of this
/// variant.
pub(crate) struct AffinityQueue<R: Send + 'static, E: Send + 'static> {
    shards: DashMap<ThreadId, VecDeque<Borrower<R, E>>>,
}

impl<R: Send, E: Send> AffinityQueue<R, E> {
    fn new() -> Self {
        Self {
            shards: DashMap::new(),
        }
    }

    fn push(&self, borrower: Borrower<R, E>) {
        self.shards
            .entry(borrower.thread())
            .or_default()
            .push_back(borrower);
    }

    fn poll(&self) -> Option<(Borrower<R, E>, HandoffPath)> {
        let current = thread::current().id();
        if let Some(mut shard) = self.shards.get_mut(&current) {
            if let Some(borrower) = shard.pop_back() {
                return Some((borrower, HandoffPath::Fast));
            }
        }
        for mut shard in self.shards.iter_mut() {
            if let Some(borrower) = shard.pop_back() {
                return Some((borrower, HandoffPath::Slow));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_queue_fifo_order() {
        let queue = OrderedQueue::fifo();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.poll(), Some(1));
        assert_eq!(queue.poll(), Some(2));
        assert_eq!(queue.poll(), Some(3));
        assert_eq!(queue.poll(), None);
    }

    #[test]
    fn ordered_queue_lifo_order() {
        let queue = OrderedQueue::lifo();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.poll(), Some(3));
        assert_eq!(queue.poll(), Some(2));
        assert_eq!(queue.poll(), Some(1));
        assert_eq!(queue.poll(), None);
    }

    #[test]
    fn borrower_cancellation_is_observable() {
        let (borrower, receiver) = Borrower::<usize, ()>::channel();
        assert!(!borrower.is_cancelled());
        drop(receiver);
        assert!(borrower.is_cancelled());
    }
}
