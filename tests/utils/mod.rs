use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use slotpool::{AllocationStrategy, PoolMetricsRecorder};

pub struct AtomicCounter {
    count: AtomicUsize,
}

#[allow(unused)]
impl AtomicCounter {
    pub fn new(val: usize) -> Self {
        Self {
            count: AtomicUsize::new(val),
        }
    }

    pub fn increment(&self) -> usize {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn decrement(&self) -> usize {
        self.count.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub fn value(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn set(&self, val: usize) {
        self.count.store(val, Ordering::SeqCst)
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Spin until `cond` holds, allowing background executor tasks to finish.
#[allow(unused)]
pub fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..5000 {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("condition not reached in time");
}

/// Counting metrics sink shared between the pool and the test body.
#[derive(Clone, Default)]
#[allow(unused)]
pub struct Recorder {
    counts: Arc<Counts>,
}

#[derive(Default)]
struct Counts {
    alloc_success: AtomicUsize,
    alloc_failure: AtomicUsize,
    resets: AtomicUsize,
    destroys: AtomicUsize,
    recycled: AtomicUsize,
    fast_path: AtomicUsize,
    slow_path: AtomicUsize,
}

#[allow(unused)]
impl Recorder {
    pub fn alloc_success(&self) -> usize {
        self.counts.alloc_success.load(Ordering::Acquire)
    }

    pub fn alloc_failure(&self) -> usize {
        self.counts.alloc_failure.load(Ordering::Acquire)
    }

    pub fn resets(&self) -> usize {
        self.counts.resets.load(Ordering::Acquire)
    }

    pub fn destroys(&self) -> usize {
        self.counts.destroys.load(Ordering::Acquire)
    }

    pub fn recycled(&self) -> usize {
        self.counts.recycled.load(Ordering::Acquire)
    }

    pub fn fast_path(&self) -> usize {
        self.counts.fast_path.load(Ordering::Acquire)
    }

    pub fn slow_path(&self) -> usize {
        self.counts.slow_path.load(Ordering::Acquire)
    }
}

impl PoolMetricsRecorder for Recorder {
    fn record_allocation_success(&self, _duration: Duration) {
        self.counts.alloc_success.fetch_add(1, Ordering::SeqCst);
    }

    fn record_allocation_failure(&self, _duration: Duration) {
        self.counts.alloc_failure.fetch_add(1, Ordering::SeqCst);
    }

    fn record_reset(&self, _duration: Duration) {
        self.counts.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn record_destroy(&self, _duration: Duration) {
        self.counts.destroys.fetch_add(1, Ordering::SeqCst);
    }

    fn record_recycled(&self) {
        self.counts.recycled.fetch_add(1, Ordering::SeqCst);
    }

    fn record_fast_path(&self) {
        self.counts.fast_path.fetch_add(1, Ordering::SeqCst);
    }

    fn record_slow_path(&self) {
        self.counts.slow_path.fetch_add(1, Ordering::SeqCst);
    }
}

/// Strategy wrapper letting the test keep a handle on the permit counters the
/// pool consumes.
#[allow(unused)]
pub struct SharedStrategy(pub Arc<dyn AllocationStrategy>);

impl AllocationStrategy for SharedStrategy {
    fn try_get_permits(&self, desired: usize) -> usize {
        self.0.try_get_permits(desired)
    }

    fn return_permits(&self, returned: usize) {
        self.0.return_permits(returned)
    }

    fn estimate_permits(&self) -> usize {
        self.0.estimate_permits()
    }

    fn permit_maximum(&self) -> usize {
        self.0.permit_maximum()
    }

    fn permit_granted(&self) -> usize {
        self.0.permit_granted()
    }
}
