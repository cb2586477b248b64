use std::sync::atomic::{AtomicUsize, Ordering};

/// Accounting of the resource budget as a set of permits.
///
/// One permit corresponds to one live resource (allocated or mid-allocation).
/// The pool takes a permit before starting an allocation and returns it when
/// a resource is destroyed or an allocation fails.
pub trait AllocationStrategy: Send + Sync {
    /// Try to obtain up to `desired` permits, returning how many were
    /// actually granted (possibly zero). Never blocks.
    fn try_get_permits(&self, desired: usize) -> usize;

    /// Return `returned` permits to the budget.
    fn return_permits(&self, returned: usize);

    /// Best-effort estimate of how many permits could currently be granted.
    fn estimate_permits(&self) -> usize;

    /// The ceiling on concurrently granted permits.
    fn permit_maximum(&self) -> usize;

    /// How many permits are granted right now.
    fn permit_granted(&self) -> usize;
}

/// A strategy that grants every request and only counts what is out.
pub struct Unbounded {
    granted: AtomicUsize,
}

impl Unbounded {
    pub fn new() -> Self {
        Self {
            granted: AtomicUsize::new(0),
        }
    }
}

impl Default for Unbounded {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocationStrategy for Unbounded {
    fn try_get_permits(&self, desired: usize) -> usize {
        if desired == 0 {
            return 0;
        }
        // The counter saturates instead of wrapping so that a pathological
        // number of grants cannot corrupt the accounting.
        self.granted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(desired))
            })
            .unwrap_or(usize::MAX);
        desired
    }

    fn return_permits(&self, returned: usize) {
        self.granted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(returned))
            })
            .unwrap_or(0);
    }

    fn estimate_permits(&self) -> usize {
        usize::MAX
    }

    fn permit_maximum(&self) -> usize {
        usize::MAX
    }

    fn permit_granted(&self) -> usize {
        self.granted.load(Ordering::Acquire)
    }
}

/// A strategy that caps the number of concurrently granted permits.
pub struct Bounded {
    max: usize,
    permits: AtomicUsize,
}

impl Bounded {
    /// Create a strategy granting at most `max` permits, with `max` clamped
    /// to at least one.
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            max,
            permits: AtomicUsize::new(max),
        }
    }
}

impl AllocationStrategy for Bounded {
    fn try_get_permits(&self, desired: usize) -> usize {
        if desired == 0 {
            return 0;
        }
        // Single CAS loop granting min(desired, available); cheaper than an
        // increment-then-compensate pair for the common desired == 1 case.
        let mut available = self.permits.load(Ordering::Acquire);
        loop {
            let granted = desired.min(available);
            match self.permits.compare_exchange_weak(
                available,
                available - granted,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return granted,
                Err(current) => available = current,
            }
        }
    }

    fn return_permits(&self, returned: usize) {
        self.permits.fetch_add(returned, Ordering::AcqRel);
    }

    fn estimate_permits(&self) -> usize {
        self.permits.load(Ordering::Acquire)
    }

    fn permit_maximum(&self) -> usize {
        self.max
    }

    fn permit_granted(&self) -> usize {
        self.max - self.permits.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn unbounded_grants_everything() {
        let strat = Unbounded::new();
        assert_eq!(strat.try_get_permits(usize::MAX), usize::MAX);
        assert_eq!(strat.try_get_permits(usize::MAX), usize::MAX);
        assert_eq!(strat.estimate_permits(), usize::MAX);
        assert_eq!(strat.permit_maximum(), usize::MAX);
        assert_eq!(strat.permit_granted(), usize::MAX);

        strat.return_permits(usize::MAX);
        strat.return_permits(usize::MAX);
        // Returning more than was recorded leaves the counter at zero.
        strat.return_permits(1);
        assert_eq!(strat.permit_granted(), 0);
    }

    #[test]
    fn bounded_grants_at_most_available() {
        let strat = Bounded::new(3);
        assert_eq!(strat.try_get_permits(2), 2);
        assert_eq!(strat.try_get_permits(5), 1);
        assert_eq!(strat.try_get_permits(1), 0);
        assert_eq!(strat.permit_granted(), 3);
        assert_eq!(strat.estimate_permits(), 0);

        strat.return_permits(3);
        assert_eq!(strat.permit_granted(), 0);
        assert_eq!(strat.estimate_permits(), 3);
    }

    #[test]
    fn bounded_zero_size_clamps_to_one() {
        let strat = Bounded::new(0);
        assert_eq!(strat.permit_maximum(), 1);
        assert_eq!(strat.try_get_permits(1), 1);
    }

    #[test]
    fn bounded_contention() {
        let strat = Arc::new(Bounded::new(3));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let strat = strat.clone();
            handles.push(thread::spawn(move || strat.try_get_permits(1)));
        }
        let first_round: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(first_round, 3);

        // Each successful taker hands its permit back; subsequent takers can
        // then be granted, for a total of ten grants across the run.
        let mut total = first_round;
        while total < 10 {
            strat.return_permits(1);
            let granted = strat.try_get_permits(1);
            assert_eq!(granted, 1);
            total += granted;
        }
        strat.return_permits(3);
        assert_eq!(total, 10);
        assert_eq!(strat.permit_granted(), 0);
    }
}
