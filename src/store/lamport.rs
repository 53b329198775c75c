use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic write-timestamp counter, advanced when this node originates a
/// write after observing what a read quorum reported.
#[derive(Debug, Default)]
pub struct LamportClock {
    counter: AtomicU64,
}

impl LamportClock {
    pub fn new() -> Self {
        LamportClock {
            counter: AtomicU64::new(0),
        }
    }

    /// Advances to `max(current, observed) + 1` and returns the new value.
    /// The result is strictly greater than both every timestamp this node
    /// previously minted and everything passed in as `observed`.
    pub fn tick(&self, observed: u64) -> u64 {
        loop {
            let current = self.counter.load(Ordering::SeqCst);
            let next = current.max(observed) + 1;
            if self
                .counter
                .compare_exchange_weak(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }

    pub fn now(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(LamportClock::new().now(), 0);
    }

    #[test]
    fn tick_advances_past_observed() {
        let clock = LamportClock::new();
        assert_eq!(clock.tick(0), 1);
        assert_eq!(clock.tick(0), 2);
        assert_eq!(clock.tick(10), 11);
        // An older observation never moves the counter backwards.
        assert_eq!(clock.tick(3), 12);
        assert_eq!(clock.now(), 12);
    }
}
