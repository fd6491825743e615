use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Schedules periodic broadcast discovery.
///
/// The first call to [`due`](DiscoveryTimer::due) always fires. After that the timer fires once
/// per interval until it is killed.
#[derive(Debug)]
pub(crate) struct DiscoveryTimer {
    /// Next deadline in microseconds.
    next: AtomicU64,
    interval: u64,
    dead: AtomicBool,
}

impl DiscoveryTimer {
    pub(crate) const fn new(interval: u64) -> Self {
        Self {
            next: AtomicU64::new(0),
            interval,
            dead: AtomicBool::new(false),
        }
    }

    /// Returns `true` exactly once per interval, even with concurrent callers.
    pub(crate) fn due(&self, now: u64) -> bool {
        if self.dead.load(Ordering::Acquire) {
            return false;
        }

        let next = self.next.load(Ordering::Acquire);

        if now < next {
            return false;
        }

        self.next
            .compare_exchange(
                next,
                now.saturating_add(self.interval),
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Stop the timer for good.
    pub(crate) fn kill(&self) {
        self.dead.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_eagerly_then_periodically() {
        let timer = DiscoveryTimer::new(60_000_000);

        assert!(timer.due(5));
        assert!(!timer.due(6));
        assert!(!timer.due(60_000_004));
        assert!(timer.due(60_000_005));
        assert!(!timer.due(60_000_006));
    }

    #[test]
    fn killed() {
        let timer = DiscoveryTimer::new(1);

        timer.kill();

        assert!(!timer.due(100));
    }
}
