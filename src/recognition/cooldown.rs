//! Process-wide remote call cooldown
//!
//! A non-blocking gate: a caller either takes the slot (and restarts the
//! interval) or is told to skip, it never waits.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct CooldownGate {
    interval: Duration,
    last_acquired: Mutex<Option<Instant>>,
}

impl CooldownGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_acquired: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Take the slot if the interval has elapsed since the last acquisition
    pub fn try_acquire(&self) -> bool {
        let mut last = self.last_acquired.lock();
        let open = last.map_or(true, |at| at.elapsed() >= self.interval);
        if open {
            *last = Some(Instant::now());
        }
        open
    }

    /// Time left until the gate opens again
    pub fn remaining(&self) -> Duration {
        self.last_acquired
            .lock()
            .map(|at| self.interval.saturating_sub(at.elapsed()))
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_gate_closes_then_reopens() {
        let gate = CooldownGate::new(Duration::from_millis(50));
        assert_eq!(gate.remaining(), Duration::ZERO);
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        assert!(gate.remaining() > Duration::ZERO);

        thread::sleep(Duration::from_millis(60));
        assert!(gate.try_acquire());
    }

    #[test]
    fn test_zero_interval_always_open() {
        let gate = CooldownGate::new(Duration::ZERO);
        assert!(gate.try_acquire());
        assert!(gate.try_acquire());
    }

    #[test]
    fn test_single_winner_under_contention() {
        let gate = Arc::new(CooldownGate::new(Duration::from_secs(60)));
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    if gate.try_acquire() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
