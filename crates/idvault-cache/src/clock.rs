use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic microsecond clock for snapshot ids.
///
/// Returns `max(wall_clock, last + 1)`, so two snapshots created by the same
/// process never share an id even within one microsecond or across a
/// backwards wall-clock step.
pub struct SnapshotClock {
    last_micros: Mutex<u64>,
}

impl SnapshotClock {
    pub fn new() -> Self {
        Self {
            last_micros: Mutex::new(0),
        }
    }

    /// Next tick, strictly greater than every previous tick of this clock.
    pub fn tick(&self) -> u64 {
        let wall = Self::wall_clock_micros();
        let mut last = self.last_micros.lock().expect("snapshot clock poisoned");
        let next = wall.max(*last + 1);
        *last = next;
        next
    }

    fn wall_clock_micros() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}

impl Default for SnapshotClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_strictly_increasing() {
        let clock = SnapshotClock::new();
        let mut prev = clock.tick();
        for _ in 0..10_000 {
            let next = clock.tick();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn concurrent_ticks_are_unique() {
        use std::collections::HashSet;
        use std::sync::Arc;
        use std::thread;

        let clock = Arc::new(SnapshotClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                thread::spawn(move || (0..1000).map(|_| clock.tick()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for tick in h.join().expect("thread should not panic") {
                assert!(seen.insert(tick));
            }
        }
    }
}
