//! Per-session request sequence.

use std::sync::atomic::{AtomicU64, Ordering};

/// Correlation ids for outbound frames.
///
/// The next frame carries [`current`](Self::current); the counter moves on
/// only after that frame has been written. Callers serialize
/// read-send-advance so two frames never share an id.
#[derive(Debug, Default)]
pub struct RequestSequenceCounter {
    next: AtomicU64,
}

impl RequestSequenceCounter {
    /// Start at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next outbound frame will carry; equals the number of frames sent.
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }

    /// Record one sent frame. Returns the id that frame carried.
    pub fn advance(&self) -> u64 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn starts_at_zero_and_advances() {
        let counter = RequestSequenceCounter::new();
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.advance(), 0);
        assert_eq!(counter.advance(), 1);
        assert_eq!(counter.current(), 2);
    }

    #[test]
    fn concurrent_advances_are_unique() {
        let counter = Arc::new(RequestSequenceCounter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || (0..100).map(|_| counter.advance()).collect::<Vec<_>>())
            })
            .collect();

        let mut ids: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 800);
        assert_eq!(counter.current(), 800);
    }
}
