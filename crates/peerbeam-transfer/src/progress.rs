/// Progress and ETA bookkeeping for one transfer. Each side keeps its own
/// tracker; nothing here is shared between sender and receiver.

use std::time::{Duration, Instant};

/// Estimated time remaining.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Eta {
    /// Nothing has moved yet, or no time has passed.
    #[default]
    Calculating,
    Seconds(u64),
}

impl Eta {
    pub fn seconds(self) -> Option<u64> {
        match self {
            Self::Calculating => None,
            Self::Seconds(s) => Some(s),
        }
    }
}

/// Snapshot published to observers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressReport {
    pub bytes_moved: u64,
    pub total_size: u64,
    /// 0.0 ..= 100.0
    pub percent: f64,
    pub eta: Eta,
}

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_size: u64,
    bytes_moved: u64,
    started_at: Instant,
}

impl ProgressTracker {
    pub fn new(total_size: u64, started_at: Instant) -> Self {
        Self {
            total_size,
            bytes_moved: 0,
            started_at,
        }
    }

    pub fn advance(&mut self, bytes: u64) {
        self.bytes_moved = self.bytes_moved.saturating_add(bytes);
    }

    pub fn bytes_moved(&self) -> u64 {
        self.bytes_moved
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn percent(&self) -> f64 {
        if self.total_size == 0 {
            return 0.0;
        }
        (self.bytes_moved as f64 / self.total_size as f64 * 100.0).min(100.0)
    }

    /// `ceil(remaining / (moved / elapsed))`, or `Calculating` until both
    /// moved bytes and elapsed time are nonzero.
    pub fn eta_at(&self, now: Instant) -> Eta {
        let elapsed = self.elapsed_at(now).as_secs_f64();
        if self.bytes_moved == 0 || elapsed <= 0.0 {
            return Eta::Calculating;
        }
        let rate = self.bytes_moved as f64 / elapsed;
        let remaining = self.total_size.saturating_sub(self.bytes_moved) as f64;
        Eta::Seconds((remaining / rate).ceil() as u64)
    }

    pub fn report_at(&self, now: Instant) -> ProgressReport {
        ProgressReport {
            bytes_moved: self.bytes_moved,
            total_size: self.total_size,
            percent: self.percent(),
            eta: self.eta_at(now),
        }
    }

    pub fn report(&self) -> ProgressReport {
        self.report_at(Instant::now())
    }

    /// Final snapshot once every byte is accounted for. An empty file is
    /// complete as soon as its end marker is handled.
    pub fn complete(&self) -> ProgressReport {
        ProgressReport {
            bytes_moved: self.bytes_moved,
            total_size: self.total_size,
            percent: 100.0,
            eta: Eta::Seconds(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_calculating_until_bytes_and_time() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(10 * MIB, start);
        assert_eq!(tracker.eta_at(start + Duration::from_secs(1)), Eta::Calculating);

        tracker.advance(MIB);
        assert_eq!(tracker.eta_at(start), Eta::Calculating);
    }

    #[test]
    fn test_eta_rounds_up() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(10 * MIB, start);
        tracker.advance(3 * MIB);
        // 3 MiB in 2 s -> 1.5 MiB/s, 7 MiB left -> 4.67 s -> 5
        assert_eq!(tracker.eta_at(start + Duration::from_secs(2)), Eta::Seconds(5));
        assert_eq!(tracker.report_at(start + Duration::from_secs(2)).eta.seconds(), Some(5));
    }

    #[test]
    fn test_percent_is_monotonic_and_capped() {
        let mut tracker = ProgressTracker::new(3 * MIB, Instant::now());
        let mut last = tracker.percent();
        for _ in 0..3 {
            tracker.advance(MIB);
            let now = tracker.percent();
            assert!(now >= last);
            last = now;
        }
        assert_eq!(last, 100.0);
        tracker.advance(1);
        assert_eq!(tracker.percent(), 100.0);
    }

    #[test]
    fn test_complete_reports_hundred() {
        let tracker = ProgressTracker::new(0, Instant::now());
        assert_eq!(tracker.percent(), 0.0);
        let report = tracker.complete();
        assert_eq!(report.percent, 100.0);
        assert_eq!(report.eta, Eta::Seconds(0));
    }
}
