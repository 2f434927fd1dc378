use std::time::{Duration, Instant};

/// Fixed-rate tick schedule for a single-threaded loop.
///
/// Deadlines advance by one period per completed tick. When a tick overruns so
/// that the next deadline has already passed, the next tick is due immediately
/// and the schedule re-anchors to the finish time. Late ticks are delayed, never
/// queued up and replayed as a burst.
#[derive(Debug, Clone)]
pub struct TickTimer {
    period: Duration,
    next: Instant,
    late_ticks: u64,
}

impl TickTimer {
    /// First tick is due one period after `start`.
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next: start + period,
            late_ticks: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Instant the next tick should start.
    pub fn next_deadline(&self) -> Instant {
        self.next
    }

    /// Record that the current tick finished at `finished_at`.
    pub fn complete(&mut self, finished_at: Instant) {
        let scheduled = self.next + self.period;
        if scheduled < finished_at {
            self.late_ticks += 1;
            self.next = finished_at;
        } else {
            self.next = scheduled;
        }
    }

    /// Ticks whose successor could not start on schedule.
    pub fn late_ticks(&self) -> u64 {
        self.late_ticks
    }
}
