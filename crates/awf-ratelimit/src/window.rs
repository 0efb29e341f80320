/// A fixed-size ring-buffer sliding window over one time unit (seconds for
/// RPM/bytes-per-minute, minutes for RPH).
///
/// `last_slot < 0` is the `fresh` state: no origin has been established yet.
/// `advance` is the only place that mutates `last_slot`/`last_time`; `record`
/// and `count` both go through it so `total == sum(slots)` always holds
/// after either call returns.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    slots: Vec<u64>,
    n: usize,
    total: u64,
    last_slot: i64,
    last_time: u64,
}

impl SlidingWindow {
    pub fn new(n: usize) -> Self {
        Self {
            slots: vec![0; n],
            n,
            total: 0,
            last_slot: -1,
            last_time: 0,
        }
    }

    /// Moves the window's time origin forward to `now`, zeroing any slots
    /// that have aged out. A full slot-count's worth of elapsed time clears
    /// the whole ring rather than looping `n` times, to avoid drift.
    pub fn advance(&mut self, now: u64) {
        if self.last_slot < 0 {
            self.last_time = now;
            self.last_slot = (now % self.n as u64) as i64;
            return;
        }

        let elapsed = now.saturating_sub(self.last_time);
        if elapsed == 0 {
            return;
        }

        if elapsed >= self.n as u64 {
            self.slots.iter_mut().for_each(|s| *s = 0);
            self.total = 0;
        } else {
            for i in 1..=elapsed {
                let idx = ((self.last_slot as u64 + i) % self.n as u64) as usize;
                self.total -= self.slots[idx];
                self.slots[idx] = 0;
            }
        }

        self.last_slot = (now % self.n as u64) as i64;
        self.last_time = now;
    }

    pub fn record(&mut self, now: u64, value: u64) {
        self.advance(now);
        let idx = (now % self.n as u64) as usize;
        self.slots[idx] += value;
        self.total += value;
    }

    pub fn count(&mut self, now: u64) -> u64 {
        self.advance(now);
        self.total
    }

    /// Scans slots oldest-to-newest, accumulating expiries; the slot at
    /// `age` seconds behind the current one ages out of the window in
    /// `n - age` seconds, so that's the value returned (floor 1) at the
    /// first slot whose expiry would drop the total strictly below `limit`.
    /// Assumes `advance`/`count` already ran for the current instant.
    pub fn estimate_retry_after(&self, limit: u64) -> u64 {
        if self.last_slot < 0 {
            return 1;
        }
        let n = self.n as i64;
        let mut running = self.total;
        for age in (0..self.n).rev() {
            let idx = (((self.last_slot - age as i64) % n + n) % n) as usize;
            running = running.saturating_sub(self.slots[idx]);
            if running < limit {
                return (self.n - age) as u64;
            }
        }
        1
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_window_establishes_origin_without_clearing() {
        let mut w = SlidingWindow::new(60);
        assert_eq!(w.count(100), 0);
        w.record(100, 5);
        assert_eq!(w.total(), 5);
    }

    #[test]
    fn monotonic_remaining_within_a_slot() {
        let mut w = SlidingWindow::new(60);
        w.record(0, 1);
        assert_eq!(w.count(0), 1);
        w.record(0, 1);
        assert_eq!(w.count(0), 2);
        w.record(0, 1);
        assert_eq!(w.count(0), 3);
    }

    #[test]
    fn slots_age_out_individually_before_full_rollover() {
        let mut w = SlidingWindow::new(3);
        w.record(0, 1);
        w.record(1, 1);
        w.record(2, 1);
        assert_eq!(w.count(2), 3);
        // age out slot 0 only.
        assert_eq!(w.count(3), 2);
    }

    #[test]
    fn full_rollover_clears_the_whole_ring() {
        let mut w = SlidingWindow::new(3);
        w.record(0, 1);
        w.record(1, 1);
        w.record(2, 1);
        assert_eq!(w.count(100), 0);
    }

    #[test]
    fn window_accepts_limit_more_requests_after_rollover() {
        let mut w = SlidingWindow::new(60);
        for t in 0..60 {
            w.record(t, 1);
        }
        assert_eq!(w.count(59), 60);
        // after a full cycle, the window should accept 60 more.
        for t in 60..120 {
            w.record(t, 1);
        }
        assert_eq!(w.count(119), 60);
    }

    #[test]
    fn estimate_retry_after_is_at_least_one() {
        let mut w = SlidingWindow::new(60);
        w.record(0, 5);
        assert!(w.estimate_retry_after(5) >= 1);
    }

    #[test]
    fn estimate_retry_after_burst_in_current_second_reports_nearly_full_window() {
        // All offending requests land in the current second: only the
        // oldest-possible expiry (the current slot, a full window away)
        // drops the count below the limit.
        let mut w = SlidingWindow::new(60);
        w.record(0, 5);
        assert_eq!(w.count(0), 5);
        assert_eq!(w.estimate_retry_after(5), 60);
    }

    #[test]
    fn estimate_retry_after_oldest_slot_about_to_expire_reports_one() {
        // Both offending requests landed 59 seconds ago; nothing since, so
        // the oldest (and only occupied) slot is one tick from aging out.
        let mut w = SlidingWindow::new(60);
        w.record(0, 2);
        assert_eq!(w.count(59), 2);
        assert_eq!(w.estimate_retry_after(2), 1);
    }
}
