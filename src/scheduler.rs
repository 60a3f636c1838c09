//! Periodic collection scheduling.
//!
//! Due times of a structure with interval `I` are the multiples of `I`
//! anchored at time zero, so due status is a pure function of the tick window
//! `(previous, now]` and no per-structure firing history is kept.

use crate::registry::{CollectionInterval, StructureId, StructureRegistry, MAX_HOUSEKEEPING_STRUCTURES};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Milliseconds since the driver's epoch.
pub type Timestamp = u64;

/// Interval meaning "never due", and the delay meaning "nothing to reschedule".
pub const NEVER: CollectionInterval = CollectionInterval::MAX;

/// True when a multiple of `interval` lies in `(previous, now]`, or the interval is 0.
pub fn is_due(interval: CollectionInterval, previous: Timestamp, now: Timestamp) -> bool {
    match interval {
        NEVER => false,
        0 => true,
        _ => {
            let interval = u64::from(interval);
            now / interval > previous / interval
        }
    }
}

/// Time from `now` to the next multiple of `interval` strictly after it.
/// `None` for a structure that is never due, or when that multiple lies past
/// the end of the [`Timestamp`] range.
pub fn time_until_next(interval: CollectionInterval, now: Timestamp) -> Option<u32> {
    match interval {
        NEVER => None,
        0 => Some(0),
        _ => {
            let interval = u64::from(interval);
            // No representable next multiple near the end of the clock
            let next = (now / interval).checked_add(1)?.checked_mul(interval)?;
            // Always in 1..=interval, so it fits the interval's width
            Some((next - now) as u32)
        }
    }
}

/// The `(now, previous, delay)` tuple threaded between ticks by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TickState {
    pub now: Timestamp,
    pub previous: Timestamp,
    pub delay: u32,
}

impl TickState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift the current time into `previous` and take `now` as the new current time.
    pub fn advance_to(&mut self, now: Timestamp) {
        self.previous = self.now;
        self.now = now;
    }

    pub fn elapsed(&self) -> u64 {
        self.now.saturating_sub(self.previous)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub total_ticks: u32,
    pub total_reports_triggered: u32,
    /// Ticks that arrived after the previously returned delay had run out.
    pub late_ticks: u32,
    pub last_delay: u32,
}

pub type PendingStructures = Vec<StructureId, MAX_HOUSEKEEPING_STRUCTURES>;

#[derive(Debug, Default)]
pub struct CollectionScheduler {
    stats: SchedulerStats,
}

impl CollectionScheduler {
    pub fn new() -> Self {
        Self {
            stats: SchedulerStats::default(),
        }
    }

    /// Enabled structures due in `(previous, now]`, in ascending ID order.
    pub fn pending(&self, registry: &StructureRegistry, now: Timestamp, previous: Timestamp) -> PendingStructures {
        let mut pending = PendingStructures::new();
        if now < previous {
            return pending;
        }

        for structure in registry.iter().filter(|s| s.enabled) {
            if is_due(structure.collection_interval, previous, now) {
                // Registry capacity equals the buffer size
                let _ = pending.push(structure.id);
            }
        }
        pending
    }

    /// Minimal wait until any enabled structure is next due, or [`NEVER`].
    pub fn next_delay(&self, registry: &StructureRegistry, now: Timestamp) -> u32 {
        registry
            .iter()
            .filter(|s| s.enabled)
            .filter_map(|s| time_until_next(s.collection_interval, now))
            .min()
            .unwrap_or(NEVER)
    }

    /// Book-keeping for one completed tick. `tick.delay` is the delay returned by the previous tick.
    pub fn record_tick(&mut self, tick: &TickState, reports: usize, next_delay: u32) {
        let expected_delay = tick.delay;
        self.stats.total_ticks = self.stats.total_ticks.wrapping_add(1);
        self.stats.total_reports_triggered = self.stats.total_reports_triggered.wrapping_add(reports as u32);

        if expected_delay != NEVER && tick.elapsed() > u64::from(expected_delay) {
            self.stats.late_ticks = self.stats.late_ticks.wrapping_add(1);
            debug!(
                elapsed = tick.elapsed(),
                expected = expected_delay,
                "late scheduler tick"
            );
        }

        self.stats.last_delay = next_delay;
        trace!(now = tick.now, reports, next_delay, "scheduler tick");
    }

    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = SchedulerStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_window_is_half_open() {
        assert!(!is_due(1000, 0, 999));
        assert!(is_due(1000, 0, 1000));
        assert!(!is_due(1000, 1000, 1999));
        assert!(is_due(1000, 999, 1000));
        // Multiple boundaries crossed still means one report
        assert!(is_due(1000, 0, 5000));
    }

    #[test]
    fn test_special_intervals() {
        assert!(is_due(0, 10, 10));
        assert!(!is_due(NEVER, 0, u64::MAX));
        assert_eq!(time_until_next(0, 123), Some(0));
        assert_eq!(time_until_next(NEVER, 123), None);
    }

    #[test]
    fn test_time_until_next_is_strictly_after_now() {
        assert_eq!(time_until_next(900, 0), Some(900));
        assert_eq!(time_until_next(900, 900), Some(900));
        assert_eq!(time_until_next(1000, 1006), Some(994));
        assert_eq!(time_until_next(2700, 2015), Some(685));
    }

    #[test]
    fn test_time_until_next_at_end_of_clock() {
        assert_eq!(time_until_next(500, u64::MAX - 10), None);
        assert_eq!(time_until_next(1, u64::MAX - 1), Some(1));
        assert_eq!(time_until_next(1, u64::MAX), None);
        assert_eq!(time_until_next(0, u64::MAX), Some(0));
        assert_eq!(time_until_next(NEVER - 1, u64::MAX), None);
    }

    #[test]
    fn test_next_delay_ignores_disabled() {
        let mut registry = StructureRegistry::new();
        registry.create(0, 100, &[]).unwrap();
        registry.create(1, 300, &[]).unwrap();
        registry.enable(1).unwrap();

        let scheduler = CollectionScheduler::new();
        assert_eq!(scheduler.next_delay(&registry, 50), 250);

        registry.disable(1).unwrap();
        assert_eq!(scheduler.next_delay(&registry, 50), NEVER);
    }

    #[test]
    fn test_backwards_time_reports_nothing() {
        let mut registry = StructureRegistry::new();
        registry.create(3, 0, &[]).unwrap();
        registry.enable(3).unwrap();

        let scheduler = CollectionScheduler::new();
        assert!(scheduler.pending(&registry, 10, 20).is_empty());
        assert_eq!(scheduler.pending(&registry, 20, 20).as_slice(), &[3]);
    }

    #[test]
    fn test_late_tick_counted() {
        let mut scheduler = CollectionScheduler::new();
        let mut tick = TickState::new();
        tick.advance_to(150);
        tick.delay = 100;
        scheduler.record_tick(&tick, 1, 50);

        tick.delay = NEVER;
        scheduler.record_tick(&tick, 0, NEVER);

        let stats = scheduler.get_stats();
        assert_eq!(stats.total_ticks, 2);
        assert_eq!(stats.late_ticks, 1);
        assert_eq!(stats.total_reports_triggered, 1);
        assert_eq!(stats.last_delay, NEVER);
    }
}
