//! Timer bookkeeping for one page context.
//!
//! The scheduler never sleeps or spawns. It records deadlines on the
//! controller's clock; the host asks for [`Scheduler::next_deadline`], arms
//! one real timer for it, and hands control back through `run_due`.

/// Delay of a debounced "tick soon": the next turn of the host loop.
pub const TICK_SOON_DELAY_MS: u64 = 0;
/// Re-probes for live-start data after a head/metadata mutation.
pub const PROBE_DELAYS_MS: [u64; 2] = [300, 1_500];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Wake {
    /// Re-read live-start sources before evaluating.
    Probe,
    Evaluate,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    interval_ms: u64,
    periodic_at: Option<u64>,
    tick_at: Option<u64>,
    debounced_pending: bool,
    probes: Vec<u64>,
}

impl Scheduler {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            periodic_at: None,
            tick_at: None,
            debounced_pending: false,
            probes: Vec::new(),
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn is_running(&self) -> bool {
        self.periodic_at.is_some()
    }

    /// Arms the periodic tick one interval from now.
    pub fn start(&mut self, now_ms: u64) {
        self.periodic_at = Some(now_ms.saturating_add(self.interval_ms));
    }

    /// Disarms the periodic tick. Pending one-shot wakes survive.
    pub fn stop(&mut self) {
        self.periodic_at = None;
    }

    /// Tears down and recreates the periodic tick with a new interval.
    pub fn restart(&mut self, interval_ms: u64, now_ms: u64) {
        self.stop();
        self.interval_ms = interval_ms;
        self.start(now_ms);
    }

    /// One evaluation `after_ms` from now, merged with any earlier request.
    pub fn schedule_tick(&mut self, after_ms: u64, now_ms: u64) {
        let at = now_ms.saturating_add(after_ms);
        self.tick_at = Some(self.tick_at.map_or(at, |pending| pending.min(at)));
    }

    /// Coalesced "tick soon". Returns `false` when one is already pending.
    pub fn schedule_debounced(&mut self, now_ms: u64) -> bool {
        if self.debounced_pending {
            return false;
        }
        self.debounced_pending = true;
        self.schedule_tick(TICK_SOON_DELAY_MS, now_ms);
        true
    }

    pub fn has_debounced(&self) -> bool {
        self.debounced_pending
    }

    pub fn schedule_probe(&mut self, after_ms: u64, now_ms: u64) {
        let at = now_ms.saturating_add(after_ms);
        if !self.probes.contains(&at) {
            self.probes.push(at);
            self.probes.sort_unstable();
        }
    }

    /// Drops every pending wake, periodic included.
    pub fn cancel_all(&mut self) {
        self.periodic_at = None;
        self.tick_at = None;
        self.debounced_pending = false;
        self.probes.clear();
    }

    pub fn next_deadline(&self) -> Option<u64> {
        [self.periodic_at, self.tick_at, self.probes.first().copied()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Consumes every wake due at `now_ms`, probes first. Several due ticks
    /// collapse into one evaluation.
    pub fn take_due(&mut self, now_ms: u64) -> Vec<Wake> {
        let mut wakes = Vec::new();

        let before = self.probes.len();
        self.probes.retain(|at| *at > now_ms);
        if self.probes.len() != before {
            wakes.push(Wake::Probe);
        }

        let mut evaluate = false;
        if matches!(self.tick_at, Some(at) if at <= now_ms) {
            self.tick_at = None;
            self.debounced_pending = false;
            evaluate = true;
        }
        if let Some(at) = self.periodic_at.filter(|at| *at <= now_ms) {
            let mut next = at.saturating_add(self.interval_ms);
            if next <= now_ms {
                next = now_ms.saturating_add(self.interval_ms);
            }
            self.periodic_at = Some(next);
            evaluate = true;
        }
        if evaluate {
            wakes.push(Wake::Evaluate);
        }
        wakes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_tick_repeats_at_interval() {
        let mut scheduler = Scheduler::new(250);
        scheduler.start(1_000);
        assert_eq!(scheduler.next_deadline(), Some(1_250));
        assert!(scheduler.take_due(1_249).is_empty());
        assert_eq!(scheduler.take_due(1_250), vec![Wake::Evaluate]);
        assert_eq!(scheduler.next_deadline(), Some(1_500));
    }

    #[test]
    fn late_host_does_not_replay_missed_ticks() {
        let mut scheduler = Scheduler::new(250);
        scheduler.start(0);
        assert_eq!(scheduler.take_due(10_000), vec![Wake::Evaluate]);
        assert_eq!(scheduler.next_deadline(), Some(10_250));
    }

    #[test]
    fn debounced_ticks_coalesce() {
        let mut scheduler = Scheduler::new(1_000);
        assert!(scheduler.schedule_debounced(50));
        assert!(!scheduler.schedule_debounced(50));
        assert!(!scheduler.schedule_debounced(51));
        assert_eq!(scheduler.take_due(51), vec![Wake::Evaluate]);
        assert!(scheduler.take_due(51).is_empty());
        assert!(scheduler.schedule_debounced(52));
    }

    #[test]
    fn restart_changes_interval_and_keeps_pending_ticks() {
        let mut scheduler = Scheduler::new(250);
        scheduler.start(0);
        scheduler.schedule_tick(2_000, 0);
        scheduler.restart(1_000, 100);
        assert_eq!(scheduler.interval_ms(), 1_000);
        assert_eq!(scheduler.next_deadline(), Some(1_100));
        scheduler.take_due(1_100);
        assert_eq!(scheduler.next_deadline(), Some(2_000));
    }

    #[test]
    fn probes_come_before_evaluation() {
        let mut scheduler = Scheduler::new(250);
        scheduler.start(0);
        for delay in PROBE_DELAYS_MS {
            scheduler.schedule_probe(delay, 0);
        }
        assert_eq!(scheduler.take_due(300), vec![Wake::Probe, Wake::Evaluate]);
        assert_eq!(scheduler.take_due(1_500), vec![Wake::Probe, Wake::Evaluate]);
    }

    #[test]
    fn cancel_all_clears_everything() {
        let mut scheduler = Scheduler::new(250);
        scheduler.start(0);
        scheduler.schedule_debounced(0);
        scheduler.schedule_probe(300, 0);
        scheduler.cancel_all();
        assert_eq!(scheduler.next_deadline(), None);
        assert!(!scheduler.is_running());
        assert!(scheduler.take_due(u64::MAX).is_empty());
    }
}
