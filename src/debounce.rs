use std::time::Duration;

pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// One-shot timers. Whoever owns the scheduler delivers each elapsed
/// `TimerId` back to the debouncer that asked for it; a cancelled timer
/// must never be delivered.
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration) -> TimerId;
    fn cancel(&mut self, timer: TimerId);
}

/// Coalesces bursts of edits into one persist after `interval` of quiet.
#[derive(Debug)]
pub struct EditDebouncer {
    interval: Duration,
    pending: Option<TimerId>,
}

impl EditDebouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    #[cfg(test)]
    pub(crate) fn pending_timer(&self) -> Option<TimerId> {
        self.pending
    }

    pub fn on_edit(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(previous) = self.pending.take() {
            scheduler.cancel(previous);
        }
        self.pending = Some(scheduler.schedule(self.interval));
    }

    /// Returns true when `timer` is the live one and the caller must persist.
    pub fn fire(&mut self, timer: TimerId) -> bool {
        if self.pending != Some(timer) {
            return false;
        }
        self.pending = None;
        true
    }

    /// Returns true when an edit was pending and the caller must persist now.
    pub fn flush(&mut self, scheduler: &mut dyn Scheduler) -> bool {
        match self.pending.take() {
            Some(timer) => {
                scheduler.cancel(timer);
                true
            }
            None => false,
        }
    }

    /// Drops a pending edit without asking for a persist.
    pub fn cancel(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(timer) = self.pending.take() {
            scheduler.cancel(timer);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::virtual_clock::VirtualClock;
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn rapid_edits_coalesce_into_one_persist() {
        let mut clock = VirtualClock::new();
        let mut debouncer = EditDebouncer::new(ms(500));
        let mut content = String::new();
        let mut persisted = Vec::new();

        for (step, text) in ["a", "ab", "abc", "abcd"].into_iter().enumerate() {
            if step > 0 {
                for timer in clock.advance(ms(100)) {
                    if debouncer.fire(timer) {
                        persisted.push((clock.now(), content.clone()));
                    }
                }
            }
            content = text.to_string();
            debouncer.on_edit(&mut clock);
        }
        assert_eq!(clock.now(), ms(300));
        assert!(persisted.is_empty());

        for _ in 0..10 {
            for timer in clock.advance(ms(100)) {
                if debouncer.fire(timer) {
                    persisted.push((clock.now(), content.clone()));
                }
            }
        }

        assert_eq!(persisted, vec![(ms(800), "abcd".to_string())]);
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn flush_without_pending_edit_is_noop() {
        let mut clock = VirtualClock::new();
        let mut debouncer = EditDebouncer::new(ms(500));
        assert!(!debouncer.flush(&mut clock));
        assert!(!debouncer.flush(&mut clock));
        assert!(clock.cancelled.is_empty());
    }

    #[test]
    fn flush_with_pending_edit_persists_once_and_cancels_timer() {
        let mut clock = VirtualClock::new();
        let mut debouncer = EditDebouncer::new(ms(500));
        debouncer.on_edit(&mut clock);
        let timer = debouncer.pending_timer().unwrap();

        assert!(debouncer.flush(&mut clock));
        assert!(!debouncer.flush(&mut clock));
        assert_eq!(clock.cancelled, vec![timer]);
        assert_eq!(clock.pending(), 0);
        assert!(clock.advance(ms(1_000)).is_empty());
    }

    #[test]
    fn superseded_timer_does_not_persist() {
        let mut clock = VirtualClock::new();
        let mut debouncer = EditDebouncer::new(ms(500));
        debouncer.on_edit(&mut clock);
        let stale = debouncer.pending_timer().unwrap();
        debouncer.on_edit(&mut clock);

        assert!(!debouncer.fire(stale));
        assert!(debouncer.is_pending());
        assert_eq!(clock.cancelled, vec![stale]);
    }

    #[test]
    fn cancel_discards_pending_edit() {
        let mut clock = VirtualClock::new();
        let mut debouncer = EditDebouncer::new(ms(500));
        debouncer.on_edit(&mut clock);
        debouncer.cancel(&mut clock);
        assert!(!debouncer.is_pending());
        assert!(!debouncer.flush(&mut clock));
        assert_eq!(clock.pending(), 0);
    }
}
