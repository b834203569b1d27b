//! Single-threaded timer wheel on a virtual clock of whole seconds.
//!
//! Every scheduled callback is represented by a [`TimerToken`]; the pending set
//! is the only record of outstanding work, so [`Scheduler::cancel_all`] leaves
//! nothing that can fire later.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerToken(u64);

#[derive(Debug, Clone)]
struct Timer<A> {
    token: TimerToken,
    action: A,
    period: Option<u64>,
}

/// Timers due at the same second fire in action order, then in the order they
/// were scheduled.
#[derive(Debug)]
pub struct Scheduler<A> {
    now: u64,
    next_seq: u64,
    pending: BTreeMap<(u64, A, u64), Timer<A>>,
}

impl<A: Ord + Clone> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Ord + Clone> Scheduler<A> {
    pub fn new() -> Self {
        Self {
            now: 0,
            next_seq: 0,
            pending: BTreeMap::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn after(&mut self, delay_secs: u64, action: A) -> TimerToken {
        let token = TimerToken(self.next_seq);
        self.insert(self.now + delay_secs, token, action, None);
        token
    }

    /// First fires one `period` from now. A zero period is treated as one
    /// second so the timer cannot spin at a single instant.
    pub fn every(&mut self, period_secs: u64, action: A) -> TimerToken {
        let period = period_secs.max(1);
        let token = TimerToken(self.next_seq);
        self.insert(self.now + period, token, action, Some(period));
        token
    }

    pub fn cancel(&mut self, token: TimerToken) -> bool {
        let key = self
            .pending
            .iter()
            .find(|(_, timer)| timer.token == token)
            .map(|(key, _)| key.clone());

        match key {
            Some(key) => self.pending.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    /// Next due time, if anything is pending.
    pub fn next_due(&self) -> Option<u64> {
        self.pending.keys().next().map(|(due, _, _)| *due)
    }

    /// Fires the earliest timer due at or before `until`, moving the clock to
    /// its due time. Repeating timers are re-armed under the same token. When
    /// nothing is due the clock moves to `until` and `None` is returned.
    pub fn pop_due(&mut self, until: u64) -> Option<(u64, TimerToken, A)> {
        let key = match self.pending.keys().next() {
            Some(key) if key.0 <= until => key.clone(),
            _ => {
                self.now = self.now.max(until);
                return None;
            }
        };

        let timer = self.pending.remove(&key)?;
        let due = key.0;
        self.now = due;

        if let Some(period) = timer.period {
            let seq = self.bump_seq();
            self.pending.insert(
                (due + period, timer.action.clone(), seq),
                timer.clone(),
            );
        }

        Some((due, timer.token, timer.action))
    }

    fn insert(&mut self, due: u64, token: TimerToken, action: A, period: Option<u64>) {
        let seq = self.bump_seq();
        self.pending.insert(
            (due, action.clone(), seq),
            Timer {
                token,
                action,
                period,
            },
        );
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
    enum Job {
        First,
        Second,
    }

    fn drain(scheduler: &mut Scheduler<Job>, until: u64) -> Vec<(u64, Job)> {
        let mut fired = Vec::new();
        while let Some((at, _, job)) = scheduler.pop_due(until) {
            fired.push((at, job));
        }
        fired
    }

    #[test]
    fn one_shot_fires_once_at_its_due_time() {
        let mut scheduler = Scheduler::new();
        scheduler.after(3, Job::First);

        assert!(drain(&mut scheduler, 2).is_empty());
        assert_eq!(scheduler.now(), 2);
        assert_eq!(drain(&mut scheduler, 10), vec![(3, Job::First)]);
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.now(), 10);
    }

    #[test]
    fn repeating_timer_rearms_until_cancelled() {
        let mut scheduler = Scheduler::new();
        let token = scheduler.every(1, Job::First);

        let fired = drain(&mut scheduler, 3);
        assert_eq!(fired, vec![(1, Job::First), (2, Job::First), (3, Job::First)]);

        assert!(scheduler.cancel(token));
        assert!(drain(&mut scheduler, 10).is_empty());
        assert!(!scheduler.cancel(token));
    }

    #[test]
    fn same_instant_orders_by_action_then_schedule_order() {
        let mut scheduler = Scheduler::new();
        scheduler.after(2, Job::Second);
        scheduler.every(1, Job::First);

        let fired = drain(&mut scheduler, 2);
        assert_eq!(
            fired,
            vec![(1, Job::First), (2, Job::First), (2, Job::Second)]
        );
    }

    #[test]
    fn cancel_all_leaves_nothing_to_fire() {
        let mut scheduler = Scheduler::new();
        for delay in 0..5 {
            scheduler.after(delay, Job::Second);
        }
        scheduler.every(1, Job::First);
        assert_eq!(scheduler.pending(), 6);

        scheduler.cancel_all();
        assert!(drain(&mut scheduler, 100).is_empty());
        assert_eq!(scheduler.next_due(), None);
    }

    #[test]
    fn zero_delay_fires_at_current_instant() {
        let mut scheduler = Scheduler::new();
        drain(&mut scheduler, 5);
        scheduler.after(0, Job::First);
        assert_eq!(drain(&mut scheduler, 5), vec![(5, Job::First)]);
    }
}
