//! Debounced recomputation
//!
//! The scheduler is a plain state machine. It does not own a timer: every
//! mutation asks it for a [`Ticket`], the caller arms a timer for that ticket,
//! and when the timer fires the caller hands the ticket back. Only the ticket
//! from the most recent request is honoured, so a burst of mutations collapses
//! into a single rebuild no matter how many timers were started for it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default quiet period before a rebuild runs
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Identifies one armed debounce timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    PendingRebuild {
        ticket: Ticket,
        /// Number of mutations folded into the pending rebuild
        coalesced: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    state: SchedulerState,
    next_ticket: u64,
    debounce: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Scheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: SchedulerState::Idle,
            next_ticket: 0,
            debounce,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, SchedulerState::PendingRebuild { .. })
    }

    /// Ticket of the timer that is currently allowed to fire
    pub fn pending_ticket(&self) -> Option<Ticket> {
        match self.state {
            SchedulerState::Idle => None,
            SchedulerState::PendingRebuild { ticket, .. } => Some(ticket),
        }
    }

    /// Records a mutation. Returns the ticket for a fresh timer; any earlier
    /// ticket is superseded.
    pub fn request(&mut self) -> Ticket {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        let coalesced = match self.state {
            SchedulerState::Idle => 1,
            SchedulerState::PendingRebuild { coalesced, .. } => coalesced + 1,
        };
        self.state = SchedulerState::PendingRebuild { ticket, coalesced };
        ticket
    }

    /// Called when the timer for `ticket` elapses.
    ///
    /// Returns the number of coalesced mutations if the rebuild should run
    /// now, moving back to idle. Stale tickets return `None`.
    pub fn fire(&mut self, ticket: Ticket) -> Option<usize> {
        match self.state {
            SchedulerState::PendingRebuild {
                ticket: current,
                coalesced,
            } if current == ticket => {
                self.state = SchedulerState::Idle;
                Some(coalesced)
            }
            _ => None,
        }
    }

    /// Fires the pending ticket, if any, without waiting
    pub fn flush(&mut self) -> Option<usize> {
        let ticket = self.pending_ticket()?;
        self.fire(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        let scheduler = Scheduler::default();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.debounce(), Duration::from_secs(1));
        assert!(scheduler.pending_ticket().is_none());
    }

    #[test]
    fn test_burst_coalesces_into_one_rebuild() {
        let mut scheduler = Scheduler::default();
        let first = scheduler.request();
        let second = scheduler.request();
        let third = scheduler.request();

        assert_eq!(scheduler.fire(first), None);
        assert_eq!(scheduler.fire(second), None);
        assert!(scheduler.is_pending());
        assert_eq!(scheduler.fire(third), Some(3));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_fire_is_at_most_once() {
        let mut scheduler = Scheduler::default();
        let ticket = scheduler.request();
        assert_eq!(scheduler.fire(ticket), Some(1));
        assert_eq!(scheduler.fire(ticket), None);
    }

    #[test]
    fn test_request_after_fire_starts_new_cycle() {
        let mut scheduler = Scheduler::default();
        let ticket = scheduler.request();
        scheduler.fire(ticket);

        let next = scheduler.request();
        assert_ne!(ticket, next);
        assert_eq!(
            scheduler.state(),
            SchedulerState::PendingRebuild {
                ticket: next,
                coalesced: 1
            }
        );
    }

    #[test]
    fn test_flush() {
        let mut scheduler = Scheduler::default();
        assert_eq!(scheduler.flush(), None);
        scheduler.request();
        scheduler.request();
        assert_eq!(scheduler.flush(), Some(2));
        assert!(!scheduler.is_pending());
    }
}
