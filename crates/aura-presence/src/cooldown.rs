//! Cancellable, restartable deadline.
//!
//! A [`CooldownTimer`] holds at most one pending deadline. Re-arming before
//! expiry pushes the deadline out (debounce), so a bursty but continuing
//! signal reads as continuously active. The owner polls the timer against
//! its clock instead of handing it a callback, which keeps expiry on the
//! owner's task and testable without wall-clock waits.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CooldownTimer {
    deadline: Option<Instant>,
}

impl CooldownTimer {
    #[must_use]
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Schedule expiry `duration` after `now`, replacing any pending deadline.
    pub fn arm(&mut self, now: Instant, duration: Duration) -> Instant {
        let deadline = now + duration;
        self.deadline = Some(deadline);
        deadline
    }

    /// Drop the pending deadline; a cancelled arm never expires.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// The pending deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether a deadline is pending and still in the future at `now`.
    #[must_use]
    pub fn is_pending(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now < deadline)
    }

    /// Clear the deadline if it has passed. Returns `true` exactly once per
    /// expired arm.
    pub fn take_expired(&mut self, now: Instant) -> bool {
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            self.deadline = None;
            true
        } else {
            false
        }
    }
}
