//! Single-slot cancellable timer for phase transitions.
//!
//! The timer never calls back into its owner. It holds at most one pending
//! event together with an absolute deadline; the owner polls it from its
//! event loop and dispatches whatever event comes due. Because the pending
//! event lives only inside the timer, cancelling it makes a later firing
//! impossible rather than merely ignored.

use crate::stats::{LatenessWindow, TimingStats};
use crate::timer::Clock;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Identifies one scheduled timer. Tokens are never reused.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CancelToken(u64);

impl fmt::Display for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("{pending} is still pending; cancel it before scheduling another timer")]
    AlreadyPending { pending: CancelToken },
}

#[derive(Debug)]
struct Pending<E> {
    token: CancelToken,
    deadline_ns: u64,
    event: E,
}

#[derive(Debug)]
pub struct PhaseTimer<C: Clock, E> {
    clock: C,
    next_token: u64,
    pending: Option<Pending<E>>,
    lateness: LatenessWindow,
}

impl<C: Clock, E> PhaseTimer<C, E> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            next_token: 0,
            pending: None,
            lateness: LatenessWindow::default(),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Arms the timer to deliver `event` once `delay` has elapsed.
    pub fn schedule(&mut self, delay: Duration, event: E) -> Result<CancelToken, TimerError> {
        if let Some(pending) = &self.pending {
            return Err(TimerError::AlreadyPending {
                pending: pending.token,
            });
        }
        self.next_token += 1;
        let token = CancelToken(self.next_token);
        let deadline_ns = self
            .clock
            .now()
            .saturating_add(delay.as_nanos() as u64);
        trace!(%token, deadline_ns, delay_ms = delay.as_millis() as u64, "timer armed");
        self.pending = Some(Pending {
            token,
            deadline_ns,
            event,
        });
        Ok(token)
    }

    /// Cancels the timer identified by `token`.
    ///
    /// Returns whether anything was cancelled. Unknown, already fired and
    /// already cancelled tokens are a no-op.
    pub fn cancel(&mut self, token: CancelToken) -> bool {
        match &self.pending {
            Some(pending) if pending.token == token => {
                trace!(%token, "timer cancelled");
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Drops whatever is pending, returning its token.
    pub fn cancel_all(&mut self) -> Option<CancelToken> {
        self.pending.take().map(|p| p.token)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_token(&self) -> Option<CancelToken> {
        self.pending.as_ref().map(|p| p.token)
    }

    pub fn deadline(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.deadline_ns)
    }

    /// Time left before the pending timer comes due; zero if overdue.
    pub fn time_until_due(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.pending
            .as_ref()
            .map(|p| Duration::from_nanos(p.deadline_ns.saturating_sub(now)))
    }

    /// Fires the pending timer if its deadline has passed.
    pub fn poll(&mut self) -> Option<E> {
        let now = self.clock.now();
        self.poll_at(now)
    }

    /// Fires the pending timer if its deadline is at or before `now_ns`.
    pub fn poll_at(&mut self, now_ns: u64) -> Option<E> {
        let due = matches!(&self.pending, Some(p) if p.deadline_ns <= now_ns);
        if !due {
            return None;
        }
        let pending = self.pending.take()?;
        let late_ns = now_ns - pending.deadline_ns;
        self.lateness.record(Duration::from_nanos(late_ns));
        trace!(token = %pending.token, late_ns, "timer fired");
        Some(pending.event)
    }

    pub fn timing_stats(&self) -> TimingStats {
        self.lateness.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualClock;

    #[derive(Debug, PartialEq)]
    enum Tick {
        A,
        B,
    }

    #[test]
    fn fires_once_after_delay() {
        let clock = ManualClock::new();
        let mut timer = PhaseTimer::new(clock.clone());
        timer.schedule(Duration::from_millis(100), Tick::A).unwrap();

        clock.advance_ms(99);
        assert_eq!(timer.poll(), None);
        clock.advance_ms(1);
        assert_eq!(timer.poll(), Some(Tick::A));
        assert_eq!(timer.poll(), None);
        assert!(!timer.is_pending());
    }

    #[test]
    fn deadline_is_wall_clock_not_poll_count() {
        let clock = ManualClock::new();
        let mut timer = PhaseTimer::new(clock.clone());
        timer.schedule(Duration::from_millis(500), Tick::A).unwrap();
        // host was inactive: a single poll long after the deadline
        clock.advance_ms(5_000);
        assert_eq!(timer.poll(), Some(Tick::A));
        let stats = timer.timing_stats();
        assert_eq!(stats.samples, 1);
        assert_eq!(stats.max_lateness_ns, 4_500_000_000.0);
    }

    #[test]
    fn second_schedule_while_pending_is_rejected() {
        let clock = ManualClock::new();
        let mut timer = PhaseTimer::new(clock);
        let first = timer.schedule(Duration::from_millis(10), Tick::A).unwrap();
        let err = timer.schedule(Duration::from_millis(10), Tick::B).unwrap_err();
        assert_eq!(err, TimerError::AlreadyPending { pending: first });
        assert_eq!(timer.pending_token(), Some(first));
    }

    #[test]
    fn cancel_is_idempotent() {
        let clock = ManualClock::new();
        let mut timer = PhaseTimer::new(clock.clone());
        let token = timer.schedule(Duration::from_millis(10), Tick::A).unwrap();
        assert!(timer.cancel(token));
        assert!(!timer.cancel(token));
        clock.advance_ms(50);
        assert_eq!(timer.poll(), None);
    }

    #[test]
    fn stale_token_does_not_cancel_newer_timer() {
        let clock = ManualClock::new();
        let mut timer = PhaseTimer::new(clock.clone());
        let old = timer.schedule(Duration::ZERO, Tick::A).unwrap();
        assert_eq!(timer.poll(), Some(Tick::A));
        let new = timer.schedule(Duration::from_millis(5), Tick::B).unwrap();
        assert_ne!(old, new);
        assert!(!timer.cancel(old));
        clock.advance_ms(5);
        assert_eq!(timer.poll(), Some(Tick::B));
    }

    #[test]
    fn time_until_due_counts_down() {
        let clock = ManualClock::new();
        let mut timer = PhaseTimer::new(clock.clone());
        assert_eq!(timer.time_until_due(), None);
        timer.schedule(Duration::from_millis(30), Tick::A).unwrap();
        clock.advance_ms(10);
        assert_eq!(timer.time_until_due(), Some(Duration::from_millis(20)));
        clock.advance_ms(40);
        assert_eq!(timer.time_until_due(), Some(Duration::ZERO));
    }

    #[test]
    fn poll_at_uses_the_given_instant() {
        let clock = ManualClock::new();
        let mut timer = PhaseTimer::new(clock);
        timer.schedule(Duration::from_millis(10), Tick::A).unwrap();
        assert_eq!(timer.poll_at(9_999_999), None);
        assert_eq!(timer.poll_at(10_000_000), Some(Tick::A));
    }
}
