//! A single absolute cutoff threaded through one inbound request's full
//! call chain — resolve, search, the upstream call and its retries — so a
//! multi-step request spends one shared time budget instead of a fresh one
//! at every hop.

use std::time::{Duration, Instant};

/// An absolute point in time by which a request must finish, or no deadline
/// at all. Cloning is cheap (`Copy`); pass it down by value and call
/// [`Deadline::remaining`] at each point that actually waits on I/O.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline `duration` from now.
    pub fn after(duration: Duration) -> Self {
        Self(Some(Instant::now() + duration))
    }

    /// No deadline: every `remaining()` call returns `None`.
    pub fn none() -> Self {
        Self(None)
    }

    /// Time left before the deadline. `None` means unbounded; a deadline
    /// already in the past saturates to `Duration::ZERO` rather than going
    /// negative, so callers can treat it as "fail immediately."
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline, if any, has already passed.
    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_deadline_never_reports_remaining() {
        assert!(Deadline::none().remaining().is_none());
        assert!(!Deadline::none().is_expired());
    }

    #[test]
    fn remaining_shrinks_but_never_goes_negative() {
        let d = Deadline::after(Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(d.remaining(), Some(Duration::ZERO));
        assert!(d.is_expired());
    }
}
