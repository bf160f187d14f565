//! Deadline bookkeeping for timeout-bounded blocking calls.
//!
//! A single logical operation (for example sending a whole frame) may need
//! several syscalls, each of which can be interrupted or only partially
//! complete. [`Deadline`] converts the caller's timeout into an absolute
//! instant once, so every retry waits only for what is left of the budget.

use std::time::{Duration, Instant};

/// Absolute point in time after which a blocking operation gives up.
///
/// `None` means the operation may block indefinitely.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    /// The instant at which the budget runs out.
    deadline: Option<Instant>,

    /// The timeout the deadline was created from, reported in errors.
    duration: Option<Duration>,
}

impl Deadline {
    /// Creates a deadline `timeout` from now, or an unbounded one for `None`.
    ///
    /// A timeout too large to be represented as an instant is unbounded too,
    /// but errors still report the requested duration.
    pub fn after(timeout: Option<Duration>) -> Self {
        Self {
            deadline: timeout.and_then(|duration| Instant::now().checked_add(duration)),
            duration: timeout,
        }
    }

    /// A deadline that never expires.
    pub fn never() -> Self {
        Self::after(None)
    }

    /// Time left before the deadline, saturating at zero.
    ///
    /// Returns `None` for unbounded deadlines.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// The timeout this deadline was built from.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_deadline_never_expires() {
        let deadline = Deadline::never();

        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), None);
        assert_eq!(deadline.duration(), None);
    }

    #[test]
    fn zero_timeout_is_expired_immediately() {
        let deadline = Deadline::after(Some(Duration::ZERO));

        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn unrepresentable_timeout_is_unbounded() {
        let deadline = Deadline::after(Some(Duration::MAX));

        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), None);
        assert_eq!(deadline.duration(), Some(Duration::MAX));
    }

    #[test]
    fn remaining_shrinks_towards_zero() {
        let deadline = Deadline::after(Some(Duration::from_secs(60)));
        let remaining = deadline.remaining().expect("bounded deadline");

        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(59));
    }
}
