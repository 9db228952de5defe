//! Injectable time source.
//!
//! The book never reads the wall clock directly; the good-for-day pruner asks
//! a [`Clock`] for the current local civil time so tests can pin time to a
//! fixed instant.

use time::OffsetDateTime;

/// Supplies the local civil time used for good-for-day expiry.
pub trait Clock: Send + Sync {
    /// Current date-time, carrying the offset cutoff arithmetic should use.
    fn now(&self) -> OffsetDateTime;
}

/// System clock in the machine's local offset, falling back to UTC when the
/// local offset cannot be determined.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
    }
}
