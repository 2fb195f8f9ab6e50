//! # Per-thread event suppression.
//!
//! A reentrant counter, one per OS thread: while it is above zero, `fire`
//! calls submitted from that thread are dropped before they ever reach the
//! queue, so disablement is observed with zero queueing delay. The counter
//! never crosses thread boundaries.

use std::cell::Cell;

use crate::error::BusError;

thread_local! {
    static DISABLED: Cell<u32> = const { Cell::new(0) };
}

/// Increments the current thread's suppression counter.
pub(crate) fn disable() {
    DISABLED.with(|count| count.set(count.get() + 1));
}

/// Decrements the counter; errors if events are not disabled on this thread.
pub(crate) fn enable() -> Result<(), BusError> {
    DISABLED.with(|count| {
        let current = count.get();
        if current == 0 {
            return Err(BusError::NotDisabled);
        }
        count.set(current - 1);
        Ok(())
    })
}

/// True while the current thread's counter is above zero.
pub(crate) fn is_disabled() -> bool {
    DISABLED.with(|count| count.get() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_disable_requires_matching_enables() {
        assert!(!is_disabled());
        disable();
        disable();
        assert!(is_disabled());
        enable().unwrap();
        assert!(is_disabled());
        enable().unwrap();
        assert!(!is_disabled());
    }

    #[test]
    fn test_unmatched_enable_fails() {
        assert!(matches!(enable(), Err(BusError::NotDisabled)));
    }

    #[test]
    fn test_state_is_thread_scoped() {
        disable();
        let other = std::thread::spawn(is_disabled).join().unwrap();
        assert!(!other);
        assert!(is_disabled());
        enable().unwrap();
    }
}
