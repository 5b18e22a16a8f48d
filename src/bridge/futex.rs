//! Futex-style wait/wake on a shared 32-bit slot.
//!
//! Built on the parking lot: the slot's address is the park key, so waking
//! is precise per slot. The validate callback gives the required `NotEqual`
//! fast path: if the slot already moved past `expected` before the caller
//! parked, the wait fails fast instead of sleeping through a wakeup that
//! already happened.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN, ParkResult};

/// Outcome of a [`wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Parked and woken by [`wake_all`].
    Ok,
    /// The slot no longer held `expected`; the caller never slept.
    NotEqual,
    /// The timeout elapsed without a wake.
    TimedOut,
}

/// Block until the slot leaves `expected`, a wake arrives, or `timeout`
/// elapses.
pub fn wait(slot: &AtomicU32, expected: u32, timeout: Duration) -> WaitStatus {
    let key = slot as *const AtomicU32 as usize;
    let deadline = Instant::now() + timeout;

    // Safety: the callbacks do not call into the parking lot, and the key is
    // only used by this module's wait/wake pair.
    let result = unsafe {
        parking_lot_core::park(
            key,
            || slot.load(Ordering::SeqCst) == expected,
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            Some(deadline),
        )
    };

    match result {
        ParkResult::Unparked(_) => WaitStatus::Ok,
        ParkResult::Invalid => WaitStatus::NotEqual,
        ParkResult::TimedOut => WaitStatus::TimedOut,
    }
}

/// Wake all threads waiting on the slot.
///
/// The completing side must change the slot *before* calling this; a waiter
/// that arrives late then fails validation instead of missing the wake.
pub fn wake_all(slot: &AtomicU32) {
    let key = slot as *const AtomicU32 as usize;
    // Safety: key mirrors the one used in `wait`.
    unsafe {
        parking_lot_core::unpark_all(key, DEFAULT_UNPARK_TOKEN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_not_equal_when_slot_already_changed() {
        let slot = AtomicU32::new(1);
        let status = wait(&slot, 0, Duration::from_secs(1));
        assert_eq!(status, WaitStatus::NotEqual);
    }

    #[test]
    fn test_timeout_when_nobody_wakes() {
        let slot = AtomicU32::new(0);
        let start = Instant::now();
        let status = wait(&slot, 0, Duration::from_millis(50));
        assert_eq!(status, WaitStatus::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_store_then_wake_releases_waiter() {
        let slot = Arc::new(AtomicU32::new(0));
        let waker = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                slot.fetch_add(1, Ordering::SeqCst);
                wake_all(&slot);
            })
        };

        let status = wait(&slot, 0, Duration::from_secs(5));
        // Either we parked and got woken, or the increment landed first
        assert!(matches!(status, WaitStatus::Ok | WaitStatus::NotEqual));
        assert_eq!(slot.load(Ordering::SeqCst), 1);
        waker.join().unwrap();
    }
}
