//! Test-and-test-and-set spinlock with bounded exponential backoff.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, Ordering};

use lock_api::{GuardSend, RawMutex};

/// Spins before yielding to the OS scheduler.
const SPIN_LIMIT: u32 = 100;

/// Backoff cap, 2^5 = 32 pause iterations.
const MAX_BACKOFF_EXP: u32 = 5;

/// Raw spinlock, cache-line aligned so neighbouring locks never share a
/// line.
#[repr(align(64))]
pub struct RawSpinLock {
    locked: AtomicBool,
}

unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinLock {
        locked: AtomicBool::new(false),
    };

    type GuardMarker = GuardSend;

    #[inline]
    fn lock(&self) {
        if !self.try_lock() {
            self.lock_contended();
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        !self.locked.load(Ordering::Relaxed)
            && self
                .locked
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl RawSpinLock {
    #[cold]
    fn lock_contended(&self) {
        let mut spins = 0u32;
        let mut backoff = 0u32;

        loop {
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
                spins += 1;
                if spins >= SPIN_LIMIT {
                    std::thread::yield_now();
                    spins = 0;
                    backoff = 0;
                }
            }

            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }

            for _ in 0..(1u32 << backoff) {
                spin_loop();
            }
            if backoff < MAX_BACKOFF_EXP {
                backoff += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_mutual_exclusion() {
        struct Shared {
            lock: RawSpinLock,
            value: std::cell::UnsafeCell<u64>,
        }
        unsafe impl Sync for Shared {}

        let shared = Arc::new(Shared {
            lock: RawSpinLock::INIT,
            value: std::cell::UnsafeCell::new(0),
        });

        let mut handles = Vec::new();
        for _ in 0..4 {
            let shared = shared.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..10_000 {
                    shared.lock.lock();
                    unsafe { *shared.value.get() += 1 };
                    unsafe { shared.lock.unlock() };
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(unsafe { *shared.value.get() }, 40_000);
    }

    #[test]
    fn test_try_lock() {
        let lock = RawSpinLock::INIT;
        assert!(lock.try_lock());
        assert!(!lock.try_lock());
        unsafe { lock.unlock() };
        assert!(lock.try_lock());
    }
}
