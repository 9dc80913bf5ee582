//! Debug-only reentrancy guard.
//!
//! Detects a thread re-entering a lock-protected structure it is already
//! inside, e.g. an equivalence hook calling back into the table that is
//! probing it. Without the guard that call deadlocks on the table mutex; in
//! debug builds it panics instead. In release builds this compiles to a
//! zero-cost no-op.
//!
//! Usage: `check()` before taking the lock, `enter()` once it is held. The
//! holder slot is written only by the thread owning the lock, so a match
//! means genuine re-entry.

#[cfg(not(debug_assertions))]
use core::marker::PhantomData;
#[cfg(debug_assertions)]
use core::sync::atomic::{AtomicU64, Ordering};

#[cfg(debug_assertions)]
fn thread_token() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TOKEN: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TOKEN.with(|t| *t)
}

/// Per-instance reentrancy tracker. Embed next to the lock it protects.
#[derive(Debug)]
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    holder: AtomicU64,
}

impl DebugReentrancy {
    /// Create a new reentrancy tracker. Const so it can be a field default.
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            holder: AtomicU64::new(0),
        }
    }

    /// Call before acquiring the protected lock. In debug builds, panics if
    /// the current thread is already inside.
    #[inline]
    pub fn check(&self) {
        #[cfg(debug_assertions)]
        {
            assert!(
                self.holder.load(Ordering::Acquire) != thread_token(),
                "reentrancy detected: nested entry into data structure"
            );
        }
    }

    /// Mark the current thread as inside. Call only while holding the lock;
    /// the guard must be dropped before the lock is released.
    #[inline]
    pub fn enter(&self) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            self.holder.store(thread_token(), Ordering::Release);
            return ReentrancyGuard { owner: self };
        }

        #[cfg(not(debug_assertions))]
        {
            return ReentrancyGuard { _z: PhantomData };
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by `DebugReentrancy::enter`.
pub struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl<'a> Drop for ReentrancyGuard<'a> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.owner.holder.store(0, Ordering::Release);
        }
    }
}
