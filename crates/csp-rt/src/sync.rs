//! Counting semaphore with close semantics.
//!
//! Channels rendezvous through two of these: `available` (writer -> reader)
//! and `taken` (reader -> writer). A poisoned channel closes both, which
//! wakes every blocked party: a party whose permit was already granted
//! completes its half of the rendezvous, everyone else fails with the
//! poison signal instead of hanging.

use parking_lot::{Condvar, Mutex};

struct SemState {
    permits: usize,
    closed: bool,
}

/// A counting semaphore backed by a mutex and condvar.
///
/// `acquire` blocks until a permit is available or the semaphore is closed.
/// Closing is monotonic: a closed semaphore never hands out permits again.
pub(crate) struct Semaphore {
    state: Mutex<SemState>,
    cond: Condvar,
}

impl Semaphore {
    /// Create a semaphore holding `permits` initial permits.
    pub(crate) fn new(permits: usize) -> Self {
        Semaphore {
            state: Mutex::new(SemState {
                permits,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Block until a permit can be taken.
    ///
    /// Returns `true` if a permit was taken, `false` if the semaphore is
    /// closed and drained. Permits granted before the close are still
    /// honoured, so a rendezvous whose peer already committed completes
    /// instead of tearing down halfway.
    pub(crate) fn acquire(&self) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.permits > 0 {
                state.permits -= 1;
                return true;
            }
            if state.closed {
                return false;
            }
            self.cond.wait(&mut state);
        }
    }

    /// Take a permit without blocking.
    ///
    /// Returns `true` only if a permit was immediately available.
    pub(crate) fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.permits == 0 {
            return false;
        }
        state.permits -= 1;
        true
    }

    /// Hand back (or grant) one permit, waking one waiter.
    pub(crate) fn release(&self) {
        let mut state = self.state.lock();
        state.permits += 1;
        drop(state);
        self.cond.notify_one();
    }

    /// Close the semaphore, waking every waiter.
    ///
    /// Idempotent. Waiters drain any remaining permits first, then fail.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.cond.notify_all();
    }
}
