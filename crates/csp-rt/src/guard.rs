//! Guards selectable by an alternation: channels, Skip, and Timer.
//!
//! A guard is a capability with the four-phase selection protocol
//! (`enable` -> `is_selectable` -> `select`, with `disable` rolling back
//! non-winners) plus `poison` for termination. Three variants exist:
//!
//! - [`crate::channel::Channel`] is the read-guard over a rendezvous channel.
//! - [`Skip`] is always ready, useful as the default arm of a selection.
//! - [`Timer`] becomes ready once its alarm deadline has passed.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Selected
// ---------------------------------------------------------------------------

/// The payload produced by a committed selection.
///
/// Every policy of [`crate::alt::Alt`] returns the winning guard's `select()`
/// payload wrapped in this type, so callers can tell a delivered value apart
/// from a Skip or Timer arm without knowing which guard won.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selected<T> {
    /// A channel guard delivered a value.
    Value(T),
    /// The always-ready [`Skip`] guard was chosen.
    Skip,
    /// A [`Timer`] guard fired after its deadline.
    Elapsed,
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

/// A capability that an alternation can select over.
///
/// `enable` prepares a synchronisation without committing; `is_selectable`
/// reports whether `select` would succeed right now; `disable` rolls a
/// non-winning `enable` back so the guard returns to a state where a later
/// `enable` succeeds; `select` commits. All four fail with
/// [`crate::CspError::Poisoned`] once the underlying resource is poisoned.
pub trait Guard<T>: Send {
    /// Prepare for, but do not commit to, a synchronisation.
    fn enable(&self) -> Result<()>;

    /// Whether this guard can currently be committed.
    fn is_selectable(&self) -> Result<bool>;

    /// Roll back a non-winning `enable`.
    fn disable(&self) -> Result<()>;

    /// Commit to a synchronisation started by `enable`.
    fn select(&self) -> Result<Selected<T>>;

    /// Poison the resource behind this guard, if any.
    fn poison(&self) {}
}

// ---------------------------------------------------------------------------
// Skip
// ---------------------------------------------------------------------------

/// Guard that is always selectable.
///
/// An alternation containing a `Skip` completes in bounded time regardless
/// of its other guards, which makes it the conventional "default" arm.
#[derive(Debug, Default, Clone, Copy)]
pub struct Skip;

impl<T> Guard<T> for Skip {
    fn enable(&self) -> Result<()> {
        Ok(())
    }

    fn is_selectable(&self) -> Result<bool> {
        Ok(true)
    }

    fn disable(&self) -> Result<()> {
        Ok(())
    }

    fn select(&self) -> Result<Selected<T>> {
        Ok(Selected::Skip)
    }
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// Guard that commits only once its alarm deadline has passed.
///
/// With no alarm set the timer is always selectable, mirroring [`Skip`].
#[derive(Debug, Default)]
pub struct Timer {
    alarm: Mutex<Option<Instant>>,
}

impl Timer {
    /// Create a timer with no alarm set.
    pub fn new() -> Self {
        Timer {
            alarm: Mutex::new(None),
        }
    }

    /// Arm the timer to become selectable `timeout` from now.
    pub fn set_alarm(&self, timeout: Duration) {
        *self.alarm.lock() = Some(Instant::now() + timeout);
    }

    /// Return the current time.
    pub fn read(&self) -> Instant {
        Instant::now()
    }

    /// Block the calling process for `timeout`.
    pub fn sleep(&self, timeout: Duration) {
        std::thread::sleep(timeout);
    }
}

impl<T> Guard<T> for Timer {
    fn enable(&self) -> Result<()> {
        Ok(())
    }

    fn is_selectable(&self) -> Result<bool> {
        Ok(match *self.alarm.lock() {
            None => true,
            Some(deadline) => Instant::now() >= deadline,
        })
    }

    fn disable(&self) -> Result<()> {
        Ok(())
    }

    fn select(&self) -> Result<Selected<T>> {
        Ok(Selected::Elapsed)
    }
}
