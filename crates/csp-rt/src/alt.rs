//! Nondeterministic choice over a set of guards.
//!
//! An `Alt` drives the four-phase selection protocol across its guard list:
//! enable everything, wait for at least one guard to become selectable,
//! pick a winner by policy, roll the losers back, and commit the winner.
//! Three policies exist:
//!
//! - [`select`](Alt::select): uniform random choice from the ready set.
//! - [`fair_select`](Alt::fair_select): like `select`, but the previously
//!   selected guard is excluded while any other guard is ready.
//! - [`pri_select`](Alt::pri_select): the ready guard with the lowest index
//!   in the guard list wins.
//!
//! The randomness source is owned per instance and seeded from OS entropy;
//! pass your own with [`Alt::with_rng`] for reproducible selection.

use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::error::{CspError, Result};
use crate::guard::{Guard, Selected};

/// How long the readiness scan sleeps between polls.
///
/// Small enough to keep Timer-guard jitter in the low milliseconds, large
/// enough not to burn a core while every guard is idle.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
enum Policy {
    Random,
    Fair,
    Priority,
}

/// The selection combinator over an ordered guard list.
pub struct Alt<T> {
    guards: Vec<Box<dyn Guard<T>>>,
    last_selected: Option<usize>,
    rng: StdRng,
}

impl<T> Default for Alt<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Alt<T> {
    /// Create an empty alternation with an OS-entropy-seeded PRNG.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Create an empty alternation selecting with the given PRNG.
    pub fn with_rng(rng: StdRng) -> Self {
        Alt {
            guards: Vec::new(),
            last_selected: None,
            rng,
        }
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, guard: impl Guard<T> + 'static) -> Self {
        self.push(guard);
        self
    }

    /// Append a guard to the list.
    pub fn push(&mut self, guard: impl Guard<T> + 'static) {
        self.guards.push(Box::new(guard));
    }

    /// Number of guards.
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Whether the guard list is empty.
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Select a guard uniformly at random from the ready set.
    pub fn select(&mut self) -> Result<Selected<T>> {
        self.run_select(Policy::Random)
    }

    /// Select a guard, avoiding the previously selected one.
    ///
    /// The last winner is excluded only while another guard is ready, so a
    /// lone ready guard is still selected.
    pub fn fair_select(&mut self) -> Result<Selected<T>> {
        self.run_select(Policy::Fair)
    }

    /// Select the ready guard with the lowest index in the guard list.
    pub fn pri_select(&mut self) -> Result<Selected<T>> {
        self.run_select(Policy::Priority)
    }

    /// Poison the last selected guard and drop it from the guard list.
    ///
    /// No-op if nothing has been selected yet.
    pub fn poison_last(&mut self) {
        let Some(idx) = self.last_selected.take() else {
            return;
        };
        let guard = self.guards.remove(idx);
        let _ = guard.disable();
        guard.poison();
    }

    fn run_select(&mut self, policy: Policy) -> Result<Selected<T>> {
        match self.guards.len() {
            0 => Err(CspError::NoGuardInAlt),
            1 => self.select_single(),
            _ => self.select_multi(policy),
        }
    }

    /// Fast path for a single guard: no policy, no rollback.
    fn select_single(&mut self) -> Result<Selected<T>> {
        let guard = &self.guards[0];
        guard.enable()?;
        while !guard.is_selectable()? {
            thread::sleep(POLL_INTERVAL);
            // Re-arm: enable is idempotent within a write transaction, and
            // re-acquires readiness once the next transaction begins.
            guard.enable()?;
        }
        self.last_selected = Some(0);
        guard.select()
    }

    fn select_multi(&mut self, policy: Policy) -> Result<Selected<T>> {
        for guard in &self.guards {
            guard.enable()?;
        }

        let ready = loop {
            let mut ready = Vec::new();
            for (idx, guard) in self.guards.iter().enumerate() {
                if guard.is_selectable()? {
                    ready.push(idx);
                }
            }
            if !ready.is_empty() {
                break ready;
            }
            thread::sleep(POLL_INTERVAL);
            for guard in &self.guards {
                guard.enable()?;
            }
        };

        let winner = match policy {
            Policy::Priority => ready[0],
            Policy::Random => ready[self.rng.random_range(0..ready.len())],
            Policy::Fair => {
                let pool: Vec<usize> = match self.last_selected {
                    Some(last) if ready.len() > 1 && ready.contains(&last) => {
                        ready.iter().copied().filter(|&idx| idx != last).collect()
                    }
                    _ => ready,
                };
                pool[self.rng.random_range(0..pool.len())]
            }
        };

        for (idx, guard) in self.guards.iter().enumerate() {
            if idx != winner {
                guard.disable()?;
            }
        }
        self.last_selected = Some(winner);
        trace!(winner, policy = ?policy, "selection committed");
        self.guards[winner].select()
    }
}

impl<T> std::fmt::Debug for Alt<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alt")
            .field("guards", &self.guards.len())
            .field("last_selected", &self.last_selected)
            .finish()
    }
}
