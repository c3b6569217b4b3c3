//! Parallel composition: start all children, join all children.
//!
//! Constructing a `Par` from another `Par` inlines that child's processes
//! (shallow flatten); any other combinator nests as an opaque process via
//! its `From` conversion. When any child exits with the poison signal, the
//! `Par` walks the union of its children's captures and terminates the
//! survivors, so the signal crosses sibling boundaries.

use std::time::Duration;

use crossbeam_channel::Select;
use tracing::debug;

use crate::error::{CspError, Result};
use crate::poison::{Captures, PoisonWalk, Poisonable};
use crate::process::{ExitReason, Process, ProcessState};

/// Parallel composition of processes.
pub struct Par {
    children: Vec<Process>,
    /// Optional per-child join timeout. `None` waits for child exit; a
    /// timeout is a scheduling hint only and does not cancel the child.
    timeout: Option<Duration>,
}

impl Par {
    /// Compose the given processes in parallel.
    pub fn new(children: Vec<Process>) -> Self {
        Par {
            children,
            timeout: None,
        }
    }

    /// Set a per-child join timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Inline the children of `other` after this Par's own (shallow
    /// flatten). Accepts a plain process as a one-child Par.
    pub fn and(mut self, other: impl Into<Par>) -> Par {
        self.children.extend(other.into().children);
        self
    }

    /// Number of child processes.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether there are no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// The union of the children's capture sets.
    pub fn captures(&self) -> Captures {
        let mut all = Captures::new();
        for child in &self.children {
            all.merge(child.captures());
        }
        all
    }

    /// Start every child, then join every child.
    ///
    /// Completions are raced rather than joined in order: the first child
    /// to exit with the poison signal triggers the capture-union walk and
    /// terminates the survivors immediately, so a sibling blocked on a
    /// channel the failing child never held is still freed. The optional
    /// timeout bounds the wait for each completion; when it expires the
    /// remaining children are abandoned, not cancelled.
    ///
    /// Fails with the poison signal if any child exited poisoned.
    pub fn run(&self) -> Result<()> {
        for child in &self.children {
            child.start();
        }

        let mut pending: Vec<usize> = (0..self.children.len()).collect();
        let mut poisoned = false;
        while !pending.is_empty() {
            // Wait for whichever pending child exits next; its completion
            // channel disconnects when the body thread is done.
            let slot = {
                let mut select = Select::new();
                for &idx in &pending {
                    select.recv(self.children[idx].done_receiver());
                }
                let oper = match self.timeout {
                    Some(timeout) => match select.select_timeout(timeout) {
                        Ok(oper) => oper,
                        // The hint expired: leave the rest running.
                        Err(_) => break,
                    },
                    None => select.select(),
                };
                let slot = oper.index();
                let _ = oper.recv(self.children[pending[slot]].done_receiver());
                slot
            };
            let child = &self.children[pending[slot]];
            child.join();
            pending.remove(slot);

            if !poisoned && matches!(child.state(), ProcessState::Exited(ExitReason::Poisoned)) {
                poisoned = true;
                debug!(children = self.children.len(), "child poisoned, propagating");
                self.captures().poison_all();
                for child in &self.children {
                    child.terminate();
                }
            }
        }

        if poisoned {
            return Err(CspError::Poisoned);
        }
        Ok(())
    }
}

impl From<Process> for Par {
    fn from(process: Process) -> Par {
        Par::new(vec![process])
    }
}

/// Wrap a Par as a single process for nesting inside other combinators.
impl From<Par> for Process {
    fn from(par: Par) -> Process {
        let captures = par.captures();
        Process::with_captures(captures, move || par.run())
    }
}

impl Poisonable for Par {
    fn poison_walk(&self, walk: &mut PoisonWalk) {
        for child in &self.children {
            child.poison_walk(walk);
        }
    }
}

impl std::fmt::Debug for Par {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Par")
            .field("children", &self.children.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use std::time::Duration;

    #[test]
    fn test_children_run_concurrently() {
        // Each side only completes if the other runs at the same time.
        let chan: Channel<i64> = Channel::new();
        let tx = chan.clone();
        let rx = chan.clone();

        let writer = Process::with_captures(Captures::new().with(tx.clone()), move || tx.write(1));
        let reader = Process::with_captures(Captures::new().with(rx.clone()), move || {
            rx.read().map(|_| ())
        });

        Par::new(vec![writer, reader]).run().unwrap();
    }

    #[test]
    fn test_and_flattens_par_children() {
        let make = || Process::new(|| Ok(()));
        let inner = Par::from(make()).and(make());
        let par = inner.and(make());
        assert_eq!(par.len(), 3);
    }

    #[test]
    fn test_run_joins_all_children() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let count = Arc::new(AtomicUsize::new(0));
        let children: Vec<Process> = (0..4)
            .map(|_| {
                let count = Arc::clone(&count);
                Process::new(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        Par::new(children).run().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_poisoned_child_poisons_siblings() {
        let c: Channel<i64> = Channel::new();
        let d: Channel<i64> = Channel::new();
        let rx = d.clone();

        let failing = Process::with_captures(Captures::new().with(c.clone()), || {
            Err(CspError::Poisoned)
        });
        let blocked = Process::with_captures(Captures::new().with(d.clone()), move || {
            loop {
                rx.read()?;
            }
        });
        let blocked_handle = blocked.clone();

        // The blocked sibling never exits on its own and holds a channel
        // the failing child never touched; the first poisoned exit must
        // free it through the capture union, with no timeout set.
        let par = Par::new(vec![failing, blocked]);
        assert_eq!(par.run(), Err(CspError::Poisoned));

        assert!(c.is_poisoned());
        assert!(d.is_poisoned());

        blocked_handle.join();
        assert_eq!(
            blocked_handle.state(),
            ProcessState::Exited(ExitReason::Poisoned)
        );
    }

    #[test]
    fn test_join_timeout_abandons_without_cancelling() {
        let slow = Process::new(|| {
            std::thread::sleep(Duration::from_millis(150));
            Ok(())
        });
        let slow_handle = slow.clone();

        let par = Par::new(vec![slow]).with_timeout(Duration::from_millis(20));
        par.run().unwrap();

        // The child was left running, not cancelled.
        assert_eq!(slow_handle.state(), ProcessState::Running);
        slow_handle.join();
        assert_eq!(slow_handle.state(), ProcessState::Exited(ExitReason::Normal));
    }

    #[test]
    fn test_par_converts_to_process() {
        let chan: Channel<i64> = Channel::new();
        let tx = chan.clone();
        let rx = chan.clone();

        let par = Par::new(vec![
            Process::with_captures(Captures::new().with(tx.clone()), move || tx.write(7)),
            Process::with_captures(Captures::new().with(rx.clone()), move || {
                rx.read().map(|_| ())
            }),
        ]);

        let proc = Process::from(par);
        proc.start();
        proc.join();
        assert_eq!(proc.state(), ProcessState::Exited(ExitReason::Normal));
    }
}
