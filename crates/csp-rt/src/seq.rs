//! Sequential composition: start child i, join child i, start child i+1.
//!
//! Constructing a `Seq` from another `Seq` inlines that child's processes
//! (shallow flatten). A child that exits with the poison signal stops the
//! remaining children from being started and propagates over the capture
//! union; a faulted child does not (its fault has already been reported).

use tracing::debug;

use crate::error::{CspError, Result};
use crate::poison::{Captures, PoisonWalk, Poisonable};
use crate::process::{ExitReason, Process, ProcessState};

/// Sequential composition of processes.
pub struct Seq {
    children: Vec<Process>,
}

impl Seq {
    /// Compose the given processes in sequence.
    pub fn new(children: Vec<Process>) -> Self {
        Seq { children }
    }

    /// Append the children of `other` after this Seq's own (shallow
    /// flatten). Accepts a plain process as a one-child Seq.
    pub fn then(mut self, other: impl Into<Seq>) -> Seq {
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

    /// Run the children in order, each to completion before the next.
    ///
    /// Fails with the poison signal at the first poisoned child; later
    /// children are never started.
    pub fn run(&self) -> Result<()> {
        for child in &self.children {
            child.start();
            child.join();
            if matches!(child.state(), ProcessState::Exited(ExitReason::Poisoned)) {
                debug!("child poisoned, stopping sequence");
                self.captures().poison_all();
                return Err(CspError::Poisoned);
            }
        }
        Ok(())
    }
}

impl From<Process> for Seq {
    fn from(process: Process) -> Seq {
        Seq::new(vec![process])
    }
}

/// Wrap a Seq as a single process for nesting inside other combinators.
impl From<Seq> for Process {
    fn from(seq: Seq) -> Process {
        let captures = seq.captures();
        Process::with_captures(captures, move || seq.run())
    }
}

impl Poisonable for Seq {
    fn poison_walk(&self, walk: &mut PoisonWalk) {
        for child in &self.children {
            child.poison_walk(walk);
        }
    }
}

impl std::fmt::Debug for Seq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Seq")
            .field("children", &self.children.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording_process(order: &Arc<Mutex<Vec<usize>>>, tag: usize) -> Process {
        let order = Arc::clone(order);
        Process::new(move || {
            order.lock().push(tag);
            Ok(())
        })
    }

    #[test]
    fn test_children_run_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let children: Vec<Process> = (0..3).map(|i| recording_process(&order, i)).collect();

        Seq::new(children).run().unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_then_flattens_seq_children() {
        let make = || Process::new(|| Ok(()));
        let inner = Seq::from(make()).then(make());
        let seq = inner.then(make());
        assert_eq!(seq.len(), 3);
    }

    #[test]
    fn test_poisoned_child_stops_sequence() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let chan: Channel<i64> = Channel::new();

        let first = recording_process(&order, 0);
        let failing = Process::with_captures(Captures::new().with(chan.clone()), || {
            Err(CspError::Poisoned)
        });
        let never = recording_process(&order, 2);

        let seq = Seq::new(vec![first, failing, never]);
        assert_eq!(seq.run(), Err(CspError::Poisoned));

        assert_eq!(*order.lock(), vec![0]);
        assert!(chan.is_poisoned());
    }

    #[test]
    fn test_faulted_child_does_not_stop_sequence() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = Process::new(|| Err(CspError::NoGuardInAlt));
        let second = recording_process(&order, 1);

        Seq::new(vec![first, second]).run().unwrap();
        assert_eq!(*order.lock(), vec![1]);
    }

    #[test]
    fn test_seq_converts_to_process() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let seq = Seq::new(vec![
            recording_process(&order, 0),
            recording_process(&order, 1),
        ]);

        let proc = Process::from(seq);
        proc.start();
        proc.join();

        assert_eq!(proc.state(), ProcessState::Exited(ExitReason::Normal));
        assert_eq!(*order.lock(), vec![0, 1]);
    }

    #[test]
    fn test_par_nests_inside_seq() {
        let chan: Channel<i64> = Channel::new();
        let tx = chan.clone();
        let rx = chan.clone();

        let par = crate::par::Par::new(vec![
            Process::with_captures(Captures::new().with(tx.clone()), move || tx.write(1)),
            Process::with_captures(Captures::new().with(rx.clone()), move || {
                rx.read().map(|_| ())
            }),
        ]);

        let order = Arc::new(Mutex::new(Vec::new()));
        let seq = Seq::new(vec![Process::from(par), recording_process(&order, 9)]);
        seq.run().unwrap();
        assert_eq!(*order.lock(), vec![9]);
    }
}
