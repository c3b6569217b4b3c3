//! Algebraic sugar over the core combinators.
//!
//! Surface conveniences only; the semantics live in [`crate::par`],
//! [`crate::seq`], and [`crate::alt`].

use crate::alt::Alt;
use crate::error::Result;
use crate::guard::{Guard, Selected};
use crate::par::Par;
use crate::process::Process;
use crate::seq::Seq;

/// Parallel composition of two parts.
///
/// Par arguments are inlined (shallow flatten), so chained calls build one
/// flat Par rather than a tree.
pub fn par2(left: impl Into<Par>, right: impl Into<Par>) -> Par {
    left.into().and(right)
}

/// Sequential composition of two parts.
///
/// Seq arguments are inlined (shallow flatten).
pub fn seq2(first: impl Into<Seq>, second: impl Into<Seq>) -> Seq {
    first.into().then(second)
}

/// N-fold sequential replication.
///
/// Processes are single-shot, so replication takes a factory and composes
/// `count` fresh instances into a Seq.
pub fn replicate<F>(count: usize, mut make: F) -> Seq
where
    F: FnMut() -> Process,
{
    Seq::new((0..count).map(|_| make()).collect())
}

/// One-shot selection over two guards.
pub fn choose<T, A, B>(left: A, right: B) -> Result<Selected<T>>
where
    A: Guard<T> + 'static,
    B: Guard<T> + 'static,
{
    let mut alt = Alt::new().with(left).with(right);
    alt.select()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::guard::Skip;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_par2_flattens() {
        let make = || Process::new(|| Ok(()));
        let par = par2(par2(make(), make()), make());
        assert_eq!(par.len(), 3);
        par.run().unwrap();
    }

    #[test]
    fn test_seq2_flattens_and_orders() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let make = |tag: usize| {
            let order = Arc::clone(&order);
            Process::new(move || {
                order.lock().push(tag);
                Ok(())
            })
        };

        let seq = seq2(seq2(make(0), make(1)), make(2));
        assert_eq!(seq.len(), 3);
        seq.run().unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_replicate_runs_count_clones() {
        let count = Arc::new(Mutex::new(0usize));
        let seq = replicate(5, || {
            let count = Arc::clone(&count);
            Process::new(move || {
                *count.lock() += 1;
                Ok(())
            })
        });
        assert_eq!(seq.len(), 5);
        seq.run().unwrap();
        assert_eq!(*count.lock(), 5);
    }

    #[test]
    fn test_choose_picks_the_ready_guard() {
        let ready: Channel<i64> = Channel::new();
        let idle: Channel<i64> = Channel::new();
        let tx = ready.clone();
        let writer = std::thread::spawn(move || tx.write(42));
        std::thread::sleep(std::time::Duration::from_millis(50));

        assert_eq!(choose(ready, idle).unwrap(), Selected::Value(42));
        writer.join().unwrap().unwrap();
    }

    #[test]
    fn test_choose_with_skip_default() {
        let idle: Channel<i64> = Channel::new();
        assert_eq!(choose(idle, Skip).unwrap(), Selected::Skip);
    }
}
