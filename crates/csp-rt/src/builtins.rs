//! Plug-and-play stock processes.
//!
//! Each factory returns an unstarted [`Process`] wired to the given channel
//! endpoints. The endpoints are declared in the process's capture set, so
//! poisoning any channel of a pipeline drains the whole pipeline: every
//! stage observes the signal at its next read or write and propagates it to
//! the channels it holds.
//!
//! All of these loop until poisoned; none exits normally.

use std::fmt::Display;
use std::time::Duration;

use crate::alt::Alt;
use crate::channel::Channel;
use crate::guard::Selected;
use crate::poison::Captures;
use crate::process::Process;

/// Write successive integers 0, 1, 2, ... to `cout`.
pub fn generate(cout: Channel<i64>) -> Process {
    let captures = Captures::new().with(cout.clone());
    Process::with_captures(captures, move || {
        let mut counter = 0i64;
        loop {
            cout.write(counter)?;
            counter += 1;
        }
    })
}

/// Copy every value read from `cin` to `cout`.
pub fn id<T: Send + 'static>(cin: Channel<T>, cout: Channel<T>) -> Process {
    unop(cin, cout, |value| value)
}

/// Write out 1 + each input value.
pub fn succ(cin: Channel<i64>, cout: Channel<i64>) -> Process {
    unop(cin, cout, |value| value + 1)
}

/// Write out each input value - 1.
pub fn pred(cin: Channel<i64>, cout: Channel<i64>) -> Process {
    unop(cin, cout, |value| value - 1)
}

/// Write `first`, then echo `cin` to `cout` one step behind.
pub fn prefix<T: Send + 'static>(cin: Channel<T>, cout: Channel<T>, first: T) -> Process {
    let captures = Captures::new().with(cin.clone()).with(cout.clone());
    Process::with_captures(captures, move || {
        let mut item = first;
        loop {
            cout.write(item)?;
            item = cin.read()?;
        }
    })
}

/// Send each input value down both output channels.
pub fn delta2<T: Clone + Send + 'static>(
    cin: Channel<T>,
    cout1: Channel<T>,
    cout2: Channel<T>,
) -> Process {
    let captures = Captures::new()
        .with(cin.clone())
        .with(cout1.clone())
        .with(cout2.clone());
    Process::with_captures(captures, move || loop {
        let value = cin.read()?;
        cout1.write(value.clone())?;
        cout2.write(value)?;
    })
}

/// Fair multiplex of two input channels onto one output.
pub fn mux2<T: Send + 'static>(
    cin1: Channel<T>,
    cin2: Channel<T>,
    cout: Channel<T>,
) -> Process {
    let captures = Captures::new()
        .with(cin1.clone())
        .with(cin2.clone())
        .with(cout.clone());
    Process::with_captures(captures, move || {
        let mut alt = Alt::new().with(cin1.clone()).with(cin2.clone());
        loop {
            if let Selected::Value(value) = alt.fair_select()? {
                cout.write(value)?;
            }
        }
    })
}

/// Write the sum of each pair of input values.
pub fn pairs(cin1: Channel<i64>, cin2: Channel<i64>, cout: Channel<i64>) -> Process {
    binop(cin1, cin2, cout, |a, b| a + b)
}

/// Scale each input value by `factor`.
pub fn scale(cin: Channel<i64>, cout: Channel<i64>, factor: i64) -> Process {
    unop(cin, cout, move |value| value * factor)
}

/// Write a unit tick to `cout` every `resolution`.
pub fn clock(cout: Channel<()>, resolution: Duration) -> Process {
    let captures = Captures::new().with(cout.clone());
    Process::with_captures(captures, move || loop {
        std::thread::sleep(resolution);
        cout.write(())?;
    })
}

/// Print every value read from `cin` to standard output.
pub fn printer<T: Display + Send + 'static>(cin: Channel<T>) -> Process {
    let captures = Captures::new().with(cin.clone());
    Process::with_captures(captures, move || loop {
        println!("{}", cin.read()?);
    })
}

/// Read values from `cin` and discard them.
pub fn blackhole<T: Send + 'static>(cin: Channel<T>) -> Process {
    let captures = Captures::new().with(cin.clone());
    Process::with_captures(captures, move || loop {
        cin.read()?;
    })
}

/// Echo `cin` to `cout` after a fixed `delay`.
pub fn fixed_delay<T: Send + 'static>(
    cin: Channel<T>,
    cout: Channel<T>,
    delay: Duration,
) -> Process {
    let captures = Captures::new().with(cin.clone()).with(cout.clone());
    Process::with_captures(captures, move || loop {
        let value = cin.read()?;
        std::thread::sleep(delay);
        cout.write(value)?;
    })
}

/// Write successive Fibonacci numbers to `cout` (wrapping on overflow).
pub fn fibonacci(cout: Channel<i64>) -> Process {
    let captures = Captures::new().with(cout.clone());
    Process::with_captures(captures, move || {
        let (mut a, mut b) = (1i64, 1i64);
        loop {
            cout.write(a)?;
            let next = a.wrapping_add(b);
            a = b;
            b = next;
        }
    })
}

/// Apply `op` to each value read from `cin`, writing the result to `cout`.
///
/// The factory behind the single-input builtins; use it directly for ad-hoc
/// stages.
pub fn unop<A, B, F>(cin: Channel<A>, cout: Channel<B>, op: F) -> Process
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> B + Send + 'static,
{
    let captures = Captures::new().with(cin.clone()).with(cout.clone());
    Process::with_captures(captures, move || loop {
        cout.write(op(cin.read()?))?;
    })
}

/// Apply `op` to each pair of values read from `cin1` and `cin2`, writing
/// the result to `cout`.
pub fn binop<A, B, C, F>(
    cin1: Channel<A>,
    cin2: Channel<B>,
    cout: Channel<C>,
    op: F,
) -> Process
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
    F: Fn(A, B) -> C + Send + 'static,
{
    let captures = Captures::new()
        .with(cin1.clone())
        .with(cin2.clone())
        .with(cout.clone());
    Process::with_captures(captures, move || loop {
        let a = cin1.read()?;
        let b = cin2.read()?;
        cout.write(op(a, b))?;
    })
}

/// Write the addition of each pair of input values.
pub fn plus(cin1: Channel<i64>, cin2: Channel<i64>, cout: Channel<i64>) -> Process {
    binop(cin1, cin2, cout, |a, b| a + b)
}

/// Write the subtraction of each pair of input values.
pub fn sub(cin1: Channel<i64>, cin2: Channel<i64>, cout: Channel<i64>) -> Process {
    binop(cin1, cin2, cout, |a, b| a - b)
}

/// Write the multiplication of each pair of input values.
pub fn mul(cin1: Channel<i64>, cin2: Channel<i64>, cout: Channel<i64>) -> Process {
    binop(cin1, cin2, cout, |a, b| a * b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ExitReason, ProcessState};

    /// Poison the given channels and wait for the processes to drain.
    fn shut_down(channels: &[&Channel<i64>], procs: &[Process]) {
        for chan in channels {
            chan.poison();
        }
        for proc in procs {
            proc.join();
            assert_eq!(proc.state(), ProcessState::Exited(ExitReason::Poisoned));
        }
    }

    #[test]
    fn test_generate_succ_pipeline() {
        let a: Channel<i64> = Channel::new();
        let b: Channel<i64> = Channel::new();

        let gen = generate(a.clone());
        let inc = succ(a.clone(), b.clone());
        gen.start();
        inc.start();

        let values: Vec<i64> = (0..3).map(|_| b.read().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);

        shut_down(&[&a, &b], &[gen, inc]);
    }

    #[test]
    fn test_prefix_leads_the_stream() {
        let a: Channel<i64> = Channel::new();
        let b: Channel<i64> = Channel::new();

        let pre = prefix(a.clone(), b.clone(), 0);
        pre.start();

        assert_eq!(b.read().unwrap(), 0);
        a.write(5).unwrap();
        assert_eq!(b.read().unwrap(), 5);

        shut_down(&[&a, &b], &[pre]);
    }

    #[test]
    fn test_delta2_duplicates() {
        let a: Channel<i64> = Channel::new();
        let b: Channel<i64> = Channel::new();
        let c: Channel<i64> = Channel::new();

        let split = delta2(a.clone(), b.clone(), c.clone());
        split.start();

        let tx = a.clone();
        let writer = std::thread::spawn(move || tx.write(7));
        assert_eq!(b.read().unwrap(), 7);
        assert_eq!(c.read().unwrap(), 7);
        writer.join().unwrap().unwrap();

        shut_down(&[&a, &b, &c], &[split]);
    }

    #[test]
    fn test_pairs_adds() {
        let a: Channel<i64> = Channel::new();
        let b: Channel<i64> = Channel::new();
        let out: Channel<i64> = Channel::new();

        let adder = pairs(a.clone(), b.clone(), out.clone());
        adder.start();

        let tx1 = a.clone();
        let tx2 = b.clone();
        let w1 = std::thread::spawn(move || tx1.write(2));
        let w2 = std::thread::spawn(move || tx2.write(3));
        assert_eq!(out.read().unwrap(), 5);
        w1.join().unwrap().unwrap();
        w2.join().unwrap().unwrap();

        shut_down(&[&a, &b, &out], &[adder]);
    }

    #[test]
    fn test_mux2_merges_both_inputs() {
        let a: Channel<i64> = Channel::new();
        let b: Channel<i64> = Channel::new();
        let out: Channel<i64> = Channel::new();

        let mux = mux2(a.clone(), b.clone(), out.clone());
        mux.start();

        let ta = a.clone();
        let w1 = std::thread::spawn(move || {
            ta.write(1).unwrap();
            ta.write(2).unwrap();
        });
        let tb = b.clone();
        let w2 = std::thread::spawn(move || {
            tb.write(10).unwrap();
            tb.write(20).unwrap();
        });

        let mut values: Vec<i64> = (0..4).map(|_| out.read().unwrap()).collect();
        w1.join().unwrap();
        w2.join().unwrap();

        values.sort_unstable();
        assert_eq!(values, vec![1, 2, 10, 20]);

        shut_down(&[&a, &b, &out], &[mux]);
    }

    #[test]
    fn test_clock_ticks_until_poisoned() {
        let ticks: Channel<()> = Channel::new();
        let ticker = clock(ticks.clone(), Duration::from_millis(10));
        ticker.start();

        ticks.read().unwrap();
        ticks.read().unwrap();

        ticks.poison();
        ticker.join();
        assert_eq!(ticker.state(), ProcessState::Exited(ExitReason::Poisoned));
    }

    #[test]
    fn test_poison_drains_whole_pipeline() {
        let a: Channel<i64> = Channel::new();
        let b: Channel<i64> = Channel::new();
        let c: Channel<i64> = Channel::new();

        let gen = generate(a.clone());
        let double = scale(a.clone(), b.clone(), 2);
        let sink_proc = id(b.clone(), c.clone());
        gen.start();
        double.start();
        sink_proc.start();

        assert_eq!(c.read().unwrap(), 0);
        assert_eq!(c.read().unwrap(), 2);

        // Poisoning one end must reach every stage through the captures.
        c.poison();
        for proc in [&gen, &double, &sink_proc] {
            proc.join();
            assert_eq!(proc.state(), ProcessState::Exited(ExitReason::Poisoned));
        }
        assert!(a.is_poisoned());
        assert!(b.is_poisoned());
    }
}
