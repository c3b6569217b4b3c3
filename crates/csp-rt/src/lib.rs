//! Communicating Sequential Processes for Rust.
//!
//! This crate is a CSP concurrency kernel: processes, synchronous rendezvous
//! channels, guards with nondeterministic selection, the parallel and
//! sequential combinators, and transitive termination via channel poisoning.
//!
//! ## Model
//!
//! A [`Process`] runs a user body on its own OS thread. Bodies communicate
//! only through [`Channel`]s: a write publishes one payload and blocks until
//! exactly one read accepts it (the rendezvous). An [`Alt`] chooses among
//! ready [`Guard`]s (channels, the always-ready [`Skip`], or a deadline
//! [`Timer`]) under a random, fair, or priority policy. [`Par`] and [`Seq`]
//! compose processes in parallel or in order.
//!
//! Termination is cooperative and viral: poisoning a channel makes every
//! operation on it fail with the poison signal, and a process observing the
//! signal poisons everything in its declared capture set ([`Captures`])
//! before exiting. Poison crosses process and combinator boundaries until
//! the whole reachable network has drained.
//!
//! ## Modules
//!
//! - [`channel`]: rendezvous channels and the four-phase selection protocol
//! - [`guard`]: the [`Guard`] capability plus [`Skip`] and [`Timer`]
//! - [`alt`]: selection over a guard list (random / fair / priority)
//! - [`process`]: the unit of execution, its lifecycle, and the fault sink
//! - [`poison`]: capture sets and the cycle-safe poison walk
//! - [`par`] / [`seq`]: parallel and sequential composition
//! - [`ops`]: algebraic sugar (pair composition, replication, one-shot choice)
//! - [`builtins`]: plug-and-play stock processes

pub mod alt;
pub mod builtins;
pub mod channel;
pub mod error;
pub mod guard;
pub mod ops;
pub mod par;
pub mod poison;
pub mod process;
pub mod seq;
mod sync;

pub use alt::Alt;
pub use channel::{Channel, ChannelId};
pub use error::{CspError, Result};
pub use guard::{Guard, Selected, Skip, Timer};
pub use ops::{choose, par2, replicate, seq2};
pub use par::Par;
pub use poison::{Captures, PoisonWalk, Poisonable};
pub use process::{
    set_fault_sink, ExitReason, FaultSink, Process, ProcessId, ProcessState,
};
pub use seq::Seq;
