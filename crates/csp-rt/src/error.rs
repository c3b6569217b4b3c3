//! Error kinds for channel, selection, and process operations.
//!
//! Poison is the only error a correct program is expected to meet: it is the
//! cooperative termination signal, recovered at the process boundary by the
//! runtime (which walks the process's captures and exits). The other kinds
//! are surfaced up the fault path instead of triggering poisoning.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CspError>;

/// An error raised by a channel, guard, selection, or combinator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CspError {
    /// The channel (or the resource behind a guard) has been poisoned.
    ///
    /// Monotonic: once an operation fails with `Poisoned`, every later
    /// operation on the same channel fails the same way.
    Poisoned,
    /// A selection was attempted over an empty guard list.
    ///
    /// This is a programming error, fatal to the calling process; it is
    /// reported through the fault sink rather than poisoning anything.
    NoGuardInAlt,
    /// A pending write was cancelled by an aborted selection.
    ///
    /// Consumed inside the kernel: `disable` hands the writer's permit back,
    /// so the write simply stays pending. The variant never escapes to user
    /// code.
    WriteAborted,
}

impl fmt::Display for CspError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poisoned => write!(f, "channel poisoned"),
            Self::NoGuardInAlt => write!(f, "alternation requires at least one guard"),
            Self::WriteAborted => write!(f, "channel write aborted by a cancelled selection"),
        }
    }
}

impl std::error::Error for CspError {}
