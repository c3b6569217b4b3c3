//! Synchronous rendezvous channels.
//!
//! A channel carries one payload at a time between exactly one writer and
//! one reader per message. `write` publishes the payload and then blocks
//! until a reader has accepted it; `read` blocks until a payload is
//! available. Writers are serialized by a write mutex, readers by a read
//! mutex; the rendezvous itself is enforced by two counting semaphores,
//! `available` (writer -> reader) and `taken` (reader -> writer).
//!
//! ## Selection sub-protocol
//!
//! An alternation never calls `read` directly. Instead it drives the
//! four-phase protocol: `enable` consumes the writer's ready-permit without
//! taking the payload, so `is_selectable` observably means "this channel is
//! committed to delivering through `select`". A non-winning guard's
//! `disable` hands the permit back, leaving the pending write intact.
//!
//! ## Poison
//!
//! `poison` monotonically marks the channel dead and closes both
//! semaphores, so parties blocked mid-rendezvous wake and fail with the
//! poison signal instead of hanging. Poison can also travel in-band: a
//! `write_poison` delivers a control token that makes the receiving side
//! poison the channel itself.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{CspError, Result};
use crate::guard::{Guard, Selected};
use crate::poison::{PoisonWalk, Poisonable};
use crate::sync::Semaphore;

// ---------------------------------------------------------------------------
// ChannelId
// ---------------------------------------------------------------------------

/// Unique identifier for a channel.
///
/// Assigned sequentially from a global atomic counter, guaranteeing
/// uniqueness within a single runtime instance.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

impl ChannelId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        ChannelId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// What travels through the payload slot: a user value or the poison token.
///
/// The poison token is a dedicated control variant, distinct from every user
/// payload by construction; readers switch on the tag on receipt.
enum Packet<T> {
    Item(T),
    Poison,
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

struct Shared<T> {
    id: ChannelId,
    /// Serializes writers. Held for the whole write transaction, including
    /// the wait for the reader.
    wlock: Mutex<()>,
    /// Serializes readers (and the alting side of the selection protocol).
    rlock: Mutex<()>,
    /// Permits granted by writers, consumed by readers (or by `enable`).
    available: Semaphore,
    /// Permits granted by readers once the payload is accepted.
    taken: Semaphore,
    /// True while an alternation has this channel enabled.
    is_alting: AtomicBool,
    /// True when `enable` has consumed the ready-permit: `select` commits.
    is_selectable: AtomicBool,
    /// Set by `select`; blocks re-selection until the next write clears it.
    has_selected: AtomicBool,
    /// Monotonic poison flag.
    poisoned: AtomicBool,
    /// The in-flight payload. At most one per channel at any time.
    slot: Mutex<Option<Packet<T>>>,
}

/// A synchronous, unbuffered rendezvous channel.
///
/// Cloning the handle shares the same channel; any clone may be used to
/// read, write, poison, or select. A `write` returns only after its value
/// has been accepted by exactly one `read` (or committed selection).
pub struct Channel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Channel<T> {
    /// Create a new idle channel.
    pub fn new() -> Self {
        Channel {
            shared: Arc::new(Shared {
                id: ChannelId::next(),
                wlock: Mutex::new(()),
                rlock: Mutex::new(()),
                available: Semaphore::new(0),
                taken: Semaphore::new(0),
                is_alting: AtomicBool::new(false),
                is_selectable: AtomicBool::new(false),
                has_selected: AtomicBool::new(false),
                poisoned: AtomicBool::new(false),
                slot: Mutex::new(None),
            }),
        }
    }

    /// This channel's stable identifier.
    pub fn id(&self) -> ChannelId {
        self.shared.id
    }

    /// Whether the channel has been poisoned.
    pub fn is_poisoned(&self) -> bool {
        self.shared.poisoned.load(Ordering::SeqCst)
    }

    /// Poison the channel, causing every process using it to terminate.
    ///
    /// Monotonic and idempotent. Parties blocked mid-rendezvous are woken
    /// and observe the poison signal; every subsequent operation fails.
    pub fn poison(&self) {
        let sh = &self.shared;
        if sh.poisoned.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(channel = %sh.id, "channel poisoned");
        sh.available.close();
        sh.taken.close();
    }

    fn write_packet(&self, packet: Packet<T>) -> Result<()> {
        if self.is_poisoned() {
            return Err(CspError::Poisoned);
        }
        let sh = &self.shared;
        let _w = sh.wlock.lock();
        // A committed selection leaves has_selected set to block
        // re-selection; a new write opens a new transaction.
        sh.has_selected.store(false, Ordering::SeqCst);
        *sh.slot.lock() = Some(packet);
        sh.available.release();
        trace!(
            channel = %sh.id,
            alting = sh.is_alting.load(Ordering::SeqCst),
            "write published, awaiting rendezvous"
        );
        // Block until the payload has been accepted.
        if !sh.taken.acquire() {
            return Err(CspError::Poisoned);
        }
        trace!(channel = %sh.id, "write complete");
        Ok(())
    }

    /// Write a value to the channel.
    ///
    /// Returns only after the value has been accepted by exactly one reader.
    pub fn write(&self, value: T) -> Result<()> {
        self.write_packet(Packet::Item(value))
    }

    /// Deliver the in-band poison token.
    ///
    /// The receiving side poisons the channel on receipt and fails with the
    /// poison signal; like any write, this blocks until the token is taken.
    pub fn write_poison(&self) -> Result<()> {
        self.write_packet(Packet::Poison)
    }

    /// Read a value from the channel, blocking until one is available.
    pub fn read(&self) -> Result<T> {
        if self.is_poisoned() {
            return Err(CspError::Poisoned);
        }
        let sh = &self.shared;
        let packet = {
            let _r = sh.rlock.lock();
            if !sh.available.acquire() {
                return Err(CspError::Poisoned);
            }
            let packet = sh
                .slot
                .lock()
                .take()
                .expect("rendezvous slot empty after available permit");
            // Announce the payload has been accepted.
            sh.taken.release();
            packet
        };
        match packet {
            Packet::Item(value) => {
                trace!(channel = %sh.id, "read complete");
                Ok(value)
            }
            Packet::Poison => {
                debug!(channel = %sh.id, "poison token received");
                self.poison();
                Err(CspError::Poisoned)
            }
        }
    }

    /// Enable a read for a selection without committing to it.
    ///
    /// Consumes the writer's ready-permit (if any) so that a `true`
    /// [`is_selectable`](Self::is_selectable) means the channel is committed
    /// to delivering through [`select`](Self::select). Idempotent within a
    /// write transaction: once this guard is selectable, or a selection has
    /// already committed in the current transaction, re-enabling is a no-op.
    pub fn enable(&self) -> Result<()> {
        if self.is_poisoned() {
            return Err(CspError::Poisoned);
        }
        let sh = &self.shared;
        if sh.has_selected.load(Ordering::SeqCst) || sh.is_selectable.load(Ordering::SeqCst) {
            return Ok(());
        }
        sh.is_alting.store(true, Ordering::SeqCst);
        let ready = {
            let _r = sh.rlock.lock();
            sh.available.try_acquire()
        };
        sh.is_selectable.store(ready, Ordering::SeqCst);
        trace!(channel = %sh.id, ready, "guard enabled");
        Ok(())
    }

    /// Whether a selection could commit to this channel right now.
    pub fn is_selectable(&self) -> Result<bool> {
        if self.is_poisoned() {
            return Err(CspError::Poisoned);
        }
        Ok(self.shared.is_selectable.load(Ordering::SeqCst))
    }

    /// Roll back a non-winning [`enable`](Self::enable).
    ///
    /// Restores the writer's ready-permit, leaving the pending write intact
    /// for an ordinary reader or a later selection.
    pub fn disable(&self) -> Result<()> {
        if self.is_poisoned() {
            return Err(CspError::Poisoned);
        }
        let sh = &self.shared;
        sh.is_alting.store(false, Ordering::SeqCst);
        if sh.is_selectable.swap(false, Ordering::SeqCst) {
            let _r = sh.rlock.lock();
            sh.available.release();
        }
        trace!(channel = %sh.id, "guard disabled");
        Ok(())
    }

    /// Commit a previously enabled read.
    ///
    /// # Panics
    ///
    /// Calling this on a guard that was not enabled as selectable is a
    /// programming error and panics.
    pub fn select(&self) -> Result<T> {
        let sh = &self.shared;
        assert!(
            sh.is_selectable.load(Ordering::SeqCst),
            "select() on channel {} which was not enabled as selectable",
            sh.id
        );
        if self.is_poisoned() {
            return Err(CspError::Poisoned);
        }
        let packet = {
            let _r = sh.rlock.lock();
            let packet = sh
                .slot
                .lock()
                .take()
                .expect("rendezvous slot empty during select");
            sh.taken.release();
            // Reset for a future read / enable; has_selected blocks
            // re-selection until the next write.
            sh.is_selectable.store(false, Ordering::SeqCst);
            sh.is_alting.store(false, Ordering::SeqCst);
            sh.has_selected.store(true, Ordering::SeqCst);
            packet
        };
        match packet {
            Packet::Item(value) => {
                trace!(channel = %sh.id, "selection committed");
                Ok(value)
            }
            Packet::Poison => {
                debug!(channel = %sh.id, "poison token received in selection");
                self.poison();
                Err(CspError::Poisoned)
            }
        }
    }
}

impl<T: Send> Guard<T> for Channel<T> {
    fn enable(&self) -> Result<()> {
        Channel::enable(self)
    }

    fn is_selectable(&self) -> Result<bool> {
        Channel::is_selectable(self)
    }

    fn disable(&self) -> Result<()> {
        Channel::disable(self)
    }

    fn select(&self) -> Result<Selected<T>> {
        Channel::select(self).map(Selected::Value)
    }

    fn poison(&self) {
        Channel::poison(self)
    }
}

impl<T: Send> Poisonable for Channel<T> {
    fn poison_walk(&self, walk: &mut PoisonWalk) {
        if walk.mark(Arc::as_ptr(&self.shared) as usize) {
            self.poison();
        }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.shared.id)
            .field("poisoned", &self.is_poisoned())
            .finish()
    }
}
