/*!
 * Message Ring
 *
 * Send/read protocol over a formatted segment. Every access to the status
 * block and the slots happens inside the cross-process critical section,
 * and only after the caller has earned the matching credit.
 */

use super::config::ChecksumPolicy;
use super::credit::{CreditSemaphores, CreditSnapshot};
use super::layout::{slot_offset, MessageSlot, StatusBlock, SLOT_LEN, STATUS_LEN, STATUS_OFFSET};
use super::platform::{HeapRegion, SharedRegion};
use crate::core::errors::{fatal, IpcError, IpcResult};
use crate::core::limits::{CAPACITY, HDR_LEN};
use crate::core::sync::{CountingSemaphore, LocalSemaphore};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{trace, warn};

/// A message taken off the ring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub command: u32,
    pub flags: u32,
    /// Bytes up to the first NUL, at most `MAX_MESSAGE_LEN`
    pub payload: Vec<u8>,
    pub sequence: u64,
}

impl From<&MessageSlot> for Message {
    fn from(slot: &MessageSlot) -> Self {
        Self {
            command: slot.command_id,
            flags: slot.flags,
            payload: slot.payload().to_vec(),
            sequence: slot.sequence,
        }
    }
}

/// Zero the region and publish a fresh header and status block
pub fn format<R: SharedRegion + ?Sized>(region: &R, header: &[u8; HDR_LEN]) {
    region.store(0, &vec![0u8; region.size()]);
    region.store(0, header);
    region.store(STATUS_OFFSET, &StatusBlock::default().encode());
}

/// Header bytes as stored in the region
pub fn read_header<R: SharedRegion + ?Sized>(region: &R) -> [u8; HDR_LEN] {
    let mut header = [0u8; HDR_LEN];
    region.load(0, &mut header);
    header
}

/// Holds the segment lock; releasing it is not allowed to fail
pub(crate) struct CriticalSection<'a, S: CountingSemaphore> {
    lock: &'a S,
}

impl<'a, S: CountingSemaphore> CriticalSection<'a, S> {
    pub(crate) fn enter(lock: &'a S) -> IpcResult<Self> {
        lock.acquire()?;
        Ok(Self { lock })
    }
}

impl<S: CountingSemaphore> Drop for CriticalSection<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release() {
            fatal("failed to release the segment lock", &e);
        }
    }
}

/// Bounded FIFO of `CAPACITY` slots shared between processes
pub struct Ring<R, S> {
    region: R,
    lock: S,
    credits: CreditSemaphores<S>,
    policy: ChecksumPolicy,
}

impl<R: SharedRegion, S: CountingSemaphore> Ring<R, S> {
    /// Wrap an already formatted region and its semaphores
    pub fn new(region: R, lock: S, credits: CreditSemaphores<S>, policy: ChecksumPolicy) -> Self {
        Self {
            region,
            lock,
            credits,
            policy,
        }
    }

    pub fn region(&self) -> &R {
        &self.region
    }

    /// Segment lock shared with every peer
    pub(crate) fn lock(&self) -> &S {
        &self.lock
    }

    pub fn policy(&self) -> ChecksumPolicy {
        self.policy
    }

    pub fn credits(&self) -> Option<CreditSnapshot> {
        self.credits.snapshot()
    }

    /// Publish one message; returns its sequence number
    ///
    /// Blocks while the ring is full, or up to `wait` when given. The
    /// read-credit is handed over even when the status block turns out to be
    /// corrupt.
    pub fn send(
        &self,
        command_id: u32,
        flags: u32,
        message: &[u8],
        wait: Option<Duration>,
    ) -> IpcResult<u64> {
        self.credits.acquire_write(wait)?;

        let published = match CriticalSection::enter(&self.lock) {
            Ok(_section) => self.publish(command_id, flags, message),
            Err(e) => {
                if let Err(release) = self.credits.release_write() {
                    fatal("failed to return a write-credit", &release);
                }
                return Err(e);
            }
        };

        if let Err(e) = self.credits.release_read() {
            fatal("failed to release a read-credit", &e);
        }
        published
    }

    /// Take the oldest message
    ///
    /// Blocks while the ring is empty, or up to `wait` when given. The
    /// write-credit is handed back before the copied slot is validated.
    pub fn read(&self, wait: Option<Duration>) -> IpcResult<Message> {
        self.credits.acquire_read(wait)?;

        let taken = match CriticalSection::enter(&self.lock) {
            Ok(_section) => self.take(),
            Err(e) => {
                if let Err(release) = self.credits.release_read() {
                    fatal("failed to return a read-credit", &release);
                }
                return Err(e);
            }
        };

        if let Err(e) = self.credits.release_write() {
            fatal("failed to release a write-credit", &e);
        }

        let (slot, intact, counter) = taken?;
        self.accept(&slot, intact, counter)?;
        Ok(Message::from(&slot))
    }

    /// Current status block, read under the segment lock
    pub fn status(&self) -> IpcResult<StatusBlock> {
        let _section = CriticalSection::enter(&self.lock)?;
        self.load_status()
    }

    fn publish(&self, command_id: u32, flags: u32, message: &[u8]) -> IpcResult<u64> {
        let mut status = self.load_status()?;
        let sequence = status.next_sequence();
        let slot = MessageSlot::new(command_id, flags, message, sequence);

        self.region
            .store(slot_offset(status.pos_write as usize), &slot.encode());
        status.advance_write();
        self.region.store(STATUS_OFFSET, &status.encode());

        trace!(
            sequence,
            command_id,
            pos_write = status.pos_write,
            "message published"
        );
        Ok(sequence)
    }

    fn take(&self) -> IpcResult<(MessageSlot, bool, u64)> {
        let mut status = self.load_status()?;

        let mut bytes = [0u8; SLOT_LEN];
        self.region
            .load(slot_offset(status.pos_read as usize), &mut bytes);
        let (slot, intact) = MessageSlot::decode(&bytes);

        status.advance_read();
        self.region.store(STATUS_OFFSET, &status.encode());

        trace!(
            sequence = slot.sequence,
            pos_read = status.pos_read,
            "message taken"
        );
        Ok((slot, intact, status.counter))
    }

    fn accept(&self, slot: &MessageSlot, intact: bool, counter: u64) -> IpcResult<()> {
        if intact {
            return Ok(());
        }
        if self.policy == ChecksumPolicy::LegacyLenient && slot.sequence < counter {
            warn!(
                sequence = slot.sequence,
                counter, "accepting message with bad checksum under lenient policy"
            );
            return Ok(());
        }
        warn!(sequence = slot.sequence, "message checksum mismatch");
        Err(IpcError::CorruptedMessage {
            sequence: slot.sequence,
        })
    }

    fn load_status(&self) -> IpcResult<StatusBlock> {
        let mut bytes = [0u8; STATUS_LEN];
        self.region.load(STATUS_OFFSET, &mut bytes);
        StatusBlock::decode(&bytes).inspect_err(|_| {
            warn!("status block checksum mismatch");
        })
    }
}

impl Ring<HeapRegion, LocalSemaphore> {
    /// Formatted ring living in process memory
    pub fn in_process(policy: ChecksumPolicy) -> Self {
        let region = HeapRegion::new(super::layout::SEGMENT_SIZE);
        format(&region, &[b'0'; HDR_LEN]);
        let capacity = CAPACITY as u32;
        Self::new(
            region,
            LocalSemaphore::new(1, 1),
            CreditSemaphores::new(
                LocalSemaphore::new(capacity, capacity),
                LocalSemaphore::new(0, capacity),
            ),
            policy,
        )
    }
}
