/*!
 * Segment Bootstrap
 *
 * Create-or-attach of the named segment and its credit semaphores. The
 * whole sequence runs under `<segment>.lock`, so an attaching process never
 * sees a segment whose header is still being written.
 *
 * Every attachment is counted in the segment. The last one to detach
 * unlinks the segment and the credit semaphores, so the next process to
 * initialize becomes Master of an empty ring. The lock semaphore stays: a
 * peer may already be waiting on it to bootstrap.
 */

use super::types::Role;
use crate::core::errors::{fatal, IpcError, IpcResult};
use crate::core::limits::CAPACITY;
use crate::core::sync::CountingSemaphore;
use crate::ipc::config::ChecksumPolicy;
use crate::ipc::credit::CreditSemaphores;
use crate::ipc::identity::ChannelIdentity;
use crate::ipc::layout::{ATTACH_LEN, ATTACH_OFFSET, SEGMENT_SIZE};
use crate::ipc::platform::{Segment, Semaphore, SharedRegion};
use crate::ipc::ring::{self, CriticalSection, Ring};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ring backed by the platform's named objects
pub type SharedRing = Ring<Segment, Semaphore>;

/// Attach count of a segment whose names were removed under it
const RETIRED: u32 = u32::MAX;

/// How long `remove` waits for a lock that may belong to a crashed process
const REMOVE_LOCK_WAIT: Duration = Duration::from_secs(1);

/// A live connection to the channel's OS objects
///
/// Dropping it detaches; the last attachment reclaims the channel.
pub struct Attachment {
    pub role: Role,
    pub ring: SharedRing,
    identity: ChannelIdentity,
}

impl Attachment {
    /// Remaining attachments after this one leaves
    fn detach(&self) -> IpcResult<u32> {
        let segment = self.ring.region();
        let _section = CriticalSection::enter(self.ring.lock())?;
        let count = attach_count(segment);
        if count == RETIRED {
            return Ok(0);
        }

        let remaining = count.saturating_sub(1);
        set_attach_count(segment, remaining);
        if remaining == 0 {
            reclaim(&self.identity)?;
        }
        Ok(remaining)
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        match self.detach() {
            Ok(0) => debug!(segment = %self.identity.segment, "last attachment gone"),
            Ok(remaining) => debug!(segment = %self.identity.segment, remaining, "detached"),
            Err(e) => warn!(segment = %self.identity.segment, error = %e, "detach failed"),
        }
    }
}

/// Create the channel's objects, or attach to the ones a peer created
pub fn acquire_or_create(
    identity: &ChannelIdentity,
    policy: ChecksumPolicy,
) -> IpcResult<Attachment> {
    let lock = Semaphore::open_or_create(&identity.segment_lock, 1)?;

    let (role, segment, write, read) = {
        let _bootstrap = CriticalSection::enter(&lock)?;
        match Segment::create_exclusive(&identity.segment, SEGMENT_SIZE)? {
            Some(segment) => {
                let (write, read) = format_master(identity, &segment).inspect_err(|e| {
                    warn!(segment = %identity.segment, error = %e, "master setup failed");
                    if let Err(unlink) = Segment::unlink(&identity.segment) {
                        warn!(error = %unlink, "could not remove half-initialized segment");
                    }
                })?;
                set_attach_count(&segment, 1);
                (Role::Master, segment, write, read)
            }
            None => {
                let segment = Segment::open(&identity.segment, SEGMENT_SIZE)?;
                if ring::read_header(&segment) != identity.header_bytes() {
                    return Err(IpcError::HeaderMismatch(identity.segment.clone()));
                }
                let write = Semaphore::open(&identity.write_semaphore)?;
                let read = Semaphore::open(&identity.read_semaphore)?;
                let count = attach_count(&segment).saturating_add(1);
                set_attach_count(&segment, count);
                (Role::Slave, segment, write, read)
            }
        }
    };

    info!(segment = %identity.segment, %role, "channel attached");
    Ok(Attachment {
        role,
        ring: Ring::new(segment, lock, CreditSemaphores::new(write, read), policy),
        identity: identity.clone(),
    })
}

fn format_master(
    identity: &ChannelIdentity,
    segment: &Segment,
) -> IpcResult<(Semaphore, Semaphore)> {
    ring::format(segment, &identity.header_bytes());
    let write = Semaphore::create_fresh(&identity.write_semaphore, CAPACITY as u32)?;
    let read = Semaphore::create_fresh(&identity.read_semaphore, 0)?;
    debug!(segment = %identity.segment, "segment formatted");
    Ok((write, read))
}

fn attach_count<R: SharedRegion + ?Sized>(region: &R) -> u32 {
    let mut bytes = [0u8; ATTACH_LEN];
    region.load(ATTACH_OFFSET, &mut bytes);
    u32::from_le_bytes(bytes)
}

fn set_attach_count<R: SharedRegion + ?Sized>(region: &R, count: u32) {
    region.store(ATTACH_OFFSET, &count.to_le_bytes());
}

/// Unlink the segment and the credit semaphores, keeping the lock
fn reclaim(identity: &ChannelIdentity) -> IpcResult<()> {
    Segment::unlink(&identity.segment)?;
    Semaphore::unlink(&identity.write_semaphore)?;
    Semaphore::unlink(&identity.read_semaphore)?;
    Ok(())
}

/// Unlink every named object of the channel
///
/// Attached processes keep working on their open handles; the next
/// `acquire_or_create` starts a new channel. The old segment is marked
/// retired first, so its remaining attachments never unlink the names of
/// that new channel. Win32 objects vanish with their last handle, so the
/// unlinking is a no-op there.
pub fn remove(identity: &ChannelIdentity) -> IpcResult<()> {
    let lock = Semaphore::open_or_create(&identity.segment_lock, 1)?;
    let locked = lock.acquire_timeout(REMOVE_LOCK_WAIT)?;
    if !locked {
        warn!(segment = %identity.segment, "segment lock held too long; removing anyway");
    }

    let retired = retire(identity);
    if locked {
        if let Err(e) = lock.release() {
            fatal("failed to release the segment lock", &e);
        }
    }
    retired?;

    reclaim(identity)?;
    Semaphore::unlink(&identity.segment_lock)?;
    debug!(segment = %identity.segment, "channel objects removed");
    Ok(())
}

fn retire(identity: &ChannelIdentity) -> IpcResult<()> {
    match Segment::open(&identity.segment, SEGMENT_SIZE) {
        Ok(segment) => {
            set_attach_count(&segment, RETIRED);
            Ok(())
        }
        // Nothing mapped there that could be attached
        Err(IpcError::NotFound(_)) | Err(IpcError::SizeMismatch { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}
