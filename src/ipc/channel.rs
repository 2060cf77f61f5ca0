/*!
 * IPC Channel
 *
 * Public façade over a named channel: one-time bootstrap, then blocking or
 * bounded send/read of small command messages between sibling processes.
 *
 * # Example
 *
 * ```no_run
 * use sibling_ipc::{InitResult, IpcChannel};
 *
 * let channel = IpcChannel::new("myapp", 0x0102, "splash");
 * if channel.initialize() != InitResult::Failure {
 *     channel.send(1, 0, b"ready").unwrap();
 * }
 * ```
 */

use super::config::ChannelConfig;
use super::credit::CreditSnapshot;
use super::identity::{ChannelIdentity, IdentityResolver};
use super::ring::Message;
use super::shm::{self, Attachment, InitResult, Role, SharedRing};
use crate::core::errors::{IpcError, IpcResult};
use crate::monitoring::ChannelSpan;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, info};

/// Metadata of a message copied into a caller buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub command: u32,
    pub flags: u32,
    pub sequence: u64,
    /// Bytes written into the buffer
    pub len: usize,
    /// Payload did not fit the buffer
    pub truncated: bool,
}

/// Counters since the channel was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub sent: u64,
    pub received: u64,
    pub integrity_failures: u64,
    pub timeouts: u64,
}

#[derive(Default)]
struct StatsCounters {
    sent: AtomicU64,
    received: AtomicU64,
    integrity_failures: AtomicU64,
    timeouts: AtomicU64,
}

impl StatsCounters {
    fn record<T>(&self, result: &IpcResult<T>, success: &AtomicU64) {
        match result {
            Ok(_) => success.fetch_add(1, Ordering::Relaxed),
            Err(e) if e.is_integrity() => self.integrity_failures.fetch_add(1, Ordering::Relaxed),
            Err(IpcError::Timeout { .. }) => self.timeouts.fetch_add(1, Ordering::Relaxed),
            Err(_) => return,
        };
    }

    fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Named, bounded message channel shared by sibling processes
///
/// All handles are owned by the instance and closed on drop. When the last
/// attached instance drops, the channel's segment and credit semaphores are
/// unlinked. Calling any send or read method before a successful
/// `initialize` panics.
pub struct IpcChannel {
    identity: ChannelIdentity,
    config: ChannelConfig,
    state: RwLock<Option<Attachment>>,
    stats: StatsCounters,
}

impl IpcChannel {
    /// Channel with default settings
    pub fn new(application_id: &str, version: u32, channel_id: &str) -> Self {
        Self::with_config(application_id, version, channel_id, ChannelConfig::default())
    }

    pub fn with_config(
        application_id: &str,
        version: u32,
        channel_id: &str,
        config: ChannelConfig,
    ) -> Self {
        let identity =
            IdentityResolver::with_namespace(&config.namespace, application_id, version, channel_id)
                .identity();
        Self {
            identity,
            config,
            state: RwLock::new(None),
            stats: StatsCounters::default(),
        }
    }

    /// Create or attach the shared objects, reporting the failure cause
    ///
    /// Idempotent: once initialized, returns `AlreadyInitialized` without
    /// touching any OS object. A failed attempt may be retried.
    pub fn try_initialize(&self) -> IpcResult<InitResult> {
        let state = self.state.upgradable_read();
        if state.is_some() {
            return Ok(InitResult::AlreadyInitialized);
        }

        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        let attachment = shm::acquire_or_create(&self.identity, self.config.checksum_policy)?;
        let result = InitResult::from(attachment.role);
        *state = Some(attachment);
        Ok(result)
    }

    /// Create or attach the shared objects
    pub fn initialize(&self) -> InitResult {
        match self.try_initialize() {
            Ok(result) => result,
            Err(e) => {
                error!(segment = %self.identity.segment, error = %e, "channel initialization failed");
                InitResult::Failure
            }
        }
    }

    /// Send a message, waiting while the ring is full
    ///
    /// Payloads longer than `MAX_MESSAGE_LEN` are truncated.
    pub fn send(&self, command: u32, flags: u32, message: &[u8]) -> IpcResult<()> {
        self.send_inner(command, flags, message, None)
    }

    /// Like `send`, but give up after `timeout` if no slot frees up
    pub fn send_timeout(
        &self,
        command: u32,
        flags: u32,
        message: &[u8],
        timeout: Duration,
    ) -> IpcResult<()> {
        self.send_inner(command, flags, message, Some(timeout))
    }

    /// Receive the oldest message, waiting while the ring is empty
    pub fn read(&self) -> IpcResult<Message> {
        self.read_inner(None)
    }

    pub fn read_timeout(&self, timeout: Duration) -> IpcResult<Message> {
        self.read_inner(Some(timeout))
    }

    /// Receive into `buf`, truncating the payload to its length
    pub fn read_into(&self, buf: &mut [u8]) -> IpcResult<Envelope> {
        let message = self.read()?;
        let len = message.payload.len().min(buf.len());
        buf[..len].copy_from_slice(&message.payload[..len]);
        Ok(Envelope {
            command: message.command,
            flags: message.flags,
            sequence: message.sequence,
            len,
            truncated: len < message.payload.len(),
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.state.read().as_ref().map(|a| a.role)
    }

    pub fn identity(&self) -> &ChannelIdentity {
        &self.identity
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Sampled credit counts; `None` before initialization or where the
    /// platform cannot report semaphore values
    pub fn credits(&self) -> Option<CreditSnapshot> {
        self.state.read().as_ref().and_then(|a| a.ring.credits())
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats.snapshot()
    }

    /// Unlink the named OS objects of a channel
    ///
    /// The last attached channel already reclaims the segment on drop. This
    /// also clears objects left behind by a crashed process, and the lock.
    pub fn remove(identity: &ChannelIdentity) -> IpcResult<()> {
        shm::remove(identity)?;
        info!(segment = %identity.segment, "channel removed");
        Ok(())
    }

    fn send_inner(
        &self,
        command: u32,
        flags: u32,
        message: &[u8],
        wait: Option<Duration>,
    ) -> IpcResult<()> {
        let result = self.with_ring("send", |ring| ring.send(command, flags, message, wait));
        self.stats.record(&result, &self.stats.sent);
        result.map(|_| ())
    }

    fn read_inner(&self, wait: Option<Duration>) -> IpcResult<Message> {
        let result = self.with_ring("read", |ring| ring.read(wait));
        self.stats.record(&result, &self.stats.received);
        result
    }

    fn with_ring<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&SharedRing) -> IpcResult<T>,
    ) -> IpcResult<T> {
        let state = self.state.read();
        let Some(attachment) = state.as_ref() else {
            panic!(
                "IpcChannel::{} called on '{}' before successful initialize()",
                operation, self.identity.segment
            );
        };
        let span = ChannelSpan::new(operation, &self.identity.segment);
        let result = {
            let _entered = span.enter();
            f(&attachment.ring)
        };
        span.record_outcome(&result);
        result
    }
}

impl std::fmt::Debug for IpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcChannel")
            .field("segment", &self.identity.segment)
            .field("role", &self.role())
            .field("stats", &self.stats())
            .finish()
    }
}
