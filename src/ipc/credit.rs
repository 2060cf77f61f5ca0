/*!
 * Credit Semaphores
 *
 * Bounded producer/consumer flow control with two counting semaphores:
 * write-credits count free slots, read-credits count pending messages.
 * A writer spends a write-credit and hands a read-credit to the readers;
 * a reader does the reverse. Outside critical sections the two counts add
 * up to the ring capacity.
 */

use crate::core::errors::{IpcError, IpcResult};
use crate::core::sync::CountingSemaphore;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Sampled credit counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CreditSnapshot {
    pub write: u32,
    pub read: u32,
}

impl CreditSnapshot {
    pub fn total(&self) -> u32 {
        self.write + self.read
    }
}

/// The write/read semaphore pair of one channel
pub struct CreditSemaphores<S> {
    write: S,
    read: S,
}

impl<S: CountingSemaphore> CreditSemaphores<S> {
    pub fn new(write: S, read: S) -> Self {
        Self { write, read }
    }

    /// Spend one write-credit, blocking or bounded by `timeout`
    pub fn acquire_write(&self, timeout: Option<Duration>) -> IpcResult<()> {
        Self::acquire(&self.write, timeout)
    }

    /// Spend one read-credit, blocking or bounded by `timeout`
    pub fn acquire_read(&self, timeout: Option<Duration>) -> IpcResult<()> {
        Self::acquire(&self.read, timeout)
    }

    pub fn release_write(&self) -> IpcResult<()> {
        self.write.release()
    }

    pub fn release_read(&self) -> IpcResult<()> {
        self.read.release()
    }

    /// Both counts, if the platform reports semaphore values
    pub fn snapshot(&self) -> Option<CreditSnapshot> {
        Some(CreditSnapshot {
            write: self.write.available()?,
            read: self.read.available()?,
        })
    }

    fn acquire(sem: &S, timeout: Option<Duration>) -> IpcResult<()> {
        let Some(timeout) = timeout else {
            return sem.acquire();
        };
        let start = Instant::now();
        if sem.acquire_timeout(timeout)? {
            Ok(())
        } else {
            Err(IpcError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}
