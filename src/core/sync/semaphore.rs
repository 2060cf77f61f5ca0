/*!
 * In-Process Counting Semaphore
 *
 * parking_lot Mutex + Condvar implementation of `CountingSemaphore`.
 * Backs the heap ring used by tests and benchmarks; processes never see it.
 */

use super::traits::CountingSemaphore;
use crate::core::errors::{IpcError, IpcResult};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Counting semaphore local to one process
pub struct LocalSemaphore {
    permits: Mutex<u32>,
    condvar: Condvar,
    max: u32,
}

impl LocalSemaphore {
    /// Create a semaphore holding `initial` permits, capped at `max`
    pub fn new(initial: u32, max: u32) -> Self {
        Self {
            permits: Mutex::new(initial.min(max)),
            condvar: Condvar::new(),
            max,
        }
    }
}

impl CountingSemaphore for LocalSemaphore {
    fn acquire(&self) -> IpcResult<()> {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.condvar.wait(&mut permits);
        }
        *permits -= 1;
        Ok(())
    }

    fn acquire_timeout(&self, timeout: Duration) -> IpcResult<bool> {
        let deadline = Instant::now() + timeout;
        let mut permits = self.permits.lock();
        while *permits == 0 {
            if self.condvar.wait_until(&mut permits, deadline).timed_out() && *permits == 0 {
                return Ok(false);
            }
        }
        *permits -= 1;
        Ok(true)
    }

    fn release(&self) -> IpcResult<()> {
        let mut permits = self.permits.lock();
        if *permits >= self.max {
            return Err(IpcError::os(
                "release",
                "local semaphore",
                format!("count would exceed maximum {}", self.max),
            ));
        }
        *permits += 1;
        drop(permits);
        self.condvar.notify_one();
        Ok(())
    }

    fn available(&self) -> Option<u32> {
        Some(*self.permits.lock())
    }
}
