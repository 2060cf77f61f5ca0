/*!
 * Synchronization Traits
 *
 * Counting-semaphore abstraction shared by the in-process and the named,
 * system-wide implementations.
 */

use crate::core::errors::IpcResult;
use std::time::Duration;

/// A counting semaphore
///
/// Implementations must be:
/// - **Thread-safe**: Safe to call from multiple threads
/// - **Kernel-assisted**: Blocking waits must not busy-poll where the platform
///   offers a real wait
///
/// Named implementations are visible to every process that opens the same name;
/// a permit released in one process can be acquired in another.
pub trait CountingSemaphore: Send + Sync {
    /// Take one permit, blocking until one is available
    fn acquire(&self) -> IpcResult<()>;

    /// Take one permit, waiting at most `timeout`
    ///
    /// Returns `Ok(false)` if the timeout expired without a permit.
    fn acquire_timeout(&self, timeout: Duration) -> IpcResult<bool>;

    /// Return one permit
    fn release(&self) -> IpcResult<()>;

    /// Current number of permits, if the platform can report it
    fn available(&self) -> Option<u32>;
}
