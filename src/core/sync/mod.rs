/*!
 * Synchronization Primitives
 *
 * Counting semaphores used for bounded producer/consumer flow control and
 * for the segment's critical section.
 *
 * # Architecture
 *
 * `CountingSemaphore` is implemented twice:
 * - `LocalSemaphore` (this module): in-process, for tests and benchmarks
 * - named system-wide semaphores in `ipc::platform` (POSIX and Win32)
 */

mod semaphore;
mod traits;

pub use semaphore::LocalSemaphore;
pub use traits::CountingSemaphore;
