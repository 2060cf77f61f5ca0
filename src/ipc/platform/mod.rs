/*!
 * Platform Capabilities
 *
 * The two OS primitives the channel protocol needs:
 * - a named shared memory segment (create-exclusive or attach, byte view)
 * - a named, system-wide counting semaphore
 *
 * Backends: POSIX (`shm_open` + `sem_open`) and Win32 (file mappings +
 * semaphore objects). `HeapRegion` is an in-process stand-in for tests and
 * benchmarks.
 */

mod heap;
#[cfg(unix)]
pub mod posix;
#[cfg(windows)]
pub mod windows;

pub use heap::HeapRegion;

#[cfg(unix)]
pub use posix::{PosixSegment as Segment, PosixSemaphore as Semaphore};
#[cfg(windows)]
pub use windows::{Win32Segment as Segment, Win32Semaphore as Semaphore};

/// Byte view over a shared block
///
/// Offsets are absolute within the region. Implementations may panic on an
/// out-of-range access: callers only pass layout constants checked against
/// `size()` when the region was attached.
pub trait SharedRegion: Send + Sync {
    /// Usable size in bytes
    fn size(&self) -> usize;

    /// Copy `dst.len()` bytes starting at `offset` out of the region
    fn load(&self, offset: usize, dst: &mut [u8]);

    /// Copy `src` into the region starting at `offset`
    fn store(&self, offset: usize, src: &[u8]);
}

#[inline]
pub(crate) fn check_range(offset: usize, len: usize, size: usize) {
    assert!(
        offset.checked_add(len).is_some_and(|end| end <= size),
        "region access out of bounds: offset {} len {} size {}",
        offset,
        len,
        size
    );
}
