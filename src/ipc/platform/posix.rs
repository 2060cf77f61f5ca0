/*!
 * POSIX Backend
 * `shm_open` + `mmap` segments and `sem_open` named semaphores
 */

use super::{check_range, SharedRegion};
use crate::core::errors::{IpcError, IpcResult};
use crate::core::sync::CountingSemaphore;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{self, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use sha2::{Digest, Sha256};
use std::ffi::{c_void, CString};
use std::fmt::Write as _;
use std::fs::File;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::time::Duration;

// macOS caps semaphore names at 31 bytes
#[cfg(target_os = "macos")]
const MAX_NAME_LEN: usize = 30;
#[cfg(not(target_os = "macos"))]
const MAX_NAME_LEN: usize = 250;

/// POSIX object name for a canonical channel name
///
/// Names that would exceed the platform limit are replaced by a hex digest.
pub fn os_name(name: &str) -> String {
    let candidate = format!("/{}", name);
    if candidate.len() <= MAX_NAME_LEN {
        return candidate;
    }
    let digest = Sha256::digest(name.as_bytes());
    let mut short = String::from("/");
    for byte in digest.iter().take((MAX_NAME_LEN - 1) / 2) {
        let _ = write!(short, "{:02x}", byte);
    }
    short
}

/// Mapped POSIX shared memory object
pub struct PosixSegment {
    ptr: NonNull<c_void>,
    len: usize,
    name: String,
}

// SAFETY: the mapping is plain shared memory; all access goes through
// copy-in/copy-out and is serialized across processes by the segment lock.
unsafe impl Send for PosixSegment {}
unsafe impl Sync for PosixSegment {}

impl PosixSegment {
    /// Create the object only if absent; `Ok(None)` if it already exists
    pub fn create_exclusive(name: &str, size: usize) -> IpcResult<Option<Self>> {
        let path = os_name(name);
        let fd = match mman::shm_open(
            path.as_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        ) {
            Ok(fd) => fd,
            Err(Errno::EEXIST) => return Ok(None),
            Err(e) => return Err(IpcError::os("shm_open", name, e)),
        };

        let file = File::from(fd);
        let mapped = file
            .set_len(size as u64)
            .map_err(|e| IpcError::os("ftruncate", name, e))
            .and_then(|_| Self::map(&file, size, name));

        match mapped {
            Ok(segment) => Ok(Some(segment)),
            Err(e) => {
                let _ = mman::shm_unlink(path.as_str());
                Err(e)
            }
        }
    }

    /// Attach to an existing object of at least `min_size` bytes
    pub fn open(name: &str, min_size: usize) -> IpcResult<Self> {
        let path = os_name(name);
        let fd = mman::shm_open(path.as_str(), OFlag::O_RDWR, Mode::empty()).map_err(|e| match e {
            Errno::ENOENT => IpcError::NotFound(name.to_string()),
            other => IpcError::os("shm_open", name, other),
        })?;

        let file = File::from(fd);
        let len = file
            .metadata()
            .map_err(|e| IpcError::os("fstat", name, e))?
            .len() as usize;
        if len < min_size {
            return Err(IpcError::SizeMismatch {
                expected: min_size,
                actual: len,
            });
        }
        Self::map(&file, len, name)
    }

    /// Remove the name; existing mappings stay valid
    pub fn unlink(name: &str) -> IpcResult<()> {
        match mman::shm_unlink(os_name(name).as_str()) {
            Ok(()) | Err(Errno::ENOENT) => Ok(()),
            Err(e) => Err(IpcError::os("shm_unlink", name, e)),
        }
    }

    fn map(file: &File, len: usize, name: &str) -> IpcResult<Self> {
        let length = NonZeroUsize::new(len).ok_or(IpcError::SizeMismatch {
            expected: 1,
            actual: 0,
        })?;
        // SAFETY: new MAP_SHARED mapping of an fd we hold; nothing else in this
        // process references the returned range.
        let ptr = unsafe {
            mman::mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                file,
                0,
            )
        }
        .map_err(|e| IpcError::os("mmap", name, e))?;

        Ok(Self {
            ptr,
            len,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SharedRegion for PosixSegment {
    fn size(&self) -> usize {
        self.len
    }

    fn load(&self, offset: usize, dst: &mut [u8]) {
        check_range(offset, dst.len(), self.len);
        // SAFETY: range checked against the mapping length
        unsafe {
            std::ptr::copy_nonoverlapping(
                (self.ptr.as_ptr() as *const u8).add(offset),
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
    }

    fn store(&self, offset: usize, src: &[u8]) {
        check_range(offset, src.len(), self.len);
        // SAFETY: range checked against the mapping length
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr(),
                (self.ptr.as_ptr() as *mut u8).add(offset),
                src.len(),
            );
        }
    }
}

impl Drop for PosixSegment {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe the mapping created in `map`
        if unsafe { libc::munmap(self.ptr.as_ptr(), self.len) } != 0 {
            tracing::warn!(segment = %self.name, error = %Errno::last(), "munmap failed");
        }
    }
}

/// Named POSIX semaphore
pub struct PosixSemaphore {
    sem: NonNull<libc::sem_t>,
    name: String,
}

// SAFETY: sem_* calls on one handle are thread-safe
unsafe impl Send for PosixSemaphore {}
unsafe impl Sync for PosixSemaphore {}

impl PosixSemaphore {
    /// Open the semaphore, creating it with `initial` permits if absent
    pub fn open_or_create(name: &str, initial: u32) -> IpcResult<Self> {
        Self::open_with(name, libc::O_CREAT, initial)
    }

    /// Discard any leftover semaphore of this name and create a new one
    pub fn create_fresh(name: &str, initial: u32) -> IpcResult<Self> {
        Self::unlink(name)?;
        Self::open_with(name, libc::O_CREAT | libc::O_EXCL, initial)
    }

    /// Open an existing semaphore
    pub fn open(name: &str) -> IpcResult<Self> {
        Self::open_with(name, 0, 0)
    }

    pub fn unlink(name: &str) -> IpcResult<()> {
        let path = Self::c_name(name)?;
        // SAFETY: path is NUL-terminated
        if unsafe { libc::sem_unlink(path.as_ptr()) } == 0 {
            return Ok(());
        }
        match Errno::last() {
            Errno::ENOENT => Ok(()),
            e => Err(IpcError::os("sem_unlink", name, e)),
        }
    }

    fn c_name(name: &str) -> IpcResult<CString> {
        CString::new(os_name(name))
            .map_err(|_| IpcError::InvalidOperation(format!("name contains NUL: {}", name)))
    }

    fn open_with(name: &str, flags: libc::c_int, initial: u32) -> IpcResult<Self> {
        let path = Self::c_name(name)?;
        // SAFETY: path is NUL-terminated; mode and value are read only with O_CREAT
        let sem = unsafe {
            libc::sem_open(
                path.as_ptr(),
                flags,
                0o600 as libc::c_uint,
                initial as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(match Errno::last() {
                Errno::ENOENT => IpcError::NotFound(name.to_string()),
                Errno::EEXIST => IpcError::Stale(name.to_string()),
                e => IpcError::os("sem_open", name, e),
            });
        }
        let sem = NonNull::new(sem).ok_or_else(|| IpcError::os("sem_open", name, "null handle"))?;
        Ok(Self {
            sem,
            name: name.to_string(),
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    fn try_acquire(&self) -> IpcResult<bool> {
        loop {
            // SAFETY: sem is a live handle from sem_open
            if unsafe { libc::sem_trywait(self.sem.as_ptr()) } == 0 {
                return Ok(true);
            }
            match Errno::last() {
                Errno::EINTR => continue,
                Errno::EAGAIN => return Ok(false),
                e => return Err(IpcError::os("sem_trywait", &self.name, e)),
            }
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn realtime_deadline(timeout: Duration) -> libc::timespec {
    // SAFETY: all-zero is a valid timespec
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    // SAFETY: ts is a valid out-pointer
    unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
    ts.tv_sec += timeout.as_secs() as libc::time_t;
    ts.tv_nsec += timeout.subsec_nanos() as libc::c_long;
    if ts.tv_nsec >= 1_000_000_000 {
        ts.tv_sec += 1;
        ts.tv_nsec -= 1_000_000_000;
    }
    ts
}

impl CountingSemaphore for PosixSemaphore {
    fn acquire(&self) -> IpcResult<()> {
        loop {
            // SAFETY: sem is a live handle from sem_open
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(());
            }
            match Errno::last() {
                Errno::EINTR => continue,
                e => return Err(IpcError::os("sem_wait", &self.name, e)),
            }
        }
    }

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    fn acquire_timeout(&self, timeout: Duration) -> IpcResult<bool> {
        let deadline = realtime_deadline(timeout);
        loop {
            // SAFETY: sem is a live handle; deadline outlives the call
            if unsafe { libc::sem_timedwait(self.sem.as_ptr(), &deadline) } == 0 {
                return Ok(true);
            }
            match Errno::last() {
                Errno::EINTR => continue,
                Errno::ETIMEDOUT => return Ok(false),
                e => return Err(IpcError::os("sem_timedwait", &self.name, e)),
            }
        }
    }

    // No sem_timedwait here; poll sem_trywait
    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    fn acquire_timeout(&self, timeout: Duration) -> IpcResult<bool> {
        let start = std::time::Instant::now();
        loop {
            if self.try_acquire()? {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn release(&self) -> IpcResult<()> {
        // SAFETY: sem is a live handle from sem_open
        if unsafe { libc::sem_post(self.sem.as_ptr()) } == 0 {
            Ok(())
        } else {
            Err(IpcError::os("sem_post", &self.name, Errno::last()))
        }
    }

    #[cfg(target_os = "macos")]
    fn available(&self) -> Option<u32> {
        None
    }

    #[cfg(not(target_os = "macos"))]
    fn available(&self) -> Option<u32> {
        let mut value: libc::c_int = 0;
        // SAFETY: sem is a live handle; value is a valid out-pointer
        if unsafe { libc::sem_getvalue(self.sem.as_ptr(), &mut value) } == 0 {
            Some(value.max(0) as u32)
        } else {
            None
        }
    }
}

impl Drop for PosixSemaphore {
    fn drop(&mut self) {
        // SAFETY: sem came from sem_open and is closed exactly once
        if unsafe { libc::sem_close(self.sem.as_ptr()) } != 0 {
            tracing::warn!(semaphore = %self.name, error = %Errno::last(), "sem_close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_name_prefix() {
        assert_eq!(os_name("org.x.ipc.a.r1.b.sharedmem"), "/org.x.ipc.a.r1.b.sharedmem");
    }

    #[test]
    fn test_os_name_long_is_hashed() {
        let long = "n".repeat(400);
        let name = os_name(&long);
        assert!(name.len() <= MAX_NAME_LEN);
        assert!(name.starts_with('/'));
        assert_eq!(name, os_name(&long));
    }

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    #[test]
    fn test_realtime_deadline_is_normalized() {
        let deadline = realtime_deadline(Duration::new(2, 999_999_999));
        assert!(deadline.tv_nsec >= 0);
        assert!(deadline.tv_nsec < 1_000_000_000);
        assert!(deadline.tv_sec >= 2);
    }
}
