/*!
 * Win32 Backend
 * Pagefile-backed file mappings and named semaphore objects
 */

use super::{check_range, SharedRegion};
use crate::core::errors::{IpcError, IpcResult};
use crate::core::limits::CAPACITY;
use crate::core::sync::CountingSemaphore;
use std::ffi::OsStr;
use std::iter::once;
use std::os::windows::ffi::OsStrExt;
use std::time::Duration;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, HANDLE, INVALID_HANDLE_VALUE, WAIT_FAILED,
    WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows::Win32::System::Memory::{
    CreateFileMappingW, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, VirtualQuery,
    FILE_MAP_ALL_ACCESS, MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
};
use windows::Win32::System::Threading::{
    CreateSemaphoreW, ReleaseSemaphore, WaitForSingleObject, INFINITE,
};

// Upper bound for every semaphore the channel creates
const SEMAPHORE_MAX: i32 = CAPACITY as i32;

fn to_wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(once(0)).collect()
}

/// Mapped view of a named file mapping
pub struct Win32Segment {
    mapping: HANDLE,
    view: MEMORY_MAPPED_VIEW_ADDRESS,
    len: usize,
    name: String,
}

// SAFETY: the handles are process-wide; all view access is copy-in/copy-out
// serialized by the segment lock.
unsafe impl Send for Win32Segment {}
unsafe impl Sync for Win32Segment {}

impl Win32Segment {
    /// Create the mapping only if absent; `Ok(None)` if it already exists
    pub fn create_exclusive(name: &str, size: usize) -> IpcResult<Option<Self>> {
        let wide = to_wide(name);
        let size64 = size as u64;
        unsafe {
            let mapping = CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                None,
                PAGE_READWRITE,
                (size64 >> 32) as u32,
                size64 as u32,
                PCWSTR(wide.as_ptr()),
            )
            .map_err(|e| IpcError::os("CreateFileMappingW", name, e))?;

            if GetLastError() == ERROR_ALREADY_EXISTS {
                let _ = CloseHandle(mapping);
                return Ok(None);
            }

            Self::map(mapping, size, name).map(Some)
        }
    }

    /// Attach to an existing mapping of at least `min_size` bytes
    pub fn open(name: &str, min_size: usize) -> IpcResult<Self> {
        let wide = to_wide(name);
        unsafe {
            let mapping = OpenFileMappingW(FILE_MAP_ALL_ACCESS.0, false, PCWSTR(wide.as_ptr()))
                .map_err(|_| IpcError::NotFound(name.to_string()))?;
            let segment = Self::map(mapping, 0, name)?;
            if segment.len < min_size {
                return Err(IpcError::SizeMismatch {
                    expected: min_size,
                    actual: segment.len,
                });
            }
            Ok(segment)
        }
    }

    /// Win32 objects disappear with their last handle
    pub fn unlink(_name: &str) -> IpcResult<()> {
        Ok(())
    }

    /// Map `len` bytes, or the whole mapping when `len` is 0
    unsafe fn map(mapping: HANDLE, len: usize, name: &str) -> IpcResult<Self> {
        let view = MapViewOfFile(mapping, FILE_MAP_ALL_ACCESS, 0, 0, len);
        if view.Value.is_null() {
            let err = GetLastError();
            let _ = CloseHandle(mapping);
            return Err(IpcError::os("MapViewOfFile", name, format!("{:?}", err)));
        }

        let mut info = MEMORY_BASIC_INFORMATION::default();
        let queried = VirtualQuery(
            Some(view.Value as *const _),
            &mut info,
            std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
        );
        let mapped_len = if queried == 0 { len } else { info.RegionSize };

        Ok(Self {
            mapping,
            view,
            len: if len == 0 { mapped_len } else { len },
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SharedRegion for Win32Segment {
    fn size(&self) -> usize {
        self.len
    }

    fn load(&self, offset: usize, dst: &mut [u8]) {
        check_range(offset, dst.len(), self.len);
        // SAFETY: range checked against the view length
        unsafe {
            std::ptr::copy_nonoverlapping(
                (self.view.Value as *const u8).add(offset),
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
    }

    fn store(&self, offset: usize, src: &[u8]) {
        check_range(offset, src.len(), self.len);
        // SAFETY: range checked against the view length
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr(),
                (self.view.Value as *mut u8).add(offset),
                src.len(),
            );
        }
    }
}

impl Drop for Win32Segment {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = UnmapViewOfFile(self.view) {
                tracing::warn!(segment = %self.name, error = %e, "UnmapViewOfFile failed");
            }
            let _ = CloseHandle(self.mapping);
        }
    }
}

/// Named Win32 semaphore object
pub struct Win32Semaphore {
    handle: HANDLE,
    name: String,
}

// SAFETY: semaphore handles may be waited on and released from any thread
unsafe impl Send for Win32Semaphore {}
unsafe impl Sync for Win32Semaphore {}

impl Win32Semaphore {
    /// Open the semaphore, creating it with `initial` permits if absent
    pub fn open_or_create(name: &str, initial: u32) -> IpcResult<Self> {
        let (handle, _) = Self::create(name, initial)?;
        Ok(Self {
            handle,
            name: name.to_string(),
        })
    }

    /// Create a new semaphore; fails if one with this name is still alive
    pub fn create_fresh(name: &str, initial: u32) -> IpcResult<Self> {
        let (handle, existed) = Self::create(name, initial)?;
        if existed {
            unsafe {
                let _ = CloseHandle(handle);
            }
            return Err(IpcError::Stale(name.to_string()));
        }
        Ok(Self {
            handle,
            name: name.to_string(),
        })
    }

    /// Open an existing semaphore
    pub fn open(name: &str) -> IpcResult<Self> {
        let (handle, existed) = Self::create(name, 0)?;
        if !existed {
            unsafe {
                let _ = CloseHandle(handle);
            }
            return Err(IpcError::NotFound(name.to_string()));
        }
        Ok(Self {
            handle,
            name: name.to_string(),
        })
    }

    pub fn unlink(_name: &str) -> IpcResult<()> {
        Ok(())
    }

    fn create(name: &str, initial: u32) -> IpcResult<(HANDLE, bool)> {
        let wide = to_wide(name);
        unsafe {
            let handle = CreateSemaphoreW(
                None,
                initial.min(SEMAPHORE_MAX as u32) as i32,
                SEMAPHORE_MAX,
                PCWSTR(wide.as_ptr()),
            )
            .map_err(|e| IpcError::os("CreateSemaphoreW", name, e))?;
            let existed = GetLastError() == ERROR_ALREADY_EXISTS;
            Ok((handle, existed))
        }
    }

    fn wait(&self, millis: u32) -> IpcResult<bool> {
        let result = unsafe { WaitForSingleObject(self.handle, millis) };
        if result == WAIT_OBJECT_0 {
            Ok(true)
        } else if result == WAIT_TIMEOUT {
            Ok(false)
        } else if result == WAIT_FAILED {
            Err(IpcError::os(
                "WaitForSingleObject",
                &self.name,
                format!("{:?}", unsafe { GetLastError() }),
            ))
        } else {
            Err(IpcError::os(
                "WaitForSingleObject",
                &self.name,
                format!("unexpected wait result {:?}", result),
            ))
        }
    }
}

impl CountingSemaphore for Win32Semaphore {
    fn acquire(&self) -> IpcResult<()> {
        if self.wait(INFINITE)? {
            Ok(())
        } else {
            Err(IpcError::os("WaitForSingleObject", &self.name, "infinite wait returned"))
        }
    }

    fn acquire_timeout(&self, timeout: Duration) -> IpcResult<bool> {
        let millis = timeout.as_millis().min((INFINITE - 1) as u128) as u32;
        self.wait(millis)
    }

    fn release(&self) -> IpcResult<()> {
        unsafe { ReleaseSemaphore(self.handle, 1, None) }
            .map_err(|e| IpcError::os("ReleaseSemaphore", &self.name, e))
    }

    fn available(&self) -> Option<u32> {
        None
    }
}

impl Drop for Win32Semaphore {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}
