/*!
 * Heap Region
 * Process-local `SharedRegion` backed by a locked byte buffer
 */

use super::{check_range, SharedRegion};
use parking_lot::Mutex;
use std::sync::Arc;

/// In-process region; clones share the same bytes
#[derive(Clone)]
pub struct HeapRegion {
    bytes: Arc<Mutex<Box<[u8]>>>,
    size: usize,
}

impl HeapRegion {
    /// Zero-filled region of `size` bytes
    pub fn new(size: usize) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(vec![0u8; size].into_boxed_slice())),
            size,
        }
    }

    /// XOR one byte in place, leaving checksums untouched
    pub fn corrupt(&self, offset: usize, mask: u8) {
        check_range(offset, 1, self.size);
        self.bytes.lock()[offset] ^= mask;
    }
}

impl SharedRegion for HeapRegion {
    fn size(&self) -> usize {
        self.size
    }

    fn load(&self, offset: usize, dst: &mut [u8]) {
        check_range(offset, dst.len(), self.size);
        dst.copy_from_slice(&self.bytes.lock()[offset..offset + dst.len()]);
    }

    fn store(&self, offset: usize, src: &[u8]) {
        check_range(offset, src.len(), self.size);
        self.bytes.lock()[offset..offset + src.len()].copy_from_slice(src);
    }
}
