/*!
 * Segment Layout
 *
 * Fixed-offset, little-endian record format of the shared segment. Records
 * are serialized field by field; shared memory is never reinterpreted as a
 * Rust struct.
 *
 * ```text
 * offset 0   header[HDR_LEN]
 * offset 40  counter u64 | pos_write u32 | pos_read u32 | checksum u32
 * offset 60  slot[CAPACITY]:
 *              command_id u32 | flags u32 | param[MAX_MESSAGE_LEN]
 *              | sequence u64 | checksum u32
 * then       attach count u32 (processes holding the channel open)
 * ```
 */

use super::checksum;
use crate::core::errors::{IpcError, IpcResult};
use crate::core::limits::{CAPACITY, HDR_LEN, MAX_MESSAGE_LEN};
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

pub const STATUS_OFFSET: usize = HDR_LEN;
/// Status bytes covered by the checksum
pub const STATUS_DATA_LEN: usize = 8 + 4 + 4;
pub const STATUS_LEN: usize = STATUS_DATA_LEN + 4;

pub const SLOTS_OFFSET: usize = STATUS_OFFSET + STATUS_LEN;
/// Slot bytes covered by the checksum
pub const SLOT_DATA_LEN: usize = 4 + 4 + MAX_MESSAGE_LEN + 8;
pub const SLOT_LEN: usize = SLOT_DATA_LEN + 4;

/// Number of live attachments, maintained under the segment lock
pub const ATTACH_OFFSET: usize = SLOTS_OFFSET + CAPACITY * SLOT_LEN;
pub const ATTACH_LEN: usize = 4;

/// Total size of a channel segment
pub const SEGMENT_SIZE: usize = ATTACH_OFFSET + ATTACH_LEN;

/// Byte offset of slot `index`
#[inline]
pub const fn slot_offset(index: usize) -> usize {
    SLOTS_OFFSET + index * SLOT_LEN
}

/// Ring cursors and the message counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StatusBlock {
    pub counter: u64,
    pub pos_write: u32,
    pub pos_read: u32,
}

impl StatusBlock {
    /// Serialize and seal with a fresh checksum
    pub fn encode(&self) -> [u8; STATUS_LEN] {
        let mut out = [0u8; STATUS_LEN];
        let mut buf = &mut out[..];
        buf.put_u64_le(self.counter);
        buf.put_u32_le(self.pos_write);
        buf.put_u32_le(self.pos_read);
        let sum = checksum::checksum(&out[..STATUS_DATA_LEN]);
        (&mut out[STATUS_DATA_LEN..]).put_u32_le(sum);
        out
    }

    /// Verify the checksum and cursor ranges, then deserialize
    pub fn decode(bytes: &[u8; STATUS_LEN]) -> IpcResult<Self> {
        let mut buf = &bytes[..];
        let status = StatusBlock {
            counter: buf.get_u64_le(),
            pos_write: buf.get_u32_le(),
            pos_read: buf.get_u32_le(),
        };
        let stored = buf.get_u32_le();
        if !checksum::verify(&bytes[..STATUS_DATA_LEN], stored) {
            return Err(IpcError::CorruptedStatus);
        }
        if status.pos_write as usize >= CAPACITY || status.pos_read as usize >= CAPACITY {
            return Err(IpcError::CorruptedStatus);
        }
        Ok(status)
    }

    /// Take a sequence number for a new message
    pub fn next_sequence(&mut self) -> u64 {
        let sequence = self.counter;
        self.counter = self.counter.wrapping_add(1);
        sequence
    }

    pub fn advance_write(&mut self) {
        self.pos_write = ((self.pos_write as usize + 1) % CAPACITY) as u32;
    }

    pub fn advance_read(&mut self) {
        self.pos_read = ((self.pos_read as usize + 1) % CAPACITY) as u32;
    }
}

/// One message as stored in the ring
#[derive(Clone, PartialEq, Eq)]
pub struct MessageSlot {
    pub command_id: u32,
    pub flags: u32,
    pub param: [u8; MAX_MESSAGE_LEN],
    pub sequence: u64,
}

impl MessageSlot {
    /// Build a slot, truncating `message` to `MAX_MESSAGE_LEN` bytes
    pub fn new(command_id: u32, flags: u32, message: &[u8], sequence: u64) -> Self {
        let mut param = [0u8; MAX_MESSAGE_LEN];
        let len = message.len().min(MAX_MESSAGE_LEN);
        param[..len].copy_from_slice(&message[..len]);
        Self {
            command_id,
            flags,
            param,
            sequence,
        }
    }

    /// Payload up to the first NUL byte
    pub fn payload(&self) -> &[u8] {
        let len = self
            .param
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_MESSAGE_LEN);
        &self.param[..len]
    }

    /// Serialize and seal with a fresh checksum
    pub fn encode(&self) -> [u8; SLOT_LEN] {
        let mut out = [0u8; SLOT_LEN];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.command_id);
        buf.put_u32_le(self.flags);
        buf.put_slice(&self.param);
        buf.put_u64_le(self.sequence);
        let sum = checksum::checksum(&out[..SLOT_DATA_LEN]);
        (&mut out[SLOT_DATA_LEN..]).put_u32_le(sum);
        out
    }

    /// Deserialize; the flag reports whether the stored checksum matched
    pub fn decode(bytes: &[u8; SLOT_LEN]) -> (Self, bool) {
        let mut buf = &bytes[..];
        let command_id = buf.get_u32_le();
        let flags = buf.get_u32_le();
        let mut param = [0u8; MAX_MESSAGE_LEN];
        buf.copy_to_slice(&mut param);
        let sequence = buf.get_u64_le();
        let stored = buf.get_u32_le();
        let intact = checksum::verify(&bytes[..SLOT_DATA_LEN], stored);
        (
            Self {
                command_id,
                flags,
                param,
                sequence,
            },
            intact,
        )
    }
}

impl std::fmt::Debug for MessageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSlot")
            .field("command_id", &self.command_id)
            .field("flags", &self.flags)
            .field("payload_len", &self.payload().len())
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_layout_offsets() {
        assert_eq!(STATUS_OFFSET, 40);
        assert_eq!(SLOTS_OFFSET, 60);
        assert_eq!(SLOT_LEN, 4 + 4 + MAX_MESSAGE_LEN + 8 + 4);
        assert_eq!(slot_offset(1) - slot_offset(0), SLOT_LEN);
        assert_eq!(ATTACH_OFFSET, slot_offset(CAPACITY));
        assert_eq!(SEGMENT_SIZE, ATTACH_OFFSET + 4);
    }

    #[test]
    fn test_status_field_positions() {
        let status = StatusBlock {
            counter: 0x0102_0304_0506_0708,
            pos_write: 5,
            pos_read: 7,
        };
        let bytes = status.encode();
        assert_eq!(&bytes[0..8], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(&bytes[8..12], &5u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &7u32.to_le_bytes());
        assert_eq!(StatusBlock::decode(&bytes).unwrap(), status);
    }

    #[test]
    fn test_zeroed_status_needs_checksum() {
        assert_eq!(
            StatusBlock::decode(&[0u8; STATUS_LEN]),
            Err(IpcError::CorruptedStatus)
        );
        let sealed = StatusBlock::default().encode();
        assert_eq!(StatusBlock::decode(&sealed).unwrap(), StatusBlock::default());
    }

    #[test]
    fn test_status_cursor_out_of_range_is_corrupt() {
        let status = StatusBlock {
            counter: 1,
            pos_write: CAPACITY as u32,
            pos_read: 0,
        };
        assert_eq!(
            StatusBlock::decode(&status.encode()),
            Err(IpcError::CorruptedStatus)
        );
    }

    #[test]
    fn test_cursor_wraps() {
        let mut status = StatusBlock {
            counter: 0,
            pos_write: (CAPACITY - 1) as u32,
            pos_read: (CAPACITY - 1) as u32,
        };
        status.advance_write();
        status.advance_read();
        assert_eq!(status.pos_write, 0);
        assert_eq!(status.pos_read, 0);
    }

    #[test]
    fn test_slot_truncates_long_message() {
        let long = vec![b'x'; MAX_MESSAGE_LEN + 40];
        let slot = MessageSlot::new(1, 2, &long, 0);
        assert_eq!(slot.payload(), &long[..MAX_MESSAGE_LEN]);
    }

    #[test]
    fn test_slot_checksum_flags_corruption() {
        let slot = MessageSlot::new(9, 3, b"open file", 42);
        let mut bytes = slot.encode();
        let (decoded, intact) = MessageSlot::decode(&bytes);
        assert!(intact);
        assert_eq!(decoded, slot);

        bytes[10] ^= 0xff;
        let (_, intact) = MessageSlot::decode(&bytes);
        assert!(!intact);
    }
}
