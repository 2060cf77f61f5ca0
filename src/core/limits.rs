/*!
 * Protocol Limits
 * Fixed sizes shared by every process attached to a channel
 */

/// Number of message slots in the ring
pub const CAPACITY: usize = 128;

/// Length of the ASCII hex fingerprint at the start of the segment
pub const HDR_LEN: usize = 40;

/// Maximum payload bytes carried by one message
pub const MAX_MESSAGE_LEN: usize = 256;

/// Seed for the block checksum
pub const CHECKSUM_SEED: u32 = 0x5D90_C356;

/// Default reverse-domain prefix for OS object names
pub const DEFAULT_NAMESPACE: &str = "org.siblingipc";
