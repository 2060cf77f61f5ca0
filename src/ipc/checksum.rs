/*!
 * Checksum Guard
 *
 * Seeded CRC-32 over the raw bytes of a shared block. Recomputed right before
 * a block is published and verified right before it is trusted. Detects torn
 * writes from a crashed peer; it is not a security mechanism.
 */

use crate::core::limits::CHECKSUM_SEED;

/// Checksum of `bytes`
#[inline]
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(CHECKSUM_SEED);
    hasher.update(bytes);
    hasher.finalize()
}

/// True if `expected` matches the checksum of `bytes`
#[inline]
pub fn verify(bytes: &[u8], expected: u32) -> bool {
    checksum(bytes) == expected
}
