/*!
 * IPC Module
 * Named shared-memory message channel between sibling processes
 */

pub mod channel;
pub mod checksum;
pub mod config;
pub mod credit;
pub mod identity;
pub mod layout;
pub mod platform;
pub mod ring;
pub mod shm;

// Re-export for convenience
pub use channel::{ChannelStats, Envelope, IpcChannel};
pub use config::{ChannelConfig, ChecksumPolicy};
pub use credit::{CreditSemaphores, CreditSnapshot};
pub use identity::{ChannelIdentity, IdentityResolver};
pub use layout::{MessageSlot, StatusBlock, SEGMENT_SIZE};
pub use ring::{Message, Ring};
pub use shm::{InitResult, Role};
