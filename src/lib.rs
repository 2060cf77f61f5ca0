/*!
 * Sibling IPC Library
 * Bounded shared-memory command channel for processes of one application
 */

pub mod core;
pub mod ipc;
pub mod monitoring;
pub mod support;

// Re-exports
pub use crate::core::errors::{IpcError, IpcResult};
pub use crate::core::limits::{CAPACITY, HDR_LEN, MAX_MESSAGE_LEN};
pub use ipc::{
    ChannelConfig, ChannelIdentity, ChannelStats, ChecksumPolicy, CreditSnapshot, Envelope,
    IdentityResolver, InitResult, IpcChannel, Message, Role,
};
pub use monitoring::init_tracing;
