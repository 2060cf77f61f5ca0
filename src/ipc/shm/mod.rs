/*!
 * Shared Segment Manager
 * Master/slave bootstrap of a channel's named OS objects
 */

pub mod segment;
pub mod types;

pub use segment::{acquire_or_create, remove, Attachment, SharedRing};
pub use types::{InitResult, Role};
