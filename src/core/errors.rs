/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

/// IPC operation result
///
/// # Must Use
/// Channel operations touch state shared with other processes and must be handled
pub type IpcResult<T> = Result<T, IpcError>;

/// Unified channel error type with miette diagnostics
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum IpcError {
    /// An OS primitive (shared memory, semaphore) failed
    #[error("{operation} failed for '{object}': {message}")]
    #[diagnostic(
        code(ipc::os),
        help("The operating system rejected the request. Check permissions and available shared-memory resources.")
    )]
    Os {
        operation: String,
        object: String,
        message: String,
    },

    /// A named OS object that should exist does not
    #[error("IPC object not found: {0}")]
    #[diagnostic(
        code(ipc::not_found),
        help("The peer that created the channel may have exited or removed it.")
    )]
    NotFound(String),

    /// Attached segment is smaller than the protocol layout
    #[error("Shared segment too small: expected at least {expected} bytes, found {actual}")]
    #[diagnostic(
        code(ipc::size_mismatch),
        help("Another application or an incompatible protocol version owns a segment with this name.")
    )]
    SizeMismatch { expected: usize, actual: usize },

    /// Header fingerprint differs from the locally computed one
    #[error("Header fingerprint mismatch on '{0}'")]
    #[diagnostic(
        code(ipc::header_mismatch),
        help("The segment was created by a different application, version, or channel.")
    )]
    HeaderMismatch(String),

    /// A credit semaphore created by this process already existed
    #[error("Stale IPC object: {0}")]
    #[diagnostic(
        code(ipc::stale),
        help("A previous instance left this object behind. Remove the channel's OS objects and retry.")
    )]
    Stale(String),

    /// Status block checksum failed or a cursor is out of range
    #[error("Corrupted IPC status block")]
    #[diagnostic(
        code(ipc::corrupted_status),
        help("A peer may have crashed mid-write. The channel state can no longer be trusted.")
    )]
    CorruptedStatus,

    /// Message slot checksum failed
    #[error("Malformed or corrupted IPC message (sequence {sequence})")]
    #[diagnostic(code(ipc::corrupted_message), help("The message was dropped."))]
    CorruptedMessage { sequence: u64 },

    /// Operation timed out while waiting for a credit
    #[error("IPC operation timed out after {elapsed_ms}ms (timeout: {timeout_ms}ms)")]
    #[diagnostic(
        code(ipc::timeout),
        help("No peer freed a slot or delivered a message in time. Check that the other side is running.")
    )]
    Timeout { elapsed_ms: u64, timeout_ms: u64 },

    /// Invalid input to a channel or collaborator API
    #[error("Invalid IPC operation: {0}")]
    #[diagnostic(code(ipc::invalid_operation))]
    InvalidOperation(String),
}

impl IpcError {
    /// Wrap an OS-level failure with the operation and object it concerned
    pub fn os(operation: &str, object: &str, err: impl Display) -> Self {
        IpcError::Os {
            operation: operation.to_string(),
            object: object.to_string(),
            message: err.to_string(),
        }
    }

    /// Checksum failures on shared state
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            IpcError::CorruptedStatus | IpcError::CorruptedMessage { .. }
        )
    }

    /// Failures that can only happen while creating or attaching a channel
    pub fn is_bootstrap(&self) -> bool {
        matches!(
            self,
            IpcError::NotFound(_)
                | IpcError::SizeMismatch { .. }
                | IpcError::HeaderMismatch(_)
                | IpcError::Stale(_)
        )
    }
}

/// Terminate the process after a failure that leaves peers in an inconsistent state
///
/// Used when the segment lock or a credit cannot be released: continuing would
/// poison the channel for every attached process, not only the caller.
#[cold]
pub fn fatal(context: &str, err: &IpcError) -> ! {
    tracing::error!(error = %err, "{}", context);
    eprintln!("sibling-ipc fatal: {}: {}", context, err);
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(IpcError::CorruptedStatus.is_integrity());
        assert!(IpcError::CorruptedMessage { sequence: 3 }.is_integrity());
        assert!(!IpcError::CorruptedStatus.is_bootstrap());
        assert!(IpcError::HeaderMismatch("seg".into()).is_bootstrap());
        assert!(IpcError::SizeMismatch {
            expected: 10,
            actual: 4
        }
        .is_bootstrap());
    }

    #[test]
    fn test_error_serializes_tagged() {
        let err = IpcError::Timeout {
            elapsed_ms: 12,
            timeout_ms: 10,
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"error\":\"timeout\""));
        let back: IpcError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
