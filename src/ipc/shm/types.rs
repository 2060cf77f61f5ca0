/*!
 * Shared Segment Types
 * Bootstrap roles and initialization results
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the bootstrap race a channel ended up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Created and formatted the segment
    Master,
    /// Attached to a segment another process created
    Slave,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => write!(f, "master"),
            Role::Slave => write!(f, "slave"),
        }
    }
}

/// Outcome of `IpcChannel::initialize`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitResult {
    AlreadyInitialized,
    SuccessMaster,
    SuccessSlave,
    Failure,
}

impl InitResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, InitResult::Failure)
    }
}

impl From<Role> for InitResult {
    fn from(role: Role) -> Self {
        match role {
            Role::Master => InitResult::SuccessMaster,
            Role::Slave => InitResult::SuccessSlave,
        }
    }
}
