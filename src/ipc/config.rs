/*!
 * Channel Configuration
 *
 * Naming namespace and reader checksum policy, with environment overrides
 */

use super::identity::sanitize_namespace;
use crate::core::limits::DEFAULT_NAMESPACE;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the name namespace
pub const ENV_NAMESPACE: &str = "SIBLING_IPC_NAMESPACE";
/// Environment variable enabling `ChecksumPolicy::LegacyLenient`
pub const ENV_LENIENT_CHECKSUM: &str = "SIBLING_IPC_LENIENT_CHECKSUM";

/// How a reader treats a message whose checksum does not match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumPolicy {
    /// Reject every mismatch
    #[default]
    Strict,
    /// Also accept a mismatching message whose sequence is below the
    /// counter observed after the copy. Kept for interoperability with
    /// older peers.
    LegacyLenient,
}

/// Per-channel settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Reverse-domain prefix of every OS object name
    pub namespace: String,
    pub checksum_policy: ChecksumPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            checksum_policy: ChecksumPolicy::Strict,
        }
    }
}

impl ChannelConfig {
    /// Default settings with the legacy lenient reader
    pub fn legacy() -> Self {
        Self {
            checksum_policy: ChecksumPolicy::LegacyLenient,
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum_policy = policy;
        self
    }

    /// Defaults overridden by `SIBLING_IPC_NAMESPACE` and
    /// `SIBLING_IPC_LENIENT_CHECKSUM`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            config.namespace = sanitize_namespace(&namespace);
        }
        if lookup(ENV_LENIENT_CHECKSUM).is_some_and(|v| is_truthy(&v)) {
            config.checksum_policy = ChecksumPolicy::LegacyLenient;
        }
        config
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_strict() {
        let config = ChannelConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ChannelConfig::default());
        assert_eq!(config.checksum_policy, ChecksumPolicy::Strict);
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_env_overrides() {
        let config = ChannelConfig::from_lookup(lookup(&[
            (ENV_NAMESPACE, " com.example "),
            (ENV_LENIENT_CHECKSUM, "TRUE"),
        ]));
        assert_eq!(config.namespace, "com.example");
        assert_eq!(config.checksum_policy, ChecksumPolicy::LegacyLenient);
    }

    #[test]
    fn test_blank_namespace_and_falsy_flag_ignored() {
        let config = ChannelConfig::from_lookup(lookup(&[
            (ENV_NAMESPACE, "   "),
            (ENV_LENIENT_CHECKSUM, "0"),
        ]));
        assert_eq!(config, ChannelConfig::default());
    }

    #[test]
    fn test_env_namespace_is_sanitized() {
        let config = ChannelConfig::from_lookup(lookup(&[(ENV_NAMESPACE, "com/Evil..app")]));
        assert_eq!(config.namespace, "com_evil.app");
        assert!(!config.namespace.contains('/'));
    }
}
