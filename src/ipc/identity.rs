/*!
 * Channel Identity
 * Canonical, OS-object-safe names for the objects backing one channel
 */

use crate::core::limits::{DEFAULT_NAMESPACE, HDR_LEN};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Item ids of the OS objects that back a channel
pub const ITEM_SEGMENT: &str = "sharedmem";
pub const ITEM_READ_SEMAPHORE: &str = "semaph_rd";
pub const ITEM_WRITE_SEMAPHORE: &str = "semaph_wr";
pub const ITEM_HEADER: &str = "header";

/// Lower-case, then replace everything outside `[A-Za-z0-9_-]` with `_`
pub fn sanitize(component: &str) -> String {
    component
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Sanitize each dot-separated label of a namespace, dropping empty ones
///
/// Falls back to `DEFAULT_NAMESPACE` when nothing is left.
pub fn sanitize_namespace(namespace: &str) -> String {
    let labels: Vec<String> = namespace
        .split('.')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(sanitize)
        .collect();
    if labels.is_empty() {
        DEFAULT_NAMESPACE.to_string()
    } else {
        labels.join(".")
    }
}

/// Derives names from (application id, version, channel id, item id)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityResolver {
    namespace: String,
    application_id: String,
    version: u32,
    channel_id: String,
}

impl IdentityResolver {
    pub fn new(application_id: &str, version: u32, channel_id: &str) -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE, application_id, version, channel_id)
    }

    /// Use a custom reverse-domain prefix instead of the default one
    pub fn with_namespace(
        namespace: &str,
        application_id: &str,
        version: u32,
        channel_id: &str,
    ) -> Self {
        Self {
            namespace: sanitize_namespace(namespace),
            application_id: application_id.to_string(),
            version,
            channel_id: channel_id.to_string(),
        }
    }

    /// `<namespace>.ipc.<app>.r<VERSION-HEX>.<channel>.<item>`
    pub fn resolve(&self, item_id: &str) -> String {
        format!(
            "{}.ipc.{}.r{:X}.{}.{}",
            self.namespace,
            sanitize(&self.application_id),
            self.version,
            sanitize(&self.channel_id),
            sanitize(item_id)
        )
    }

    /// Hex fingerprint of the `header` name, exactly `HDR_LEN` characters
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.resolve(ITEM_HEADER).as_bytes());
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest.iter() {
            let _ = write!(hex, "{:02x}", byte);
        }
        hex.truncate(HDR_LEN);
        hex
    }

    /// Resolve every name a channel needs
    pub fn identity(&self) -> ChannelIdentity {
        let segment = self.resolve(ITEM_SEGMENT);
        ChannelIdentity {
            segment_lock: format!("{}.lock", segment),
            segment,
            read_semaphore: self.resolve(ITEM_READ_SEMAPHORE),
            write_semaphore: self.resolve(ITEM_WRITE_SEMAPHORE),
            fingerprint: self.fingerprint(),
        }
    }
}

/// Names of the OS objects backing one logical channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChannelIdentity {
    pub segment: String,
    pub segment_lock: String,
    pub read_semaphore: String,
    pub write_semaphore: String,
    pub fingerprint: String,
}

impl ChannelIdentity {
    /// Convenience for `IdentityResolver::new(..).identity()`
    pub fn resolve(application_id: &str, version: u32, channel_id: &str) -> Self {
        IdentityResolver::new(application_id, version, channel_id).identity()
    }

    /// Fingerprint as the raw bytes stored in the segment header
    pub fn header_bytes(&self) -> [u8; HDR_LEN] {
        let mut header = [0u8; HDR_LEN];
        let src = self.fingerprint.as_bytes();
        let len = src.len().min(HDR_LEN);
        header[..len].copy_from_slice(&src[..len]);
        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("My App!"), "my_app_");
        assert_eq!(sanitize("a-b_c.9"), "a-b_c_9");
        assert_eq!(sanitize("Über"), "_ber");
    }

    #[test]
    fn test_sanitize_namespace() {
        assert_eq!(sanitize_namespace("com.Example"), "com.example");
        assert_eq!(sanitize_namespace("com/evil..Example"), "com_evil.example");
        assert_eq!(sanitize_namespace(" . ."), DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_namespace_cannot_add_path_separators() {
        let resolver = IdentityResolver::with_namespace("/tmp/x", "Demo", 1, "Main");
        assert_eq!(resolver.resolve("sharedmem"), "_tmp_x.ipc.demo.r1.main.sharedmem");
    }

    #[test]
    fn test_resolve_format() {
        let resolver = IdentityResolver::new("Demo", 0x1a2b, "Main");
        assert_eq!(
            resolver.resolve("sharedmem"),
            "org.siblingipc.ipc.demo.r1A2B.main.sharedmem"
        );
    }

    #[test]
    fn test_fingerprint_length_and_charset() {
        let fp = IdentityResolver::new("Demo", 1, "Main").fingerprint();
        assert_eq!(fp.len(), HDR_LEN);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_depends_on_version() {
        let a = IdentityResolver::new("Demo", 1, "Main").fingerprint();
        let b = IdentityResolver::new("Demo", 2, "Main").fingerprint();
        assert_ne!(a, b);
    }
}
