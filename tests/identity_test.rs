/*!
 * Identity Tests
 * Canonical naming and header fingerprints
 */

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sibling_ipc::ipc::identity::{sanitize, IdentityResolver};
use sibling_ipc::{ChannelIdentity, HDR_LEN};

#[test]
fn test_identity_names_every_object() {
    let identity = ChannelIdentity::resolve("Editor", 0x0203, "Splash");
    assert_eq!(identity.segment, "org.siblingipc.ipc.editor.r203.splash.sharedmem");
    assert_eq!(identity.segment_lock, "org.siblingipc.ipc.editor.r203.splash.sharedmem.lock");
    assert_eq!(identity.read_semaphore, "org.siblingipc.ipc.editor.r203.splash.semaph_rd");
    assert_eq!(identity.write_semaphore, "org.siblingipc.ipc.editor.r203.splash.semaph_wr");
    assert_eq!(identity.header_bytes().len(), HDR_LEN);
    assert_eq!(&identity.header_bytes()[..], identity.fingerprint.as_bytes());
}

#[test]
fn test_case_insensitive_inputs_resolve_identically() {
    let a = IdentityResolver::new("MyApp", 7, "Helper Channel").identity();
    let b = IdentityResolver::new("myapp", 7, "HELPER CHANNEL").identity();
    assert_eq!(a, b);
}

#[test]
fn test_namespace_changes_every_name() {
    let default = IdentityResolver::new("app", 1, "chan").identity();
    let custom = IdentityResolver::with_namespace("com.example", "app", 1, "chan").identity();
    assert!(custom.segment.starts_with("com.example.ipc."));
    assert_ne!(default.segment, custom.segment);
    assert_ne!(default.fingerprint, custom.fingerprint);
}

#[test]
fn test_channels_do_not_collide() {
    let a = ChannelIdentity::resolve("app", 1, "one");
    let b = ChannelIdentity::resolve("app", 1, "two");
    assert_ne!(a.segment, b.segment);
    assert_ne!(a.fingerprint, b.fingerprint);
}

proptest! {
    #[test]
    fn prop_sanitized_names_are_os_safe(app in "\\PC{0,24}", chan in "\\PC{0,24}", version: u32) {
        let name = IdentityResolver::new(&app, version, &chan).resolve("sharedmem");
        prop_assert!(name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
        let suffix = format!(".r{:X}.", version);
        prop_assert!(name.contains(&suffix));
    }

    #[test]
    fn prop_sanitize_ignores_ascii_case(input in "[ -~]{0,32}") {
        prop_assert_eq!(sanitize(&input), sanitize(&input.to_ascii_uppercase()));
    }
}
