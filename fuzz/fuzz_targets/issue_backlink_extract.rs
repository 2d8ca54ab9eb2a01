#![no_main]

use libfuzzer_sys::fuzz_target;
use tau_forum_sync::extract_message_ref;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Some(reference) = extract_message_ref(&raw) {
        assert!(!reference.channel_id.is_empty());
        assert!(reference.channel_id.chars().all(|ch| ch.is_ascii_digit()));
        assert!(reference.message_id.chars().all(|ch| ch.is_ascii_digit()));
    }
});
