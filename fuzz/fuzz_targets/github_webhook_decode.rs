#![no_main]

use libfuzzer_sys::fuzz_target;
use tau_github_issues::issue_webhook::{decode_github_webhook, GithubWebhookDecision};
use tau_github_issues::webhook_signature::{sign_github_payload, verify_github_sha256_signature};

const EVENT_NAMES: &[&str] = &["issues", "issue_comment", "ping", "push", ""];

fuzz_target!(|data: &[u8]| {
    let selector = data.first().copied().unwrap_or_default() as usize;
    let event_name = EVENT_NAMES[selector % EVENT_NAMES.len()];
    let body = data.get(1..).unwrap_or_default();

    match decode_github_webhook(event_name, body) {
        Ok(GithubWebhookDecision::Event(event)) => {
            assert!(!event.kind().is_empty());
        }
        Ok(GithubWebhookDecision::Ignored { reason }) => {
            assert!(!reason.trim().is_empty());
        }
        Ok(GithubWebhookDecision::Ping) => assert_eq!(event_name, "ping"),
        Err(error) => assert!(!error.code().is_empty()),
    }

    if let Ok(signature) = sign_github_payload(body, "fuzz-secret") {
        assert!(verify_github_sha256_signature(body, &signature, "fuzz-secret").is_ok());
    }
});
