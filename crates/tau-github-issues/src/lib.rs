//! Shared GitHub types for the forum bridge.
//! This crate provides REST/webhook payload models, webhook decoding and signature
//! verification, and retry helpers consumed by the runtime crate.

pub mod github_transport_helpers;
pub mod issue_event_collection;
pub mod issue_webhook;
pub mod webhook_signature;
