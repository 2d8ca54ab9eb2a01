use thiserror::Error;

#[derive(Debug, Error)]
/// Enumerates failures surfaced by sync handlers.
pub enum SyncError {
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
    #[error("dispatcher dropped the event before it completed")]
    Dropped,
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl SyncError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Dropped => "dispatch_dropped",
            Self::Transport(_) => "transport_failure",
        }
    }
}
