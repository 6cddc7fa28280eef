use thiserror::Error;
use uuid::Uuid;

use crate::provider::{ProviderError, ProviderKind};

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("{provider} cannot produce {requested}s (allowed {min}..={max}s)")]
    InvalidDuration {
        provider: ProviderKind,
        requested: u32,
        min: u32,
        max: u32,
    },

    #[error("prompt rejected by content policy: {message}")]
    ContentPolicyRejected {
        message: String,
        original_prompt: String,
        sanitized_prompt: String,
    },

    #[error("Config error: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("extension chain {plan_id} stopped after {completed}/{planned} extensions: {message}")]
    ExtensionFailedSticky {
        plan_id: Uuid,
        completed: u32,
        planned: u32,
        message: String,
    },

    #[error("Video {handle} is not ready for download")]
    NotReady { handle: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Provider {0} is not configured")]
    ProviderUnavailable(ProviderKind),

    #[error("Registry error: {0}")]
    Registry(String),
}

impl ClipError {
    /// Whether the same call may succeed if the caller simply tries again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClipError::Provider(e) => e.is_transient(),
            _ => false,
        }
    }
}
