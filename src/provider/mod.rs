//! Provider clients for the two video generation backends.
//!
//! [`ProviderKind`] is the closed set of supported providers; each variant
//! carries its own [`DurationProfile`] so duration rules are looked up once
//! at the boundary instead of being re-derived from model names.
//! [`VideoProvider`] is the capability set the resolver, orchestrator and
//! service work against.

pub mod client;
pub mod error;
pub mod sora;
pub mod types;
pub mod veo;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use client::{ProviderClient, build_clients};
pub use error::ProviderError;
pub use sora::SoraClient;
pub use veo::VeoClient;

/// How a provider handles durations longer than a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationStrategy {
    /// One call, one clip, picked from a fixed set of lengths.
    FixedDuration,
    /// An initial clip that can be grown by follow-up extension calls.
    Extensible,
}

/// Extension constants for an extensible provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionLimits {
    /// Seconds added by every extension call.
    pub increment_sec: u32,
    /// Upper bound on extension calls for one logical video.
    pub max_extensions: u32,
}

/// Duration rules of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationProfile {
    pub strategy: DurationStrategy,
    /// Durations the provider accepts on the initial submission, ascending.
    pub legal_initial_sec: &'static [u32],
    /// Absolute bounds for a requested duration, if the provider has any.
    pub bounds_sec: Option<(u32, u32)>,
    pub extension: Option<ExtensionLimits>,
}

const SORA_PROFILE: DurationProfile = DurationProfile {
    strategy: DurationStrategy::FixedDuration,
    legal_initial_sec: &[4, 8, 12],
    bounds_sec: None,
    extension: None,
};

const VEO_PROFILE: DurationProfile = DurationProfile {
    strategy: DurationStrategy::Extensible,
    legal_initial_sec: &[4, 6, 8],
    bounds_sec: Some((4, 148)),
    extension: Some(ExtensionLimits {
        increment_sec: 7,
        max_extensions: 20,
    }),
};

/// The supported generation providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI Sora: fixed clip lengths, no extension.
    Sora,
    /// Google Veo on Vertex AI: short initial clip plus extensions.
    Veo,
}

impl ProviderKind {
    pub fn profile(self) -> &'static DurationProfile {
        match self {
            ProviderKind::Sora => &SORA_PROFILE,
            ProviderKind::Veo => &VEO_PROFILE,
        }
    }

    /// Longest prompt (in characters) the provider reliably accepts.
    pub fn max_prompt_chars(self) -> usize {
        match self {
            ProviderKind::Sora => 4000,
            ProviderKind::Veo => 2000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Sora => "sora",
            ProviderKind::Veo => "veo",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sora" | "sora-2" | "sora2" | "openai" => Ok(ProviderKind::Sora),
            "veo" | "veo-3" | "veo3" | "vertex" => Ok(ProviderKind::Veo),
            other => Err(format!("unknown video provider: {other}")),
        }
    }
}

/// A concrete model in a concrete region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub model: String,
    pub region: String,
}

impl Endpoint {
    pub fn new(model: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            region: region.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.model, self.region)
    }
}

/// Output resolution and orientation requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    Landscape720,
    Portrait720,
    Landscape1080,
    Portrait1080,
}

impl Resolution {
    pub fn is_portrait(self) -> bool {
        matches!(self, Resolution::Portrait720 | Resolution::Portrait1080)
    }

    /// Same orientation, capped at 720p.
    pub fn at_most_720(self) -> Self {
        if self.is_portrait() {
            Resolution::Portrait720
        } else {
            Resolution::Landscape720
        }
    }
}

/// Lifecycle of a single provider-side operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::InProgress => write!(f, "in_progress"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Where the bytes of a finished job can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaRef {
    /// Base64 payload embedded in the completed operation.
    Inline { base64: String, mime_type: String },
    /// Object in provider-side storage (e.g. `gs://bucket/key.mp4`).
    Storage { uri: String, mime_type: String },
    /// Served by the provider's own content endpoint for this handle.
    ProviderContent,
}

/// One provider-side operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub handle: String,
    pub provider: ProviderKind,
    pub endpoint: Endpoint,
    pub status: JobStatus,
    pub progress: u8,
    pub error_message: Option<String>,
    pub media: Option<MediaRef>,
    pub duration_sec: Option<u32>,
}

impl GenerationJob {
    /// A job the provider has accepted but not finished.
    pub fn pending(
        handle: impl Into<String>,
        provider: ProviderKind,
        endpoint: Endpoint,
        status: JobStatus,
        progress: u8,
    ) -> Self {
        debug_assert!(matches!(status, JobStatus::Queued | JobStatus::InProgress));
        Self {
            handle: handle.into(),
            provider,
            endpoint,
            status,
            progress: progress.min(99),
            error_message: None,
            media: None,
            duration_sec: None,
        }
    }

    /// A finished job. Without retrievable media this is a failure.
    pub fn completed(
        handle: impl Into<String>,
        provider: ProviderKind,
        endpoint: Endpoint,
        media: Option<MediaRef>,
    ) -> Self {
        let handle = handle.into();
        match media {
            Some(media) => Self {
                handle,
                provider,
                endpoint,
                status: JobStatus::Completed,
                progress: 100,
                error_message: None,
                media: Some(media),
                duration_sec: None,
            },
            None => Self::failed(
                handle,
                provider,
                endpoint,
                "operation completed without a retrievable video",
            ),
        }
    }

    pub fn failed(
        handle: impl Into<String>,
        provider: ProviderKind,
        endpoint: Endpoint,
        message: impl Into<String>,
    ) -> Self {
        Self {
            handle: handle.into(),
            provider,
            endpoint,
            status: JobStatus::Failed,
            progress: 0,
            error_message: Some(message.into()),
            media: None,
            duration_sec: None,
        }
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration_sec = Some(seconds);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

/// An initial submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub duration_sec: u32,
    pub resolution: Resolution,
}

/// A follow-up call growing an existing clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRequest {
    pub prompt: String,
    pub increment_sec: u32,
    pub resolution: Resolution,
}

/// Operations every video generation backend offers.
///
/// `extend` has no deduplication on the provider side: two calls against the
/// same source produce two billed jobs. Callers guard against that.
pub trait VideoProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Create a long-running generation operation on `endpoint`.
    fn submit(
        &self,
        endpoint: &Endpoint,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<GenerationJob, ProviderError>> + Send;

    /// Fetch the current state of an operation.
    fn poll(
        &self,
        endpoint: &Endpoint,
        handle: &str,
    ) -> impl Future<Output = Result<GenerationJob, ProviderError>> + Send;

    /// Download the finished video. Fails with `NotReady` unless completed.
    fn fetch_bytes(
        &self,
        endpoint: &Endpoint,
        handle: &str,
    ) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;

    /// Start a new operation that continues the clip produced by `source_handle`.
    fn extend(
        &self,
        endpoint: &Endpoint,
        source_handle: &str,
        request: &ExtensionRequest,
    ) -> impl Future<Output = Result<GenerationJob, ProviderError>> + Send;

    /// Switch to the alternate authentication method. `false` if none is left.
    fn fallback_auth(&self) -> bool;
}
