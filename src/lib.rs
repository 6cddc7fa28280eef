//! Video generation job orchestrator.
//!
//! Submits clips to OpenAI Sora or Google Veo, picks a working model and
//! region, and grows Veo clips past the single-call limit by chaining
//! extension calls as the caller polls.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use clipchain::{ClipConfig, ProviderKind, Resolution, SubmitRequest, VideoService};
//!
//! let config = ClipConfig::load()?;
//! clipchain::logging::init(&config.log_level, config.log_format);
//! let service = VideoService::from_config(&config)?;
//!
//! let receipt = service
//!     .submit(SubmitRequest {
//!         prompt: "a paper boat drifting down a rainy street".into(),
//!         duration_sec: 30,
//!         provider: ProviderKind::Veo,
//!         resolution: Resolution::Landscape720,
//!     })
//!     .await?;
//! let report = service.status(&receipt.handle).await?;
//! println!("{} {}%", report.status, report.progress);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod duration;
pub mod error;
pub mod extension;
pub mod logging;
pub mod provider;
pub mod resolver;
pub mod sanitize;
pub mod service;
pub mod storage;

pub use config::{ClipConfig, LogFormat, TimeoutPolicy};
pub use error::ClipError;
pub use extension::{ChainPhase, ExtensionPlan, ExtensionRegistry, InMemoryRegistry};
pub use provider::{
    Endpoint, JobStatus, ProviderClient, ProviderError, ProviderKind, Resolution, VideoProvider,
};
pub use service::{ChainProgress, StatusReport, SubmitReceipt, SubmitRequest, VideoService};
