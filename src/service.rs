//! Caller-facing facade: submit, status, download and resume.
//!
//! Orchestration happens inside `status`: there is no background task, so a
//! chain only moves forward while someone keeps polling it.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{ClipConfig, TimeoutPolicy};
use crate::duration::negotiate;
use crate::error::ClipError;
use crate::extension::{
    Advance, ChainPhase, ExtensionOrchestrator, ExtensionPlan, ExtensionRegistry,
    InMemoryRegistry, SharedPlan,
};
use crate::provider::{
    Endpoint, GenerationJob, GenerationRequest, JobStatus, ProviderClient, ProviderError,
    ProviderKind, Resolution, VideoProvider, build_clients,
};
use crate::resolver::{ResolveError, resolve};
use crate::sanitize::sanitize_for;

/// A request for one logical video.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub prompt: String,
    pub duration_sec: u32,
    pub provider: ProviderKind,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitReceipt {
    /// Handle to poll; stays valid for the whole chain.
    pub handle: String,
    pub provider: ProviderKind,
    pub endpoint: Endpoint,
    pub initial_sec: u32,
    pub extensions_planned: u32,
    pub plan_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainProgress {
    pub plan_id: Uuid,
    pub phase: ChainPhase,
    pub completed: u32,
    pub planned: u32,
    pub target_duration_sec: u32,
    pub achieved_duration_sec: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub handle: String,
    pub status: JobStatus,
    pub progress: u8,
    pub error_message: Option<String>,
    /// Handle whose bytes `download` serves, once there is one.
    pub final_handle: Option<String>,
    /// `NoExtensionNeeded` for single-clip jobs.
    pub phase: ChainPhase,
    pub chain: Option<ChainProgress>,
}

#[derive(Debug, Clone)]
struct JobRecord {
    provider: ProviderKind,
    endpoint: Endpoint,
    duration_sec: u32,
}

pub struct VideoService<
    P: VideoProvider = ProviderClient,
    R: ExtensionRegistry = InMemoryRegistry,
> {
    providers: Vec<P>,
    candidates: HashMap<ProviderKind, Vec<Endpoint>>,
    orchestrator: ExtensionOrchestrator<R>,
    index: RwLock<HashMap<String, JobRecord>>,
    timeouts: TimeoutPolicy,
}

impl VideoService<ProviderClient, InMemoryRegistry> {
    /// Service backed by the real provider clients the configuration enables.
    pub fn from_config(config: &ClipConfig) -> Result<Self, ClipError> {
        let providers = build_clients(config)?;
        if providers.is_empty() {
            return Err(ClipError::Configuration(
                "no video provider configured: set OPENAI_API_KEY or GOOGLE_CLOUD_PROJECT".into(),
            ));
        }
        Ok(Self::new(providers, config))
    }
}

impl<P: VideoProvider> VideoService<P, InMemoryRegistry> {
    pub fn new(providers: Vec<P>, config: &ClipConfig) -> Self {
        Self::with_registry(providers, config, InMemoryRegistry::new())
    }
}

impl<P: VideoProvider, R: ExtensionRegistry> VideoService<P, R> {
    pub fn with_registry(providers: Vec<P>, config: &ClipConfig, registry: R) -> Self {
        let candidates = providers
            .iter()
            .map(|p| (p.kind(), config.candidates(p.kind()).endpoints()))
            .collect();
        Self {
            providers,
            candidates,
            orchestrator: ExtensionOrchestrator::new(
                registry,
                config.timeouts,
                config.extension.auto_retries,
            ),
            index: RwLock::new(HashMap::new()),
            timeouts: config.timeouts,
        }
    }

    fn provider(&self, kind: ProviderKind) -> Result<&P, ClipError> {
        self.providers
            .iter()
            .find(|p| p.kind() == kind)
            .ok_or(ClipError::ProviderUnavailable(kind))
    }

    async fn record(&self, handle: &str) -> Result<JobRecord, ClipError> {
        self.index
            .read()
            .await
            .get(handle)
            .cloned()
            .ok_or_else(|| ClipError::JobNotFound(handle.to_string()))
    }

    async fn index_job(&self, job: &GenerationJob, duration_sec: u32) {
        self.index.write().await.insert(
            job.handle.clone(),
            JobRecord {
                provider: job.provider,
                endpoint: job.endpoint.clone(),
                duration_sec,
            },
        );
    }

    /// Negotiate, sanitize, resolve an endpoint and submit the initial clip.
    /// Registers an extension plan when the request needs one.
    #[instrument(
        skip(self, request),
        fields(provider = %request.provider, requested_sec = request.duration_sec)
    )]
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitReceipt, ClipError> {
        let kind = request.provider;
        let provider = self.provider(kind)?;
        let negotiation = negotiate(kind, request.duration_sec)?;

        let sanitized = sanitize_for(kind, &request.prompt);
        info!(
            changed = sanitized.changed,
            chars = sanitized.text.chars().count(),
            "prompt sanitized"
        );

        let resolution = if negotiation.plan.is_some() {
            let capped = request.resolution.at_most_720();
            if capped != request.resolution {
                warn!(
                    requested = ?request.resolution,
                    "extension chains are limited to 720p, downgrading"
                );
            }
            capped
        } else {
            request.resolution
        };

        let generation = GenerationRequest {
            prompt: sanitized.text.clone(),
            duration_sec: negotiation.initial_sec,
            resolution,
        };
        let candidates = self.candidates.get(&kind).map(Vec::as_slice).unwrap_or(&[]);

        let resolved = match resolve(provider, candidates, &generation, &self.timeouts).await {
            Ok(resolved) => resolved,
            Err(ResolveError::Rejected { source, .. }) if source.is_content_policy() => {
                warn!(error = %source, "prompt rejected by content policy");
                return Err(ClipError::ContentPolicyRejected {
                    message: source.to_string(),
                    original_prompt: request.prompt,
                    sanitized_prompt: sanitized.text,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let job = resolved.job;
        self.index_job(&job, negotiation.initial_sec).await;

        let mut extensions_planned = 0;
        let mut plan_id = None;
        if let Some(skeleton) = negotiation.plan {
            let plan = ExtensionPlan::new(
                skeleton,
                negotiation.initial_sec,
                job.handle.clone(),
                resolved.endpoint.clone(),
                sanitized.text,
                resolution,
            );
            extensions_planned = plan.extensions_planned;
            plan_id = Some(plan.id);
            self.orchestrator.start(plan).await?;
        }

        info!(
            handle = %job.handle,
            endpoint = %resolved.endpoint,
            initial_sec = negotiation.initial_sec,
            extensions_planned,
            "video submitted"
        );
        Ok(SubmitReceipt {
            handle: job.handle,
            provider: kind,
            endpoint: resolved.endpoint,
            initial_sec: negotiation.initial_sec,
            extensions_planned,
            plan_id,
        })
    }

    /// Poll a handle. For extension chains this is also where the next
    /// extension gets dispatched.
    #[instrument(skip(self))]
    pub async fn status(&self, handle: &str) -> Result<StatusReport, ClipError> {
        if let Some(plan) = self.orchestrator.lookup(handle).await {
            return self.chain_status(handle, &plan).await;
        }

        let record = self.record(handle).await?;
        let provider = self.provider(record.provider)?;
        let job = self
            .timeouts
            .run(record.duration_sec, provider.poll(&record.endpoint, handle))
            .await?;
        debug!(status = %job.status, progress = job.progress, "job polled");

        Ok(StatusReport {
            handle: handle.to_string(),
            status: job.status,
            progress: job.progress,
            final_handle: job.is_completed().then(|| job.handle.clone()),
            error_message: job.error_message,
            phase: ChainPhase::NoExtensionNeeded,
            chain: None,
        })
    }

    async fn chain_status(
        &self,
        handle: &str,
        plan: &SharedPlan,
    ) -> Result<StatusReport, ClipError> {
        let (current, base, sticky) = {
            let p = plan.lock().await;
            (p.current_handle.clone(), p.base_handle.clone(), p.failed)
        };

        // A stopped chain reports what it reached without touching the provider.
        if sticky {
            return Ok(chain_report(handle, plan, None).await);
        }

        let record = match self.record(&current).await {
            Ok(record) => record,
            Err(_) => self.record(&base).await?,
        };
        let provider = self.provider(record.provider)?;
        let job = self
            .timeouts
            .run(record.duration_sec, provider.poll(&record.endpoint, &current))
            .await?;

        match job.status {
            JobStatus::Completed => {
                let advance = self.orchestrator.advance(provider, plan, &job).await?;
                if let Advance::Extended(next) = advance {
                    let increment = plan.lock().await.extension_increment_sec;
                    self.index_job(&next, increment).await;
                }
            }
            JobStatus::Failed => {
                self.orchestrator.fail_current(plan, &job).await;
            }
            JobStatus::Queued | JobStatus::InProgress => {}
        }

        Ok(chain_report(handle, plan, Some(&job)).await)
    }

    /// Bytes of the finished video. For chains this is the final extension,
    /// or the last playable clip once the chain has stopped.
    #[instrument(skip(self))]
    pub async fn download(&self, handle: &str) -> Result<Vec<u8>, ClipError> {
        let target = match self.orchestrator.lookup(handle).await {
            Some(plan) => {
                let p = plan.lock().await;
                match p.phase() {
                    ChainPhase::FullyExtended => p.current_handle.clone(),
                    ChainPhase::FailedSticky => match &p.playable_handle {
                        Some(playable) => playable.clone(),
                        None => {
                            return Err(ClipError::ExtensionFailedSticky {
                                plan_id: p.id,
                                completed: p.extensions_completed,
                                planned: p.extensions_planned,
                                message: p.last_error.clone().unwrap_or_default(),
                            });
                        }
                    },
                    _ => {
                        return Err(ClipError::NotReady {
                            handle: handle.to_string(),
                        });
                    }
                }
            }
            None => handle.to_string(),
        };

        let record = self.record(&target).await?;
        let provider = self.provider(record.provider)?;
        let bytes = self
            .timeouts
            .run(record.duration_sec, provider.fetch_bytes(&record.endpoint, &target))
            .await
            .map_err(|err| match err {
                ProviderError::NotReady { .. } => ClipError::NotReady {
                    handle: handle.to_string(),
                },
                other => ClipError::Provider(other),
            })?;
        info!(target = %target, bytes = bytes.len(), "video downloaded");
        Ok(bytes)
    }

    /// Clear a sticky extension failure so polling continues the chain.
    /// Returns `false` when there was nothing to resume.
    #[instrument(skip(self))]
    pub async fn resume(&self, handle: &str) -> Result<bool, ClipError> {
        match self.orchestrator.lookup(handle).await {
            Some(plan) => Ok(self.orchestrator.resume(&plan).await),
            None => {
                self.record(handle).await?;
                Ok(false)
            }
        }
    }
}

/// Build the caller's view of a chain from the plan and, when the current
/// sub-job was just polled, its job.
async fn chain_report(
    handle: &str,
    plan: &SharedPlan,
    polled: Option<&GenerationJob>,
) -> StatusReport {
    let p = plan.lock().await;
    let phase = p.phase();

    let current_progress = polled
        .filter(|job| job.handle == p.current_handle)
        .map(|job| u32::from(job.progress))
        .unwrap_or(0);
    let steps = p.extensions_planned + 1;
    let progress = match phase {
        ChainPhase::FullyExtended => 100,
        ChainPhase::FailedSticky => (p.extensions_completed * 100 / steps).min(99) as u8,
        _ => ((p.extensions_completed * 100 + current_progress.min(99)) / steps).min(99) as u8,
    };

    let (status, final_handle) = match phase {
        ChainPhase::FullyExtended => (JobStatus::Completed, Some(p.current_handle.clone())),
        ChainPhase::FailedSticky => match &p.playable_handle {
            Some(playable) => (JobStatus::Completed, Some(playable.clone())),
            None => (JobStatus::Failed, None),
        },
        _ => {
            let queued = p.extensions_completed == 0
                && polled.is_some_and(|job| job.status == JobStatus::Queued);
            let status = if queued {
                JobStatus::Queued
            } else {
                JobStatus::InProgress
            };
            (status, None)
        }
    };

    StatusReport {
        handle: handle.to_string(),
        status,
        progress,
        error_message: p.last_error.clone(),
        final_handle,
        phase,
        chain: Some(ChainProgress {
            plan_id: p.id,
            phase,
            completed: p.extensions_completed,
            planned: p.extensions_planned,
            target_duration_sec: p.target_duration_sec,
            achieved_duration_sec: p.achieved_duration_sec(),
        }),
    }
}
