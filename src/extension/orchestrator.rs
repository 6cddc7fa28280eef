use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::plan::ExtensionPlan;
use super::registry::{ExtensionRegistry, InMemoryRegistry, SharedPlan};
use crate::config::TimeoutPolicy;
use crate::error::ClipError;
use crate::provider::{ExtensionRequest, GenerationJob, VideoProvider};

/// Outcome of offering a completed poll to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// The polled handle is no longer the chain's current handle.
    Stale,
    /// The chain failed earlier; nothing was dispatched.
    Sticky { error: String },
    /// Every planned extension has rendered.
    FullyExtended,
    /// Another poll already dispatched the next extension.
    Waiting,
    /// This poll dispatched the next extension.
    Extended(GenerationJob),
    /// The extend call failed. With `sticky` unset the next poll retries.
    ExtendFailed { error: String, sticky: bool },
}

/// Drives extension chains forward from inbound status polls.
///
/// There is no background scheduler: each completed poll of a chain's
/// current handle gives the orchestrator one chance to dispatch the next
/// extension.
pub struct ExtensionOrchestrator<R: ExtensionRegistry = InMemoryRegistry> {
    registry: R,
    timeouts: TimeoutPolicy,
    auto_retries: u32,
}

impl<R: ExtensionRegistry> ExtensionOrchestrator<R> {
    pub fn new(registry: R, timeouts: TimeoutPolicy, auto_retries: u32) -> Self {
        Self {
            registry,
            timeouts,
            auto_retries,
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Register a freshly submitted plan under its base handle.
    pub async fn start(&self, plan: ExtensionPlan) -> Result<SharedPlan, ClipError> {
        let base_handle = plan.base_handle.clone();
        info!(
            plan = %plan.id,
            handle = %base_handle,
            target_sec = plan.target_duration_sec,
            planned = plan.extensions_planned,
            "extension plan registered"
        );
        let shared = Arc::new(Mutex::new(plan));
        self.registry.register(&base_handle, shared.clone()).await?;
        Ok(shared)
    }

    pub async fn lookup(&self, handle: &str) -> Option<SharedPlan> {
        self.registry.lookup(handle).await
    }

    /// Decide what a `Completed` poll of `polled` means for the chain and
    /// dispatch the next extension when it is this poll's turn.
    ///
    /// The plan lock is held for the check-and-set only, never across the
    /// provider call; `attempted` keeps concurrent polls from dispatching twice.
    pub async fn advance<P: VideoProvider>(
        &self,
        provider: &P,
        plan: &SharedPlan,
        polled: &GenerationJob,
    ) -> Result<Advance, ClipError> {
        let (plan_id, step, source, endpoint, request) = {
            let mut p = plan.lock().await;
            if polled.handle != p.current_handle {
                debug!(plan = %p.id, handle = %polled.handle, "stale poll ignored");
                return Ok(Advance::Stale);
            }
            if !polled.is_completed() {
                return Ok(Advance::Waiting);
            }
            p.mark_playable(&polled.handle);

            if p.failed {
                return Ok(Advance::Sticky {
                    error: sticky_message(&p),
                });
            }
            if p.all_dispatched() {
                return Ok(Advance::FullyExtended);
            }
            if p.attempted {
                return Ok(Advance::Waiting);
            }

            p.begin_extension();
            (
                p.id,
                p.extensions_completed + 1,
                p.current_handle.clone(),
                p.endpoint.clone(),
                ExtensionRequest {
                    prompt: p.prompt.clone(),
                    increment_sec: p.extension_increment_sec,
                    resolution: p.resolution,
                },
            )
        };

        info!(
            plan = %plan_id,
            step,
            source = %source,
            endpoint = %endpoint,
            "dispatching extension"
        );
        let result = self
            .timeouts
            .run(
                request.increment_sec,
                provider.extend(&endpoint, &source, &request),
            )
            .await;

        let job = match result {
            Ok(job) => job,
            Err(err) => {
                let error = err.to_string();
                let sticky = plan.lock().await.record_failure(&error, self.auto_retries);
                warn!(plan = %plan_id, step, sticky, error = %error, "extension failed");
                return Ok(Advance::ExtendFailed { error, sticky });
            }
        };

        // The new handle must resolve to the plan before it becomes current.
        if let Err(err) = self.registry.register(&job.handle, plan.clone()).await {
            plan.lock().await.record_failure(err.to_string(), self.auto_retries);
            return Err(err);
        }

        let mut p = plan.lock().await;
        p.record_extension(job.handle.clone());
        info!(
            plan = %plan_id,
            step,
            handle = %job.handle,
            completed = p.extensions_completed,
            planned = p.extensions_planned,
            "extension dispatched"
        );
        Ok(Advance::Extended(job))
    }

    /// The current sub-job itself failed at the provider: stop the chain.
    pub async fn fail_current(&self, plan: &SharedPlan, polled: &GenerationJob) -> Advance {
        let mut p = plan.lock().await;
        if polled.handle != p.current_handle {
            return Advance::Stale;
        }
        if !p.failed {
            let message = polled
                .error_message
                .clone()
                .unwrap_or_else(|| "video generation failed".to_string());
            warn!(
                plan = %p.id,
                handle = %polled.handle,
                error = %message,
                "sub-job failed, chain stopped"
            );
            p.fail_current(message);
        }
        Advance::Sticky {
            error: sticky_message(&p),
        }
    }

    /// Clear a sticky failure. Returns `false` when the chain was not
    /// failed or has no playable clip to continue from.
    pub async fn resume(&self, plan: &SharedPlan) -> bool {
        let mut p = plan.lock().await;
        let resumed = p.resume();
        if resumed {
            info!(
                plan = %p.id,
                handle = %p.current_handle,
                completed = p.extensions_completed,
                "extension chain resumed"
            );
        }
        resumed
    }
}

fn sticky_message(plan: &ExtensionPlan) -> String {
    plan.last_error
        .clone()
        .unwrap_or_else(|| "extension failed".to_string())
}
