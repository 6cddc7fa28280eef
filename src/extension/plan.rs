use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::duration::{PlanSkeleton, achieved_duration_sec};
use crate::provider::{Endpoint, Resolution};

/// Where a logical video stands in its extension chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainPhase {
    /// The requested duration fits in one clip; there is no plan.
    NoExtensionNeeded,
    /// `k` extensions dispatched; the current sub-job is rendering or
    /// waiting for the next poll to trigger extension `k + 1`.
    Pending(u32),
    /// The extend call for extension `k` is in flight.
    ExtendInFlight(u32),
    /// Every planned extension has rendered.
    FullyExtended,
    /// An extension failed; no further extends until the caller resumes.
    FailedSticky,
}

impl fmt::Display for ChainPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainPhase::NoExtensionNeeded => write!(f, "NO_EXTENSION_NEEDED"),
            ChainPhase::Pending(k) => write!(f, "PENDING({k})"),
            ChainPhase::ExtendInFlight(k) => write!(f, "EXTEND_IN_FLIGHT({k})"),
            ChainPhase::FullyExtended => write!(f, "FULLY_EXTENDED"),
            ChainPhase::FailedSticky => write!(f, "FAILED_STICKY"),
        }
    }
}

/// A logical video built from an initial clip plus a chain of extensions.
///
/// Mutated only by the orchestrator while it holds the plan's lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionPlan {
    pub id: Uuid,
    pub target_duration_sec: u32,
    pub initial_duration_sec: u32,
    pub extension_increment_sec: u32,
    pub extensions_planned: u32,
    pub extensions_completed: u32,
    pub base_handle: String,
    pub current_handle: String,
    /// An extend call for the next step is in flight.
    pub attempted: bool,
    /// Sticky failure. Takes priority over `attempted`.
    pub failed: bool,
    pub last_error: Option<String>,
    pub failure_count: u32,
    /// Most recent handle observed `Completed`.
    pub playable_handle: Option<String>,
    /// The current sub-job itself failed at the provider.
    pub current_failed: bool,
    pub endpoint: Endpoint,
    pub prompt: String,
    pub resolution: Resolution,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtensionPlan {
    pub fn new(
        skeleton: PlanSkeleton,
        initial_duration_sec: u32,
        base_handle: impl Into<String>,
        endpoint: Endpoint,
        prompt: impl Into<String>,
        resolution: Resolution,
    ) -> Self {
        let base_handle = base_handle.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            target_duration_sec: skeleton.target_duration_sec,
            initial_duration_sec,
            extension_increment_sec: skeleton.extension_increment_sec,
            extensions_planned: skeleton.extensions_planned,
            extensions_completed: 0,
            current_handle: base_handle.clone(),
            base_handle,
            attempted: false,
            failed: false,
            last_error: None,
            failure_count: 0,
            playable_handle: None,
            current_failed: false,
            endpoint,
            prompt: prompt.into(),
            resolution,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn phase(&self) -> ChainPhase {
        if self.failed {
            ChainPhase::FailedSticky
        } else if self.all_dispatched()
            && self.playable_handle.as_deref() == Some(self.current_handle.as_str())
        {
            ChainPhase::FullyExtended
        } else if self.attempted {
            ChainPhase::ExtendInFlight(self.extensions_completed + 1)
        } else {
            ChainPhase::Pending(self.extensions_completed)
        }
    }

    /// Every planned extension has been dispatched successfully.
    pub fn all_dispatched(&self) -> bool {
        self.extensions_completed >= self.extensions_planned
    }

    /// Seconds of video the current handle holds once it finishes rendering.
    pub fn achieved_duration_sec(&self) -> u32 {
        achieved_duration_sec(
            self.initial_duration_sec,
            self.extension_increment_sec,
            self.extensions_completed,
        )
    }

    pub fn error_message(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn mark_playable(&mut self, handle: &str) {
        if self.playable_handle.as_deref() != Some(handle) {
            self.playable_handle = Some(handle.to_string());
            self.touch();
        }
    }

    pub(crate) fn begin_extension(&mut self) {
        self.attempted = true;
        self.touch();
    }

    pub(crate) fn record_extension(&mut self, new_handle: impl Into<String>) {
        self.current_handle = new_handle.into();
        self.extensions_completed = (self.extensions_completed + 1).min(self.extensions_planned);
        self.attempted = false;
        self.current_failed = false;
        self.last_error = None;
        self.touch();
    }

    /// Record a failed extend dispatch. Returns whether the chain is now sticky.
    pub(crate) fn record_failure(&mut self, message: impl Into<String>, auto_retries: u32) -> bool {
        self.failure_count += 1;
        self.last_error = Some(message.into());
        self.attempted = false;
        if self.failure_count > auto_retries {
            self.failed = true;
        }
        self.touch();
        self.failed
    }

    /// The current sub-job failed at the provider; the chain cannot continue from it.
    pub(crate) fn fail_current(&mut self, message: impl Into<String>) {
        self.failed = true;
        self.current_failed = true;
        self.attempted = false;
        self.last_error = Some(message.into());
        self.touch();
    }

    /// Clear a sticky failure so the next completed poll extends again.
    ///
    /// When the current sub-job itself failed, the chain steps back to the
    /// last playable handle. Returns `false` if there is nothing to resume.
    pub(crate) fn resume(&mut self) -> bool {
        if !self.failed {
            return false;
        }
        if self.current_failed {
            let Some(playable) = self.playable_handle.clone() else {
                return false;
            };
            if playable != self.current_handle {
                self.current_handle = playable;
                self.extensions_completed = self.extensions_completed.saturating_sub(1);
            }
            self.current_failed = false;
        }
        self.failed = false;
        self.failure_count = 0;
        self.last_error = None;
        self.touch();
        true
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
