use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::plan::ExtensionPlan;
use crate::error::ClipError;

/// A plan shared by every handle of its logical video. The inner mutex is the
/// per-plan lock; it is never held across a provider call.
pub type SharedPlan = Arc<Mutex<ExtensionPlan>>;

/// Maps every handle that has represented a logical video to its plan.
pub trait ExtensionRegistry: Send + Sync {
    /// Point `handle` at `plan`. Re-registering the same pair is a no-op;
    /// pointing a known handle at a different plan is an error.
    fn register(
        &self,
        handle: &str,
        plan: SharedPlan,
    ) -> impl Future<Output = Result<(), ClipError>> + Send;

    fn lookup(&self, handle: &str) -> impl Future<Output = Option<SharedPlan>> + Send;
}

/// Process-local registry. Lost on restart.
#[derive(Default)]
pub struct InMemoryRegistry {
    plans: RwLock<HashMap<String, SharedPlan>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.plans.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plans.read().await.is_empty()
    }
}

impl ExtensionRegistry for InMemoryRegistry {
    async fn register(&self, handle: &str, plan: SharedPlan) -> Result<(), ClipError> {
        let mut plans = self.plans.write().await;
        match plans.get(handle) {
            Some(existing) if Arc::ptr_eq(existing, &plan) => Ok(()),
            Some(_) => Err(ClipError::Registry(format!(
                "handle {handle} already belongs to another plan"
            ))),
            None => {
                plans.insert(handle.to_string(), plan);
                Ok(())
            }
        }
    }

    async fn lookup(&self, handle: &str) -> Option<SharedPlan> {
        self.plans.read().await.get(handle).cloned()
    }
}
