//! Multi-step extension chains.
//!
//! A logical video longer than one provider call is an [`ExtensionPlan`]
//! shared by every handle it has ever had. The [`ExtensionOrchestrator`]
//! moves the chain forward one extension per completed poll.

mod orchestrator;
mod plan;
mod registry;

pub use orchestrator::{Advance, ExtensionOrchestrator};
pub use plan::{ChainPhase, ExtensionPlan};
pub use registry::{ExtensionRegistry, InMemoryRegistry, SharedPlan};
