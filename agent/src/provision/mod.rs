//! Work queues and the machinery that drains them

pub mod executor;
pub mod planner;
pub mod queue;
pub mod runner;

pub use executor::{AppExecutor, FileExecutor, ItemExecutor};
pub use planner::{plan_applications, plan_files, InstalledPackages, ReinstallPolicy};
pub use queue::{ProvisioningState, QueueItem, QueueKind, WorkQueue};
pub use runner::{DrainOutcome, EscalationPolicy, QueueRunner, RunnerOptions};
