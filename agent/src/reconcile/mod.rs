//! Reconciliation pipeline: gates, fetch, settings, files, apps

pub mod fsm;
pub mod orchestrator;
pub mod settings;

pub use fsm::{ReconcileEvent, ReconcileFsm, ReconcileState};
pub use orchestrator::{
    Orchestrator, OrchestratorOptions, OrchestratorStatus, PassOutcome, PlatformHandles, Resolution,
};
pub use settings::SystemSettingsApplier;
