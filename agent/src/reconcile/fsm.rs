//! Finite state machine for reconciliation passes

use serde::{Deserialize, Serialize};

use crate::provision::QueueKind;

/// Reconciliation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    /// Nothing ran since process start
    Idle,

    GateCheck,

    /// A capability gate waits for the operator
    GateBlocked,

    Fetching,

    ApplyingSystemSettings,

    FileProvisioning,

    AppProvisioning,

    /// A provisioning item waits for retry or skip
    AwaitingOperator,

    Ready,

    /// Pass stopped, an operator retry is required
    Failed,
}

impl ReconcileState {
    /// A pass is between its start and a resting state
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ReconcileState::GateCheck
                | ReconcileState::Fetching
                | ReconcileState::ApplyingSystemSettings
                | ReconcileState::FileProvisioning
                | ReconcileState::AppProvisioning
        )
    }
}

/// Reconciliation event
#[derive(Debug, Clone)]
pub enum ReconcileEvent {
    /// A new pass starts
    Start,

    GatesPassed,

    GateFailed,

    /// Fresh configuration stored
    Fetched,

    /// Server unreachable, last known configuration reused
    UseCached,

    /// Unreachable without fallback, or rejected
    FetchFailed(String),

    SettingsApplied,

    FilesDrained,

    AppsDrained,

    /// An item failed and waits for the operator
    ItemBlocked(String),

    /// Operator resolved the blocked item
    Resume(QueueKind),

    /// Unrecoverable error inside a pass
    Abort(String),
}

/// Reconciliation FSM
#[derive(Debug, Clone)]
pub struct ReconcileFsm {
    state: ReconcileState,
    error: Option<String>,
    blocked_item: Option<String>,
}

impl ReconcileFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: ReconcileState::Idle,
            error: None,
            blocked_item: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// Error of the last failed pass
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Item waiting for the operator
    pub fn blocked_item(&self) -> Option<&str> {
        self.blocked_item.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: ReconcileEvent) -> Result<ReconcileState, String> {
        use ReconcileEvent as E;
        use ReconcileState as S;

        let new_state = match (self.state, &event) {
            // Resting states accept a new pass
            (
                S::Idle | S::Ready | S::Failed | S::GateBlocked | S::AwaitingOperator,
                E::Start,
            ) => {
                self.error = None;
                self.blocked_item = None;
                S::GateCheck
            }

            (S::GateCheck, E::GatesPassed) => S::Fetching,
            (S::GateCheck, E::GateFailed) => S::GateBlocked,

            (S::Fetching, E::Fetched) => S::ApplyingSystemSettings,
            (S::Fetching, E::UseCached) => S::Ready,
            (S::Fetching, E::FetchFailed(err)) => {
                self.error = Some(err.clone());
                S::Failed
            }

            (S::ApplyingSystemSettings, E::SettingsApplied) => S::FileProvisioning,

            (S::FileProvisioning, E::FilesDrained) => S::AppProvisioning,
            (S::AppProvisioning, E::AppsDrained) => S::Ready,
            (S::FileProvisioning | S::AppProvisioning, E::ItemBlocked(item)) => {
                self.blocked_item = Some(item.clone());
                S::AwaitingOperator
            }

            (S::AwaitingOperator, E::Resume(QueueKind::Files)) => {
                self.blocked_item = None;
                S::FileProvisioning
            }
            (S::AwaitingOperator, E::Resume(QueueKind::Apps)) => {
                self.blocked_item = None;
                S::AppProvisioning
            }

            (state, E::Abort(err)) if state.is_active() => {
                self.error = Some(err.clone());
                S::Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for ReconcileFsm {
    fn default() -> Self {
        Self::new()
    }
}
