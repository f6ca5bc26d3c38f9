//! Server state

use std::sync::Arc;

use crate::platform::notify::StatusBoard;
use crate::reconcile::Orchestrator;

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub status_board: Arc<StatusBoard>,
}

impl ServerState {
    pub fn new(orchestrator: Arc<Orchestrator>, status_board: Arc<StatusBoard>) -> Self {
        Self {
            orchestrator,
            status_board,
        }
    }
}
