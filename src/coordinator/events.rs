//! Notifications published to coordinator observers

use serde::Serialize;

use crate::protocol::{FocusChange, PauseReason, SessionState};

use super::shutdown::ShutdownReport;

/// Published on the coordinator's broadcast channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    SessionStateChanged {
        index: usize,
        from: SessionState,
        to: SessionState,
    },
    /// Sessions started together, in this order
    BarrierFired { order: Vec<usize> },
    AllSessionsFailed,
    FocusChanged { change: FocusChange },
    Paused { reason: PauseReason, sessions: Vec<usize> },
    Resumed { sessions: Vec<usize> },
    ShutdownCompleted { report: ShutdownReport },
    Released { errors: usize },
}
