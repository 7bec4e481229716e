//! Session lifecycle transitions
//!
//! A pure function from (state, trigger) to the next step. Sessions apply
//! the step and perform engine side effects only when a state is entered,
//! which makes duplicate engine events harmless.

use crate::protocol::SessionState;

/// Inputs that can move a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Open,
    OpenComplete,
    Start,
    Pause,
    Resume,
    RequestStop,
    StopComplete,
    /// Synchronous stop, or stop forced after the shutdown bound
    ForceStop,
    Release,
    Fault,
}

/// Result of applying a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Enter(SessionState),
    /// Ignored; the trigger does not apply in this state
    Stay,
    /// Refused; the caller gets an error
    Reject,
}

pub fn step(from: SessionState, trigger: Trigger) -> Step {
    use SessionState::*;

    match (from, trigger) {
        (Uninitialized, Trigger::Open) => Step::Enter(Opening),
        (_, Trigger::Open) => Step::Reject,

        (Opening, Trigger::OpenComplete) => Step::Enter(Ready),

        (Ready, Trigger::Start) => Step::Enter(Playing),

        (Playing, Trigger::Pause) => Step::Enter(Paused),
        (Paused, Trigger::Resume) => Step::Enter(Playing),

        (s, Trigger::RequestStop) if s.is_pre_terminal() => Step::Enter(Stopping),

        (Stopping, Trigger::StopComplete) => Step::Enter(Stopped),

        (Stopping, Trigger::ForceStop) => Step::Enter(Stopped),
        (s, Trigger::ForceStop) if s.is_pre_terminal() => Step::Enter(Stopped),

        (Stopped | Failed, Trigger::Release) => Step::Enter(Released),

        (Released | Failed, Trigger::Fault) => Step::Stay,
        (_, Trigger::Fault) => Step::Enter(Failed),

        _ => Step::Stay,
    }
}
