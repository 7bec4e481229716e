//! Decode/render engine capability
//!
//! The coordinator drives engines through [`DecodeEngine`] and learns about
//! asynchronous completions through [`EngineEvent`]s sent on an [`EventSink`].

pub mod simulated;

#[cfg(test)]
pub(crate) mod testing;

pub use simulated::SimulatedEngine;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::surface::FrameSize;

/// Engine-side state ordinal
///
/// Ordered so that `state <= EngineState::Stopped` means "not presenting and
/// not about to".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EngineState {
    Released = 0,
    Idle = 1,
    Stopped = 2,
    Opening = 3,
    Ready = 4,
    Paused = 5,
    Playing = 6,
}

impl EngineState {
    pub fn is_stopped(self) -> bool {
        self <= EngineState::Stopped
    }
}

/// Completion and failure notifications from an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEventKind {
    OpenComplete,
    StartComplete,
    StopComplete,
    Error(String),
}

/// Event tagged with the session it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub session: usize,
    pub kind: EngineEventKind,
}

impl EngineEvent {
    pub fn new(session: usize, kind: EngineEventKind) -> Self {
        Self { session, kind }
    }
}

/// Per-session handle an engine uses to report events
#[derive(Debug, Clone)]
pub struct EventSink {
    session: usize,
    tx: Sender<EngineEvent>,
}

impl EventSink {
    pub fn new(session: usize, tx: Sender<EngineEvent>) -> Self {
        Self { session, tx }
    }

    /// Session index this sink reports for
    pub fn session(&self) -> usize {
        self.session
    }

    /// Deliver an event; returns false once the coordinator is gone
    pub fn emit(&self, kind: EngineEventKind) -> bool {
        self.tx.send(EngineEvent::new(self.session, kind)).is_ok()
    }
}

/// Decode/render pipeline for one stream
///
/// `open` and `request_stop` only start the work; completion arrives later as
/// `OpenComplete` / `StopComplete` on the engine's [`EventSink`]. Every other
/// command takes effect before it returns.
pub trait DecodeEngine: Send {
    fn open(&mut self, uri: &str) -> Result<(), EngineError>;

    fn start(&mut self) -> Result<(), EngineError>;

    fn pause(&mut self) -> Result<(), EngineError>;

    fn resume(&mut self) -> Result<(), EngineError>;

    /// Begin an asynchronous stop
    fn request_stop(&mut self) -> Result<(), EngineError>;

    /// Stop synchronously; used to escalate an unconfirmed stop
    fn stop_now(&mut self) -> Result<(), EngineError>;

    fn close(&mut self) -> Result<(), EngineError>;

    fn release(&mut self) -> Result<(), EngineError>;

    fn state(&self) -> EngineState;

    /// Upper bound on the stream bitrate in bits per second
    fn set_bandwidth_ceiling(&mut self, bits_per_second: u64) -> Result<(), EngineError>;

    /// Re-select a rendition after the ceiling changed
    fn renegotiate(&mut self) -> Result<(), EngineError>;

    /// Output gain, 0.0 is muted
    fn set_volume(&mut self, level: f32) -> Result<(), EngineError>;

    /// Resize decoded output to the surface region
    fn renegotiate_output_size(&mut self, size: FrameSize) -> Result<(), EngineError>;
}
