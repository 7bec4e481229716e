//! Recording engine for unit tests
//!
//! Every command is appended to a [`Journal`] shared by all engines of a
//! test, so cross-session ordering can be asserted. The engine never sends
//! open events on its own; tests inject them.

use parking_lot::Mutex;
use std::sync::Arc;

use super::{DecodeEngine, EngineEventKind, EngineState, EventSink};
use crate::error::EngineError;
use crate::surface::FrameSize;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Open(String),
    Start,
    Pause,
    Resume,
    RequestStop,
    StopNow,
    Close,
    Release,
    Bandwidth(u64),
    Renegotiate,
    Volume(f32),
    OutputSize(FrameSize),
}

#[derive(Clone, Default)]
pub(crate) struct Journal {
    calls: Arc<Mutex<Vec<(usize, Call)>>>,
}

impl Journal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn record(&self, index: usize, call: Call) {
        self.calls.lock().push((index, call));
    }

    pub(crate) fn calls(&self) -> Vec<(usize, Call)> {
        self.calls.lock().clone()
    }

    pub(crate) fn calls_for(&self, index: usize) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|(i, _)| *i == index)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Session indices in the order `start` reached their engines
    pub(crate) fn starts(&self) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, c)| *c == Call::Start)
            .map(|(i, _)| *i)
            .collect()
    }

    pub(crate) fn count(&self, index: usize, call: &Call) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(i, c)| *i == index && c == call)
            .count()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().clear();
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Behavior {
    /// `open` is refused synchronously
    pub fail_open: bool,
    /// `start` returns an error
    pub fail_start: bool,
    /// `request_stop` never sends StopComplete
    pub silent_stop: bool,
    /// `stop_now` has no effect either
    pub ignore_stop_now: bool,
    /// `release` returns an error
    pub fail_release: bool,
}

impl Behavior {
    pub(crate) fn responsive() -> Self {
        Self::default()
    }

    /// Never acknowledges a stop, asynchronously or synchronously
    pub(crate) fn hung() -> Self {
        Self {
            silent_stop: true,
            ignore_stop_now: true,
            ..Self::default()
        }
    }
}

pub(crate) struct RecordingEngine {
    index: usize,
    sink: EventSink,
    journal: Journal,
    behavior: Behavior,
    state: EngineState,
}

impl RecordingEngine {
    pub(crate) fn new(sink: EventSink, journal: Journal, behavior: Behavior) -> Self {
        Self {
            index: sink.session(),
            sink,
            journal,
            behavior,
            state: EngineState::Idle,
        }
    }

    fn record(&self, call: Call) {
        self.journal.record(self.index, call);
    }
}

/// Engine factory for `PlaybackCoordinator::register`
pub(crate) fn factory(
    journal: &Journal,
    behavior: Behavior,
) -> impl FnOnce(EventSink) -> Result<Box<dyn DecodeEngine>, EngineError> {
    let journal = journal.clone();
    move |sink| Ok(Box::new(RecordingEngine::new(sink, journal, behavior)) as Box<dyn DecodeEngine>)
}

impl DecodeEngine for RecordingEngine {
    fn open(&mut self, uri: &str) -> Result<(), EngineError> {
        self.record(Call::Open(uri.to_string()));
        if self.behavior.fail_open {
            return Err(EngineError::InitFailed("codec unavailable".into()));
        }
        self.state = EngineState::Opening;
        Ok(())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.record(Call::Start);
        if self.behavior.fail_start {
            return Err(EngineError::command("start", "surface lost"));
        }
        self.state = EngineState::Playing;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.record(Call::Pause);
        self.state = EngineState::Paused;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        self.record(Call::Resume);
        self.state = EngineState::Playing;
        Ok(())
    }

    fn request_stop(&mut self) -> Result<(), EngineError> {
        self.record(Call::RequestStop);
        if !self.behavior.silent_stop {
            self.state = EngineState::Stopped;
            self.sink.emit(EngineEventKind::StopComplete);
        }
        Ok(())
    }

    fn stop_now(&mut self) -> Result<(), EngineError> {
        self.record(Call::StopNow);
        if !self.behavior.ignore_stop_now {
            self.state = EngineState::Stopped;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.record(Call::Close);
        self.state = EngineState::Idle;
        Ok(())
    }

    fn release(&mut self) -> Result<(), EngineError> {
        self.record(Call::Release);
        if self.behavior.fail_release {
            return Err(EngineError::command("release", "native handle leaked"));
        }
        self.state = EngineState::Released;
        Ok(())
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn set_bandwidth_ceiling(&mut self, bits_per_second: u64) -> Result<(), EngineError> {
        self.record(Call::Bandwidth(bits_per_second));
        Ok(())
    }

    fn renegotiate(&mut self) -> Result<(), EngineError> {
        self.record(Call::Renegotiate);
        Ok(())
    }

    fn set_volume(&mut self, level: f32) -> Result<(), EngineError> {
        self.record(Call::Volume(level));
        Ok(())
    }

    fn renegotiate_output_size(&mut self, size: FrameSize) -> Result<(), EngineError> {
        self.record(Call::OutputSize(size));
        Ok(())
    }
}
