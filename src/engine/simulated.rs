//! Simulated decode engine
//!
//! Stands in for a native decoder: buffering and asynchronous stop are
//! modelled by short-lived worker threads that report back through the
//! engine's [`EventSink`]. URIs with the `fail:` scheme never finish opening
//! and report an error instead.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{DecodeEngine, EngineEventKind, EngineState, EventSink};
use crate::config::SimulationConfig;
use crate::error::EngineError;
use crate::surface::FrameSize;

/// Timing of one simulated engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTiming {
    pub open_delay: Duration,
    pub stop_delay: Duration,
}

impl SimulationTiming {
    /// Per-session timing; the jitter makes sessions become ready out of index order
    pub fn for_session(config: &SimulationConfig, index: usize) -> Self {
        let spread = (index as u64 * 3) % 4;
        Self {
            open_delay: Duration::from_millis(config.open_delay_ms + config.open_jitter_ms * spread),
            stop_delay: Duration::from_millis(config.stop_delay_ms),
        }
    }
}

/// Last values pushed by the coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineSettings {
    pub bandwidth_bps: u64,
    pub volume: f32,
    pub output_size: FrameSize,
    pub renegotiations: u32,
}

/// Thread-backed engine that never decodes a byte
pub struct SimulatedEngine {
    sink: EventSink,
    timing: SimulationTiming,
    state: Arc<Mutex<EngineState>>,
    settings: Arc<Mutex<EngineSettings>>,
    workers: Vec<JoinHandle<()>>,
}

impl SimulatedEngine {
    pub fn new(sink: EventSink, timing: SimulationTiming) -> Self {
        Self {
            sink,
            timing,
            state: Arc::new(Mutex::new(EngineState::Idle)),
            settings: Arc::new(Mutex::new(EngineSettings::default())),
            workers: Vec::new(),
        }
    }

    /// Handle for observing pushed settings after the engine is boxed
    pub fn settings_handle(&self) -> Arc<Mutex<EngineSettings>> {
        self.settings.clone()
    }

    fn spawn_worker<F>(&mut self, label: &str, task: F) -> Result<(), EngineError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.workers.retain(|h| !h.is_finished());

        let handle = thread::Builder::new()
            .name(format!("engine-{}-{}", label, self.sink.session()))
            .spawn(task)
            .map_err(|e| EngineError::command("spawn", e.to_string()))?;
        self.workers.push(handle);
        Ok(())
    }

    fn join_workers(&mut self) {
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }

    fn require_live(&self) -> Result<(), EngineError> {
        if *self.state.lock() == EngineState::Released {
            return Err(EngineError::Released);
        }
        Ok(())
    }
}

impl DecodeEngine for SimulatedEngine {
    fn open(&mut self, uri: &str) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock();
            if *state != EngineState::Idle {
                return Err(EngineError::command("open", format!("engine is {:?}", *state)));
            }
            *state = EngineState::Opening;
        }

        let state = self.state.clone();
        let sink = self.sink.clone();
        let delay = self.timing.open_delay;
        let unreachable = uri.starts_with("fail:");

        self.spawn_worker("open", move || {
            thread::sleep(delay);
            let mut state = state.lock();
            if *state != EngineState::Opening {
                // Stopped or released while buffering
                return;
            }
            if unreachable {
                *state = EngineState::Idle;
                drop(state);
                sink.emit(EngineEventKind::Error("stream unreachable".into()));
            } else {
                *state = EngineState::Ready;
                drop(state);
                sink.emit(EngineEventKind::OpenComplete);
            }
        })
    }

    fn start(&mut self) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock();
            if !matches!(*state, EngineState::Ready | EngineState::Paused | EngineState::Playing) {
                return Err(EngineError::NotOpen);
            }
            *state = EngineState::Playing;
        }
        self.sink.emit(EngineEventKind::StartComplete);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if *state == EngineState::Playing {
            *state = EngineState::Paused;
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if *state == EngineState::Paused {
            *state = EngineState::Playing;
        }
        Ok(())
    }

    fn request_stop(&mut self) -> Result<(), EngineError> {
        self.require_live()?;

        let state = self.state.clone();
        let sink = self.sink.clone();
        let delay = self.timing.stop_delay;

        self.spawn_worker("stop", move || {
            thread::sleep(delay);
            let mut state = state.lock();
            if *state == EngineState::Released {
                return;
            }
            *state = EngineState::Stopped;
            drop(state);
            sink.emit(EngineEventKind::StopComplete);
        })
    }

    fn stop_now(&mut self) -> Result<(), EngineError> {
        self.require_live()?;
        *self.state.lock() = EngineState::Stopped;
        Ok(())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.require_live()?;
        *self.state.lock() = EngineState::Stopped;
        self.join_workers();
        Ok(())
    }

    fn release(&mut self) -> Result<(), EngineError> {
        *self.state.lock() = EngineState::Released;
        self.join_workers();
        Ok(())
    }

    fn state(&self) -> EngineState {
        *self.state.lock()
    }

    fn set_bandwidth_ceiling(&mut self, bits_per_second: u64) -> Result<(), EngineError> {
        self.require_live()?;
        self.settings.lock().bandwidth_bps = bits_per_second;
        Ok(())
    }

    fn renegotiate(&mut self) -> Result<(), EngineError> {
        self.require_live()?;
        self.settings.lock().renegotiations += 1;
        Ok(())
    }

    fn set_volume(&mut self, level: f32) -> Result<(), EngineError> {
        self.require_live()?;
        self.settings.lock().volume = level.clamp(0.0, 1.0);
        Ok(())
    }

    fn renegotiate_output_size(&mut self, size: FrameSize) -> Result<(), EngineError> {
        self.require_live()?;
        self.settings.lock().output_size = size;
        Ok(())
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        *self.state.lock() = EngineState::Released;
        self.join_workers();
    }
}
