//! One stream's decode/render pipeline and its lifecycle state

use std::sync::{Arc, Weak};

use crate::config::QualityConfig;
use crate::engine::DecodeEngine;
use crate::error::SessionError;
use crate::protocol::{BandwidthTier, DisplaySlot, SessionState, SessionStatus, Volume};
use crate::surface::{FrameSize, RenderSurface, SurfaceBinding};

use super::lifecycle::{self, Step, Trigger};

/// A single stream in the grid
///
/// Owns its engine exclusively; the render surface belongs to the UI layer
/// and is only referenced.
pub struct Session {
    index: usize,
    uri: String,
    state: SessionState,
    focused: bool,
    tier: BandwidthTier,
    volume: Volume,
    quality: QualityConfig,
    surface: Option<Weak<dyn RenderSurface>>,
    engine: Option<Box<dyn DecodeEngine>>,
    last_error: Option<String>,
}

impl Session {
    /// Create an unopened, unfocused session
    pub fn new(
        index: usize,
        uri: impl Into<String>,
        quality: QualityConfig,
        engine: Box<dyn DecodeEngine>,
        surface: Weak<dyn RenderSurface>,
    ) -> Self {
        Self {
            index,
            uri: uri.into(),
            state: SessionState::Uninitialized,
            focused: false,
            tier: BandwidthTier::Background,
            volume: Volume::Muted,
            quality,
            surface: Some(surface),
            engine: Some(engine),
            last_error: None,
        }
    }

    /// Session whose engine could not be constructed; starts out Failed
    pub fn without_engine(
        index: usize,
        uri: impl Into<String>,
        quality: QualityConfig,
        surface: Weak<dyn RenderSurface>,
        reason: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        tracing::warn!("Session {}: engine initialization failed: {}", index, reason);
        Self {
            index,
            uri: uri.into(),
            state: SessionState::Failed,
            focused: false,
            tier: BandwidthTier::Background,
            volume: Volume::Muted,
            quality,
            surface: Some(surface),
            engine: None,
            last_error: Some(reason),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn tier(&self) -> BandwidthTier {
        self.tier
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The surface, if the UI layer still holds it
    pub fn surface(&self) -> Option<Arc<dyn RenderSurface>> {
        self.surface.as_ref().and_then(Weak::upgrade)
    }

    pub fn status(&self, slot: DisplaySlot) -> SessionStatus {
        SessionStatus {
            index: self.index,
            uri: self.uri.clone(),
            state: self.state,
            focused: self.focused,
            tier: self.tier,
            volume: self.volume,
            slot,
            last_error: self.last_error.clone(),
        }
    }

    fn apply(&mut self, trigger: Trigger) -> Step {
        let step = lifecycle::step(self.state, trigger);
        match step {
            Step::Enter(next) => {
                tracing::debug!("Session {}: {} -> {} ({:?})", self.index, self.state, next, trigger);
                self.state = next;
            }
            Step::Stay => {
                tracing::debug!("Session {}: {:?} ignored while {}", self.index, trigger, self.state);
            }
            Step::Reject => {}
        }
        step
    }

    /// Whether `trigger` would move the session right now
    fn accepts(&self, trigger: Trigger) -> bool {
        matches!(lifecycle::step(self.state, trigger), Step::Enter(_))
    }

    /// Engine is buffered and takes quality settings
    fn engine_is_live(&self) -> bool {
        self.state.has_reached_ready() && self.engine.is_some()
    }

    /// Issue the asynchronous open; completion arrives as an engine event
    pub fn open(&mut self) -> Result<(), SessionError> {
        if lifecycle::step(self.state, Trigger::Open) == Step::Reject {
            return Err(SessionError::AlreadyOpened(self.index));
        }

        let result = match self.engine.as_mut() {
            Some(engine) => engine.open(&self.uri).map_err(|e| e.to_string()),
            None => Err("no engine".to_string()),
        };

        match result {
            Ok(()) => {
                self.apply(Trigger::Open);
                tracing::info!("Session {}: opening {}", self.index, self.uri);
                Ok(())
            }
            Err(reason) => {
                self.fail(reason.clone());
                Err(SessionError::EngineInit {
                    index: self.index,
                    reason,
                })
            }
        }
    }

    /// Engine finished buffering; returns true on the Opening -> Ready edge
    pub fn on_engine_ready(&mut self) -> bool {
        if !matches!(self.apply(Trigger::OpenComplete), Step::Enter(_)) {
            return false;
        }
        tracing::info!("Session {}: ready", self.index);
        self.push_quality();
        // The surface may have moved while the engine was still opening
        self.renegotiate_frame_size();
        true
    }

    /// Begin presentation; only the readiness barrier calls this
    pub fn start(&mut self) -> bool {
        if !self.accepts(Trigger::Start) {
            return false;
        }
        let result = match self.engine.as_mut() {
            Some(engine) => engine.start(),
            None => return false,
        };
        match result {
            Ok(()) => {
                self.apply(Trigger::Start);
                true
            }
            Err(e) => {
                self.fail(format!("start failed: {}", e));
                false
            }
        }
    }

    pub fn pause(&mut self) -> bool {
        if !self.accepts(Trigger::Pause) {
            return false;
        }
        if let Some(engine) = self.engine.as_mut() {
            if let Err(e) = engine.pause() {
                tracing::warn!("Session {}: pause failed: {}", self.index, e);
                return false;
            }
        }
        self.apply(Trigger::Pause);
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.accepts(Trigger::Resume) {
            return false;
        }
        if let Some(engine) = self.engine.as_mut() {
            if let Err(e) = engine.resume() {
                tracing::warn!("Session {}: resume failed: {}", self.index, e);
                return false;
            }
        }
        self.apply(Trigger::Resume);
        true
    }

    /// Move to Stopping and issue the asynchronous stop
    pub fn request_stop(&mut self) -> bool {
        if !matches!(self.apply(Trigger::RequestStop), Step::Enter(_)) {
            return false;
        }
        if let Some(engine) = self.engine.as_mut() {
            if let Err(e) = engine.request_stop() {
                tracing::warn!("Session {}: stop request failed: {}", self.index, e);
            }
        }
        true
    }

    /// Engine confirmed the stop
    pub fn confirm_stopped(&mut self) -> bool {
        matches!(self.apply(Trigger::StopComplete), Step::Enter(_))
    }

    /// Confirm a pending stop if the engine already reports stopped
    pub fn poll_stopped(&mut self) -> bool {
        if self.state != SessionState::Stopping {
            return false;
        }
        let stopped = self.engine.as_ref().map_or(true, |e| e.state().is_stopped());
        stopped && self.confirm_stopped()
    }

    /// Synchronous stop; transitions only if the engine actually stopped
    pub fn force_stop(&mut self) -> bool {
        if !self.accepts(Trigger::ForceStop) {
            return false;
        }
        let stopped = match self.engine.as_mut() {
            Some(engine) => {
                if let Err(e) = engine.stop_now() {
                    tracing::warn!("Session {}: synchronous stop failed: {}", self.index, e);
                }
                engine.state().is_stopped()
            }
            None => true,
        };
        stopped && matches!(self.apply(Trigger::ForceStop), Step::Enter(_))
    }

    /// Treat an unresponsive session as stopped
    pub fn mark_forced_stopped(&mut self) -> bool {
        let forced = matches!(self.apply(Trigger::ForceStop), Step::Enter(_));
        if forced {
            tracing::warn!("Session {}: engine never confirmed stop, forced to stopped", self.index);
        }
        forced
    }

    /// Free the engine and the surface binding
    ///
    /// Valid from Stopped or Failed. Calling it again is a no-op; the engine
    /// is taken out of the session so it can never be released twice. The
    /// session ends Released even when the engine reports an error.
    pub fn release(&mut self) -> Result<(), SessionError> {
        if !self.accepts(Trigger::Release) {
            if self.state != SessionState::Released {
                tracing::debug!("Session {}: release skipped while {}", self.index, self.state);
            }
            return Ok(());
        }

        let mut failures = Vec::new();
        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.close() {
                failures.push(e.to_string());
            }
            if let Err(e) = engine.release() {
                failures.push(e.to_string());
            }
        }

        if let Some(surface) = self.surface.take().and_then(|s| s.upgrade()) {
            surface.unbind();
        }

        self.focused = false;
        self.tier = BandwidthTier::Background;
        self.volume = Volume::Muted;
        self.apply(Trigger::Release);

        if failures.is_empty() {
            tracing::debug!("Session {}: released", self.index);
            Ok(())
        } else {
            Err(SessionError::Release {
                index: self.index,
                reason: failures.join("; "),
            })
        }
    }

    /// Record an unrecoverable engine error
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let failed = matches!(self.apply(Trigger::Fault), Step::Enter(_));
        if failed {
            tracing::warn!("Session {}: failed: {}", self.index, reason);
            self.last_error = Some(reason);
        } else {
            tracing::debug!("Session {}: late error ignored while {}: {}", self.index, self.state, reason);
        }
        failed
    }

    /// Change the bandwidth ceiling and let the engine re-select a rendition
    pub fn set_bandwidth(&mut self, tier: BandwidthTier) {
        if self.state == SessionState::Released {
            return;
        }
        self.tier = tier;
        if !self.engine_is_live() {
            return;
        }
        let ceiling = self.quality.ceiling(tier);
        if let Some(engine) = self.engine.as_mut() {
            if let Err(e) = engine.set_bandwidth_ceiling(ceiling).and_then(|_| engine.renegotiate()) {
                tracing::warn!("Session {}: bandwidth update failed: {}", self.index, e);
            }
        }
    }

    pub fn set_volume(&mut self, volume: Volume) {
        if self.state == SessionState::Released {
            return;
        }
        self.volume = volume;
        if !self.engine_is_live() {
            return;
        }
        let level = self.quality.level(volume);
        if let Some(engine) = self.engine.as_mut() {
            if let Err(e) = engine.set_volume(level) {
                tracing::warn!("Session {}: volume update failed: {}", self.index, e);
            }
        }
    }

    /// Set focus, tier and volume together
    pub fn assign_focus(&mut self, focused: bool) {
        self.focused = focused;
        if focused {
            self.set_bandwidth(BandwidthTier::Focused);
            self.set_volume(Volume::Full);
        } else {
            self.set_bandwidth(BandwidthTier::Background);
            self.set_volume(Volume::Muted);
        }
    }

    /// Push the current tier and volume to a freshly ready engine
    fn push_quality(&mut self) {
        self.set_bandwidth(self.tier);
        self.set_volume(self.volume);
    }

    /// Attach the referenced surface to this session
    pub fn bind_surface(&self) {
        if let Some(surface) = self.surface() {
            surface.bind(SurfaceBinding {
                session: self.index,
            });
        }
    }

    /// Exchange surfaces between two sessions and rebind both
    pub fn exchange_surfaces(a: &mut Session, b: &mut Session) {
        std::mem::swap(&mut a.surface, &mut b.surface);
        a.bind_surface();
        b.bind_surface();
    }

    /// Fit the decoded output to the current surface allocation
    pub fn renegotiate_frame_size(&mut self) -> Option<FrameSize> {
        if !self.engine_is_live() {
            return None;
        }
        let surface = self.surface()?;
        let size = FrameSize::fit_within(surface.intrinsic_content_size(), surface.allocated_size());
        if let Some(engine) = self.engine.as_mut() {
            if let Err(e) = engine.renegotiate_output_size(size) {
                tracing::warn!("Session {}: frame size renegotiation failed: {}", self.index, e);
                return None;
            }
        }
        Some(size)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("index", &self.index)
            .field("uri", &self.uri)
            .field("state", &self.state)
            .field("focused", &self.focused)
            .field("tier", &self.tier)
            .field("volume", &self.volume)
            .finish()
    }
}
