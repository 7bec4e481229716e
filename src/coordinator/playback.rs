//! Playback coordinator facade
//!
//! Owns the ordered sessions and composes the readiness barrier, the focus
//! controller and the shutdown protocol. Every decision runs with `&mut self`,
//! so the coordinator is the single serialized control context; engine
//! threads only ever talk to it through the event channel.

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::{AppConfig, CoordinatorConfig, QualityConfig};
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::engine::{DecodeEngine, EngineEvent, EngineEventKind, EventSink};
use crate::error::{CoordinatorError, EngineError, SessionError};
use crate::protocol::{
    CoordinatorPhase, CoordinatorStatus, DisplaySlot, FocusChange, PauseReason, SessionState,
    SessionStatus, StreamSet,
};
use crate::session::Session;
use crate::surface::RenderSurface;

use super::barrier::{BarrierOutcome, ReadinessBarrier};
use super::clock::{Clock, SystemClock};
use super::events::CoordinatorEvent;
use super::focus::FocusController;
use super::shutdown::{ShutdownCoordinator, ShutdownPolicy, ShutdownReport};

/// Apply an engine event that arrives while the stop phase is waiting
fn apply_during_shutdown(sessions: &mut [Session], event: EngineEvent) {
    let Some(session) = sessions.get_mut(event.session) else {
        return;
    };
    match event.kind {
        EngineEventKind::StopComplete => {
            session.confirm_stopped();
        }
        EngineEventKind::Error(reason) => {
            session.fail(reason);
        }
        EngineEventKind::OpenComplete => {
            session.on_engine_ready();
        }
        EngineEventKind::StartComplete => {}
    }
}

pub struct PlaybackCoordinator {
    id: Uuid,
    created_at: DateTime<Utc>,
    config: CoordinatorConfig,
    quality: QualityConfig,
    streams: StreamSet,
    sessions: Vec<Session>,
    barrier: ReadinessBarrier,
    focus: FocusController,
    clock: Arc<dyn Clock>,
    event_tx: Sender<EngineEvent>,
    event_rx: Receiver<EngineEvent>,
    notify: broadcast::Sender<CoordinatorEvent>,
    phase: CoordinatorPhase,
    /// Sessions paused by `pause_all` that `resume_all` will resume
    paused: BTreeSet<usize>,
    pause_reason: Option<PauseReason>,
    all_failed_reported: bool,
}

impl PlaybackCoordinator {
    /// Create a coordinator for a fixed stream set
    pub fn new(config: &AppConfig, streams: StreamSet) -> Self {
        Self::with_clock(config, streams, Arc::new(SystemClock))
    }

    /// Create a coordinator whose shutdown wait uses `clock`
    pub fn with_clock(config: &AppConfig, streams: StreamSet, clock: Arc<dyn Clock>) -> Self {
        let (event_tx, event_rx) = unbounded();
        let (notify, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let count = streams.len();

        let coordinator = Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            config: config.coordinator.clone(),
            quality: config.quality,
            streams,
            sessions: Vec::with_capacity(count),
            barrier: ReadinessBarrier::new(count),
            focus: FocusController::new(count),
            clock,
            event_tx,
            event_rx,
            notify,
            phase: CoordinatorPhase::Registering,
            paused: BTreeSet::new(),
            pause_reason: None,
            all_failed_reported: false,
        };
        tracing::info!("Coordinator {} created for {} streams", coordinator.id, count);
        coordinator
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> CoordinatorPhase {
        self.phase
    }

    pub fn streams(&self) -> &StreamSet {
        &self.streams
    }

    pub fn focused(&self) -> Option<usize> {
        self.focus.focused()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn get_session(&self, index: usize) -> Option<&Session> {
        self.sessions.get(index)
    }

    /// Observe coordinator events
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.notify.subscribe()
    }

    /// Sink for delivering engine events for `index` from outside the engine
    pub fn event_sink(&self, index: usize) -> Option<EventSink> {
        (index < self.streams.len()).then(|| EventSink::new(index, self.event_tx.clone()))
    }

    /// Register the session for the next stream of the set
    ///
    /// `make_engine` receives the session's event sink. If it fails, the
    /// session is still registered, as Failed, and excluded from playback.
    pub fn register<F>(
        &mut self,
        make_engine: F,
        surface: Weak<dyn RenderSurface>,
    ) -> Result<usize, CoordinatorError>
    where
        F: FnOnce(EventSink) -> Result<Box<dyn DecodeEngine>, EngineError>,
    {
        if self.phase != CoordinatorPhase::Registering {
            return Err(CoordinatorError::RegistrationClosed);
        }
        let index = self.sessions.len();
        let uri = self
            .streams
            .uri(index)
            .ok_or(CoordinatorError::RegistrationClosed)?
            .to_string();

        let sink = EventSink::new(index, self.event_tx.clone());
        let session = match make_engine(sink) {
            Ok(engine) => Session::new(index, uri, self.quality, engine, surface),
            Err(e) => {
                let reason = SessionError::EngineInit {
                    index,
                    reason: e.to_string(),
                };
                Session::without_engine(index, uri, self.quality, surface, reason.to_string())
            }
        };

        tracing::debug!("Registered session {} ({})", index, session.uri());
        self.sessions.push(session);
        Ok(index)
    }

    /// Open every registered session and assign the initial focus
    ///
    /// Fails with `AllSessionsFailed` when no session can become ready.
    pub fn open_all(&mut self) -> Result<(), CoordinatorError> {
        if self.phase != CoordinatorPhase::Registering {
            return Err(CoordinatorError::RegistrationClosed);
        }
        if self.sessions.len() != self.streams.len() {
            return Err(CoordinatorError::IncompleteRegistration {
                expected: self.streams.len(),
                registered: self.sessions.len(),
            });
        }

        let before = self.snapshot();
        self.phase = CoordinatorPhase::Opening;

        for session in self.sessions.iter_mut() {
            if session.state() != SessionState::Uninitialized {
                continue;
            }
            if let Err(e) = session.open() {
                tracing::warn!("{}", e);
            }
        }

        // The primary stream takes focus unless it already failed
        let initial = self
            .sessions
            .iter()
            .find(|s| s.state() != SessionState::Failed)
            .map(Session::index);
        if let Some(index) = initial {
            self.focus.assign_initial(&mut self.sessions, index);
        }

        let result = self.evaluate_barrier().map(|_| ());
        self.publish_changes(&before);
        result
    }

    /// Apply one engine event
    pub fn handle_event(&mut self, event: EngineEvent) {
        let before = self.snapshot();
        self.apply_event(event);
        self.publish_changes(&before);
    }

    /// Drain and apply every queued engine event
    pub fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Open-completion for `index`; returns true if this fired the barrier
    pub fn notify_ready(&mut self, index: usize) -> Result<bool, CoordinatorError> {
        if index >= self.sessions.len() {
            return Err(CoordinatorError::SessionNotFound(index));
        }
        let fired_before = self.barrier.has_fired();
        self.handle_event(EngineEvent::new(index, EngineEventKind::OpenComplete));
        Ok(!fired_before && self.barrier.has_fired())
    }

    fn apply_event(&mut self, event: EngineEvent) {
        let index = event.session;
        let Some(session) = self.sessions.get_mut(index) else {
            tracing::warn!("Event for unknown session {}: {:?}", index, event.kind);
            return;
        };

        match event.kind {
            EngineEventKind::OpenComplete => {
                if session.on_engine_ready() {
                    let _ = self.evaluate_barrier();
                }
            }
            EngineEventKind::StartComplete => {
                tracing::debug!("Session {}: presentation started", index);
            }
            EngineEventKind::StopComplete => {
                session.confirm_stopped();
            }
            EngineEventKind::Error(reason) => self.on_session_error(index, reason),
        }
    }

    fn on_session_error(&mut self, index: usize, reason: String) {
        let session = &mut self.sessions[index];
        let reason = if session.state() == SessionState::Opening {
            SessionError::StreamOpen { index, reason }.to_string()
        } else {
            reason
        };
        if !session.fail(reason) {
            return;
        }

        if let Some(change) = self.focus.reassign_from_failed(&mut self.sessions) {
            self.emit(CoordinatorEvent::FocusChanged { change });
        }
        if self.phase == CoordinatorPhase::Opening {
            let _ = self.evaluate_barrier();
        }
    }

    /// Start everything if the barrier is satisfied
    fn evaluate_barrier(&mut self) -> Result<bool, CoordinatorError> {
        if self.pause_reason.is_some() {
            tracing::debug!("Barrier held while paused");
            return Ok(false);
        }

        match self.barrier.evaluate(&self.sessions) {
            BarrierOutcome::Fire(order) => {
                tracing::info!("All sessions ready, starting {:?}", order);
                for &index in &order {
                    self.sessions[index].start();
                }
                self.phase = CoordinatorPhase::Playing;
                if let Some(change) = self.focus.reassign_from_failed(&mut self.sessions) {
                    self.emit(CoordinatorEvent::FocusChanged { change });
                }
                self.emit(CoordinatorEvent::BarrierFired { order });
                Ok(true)
            }
            BarrierOutcome::AllFailed => {
                if !self.all_failed_reported {
                    self.all_failed_reported = true;
                    tracing::error!("Every session failed before becoming ready");
                    self.emit(CoordinatorEvent::AllSessionsFailed);
                }
                Err(CoordinatorError::AllSessionsFailed)
            }
            BarrierOutcome::Waiting { ready, pending } => {
                tracing::debug!("Barrier waiting: {} ready, {} pending", ready, pending);
                Ok(false)
            }
            BarrierOutcome::Inactive => Ok(false),
        }
    }

    /// True when every non-failed session has buffered
    pub fn is_all_ready(&self) -> bool {
        ReadinessBarrier::is_satisfied(self.streams.len(), &self.sessions)
    }

    /// Start all sessions if, and only if, they are all ready
    pub fn start_all(&mut self) -> Result<bool, CoordinatorError> {
        if self.phase == CoordinatorPhase::Registering {
            return Err(CoordinatorError::IncompleteRegistration {
                expected: self.streams.len(),
                registered: self.sessions.len(),
            });
        }
        let before = self.snapshot();
        let result = self.evaluate_barrier();
        self.publish_changes(&before);
        result
    }

    /// Move focus to `index`
    pub fn swap_focus(&mut self, index: usize) -> Result<FocusChange, CoordinatorError> {
        match self.phase {
            CoordinatorPhase::ShuttingDown
            | CoordinatorPhase::Stopped
            | CoordinatorPhase::Released => return Err(CoordinatorError::ShutdownInProgress),
            CoordinatorPhase::Registering => {
                return Err(CoordinatorError::IncompleteRegistration {
                    expected: self.streams.len(),
                    registered: self.sessions.len(),
                })
            }
            CoordinatorPhase::Opening | CoordinatorPhase::Playing => {}
        }

        let change = self.focus.swap(&mut self.sessions, index)?;
        if matches!(change, FocusChange::Moved { .. }) {
            self.emit(CoordinatorEvent::FocusChanged { change });
        }
        Ok(change)
    }

    /// The UI reported a click on a display slot
    pub fn on_surface_selected(&mut self, slot: DisplaySlot) -> Result<FocusChange, CoordinatorError> {
        let index = self
            .focus
            .slots()
            .session_in(slot)
            .ok_or(CoordinatorError::UnknownSlot)?;
        self.swap_focus(index)
    }

    /// Pause every playing session and hold the barrier
    ///
    /// Returns the sessions paused by this call. Repeated calls accumulate,
    /// so a later `resume_all` restores everything that was playing.
    pub fn pause_all(&mut self, reason: PauseReason) -> Vec<usize> {
        if !matches!(self.phase, CoordinatorPhase::Opening | CoordinatorPhase::Playing) {
            return Vec::new();
        }

        let before = self.snapshot();
        let paused: Vec<usize> = self
            .sessions
            .iter_mut()
            .filter_map(|s| s.pause().then(|| s.index()))
            .collect();
        self.paused.extend(paused.iter().copied());
        if self.pause_reason != Some(PauseReason::Interrupt) {
            self.pause_reason = Some(reason);
        }

        tracing::info!("Paused ({:?}): {:?}", reason, paused);
        self.emit(CoordinatorEvent::Paused {
            reason,
            sessions: paused.clone(),
        });
        self.publish_changes(&before);
        paused
    }

    /// Resume exactly the sessions `pause_all` paused
    pub fn resume_all(&mut self) -> Vec<usize> {
        if self.pause_reason.take().is_none() {
            return Vec::new();
        }

        let before = self.snapshot();
        let resumed: Vec<usize> = std::mem::take(&mut self.paused)
            .into_iter()
            .filter(|&index| self.sessions[index].resume())
            .collect();

        tracing::info!("Resumed {:?}", resumed);
        self.emit(CoordinatorEvent::Resumed {
            sessions: resumed.clone(),
        });

        if self.phase == CoordinatorPhase::Opening {
            let _ = self.evaluate_barrier();
        }
        self.publish_changes(&before);
        resumed
    }

    /// Stop every session within the configured bound
    ///
    /// Blocks the caller. On `ShutdownTimeout` every session has still been
    /// moved to Stopped and `release_all` may proceed.
    pub fn stop_all(&mut self) -> Result<ShutdownReport, CoordinatorError> {
        if self.phase == CoordinatorPhase::Released {
            return Ok(ShutdownReport::default());
        }

        let before = self.snapshot();
        self.phase = CoordinatorPhase::ShuttingDown;
        self.barrier.cancel();
        self.paused.clear();
        self.pause_reason = None;

        let policy = ShutdownPolicy::from(&self.config);
        let rx = &self.event_rx;
        let report = ShutdownCoordinator::new(policy, self.clock.as_ref()).stop_all(
            &mut self.sessions,
            |sessions| {
                while let Ok(event) = rx.try_recv() {
                    apply_during_shutdown(sessions, event);
                }
            },
        );

        self.phase = CoordinatorPhase::Stopped;
        tracing::info!(
            "Stopped {} sessions in {} ms ({} escalated, {} forced)",
            self.sessions.len(),
            report.elapsed_ms,
            report.escalated.len(),
            report.forced.len()
        );
        self.emit(CoordinatorEvent::ShutdownCompleted {
            report: report.clone(),
        });
        self.publish_changes(&before);

        if report.timed_out() {
            Err(CoordinatorError::ShutdownTimeout {
                forced: report.forced,
            })
        } else {
            Ok(report)
        }
    }

    /// Release every session; stops first if needed. Safe to call repeatedly.
    pub fn release_all(&mut self) {
        if self.phase == CoordinatorPhase::Released {
            return;
        }
        if !self.sessions.iter().all(|s| s.state().is_settled()) {
            if let Err(e) = self.stop_all() {
                tracing::warn!("{}", e);
            }
        }

        let before = self.snapshot();
        let errors = ShutdownCoordinator::release_all(&mut self.sessions);
        self.focus.clear(&mut self.sessions);
        self.phase = CoordinatorPhase::Released;

        tracing::info!(
            "Coordinator {} released ({} release errors)",
            self.id,
            errors.len()
        );
        self.emit(CoordinatorEvent::Released {
            errors: errors.len(),
        });
        self.publish_changes(&before);
    }

    pub fn session_status(&self, index: usize) -> Option<SessionStatus> {
        self.sessions
            .get(index)
            .map(|s| s.status(self.focus.slot_of(index)))
    }

    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            id: self.id,
            phase: self.phase,
            focused: self.focus.focused(),
            all_ready: self.is_all_ready(),
            started: self.barrier.has_fired(),
            paused: self.paused.iter().copied().collect(),
            created_at: self.created_at,
            sessions: self
                .sessions
                .iter()
                .map(|s| s.status(self.focus.slot_of(s.index())))
                .collect(),
        }
    }

    fn snapshot(&self) -> Vec<SessionState> {
        self.sessions.iter().map(Session::state).collect()
    }

    fn publish_changes(&self, before: &[SessionState]) {
        for (session, &from) in self.sessions.iter().zip(before) {
            if session.state() != from {
                self.emit(CoordinatorEvent::SessionStateChanged {
                    index: session.index(),
                    from,
                    to: session.state(),
                });
            }
        }
    }

    fn emit(&self, event: CoordinatorEvent) {
        // No subscribers is fine
        let _ = self.notify.send(event);
    }
}

impl Drop for PlaybackCoordinator {
    fn drop(&mut self) {
        self.release_all();
    }
}
