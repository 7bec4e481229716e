//! Shutdown protocol
//!
//! stop -> confirm -> escalate -> release, applied to every session. The
//! confirmation wait is the only place the coordinator blocks its caller,
//! and it is bounded by both an iteration count and wall time.

use serde::Serialize;
use std::time::Duration;

use crate::config::CoordinatorConfig;
use crate::error::SessionError;
use crate::session::Session;

use super::clock::Clock;

/// Bounds for the confirmation wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownPolicy {
    pub poll_interval: Duration,
    pub max_iterations: u32,
    pub timeout: Duration,
}

impl From<&CoordinatorConfig> for ShutdownPolicy {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            poll_interval: config.shutdown_poll_interval(),
            max_iterations: config.shutdown_max_iterations,
            timeout: config.shutdown_timeout(),
        }
    }
}

/// What the stop phase had to do
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Wait-loop iterations (each one poll interval)
    pub iterations: u32,
    pub elapsed_ms: u64,
    /// Sessions that were sent an asynchronous stop
    pub requested: Vec<usize>,
    /// Sessions stopped by a synchronous re-issued stop
    pub escalated: Vec<usize>,
    /// Sessions that never confirmed within the bound
    pub forced: Vec<usize>,
}

impl ShutdownReport {
    pub fn timed_out(&self) -> bool {
        !self.forced.is_empty()
    }
}

fn all_settled(sessions: &[Session]) -> bool {
    sessions.iter().all(|s| s.state().is_settled())
}

pub struct ShutdownCoordinator<'a> {
    policy: ShutdownPolicy,
    clock: &'a dyn Clock,
}

impl<'a> ShutdownCoordinator<'a> {
    pub fn new(policy: ShutdownPolicy, clock: &'a dyn Clock) -> Self {
        Self { policy, clock }
    }

    /// Drive every session to Stopped (or Failed)
    ///
    /// `drain` is called once per iteration to apply engine events that
    /// arrived in the meantime. Sessions still unconfirmed when the bound
    /// is reached are marked stopped and listed in `forced`.
    pub fn stop_all<F>(&self, sessions: &mut [Session], mut drain: F) -> ShutdownReport
    where
        F: FnMut(&mut [Session]),
    {
        let started = self.clock.now();
        let mut report = ShutdownReport::default();

        for session in sessions.iter_mut() {
            if session.request_stop() {
                report.requested.push(session.index());
            }
        }

        loop {
            drain(sessions);
            for session in sessions.iter_mut() {
                session.poll_stopped();
            }
            if all_settled(sessions) {
                break;
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            if report.iterations >= self.policy.max_iterations || elapsed >= self.policy.timeout {
                for session in sessions.iter_mut() {
                    if !session.state().is_settled() && session.mark_forced_stopped() {
                        report.forced.push(session.index());
                    }
                }
                tracing::warn!(
                    "Shutdown bound reached after {} iterations ({:?}); forced sessions {:?}",
                    report.iterations,
                    elapsed,
                    report.forced
                );
                break;
            }

            // Give asynchronous confirmations one interval before escalating
            if report.iterations > 0 {
                for session in sessions.iter_mut() {
                    if !session.state().is_settled() && session.force_stop() {
                        tracing::debug!("Session {} stopped by escalation", session.index());
                        report.escalated.push(session.index());
                    }
                }
                if all_settled(sessions) {
                    break;
                }
            }

            self.clock.sleep(self.policy.poll_interval);
            report.iterations += 1;
        }

        report.elapsed_ms = self
            .clock
            .now()
            .saturating_duration_since(started)
            .as_millis() as u64;
        report
    }

    /// Release every session; failures are logged and do not stop the rest
    pub fn release_all(sessions: &mut [Session]) -> Vec<SessionError> {
        let mut errors = Vec::new();
        for session in sessions.iter_mut() {
            if let Err(e) = session.release() {
                tracing::warn!("{}", e);
                errors.push(e);
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityConfig;
    use crate::coordinator::clock::ManualClock;
    use crate::engine::testing::{Behavior, Call, Journal, RecordingEngine};
    use crate::engine::{EngineEvent, EngineEventKind, EventSink};
    use crate::protocol::SessionState;
    use crate::surface::{HeadlessSurface, RenderSurface};
    use crossbeam_channel::{unbounded, Receiver};
    use std::sync::Weak;

    fn policy() -> ShutdownPolicy {
        ShutdownPolicy {
            poll_interval: Duration::from_millis(10),
            max_iterations: 5,
            timeout: Duration::from_secs(1),
        }
    }

    fn build(behaviors: &[Behavior], journal: &Journal) -> (Vec<Session>, Receiver<EngineEvent>) {
        let (tx, rx) = unbounded();
        let sessions = behaviors
            .iter()
            .enumerate()
            .map(|(i, behavior)| {
                let engine = RecordingEngine::new(EventSink::new(i, tx.clone()), journal.clone(), *behavior);
                let surface: Weak<dyn RenderSurface> = Weak::<HeadlessSurface>::new();
                Session::new(i, format!("s{}", i), QualityConfig::default(), Box::new(engine), surface)
            })
            .collect();
        (sessions, rx)
    }

    fn drain_from(rx: &Receiver<EngineEvent>) -> impl FnMut(&mut [Session]) + '_ {
        move |sessions: &mut [Session]| {
            while let Ok(event) = rx.try_recv() {
                if event.kind == EngineEventKind::StopComplete {
                    sessions[event.session].confirm_stopped();
                }
            }
        }
    }

    fn start_playing(sessions: &mut [Session]) {
        for s in sessions.iter_mut() {
            s.open().unwrap();
            s.on_engine_ready();
            s.start();
        }
    }

    #[test]
    fn test_confirmed_stops_need_no_escalation() {
        let journal = Journal::new();
        let (mut sessions, rx) = build(&[Behavior::responsive(); 3], &journal);
        start_playing(&mut sessions);

        let clock = ManualClock::new();
        let report = ShutdownCoordinator::new(policy(), &clock).stop_all(&mut sessions, drain_from(&rx));

        assert_eq!(report.requested, vec![0, 1, 2]);
        assert!(report.escalated.is_empty());
        assert!(!report.timed_out());
        assert_eq!(report.iterations, 0);
        assert!(sessions.iter().all(|s| s.state() == SessionState::Stopped));
    }

    #[test]
    fn test_silent_engine_is_escalated() {
        let journal = Journal::new();
        let silent = Behavior {
            silent_stop: true,
            ..Behavior::default()
        };
        let (mut sessions, rx) = build(&[silent, Behavior::responsive()], &journal);
        start_playing(&mut sessions);

        let clock = ManualClock::new();
        let report = ShutdownCoordinator::new(policy(), &clock).stop_all(&mut sessions, drain_from(&rx));

        assert_eq!(report.escalated, vec![0]);
        assert!(report.forced.is_empty());
        assert_eq!(journal.count(0, &Call::StopNow), 1);
        assert_eq!(sessions[0].state(), SessionState::Stopped);
    }

    #[test]
    fn test_hung_engine_is_bounded_by_iterations() {
        let journal = Journal::new();
        let (mut sessions, rx) = build(&[Behavior::responsive(), Behavior::hung()], &journal);
        start_playing(&mut sessions);

        let clock = ManualClock::new();
        let report = ShutdownCoordinator::new(policy(), &clock).stop_all(&mut sessions, drain_from(&rx));

        assert_eq!(report.iterations, 5);
        assert_eq!(report.forced, vec![1]);
        assert!(report.timed_out());
        assert_eq!(clock.slept(), Duration::from_millis(50));
        assert!(sessions.iter().all(|s| s.state() == SessionState::Stopped));
        // Re-issued on every iteration after the first
        assert_eq!(journal.count(1, &Call::StopNow), 4);
    }

    #[test]
    fn test_hung_engine_is_bounded_by_time() {
        let journal = Journal::new();
        let (mut sessions, rx) = build(&[Behavior::hung()], &journal);
        start_playing(&mut sessions);

        let policy = ShutdownPolicy {
            poll_interval: Duration::from_millis(100),
            max_iterations: 1_000,
            timeout: Duration::from_millis(250),
        };
        let clock = ManualClock::new();
        let report = ShutdownCoordinator::new(policy, &clock).stop_all(&mut sessions, drain_from(&rx));

        assert_eq!(report.iterations, 3);
        assert_eq!(report.forced, vec![0]);
        assert_eq!(report.elapsed_ms, 300);
    }

    #[test]
    fn test_failed_sessions_are_skipped() {
        let journal = Journal::new();
        let (mut sessions, rx) = build(&[Behavior::responsive(), Behavior::responsive()], &journal);
        start_playing(&mut sessions);
        sessions[1].fail("decoder crashed");

        let clock = ManualClock::new();
        let report = ShutdownCoordinator::new(policy(), &clock).stop_all(&mut sessions, drain_from(&rx));

        assert_eq!(report.requested, vec![0]);
        assert_eq!(journal.count(1, &Call::RequestStop), 0);
        assert_eq!(sessions[1].state(), SessionState::Failed);
    }

    #[test]
    fn test_release_all_continues_past_errors() {
        let journal = Journal::new();
        let bad = Behavior {
            fail_release: true,
            ..Behavior::default()
        };
        let (mut sessions, rx) = build(&[bad, Behavior::responsive()], &journal);
        start_playing(&mut sessions);

        let clock = ManualClock::new();
        ShutdownCoordinator::new(policy(), &clock).stop_all(&mut sessions, drain_from(&rx));

        let errors = ShutdownCoordinator::release_all(&mut sessions);
        assert_eq!(errors.len(), 1);
        assert!(sessions.iter().all(|s| s.state() == SessionState::Released));

        assert!(ShutdownCoordinator::release_all(&mut sessions).is_empty());
        assert_eq!(journal.count(0, &Call::Release), 1);
        assert_eq!(journal.count(1, &Call::Release), 1);
    }
}
