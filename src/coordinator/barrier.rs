//! Readiness barrier
//!
//! Withholds `start()` until every non-failed session is buffered, then
//! releases all of them in index order within one evaluation.

use crate::protocol::SessionState;
use crate::session::Session;

/// Result of evaluating the barrier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierOutcome {
    /// Still waiting on at least one session
    Waiting { ready: usize, pending: usize },
    /// Start these sessions, in this order
    Fire(Vec<usize>),
    /// No session can ever become ready
    AllFailed,
    /// Already fired or cancelled; nothing to do
    Inactive,
}

/// Level-triggered, single-shot barrier
#[derive(Debug)]
pub struct ReadinessBarrier {
    expected: usize,
    fired: bool,
    cancelled: bool,
}

impl ReadinessBarrier {
    /// Barrier over `expected` sessions
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            fired: false,
            cancelled: false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Never fire; used once shutdown begins
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Number of sessions in state >= Ready
    pub fn ready_count(sessions: &[Session]) -> usize {
        sessions
            .iter()
            .filter(|s| s.state().has_reached_ready())
            .count()
    }

    /// True when every non-failed session is ready and at least one is
    pub fn is_satisfied(expected: usize, sessions: &[Session]) -> bool {
        if sessions.len() != expected {
            return false;
        }
        let mut live = sessions
            .iter()
            .filter(|s| s.state() != SessionState::Failed)
            .peekable();
        live.peek().is_some() && live.all(|s| s.state().has_reached_ready())
    }

    /// Re-evaluate over the current session states
    ///
    /// Fires at most once. A session that becomes ready after the barrier
    /// fired is not started by it.
    pub fn evaluate(&mut self, sessions: &[Session]) -> BarrierOutcome {
        if self.fired || self.cancelled {
            return BarrierOutcome::Inactive;
        }

        if sessions.len() == self.expected
            && sessions.iter().all(|s| s.state() == SessionState::Failed)
        {
            return BarrierOutcome::AllFailed;
        }

        if !Self::is_satisfied(self.expected, sessions) {
            let ready = Self::ready_count(sessions);
            let failed = sessions
                .iter()
                .filter(|s| s.state() == SessionState::Failed)
                .count();
            return BarrierOutcome::Waiting {
                ready,
                pending: self.expected.saturating_sub(ready + failed),
            };
        }

        self.fired = true;
        let order = sessions
            .iter()
            .filter(|s| s.state() == SessionState::Ready)
            .map(Session::index)
            .collect();
        BarrierOutcome::Fire(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityConfig;
    use crate::engine::testing::{Behavior, Journal, RecordingEngine};
    use crate::engine::EventSink;
    use crate::surface::{HeadlessSurface, RenderSurface};
    use crossbeam_channel::unbounded;
    use proptest::prelude::*;
    use std::sync::Weak;

    fn opened(count: usize) -> Vec<Session> {
        let (tx, _rx) = unbounded();
        let journal = Journal::new();
        (0..count)
            .map(|i| {
                let engine = RecordingEngine::new(EventSink::new(i, tx.clone()), journal.clone(), Behavior::responsive());
                let surface: Weak<dyn RenderSurface> = Weak::<HeadlessSurface>::new();
                let mut s = Session::new(i, format!("s{}", i), QualityConfig::default(), Box::new(engine), surface);
                s.open().unwrap();
                s
            })
            .collect()
    }

    #[test]
    fn test_waits_for_all() {
        let mut sessions = opened(3);
        let mut barrier = ReadinessBarrier::new(3);

        sessions[1].on_engine_ready();
        sessions[2].on_engine_ready();
        assert_eq!(
            barrier.evaluate(&sessions),
            BarrierOutcome::Waiting { ready: 2, pending: 1 }
        );

        sessions[0].on_engine_ready();
        assert_eq!(barrier.evaluate(&sessions), BarrierOutcome::Fire(vec![0, 1, 2]));
        assert!(barrier.has_fired());
        assert_eq!(barrier.evaluate(&sessions), BarrierOutcome::Inactive);
    }

    #[test]
    fn test_failed_sessions_are_excluded() {
        let mut sessions = opened(3);
        let mut barrier = ReadinessBarrier::new(3);

        sessions[1].fail("decoder crashed");
        sessions[0].on_engine_ready();
        assert!(matches!(barrier.evaluate(&sessions), BarrierOutcome::Waiting { .. }));

        sessions[2].on_engine_ready();
        assert_eq!(barrier.evaluate(&sessions), BarrierOutcome::Fire(vec![0, 2]));
    }

    #[test]
    fn test_all_failed_never_fires() {
        let mut sessions = opened(2);
        let mut barrier = ReadinessBarrier::new(2);

        sessions[0].fail("x");
        sessions[1].fail("y");
        assert_eq!(barrier.evaluate(&sessions), BarrierOutcome::AllFailed);
        assert!(!barrier.has_fired());
    }

    #[test]
    fn test_incomplete_registration_never_fires() {
        let mut sessions = opened(2);
        let mut barrier = ReadinessBarrier::new(3);

        sessions[0].on_engine_ready();
        sessions[1].on_engine_ready();
        assert!(matches!(barrier.evaluate(&sessions), BarrierOutcome::Waiting { .. }));
    }

    #[test]
    fn test_cancelled_barrier_is_inactive() {
        let mut sessions = opened(1);
        let mut barrier = ReadinessBarrier::new(1);
        barrier.cancel();

        sessions[0].on_engine_ready();
        assert_eq!(barrier.evaluate(&sessions), BarrierOutcome::Inactive);
    }

    proptest! {
        #[test]
        fn prop_fires_only_on_last_ready(
            order in (1usize..8).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
        ) {
            let n = order.len();
            let mut sessions = opened(n);
            let mut barrier = ReadinessBarrier::new(n);

            for (step, &index) in order.iter().enumerate() {
                sessions[index].on_engine_ready();
                let outcome = barrier.evaluate(&sessions);
                if step + 1 < n {
                    let is_waiting = matches!(outcome, BarrierOutcome::Waiting { .. });
                    prop_assert!(is_waiting);
                } else {
                    prop_assert_eq!(outcome, BarrierOutcome::Fire((0..n).collect()));
                }
            }
        }
    }
}
