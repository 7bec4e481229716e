//! Focus controller
//!
//! Moves the focused designation between sessions and keeps the
//! index -> display slot table in step with it.

use serde::Serialize;

use crate::error::CoordinatorError;
use crate::protocol::{DisplaySlot, FocusChange, SessionState};
use crate::session::Session;

/// Which display slot each session drives
///
/// Built once at construction; only a focus swap rearranges it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotTable {
    slots: Vec<DisplaySlot>,
}

impl SlotTable {
    pub fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(DisplaySlot::initial_for).collect(),
        }
    }

    pub fn slot_of(&self, index: usize) -> Option<DisplaySlot> {
        self.slots.get(index).copied()
    }

    pub fn session_in(&self, slot: DisplaySlot) -> Option<usize> {
        self.slots.iter().position(|s| *s == slot)
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.slots.swap(a, b);
    }
}

/// Two distinct mutable sessions out of one slice
fn pair_mut(sessions: &mut [Session], a: usize, b: usize) -> (&mut Session, &mut Session) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = sessions.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = sessions.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

#[derive(Debug)]
pub struct FocusController {
    focused: Option<usize>,
    slots: SlotTable,
}

impl FocusController {
    pub fn new(count: usize) -> Self {
        Self {
            focused: None,
            slots: SlotTable::new(count),
        }
    }

    pub fn focused(&self) -> Option<usize> {
        self.focused
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub fn slot_of(&self, index: usize) -> DisplaySlot {
        self.slots
            .slot_of(index)
            .unwrap_or_else(|| DisplaySlot::initial_for(index))
    }

    /// First focus assignment; binds every session to its initial surface
    pub fn assign_initial(&mut self, sessions: &mut [Session], index: usize) {
        for session in sessions.iter() {
            session.bind_surface();
        }
        if let Some(session) = sessions.get_mut(index) {
            session.assign_focus(true);
            self.focused = Some(index);
            tracing::info!("Initial focus on session {}", index);
        }
    }

    /// Move focus to `target`
    ///
    /// Runs under the caller's exclusive borrow, so no observer can see two
    /// focused sessions or none. The new focus is upgraded before the old one
    /// is downgraded.
    pub fn swap(
        &mut self,
        sessions: &mut [Session],
        target: usize,
    ) -> Result<FocusChange, CoordinatorError> {
        let state = sessions
            .get(target)
            .map(Session::state)
            .ok_or(CoordinatorError::SessionNotFound(target))?;

        if self.focused == Some(target) {
            return Ok(FocusChange::Unchanged { index: target });
        }
        if matches!(state, SessionState::Released | SessionState::Failed) {
            return Err(CoordinatorError::InvalidFocusTarget {
                index: target,
                state,
            });
        }

        let previous = self.focused;
        match previous {
            Some(current) if current < sessions.len() => {
                let (old, new) = pair_mut(sessions, current, target);

                // 1. surfaces follow the slots
                Session::exchange_surfaces(old, new);
                self.slots.swap(current, target);

                // 2. then 3.
                new.assign_focus(true);
                old.assign_focus(false);

                // 4.
                new.renegotiate_frame_size();
                old.renegotiate_frame_size();
            }
            _ => {
                let new = &mut sessions[target];
                new.assign_focus(true);
                new.renegotiate_frame_size();
            }
        }

        self.focused = Some(target);
        tracing::info!("Focus moved from {:?} to session {}", previous, target);
        Ok(FocusChange::Moved {
            from: previous,
            to: target,
        })
    }

    /// Re-home focus after the focused session failed
    ///
    /// Picks the lowest-index session that is neither failed nor released.
    pub fn reassign_from_failed(&mut self, sessions: &mut [Session]) -> Option<FocusChange> {
        let current = self.focused?;
        if sessions.get(current).map(Session::state) != Some(SessionState::Failed) {
            return None;
        }

        let candidate = sessions
            .iter()
            .find(|s| !matches!(s.state(), SessionState::Failed | SessionState::Released))
            .map(Session::index)?;

        match self.swap(sessions, candidate) {
            Ok(change) => Some(change),
            Err(e) => {
                tracing::warn!("Could not move focus off failed session {}: {}", current, e);
                None
            }
        }
    }

    /// Drop focus entirely; used after full release
    pub fn clear(&mut self, sessions: &mut [Session]) {
        for session in sessions.iter_mut() {
            if session.is_focused() {
                session.assign_focus(false);
            }
        }
        self.focused = None;
    }
}
