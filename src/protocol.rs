//! Shared data types
//!
//! Serializable types exchanged between the coordinator, its observers and
//! the control API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::MAX_SESSIONS;
use crate::error::CoordinatorError;

/// Lifecycle state of a single session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Opening,
    Ready,
    Playing,
    Paused,
    Stopping,
    Stopped,
    Released,
    Failed,
}

impl SessionState {
    /// Ready, or already past Ready without having been asked to stop
    pub fn has_reached_ready(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Playing | SessionState::Paused)
    }

    /// States a stop request can still act on
    pub fn is_pre_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Uninitialized
                | SessionState::Opening
                | SessionState::Ready
                | SessionState::Playing
                | SessionState::Paused
        )
    }

    /// Nothing more for shutdown to wait on
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            SessionState::Stopped | SessionState::Released | SessionState::Failed
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Opening => "opening",
            SessionState::Ready => "ready",
            SessionState::Playing => "playing",
            SessionState::Paused => "paused",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Released => "released",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Quality tier pushed to a session's decode engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandwidthTier {
    Focused,
    Background,
}

/// Audio routing for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Volume {
    Muted,
    Full,
}

/// Region of the view a session renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplaySlot {
    Primary,
    Tile(usize),
}

impl DisplaySlot {
    /// Slot a session occupies before any focus swap
    pub fn initial_for(index: usize) -> Self {
        if index == 0 {
            DisplaySlot::Primary
        } else {
            DisplaySlot::Tile(index - 1)
        }
    }
}

impl std::str::FromStr for DisplaySlot {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("primary") {
            return Ok(DisplaySlot::Primary);
        }
        s.parse::<usize>()
            .map(DisplaySlot::Tile)
            .map_err(|_| CoordinatorError::UnknownSlot)
    }
}

/// Why playback was paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseReason {
    User,
    /// System-level interruption (suspend, audio focus loss, ...)
    Interrupt,
}

/// One entry of the stream list handed over by the catalog lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSource {
    pub uri: String,
    #[serde(default)]
    pub primary: bool,
}

impl StreamSource {
    pub fn new(uri: impl Into<String>, primary: bool) -> Self {
        Self {
            uri: uri.into(),
            primary,
        }
    }
}

/// Immutable, validated set of streams for one coordinator
///
/// The primary stream always sits at index 0; the other streams keep the
/// order they were listed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSet {
    uris: Vec<String>,
}

impl StreamSet {
    /// Build a set from the catalog list, moving the primary entry to the front
    pub fn from_sources(sources: Vec<StreamSource>) -> Result<Self, CoordinatorError> {
        if sources.is_empty() {
            return Err(CoordinatorError::EmptyStreamSet);
        }
        if sources.len() > MAX_SESSIONS {
            return Err(CoordinatorError::TooManyStreams(sources.len()));
        }
        if let Some(pos) = sources.iter().position(|s| s.uri.trim().is_empty()) {
            return Err(CoordinatorError::BlankUri(pos));
        }

        let primaries = sources.iter().filter(|s| s.primary).count();
        if primaries != 1 {
            return Err(CoordinatorError::PrimaryCount(primaries));
        }

        let (primary, rest): (Vec<_>, Vec<_>) = sources.into_iter().partition(|s| s.primary);
        let uris = primary
            .into_iter()
            .chain(rest)
            .map(|s| s.uri)
            .collect();

        Ok(Self { uris })
    }

    /// First URI is the primary stream
    pub fn from_uris<I, S>(uris: I) -> Result<Self, CoordinatorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources = uris
            .into_iter()
            .enumerate()
            .map(|(i, uri)| StreamSource::new(uri, i == 0))
            .collect();
        Self::from_sources(sources)
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    pub fn uri(&self, index: usize) -> Option<&str> {
        self.uris.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.uris.iter().map(String::as_str)
    }
}

/// Snapshot of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub index: usize,
    pub uri: String,
    pub state: SessionState,
    pub focused: bool,
    pub tier: BandwidthTier,
    pub volume: Volume,
    pub slot: DisplaySlot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Phase of the coordinator as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorPhase {
    Registering,
    Opening,
    Playing,
    ShuttingDown,
    Stopped,
    Released,
}

/// Snapshot of the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub id: Uuid,
    pub phase: CoordinatorPhase,
    pub focused: Option<usize>,
    pub all_ready: bool,
    pub started: bool,
    pub paused: Vec<usize>,
    pub created_at: DateTime<Utc>,
    pub sessions: Vec<SessionStatus>,
}

/// Outcome of a focus swap request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FocusChange {
    Unchanged { index: usize },
    Moved { from: Option<usize>, to: usize },
}
