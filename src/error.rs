//! Error types for the multiview playback coordinator

use thiserror::Error;

use crate::protocol::SessionState;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a decode/render engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine initialization failed: {0}")]
    InitFailed(String),

    #[error("Engine command '{command}' failed: {reason}")]
    CommandFailed {
        command: &'static str,
        reason: String,
    },

    #[error("Engine has no open stream")]
    NotOpen,

    #[error("Engine already released")]
    Released,
}

impl EngineError {
    pub fn command(command: &'static str, reason: impl Into<String>) -> Self {
        EngineError::CommandFailed {
            command,
            reason: reason.into(),
        }
    }
}

/// Per-session errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session {index}: engine failed to initialize: {reason}")]
    EngineInit { index: usize, reason: String },

    #[error("Session {index}: stream failed to open: {reason}")]
    StreamOpen { index: usize, reason: String },

    #[error("Session {0} was already opened")]
    AlreadyOpened(usize),

    #[error("Session {index}: release failed: {reason}")]
    Release { index: usize, reason: String },
}

/// Coordinator-level conditions surfaced to callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Stream set is empty")]
    EmptyStreamSet,

    #[error("Stream set must flag exactly one primary stream, found {0}")]
    PrimaryCount(usize),

    #[error("Stream set has {0} entries, maximum is {max}", max = crate::constants::MAX_SESSIONS)]
    TooManyStreams(usize),

    #[error("Stream {0} has an empty URI")]
    BlankUri(usize),

    #[error("Session not found: {0}")]
    SessionNotFound(usize),

    #[error("No session is bound to the selected display slot")]
    UnknownSlot,

    #[error("Registration is closed")]
    RegistrationClosed,

    #[error("Only {registered} of {expected} sessions registered")]
    IncompleteRegistration { expected: usize, registered: usize },

    #[error("Every session failed before becoming ready")]
    AllSessionsFailed,

    #[error("Shutdown exceeded its bound; sessions {forced:?} were forced to stop")]
    ShutdownTimeout { forced: Vec<usize> },

    #[error("Shutdown in progress")]
    ShutdownInProgress,

    #[error("Session {index} cannot take focus while {state}")]
    InvalidFocusTarget { index: usize, state: SessionState },
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
