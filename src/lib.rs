//! # Multiview Player
//!
//! Synchronized playback of several live video streams in one view: a large
//! primary display plus smaller tiles, with one stream focused at a time.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                      PlaybackCoordinator                             │
//! │                                                                      │
//! │   ReadinessBarrier      FocusController        ShutdownCoordinator   │
//! │   (start together)      (slots, tiers)         (stop -> confirm ->   │
//! │                                                  escalate -> release)│
//! │                                                                      │
//! │  ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌───────────┐       │
//! │  │ Session 0 │   │ Session 1 │   │ Session 2 │   │ Session N │       │
//! │  │ (primary) │   │  (tile)   │   │  (tile)   │   │  (tile)   │       │
//! │  └─────┬─────┘   └─────┬─────┘   └─────┬─────┘   └─────┬─────┘       │
//! └────────┼───────────────┼───────────────┼───────────────┼─────────────┘
//!          │ commands      │               │               │
//!          ▼               ▼               ▼               ▼
//!    ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌───────────┐
//!    │  Decode   │   │  Decode   │   │  Decode   │   │  Decode   │
//!    │  Engine   │   │  Engine   │   │  Engine   │   │  Engine   │
//!    └─────┬─────┘   └─────┬─────┘   └─────┬─────┘   └─────┬─────┘
//!          │ EngineEvent (crossbeam channel)                │
//!          └───────────────┴──────────┬────┴────────────────┘
//!                                     ▼
//!                     EventPump ──► coordinator (one lock)
//!                                     │
//!                                     ▼
//!                     CoordinatorEvent broadcast ──► HTTP API (axum)
//! ```

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod session;
pub mod surface;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Maximum number of streams in one view
    pub const MAX_SESSIONS: usize = 16;

    /// Interval between shutdown confirmation checks
    pub const DEFAULT_SHUTDOWN_POLL_MS: u64 = 50;

    /// Confirmation checks before stragglers are forced
    pub const DEFAULT_SHUTDOWN_MAX_ITERATIONS: u32 = 40;

    /// Wall-time bound for the stop phase
    pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2000;

    /// Event pump interval
    pub const DEFAULT_EVENT_PUMP_MS: u64 = 5;

    /// Bandwidth ceiling for the focused stream (bits per second)
    pub const DEFAULT_FOCUSED_BANDWIDTH_BPS: u64 = 8_000_000;

    /// Bandwidth ceiling for background streams (bits per second)
    pub const DEFAULT_BACKGROUND_BANDWIDTH_BPS: u64 = 1_000_000;

    /// Default HTTP port for the control API
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Capacity of the coordinator event broadcast channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
}
