//! Per-stream sessions
//!
//! A session pairs one decode engine with its lifecycle state machine.

pub mod lifecycle;
pub mod pipeline;

pub use lifecycle::{Step, Trigger};
pub use pipeline::Session;
