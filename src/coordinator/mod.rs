//! Multi-session coordination
//!
//! The [`PlaybackCoordinator`] owns every session of a view and decides when
//! they start, which one is focused and how they shut down.

pub mod barrier;
pub mod clock;
pub mod events;
pub mod focus;
pub mod playback;
pub mod pump;
pub mod shutdown;

pub use barrier::{BarrierOutcome, ReadinessBarrier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::CoordinatorEvent;
pub use focus::{FocusController, SlotTable};
pub use playback::PlaybackCoordinator;
pub use pump::{EventPump, SharedCoordinator};
pub use shutdown::{ShutdownCoordinator, ShutdownPolicy, ShutdownReport};
