//! Background event pump
//!
//! Drains engine events into a shared coordinator on a dedicated thread.
//! The pump holds the coordinator lock only while applying a batch.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::playback::PlaybackCoordinator;

/// Coordinator shared between the pump, the HTTP API and the binary
pub type SharedCoordinator = Arc<Mutex<PlaybackCoordinator>>;

pub struct EventPump {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventPump {
    /// Start pumping events every `interval`
    pub fn start(coordinator: SharedCoordinator, interval: Duration) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let thread = thread::Builder::new()
            .name("event-pump".into())
            .spawn(move || {
                tracing::debug!("Event pump started ({:?})", interval);
                while running_clone.load(Ordering::Relaxed) {
                    let handled = coordinator.lock().process_pending_events();
                    if handled > 0 {
                        tracing::trace!("Pumped {} engine events", handled);
                    }
                    thread::sleep(interval);
                }
                tracing::debug!("Event pump stopped");
            })?;

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.stop();
    }
}
