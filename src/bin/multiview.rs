//! Multiview demo application
//!
//! Plays the stream URIs given on the command line through simulated
//! engines and headless surfaces, and serves the control API.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multiview_player::{
    config::AppConfig,
    coordinator::{EventPump, PlaybackCoordinator, SharedCoordinator},
    engine::{simulated::SimulationTiming, DecodeEngine, SimulatedEngine},
    protocol::StreamSet,
    surface::{FrameSize, HeadlessSurface, RenderSurface},
    ui::WebServer,
};

const DEMO_STREAMS: [&str; 4] = [
    "rtsp://demo.local/stage",
    "rtsp://demo.local/crowd",
    "rtsp://demo.local/backstage",
    "rtsp://demo.local/aerial",
];

const PRIMARY_SIZE: FrameSize = FrameSize {
    width: 1280,
    height: 720,
};
const TILE_SIZE: FrameSize = FrameSize {
    width: 320,
    height: 180,
};
const CONTENT_SIZE: FrameSize = FrameSize {
    width: 1920,
    height: 1080,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Multiview Player");

    let config = AppConfig::load_or_default().context("loading configuration")?;
    config.validate()?;

    let mut uris: Vec<String> = std::env::args().skip(1).collect();
    if uris.is_empty() {
        uris = DEMO_STREAMS.iter().map(|s| s.to_string()).collect();
    }
    let streams = StreamSet::from_uris(uris)?;

    println!("\n=== Streams ===");
    for (index, uri) in streams.iter().enumerate() {
        let role = if index == 0 { " [PRIMARY]" } else { "" };
        println!("  {}: {}{}", index, uri, role);
    }
    println!();

    let mut coordinator = PlaybackCoordinator::new(&config, streams);

    // Surfaces must outlive the sessions that render into them
    let surfaces: Vec<Arc<HeadlessSurface>> = (0..coordinator.streams().len())
        .map(|index| {
            let allocated = if index == 0 { PRIMARY_SIZE } else { TILE_SIZE };
            Arc::new(HeadlessSurface::new(allocated, CONTENT_SIZE))
        })
        .collect();

    for (index, surface) in surfaces.iter().enumerate() {
        let timing = SimulationTiming::for_session(&config.simulation, index);
        let weak: Weak<dyn RenderSurface> = Arc::downgrade(surface) as Weak<dyn RenderSurface>;
        coordinator.register(
            move |sink| Ok(Box::new(SimulatedEngine::new(sink, timing)) as Box<dyn DecodeEngine>),
            weak,
        )?;
    }

    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::info!("event: {}", json),
                    Err(e) => tracing::warn!("Unserializable event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event log lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    coordinator.open_all()?;

    let shared: SharedCoordinator = Arc::new(Mutex::new(coordinator));
    let mut pump = EventPump::start(shared.clone(), config.coordinator.event_pump_interval())?;

    if config.ui.enabled {
        let web_server = WebServer::new(config.ui.clone(), shared.clone());
        let _web_handle = web_server.start_background();
        tracing::info!(
            "Control API available at http://{}:{}",
            config.ui.bind_address,
            config.ui.http_port
        );
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    pump.stop();
    tokio::task::spawn_blocking(move || {
        let mut coordinator = shared.lock();
        match coordinator.stop_all() {
            Ok(report) => tracing::info!("Stopped cleanly in {} ms", report.elapsed_ms),
            Err(e) => tracing::warn!("{}", e),
        }
        coordinator.release_all();
    })
    .await?;

    drop(surfaces);
    tracing::info!("Multiview Player stopped");
    Ok(())
}
