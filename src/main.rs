//! camtest: multi-camera diagnostic harness

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use camtest::device::StreamPlan;
use camtest::display::{DisplaySurface, HeadlessDisplay};
use camtest::pipeline::PollLoop;
use camtest::{Config, DisplayBackend};
use color_eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("camtest=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("camtest launching...");

    let config = Config::load(std::env::args_os().nth(1).map(PathBuf::from).as_deref())?;

    let selection = config.device.selection()?;
    let mut device = config.device.open_device(&selection)?;
    let cameras = device.connected_cameras();
    info!("Connected cameras:");
    for cam in &cameras {
        info!(
            "  {} ({}) {} {}x{} autofocus={} types={:?}",
            cam.socket,
            cam.socket.option_name(),
            cam.sensor_name,
            cam.width,
            cam.height,
            cam.has_autofocus,
            cam.supported_types
        );
    }

    let plan = StreamPlan::build(
        &selection,
        &cameras,
        device.calibration(),
        &config.device.plan_options(),
        config.device.fps,
    )?;
    let session = device.start(&plan, config.pipeline.queue_depth)?;

    let display = open_display(&config)?;
    let mut poll = PollLoop::new(&plan, session, display, config.loop_options());

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });

    poll.run(&shutdown)?;

    // Windows go away before the device threads are joined
    drop(poll);
    drop(device);
    info!("camtest shutting down");
    Ok(())
}

fn open_display(config: &Config) -> Result<Box<dyn DisplaySurface>> {
    match config.display.backend {
        #[cfg(feature = "sdl-display")]
        DisplayBackend::Sdl => Ok(Box::new(camtest::display::Sdl2Display::new(
            config.display.clone(),
        )?)),
        #[cfg(not(feature = "sdl-display"))]
        DisplayBackend::Sdl => {
            tracing::warn!("Built without the `sdl-display` feature, falling back to headless");
            Ok(Box::new(HeadlessDisplay::stdin()))
        }
        DisplayBackend::Headless => {
            info!("Headless display, type keys followed by Enter");
            Ok(Box::new(HeadlessDisplay::stdin()))
        }
    }
}
