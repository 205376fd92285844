//! rust_opi: serve one OPI client over TCP.
//!
//! Pressing Enter on stdin acts as the subject's response button.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rust_opi::camera::{SampleCorrelator, SimulatedCamera};
use rust_opi::config::Settings;
use rust_opi::host::UpdateLoop;
use rust_opi::instrument::display::Display;
use rust_opi::instrument::mock::MockInstrument;
use rust_opi::instrument::relay::Relay;
use rust_opi::instrument::DeviceRegistry;
use rust_opi::presentation::{EngineHandle, NullRenderer, PresentationEngine, SampleTiming};
use rust_opi::session::Session;
use rust_opi::timing::{Clock, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rust_opi", version, about = "OPI perimetry control runtime")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Device to serve: display, relay or mock
    #[arg(short, long)]
    machine: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.application.log_level.to_lowercase()));
    if settings.application.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Engine, update loop and optional camera behind the display device.
struct DisplayHost {
    handle: EngineHandle,
    update_loop: UpdateLoop,
    camera: Option<SimulatedCamera>,
}

impl DisplayHost {
    fn start(settings: &Settings) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let mut camera = None;
        let correlator = if settings.camera.enabled {
            let (correlator, link) = SampleCorrelator::new(settings.camera.queue_capacity);
            if settings.camera.simulated {
                camera = Some(SimulatedCamera::spawn(
                    link,
                    clock.clone(),
                    Duration::from_millis(settings.camera.latency_ms),
                ));
            }
            Some(correlator)
        } else {
            None
        };
        let timing = SampleTiming {
            max_wait: settings.camera.max_wait(),
            poll_interval: settings.camera.poll_interval(),
        };
        let (engine, handle) = PresentationEngine::new(NullRenderer, clock, correlator, timing);
        let update_loop = UpdateLoop::spawn(engine, settings.display.frame_interval());
        Self {
            handle,
            update_loop,
            camera,
        }
    }

    fn stop(mut self) {
        self.update_loop.stop();
        if let Some(camera) = self.camera.as_mut() {
            camera.stop();
        }
    }
}

fn registry(settings: &Settings, engine: Option<EngineHandle>) -> DeviceRegistry {
    let mut registry = DeviceRegistry::new();
    if let Some(engine) = engine {
        let display = settings.display.clone();
        registry.register("display", move |_name| {
            Box::new(Display::new(engine.clone(), display.clone()))
        });
    }
    registry.register("relay", |_name| Box::new(Relay::default()));
    registry.register("mock", |_name| Box::new(MockInstrument::new()));
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(machine) = cli.machine {
        settings.server.machine = machine;
    }
    if cli.json_logs {
        settings.application.json_logs = true;
    }
    settings.validate().context("Invalid configuration")?;

    init_logging(&settings);
    info!(name = %settings.application.name, machine = %settings.server.machine, "Starting");

    let host = (settings.server.machine == "display").then(|| DisplayHost::start(&settings));
    let registry = registry(&settings, host.as_ref().map(|h| h.handle.clone()));
    let device = registry.create(&settings.server.machine).ok_or_else(|| {
        anyhow!(
            "Unknown machine '{}'. Available: {}",
            settings.server.machine,
            registry.list().join(", ")
        )
    })?;

    let session = Session::bind(settings.server.socket_addr(), device)
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.socket_addr()))?;
    info!(id = %session.id(), addr = %session.local_addr(), "Waiting for a client");

    if let Some(host) = &host {
        let button = host.handle.button();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(_)) = lines.next_line().await {
                if !button.press() {
                    warn!("Response dropped");
                }
            }
        });
    }

    tokio::select! {
        _ = session.closed() => {}
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Interrupted"),
            Err(e) => {
                warn!(error = %e, "Cannot listen for Ctrl-C");
                session.closed().await;
            }
        },
    }
    session.shutdown().await;

    if let Some(host) = host {
        host.stop();
    }
    info!("Stopped");
    Ok(())
}
