use std::{
    env,
    path::{Path, PathBuf},
    sync::mpsc as std_mpsc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tracing::info;
use vigia_capture::{MediaDevice, StillImageDevice, SyntheticDevice};
use vigia_network::{LocalChannel, RecognitionChannel, TcpChannel};
use vigia_ops::{init_tracing, TelemetryStore};
use vigia_orchestrator::{enroll, register_camera, DemoService, StreamController, UserCommand};
use vigia_types::{
    config::{DeviceKind, VigiaConfig},
    events::{ClientEvent, EventPayload},
};

mod ui;

use ui::UiMessage;

#[derive(Debug, Parser)]
#[command(name = "vigia", version, about = "Webcam capture and face annotation client")]
struct Cli {
    /// TOML configuration file (falls back to $VIGIA_CONFIG, then configs/dev.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Answer locally with the built-in demo service instead of connecting.
    #[arg(long, global = true)]
    offline: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stream the local camera and annotate recognition results.
    Watch {
        /// Ask the service for the additional camera streams at startup.
        #[arg(long)]
        multicam: bool,
        /// Show the terminal dashboard instead of plain logs.
        #[arg(long)]
        dashboard: bool,
    },
    /// Capture face samples and submit them under a name.
    Enroll {
        #[arg(long)]
        name: String,
    },
    /// Register an extra camera stream with the service.
    RegisterCamera {
        #[arg(long)]
        id: String,
        #[arg(long)]
        url: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());
    let command = cli.command.unwrap_or(Command::Watch {
        multicam: false,
        dashboard: false,
    });

    // Log lines would draw over the dashboard.
    if !matches!(command, Command::Watch { dashboard: true, .. }) {
        init_tracing(&config.ops)?;
    }

    let channel = build_channel(&config, cli.offline);
    let device = build_device(&config)?;
    match command {
        Command::Watch {
            multicam,
            dashboard,
        } => watch(config, channel, device, multicam, dashboard).await,
        Command::Enroll { name } => run_enroll(&config, channel, device, &name).await,
        Command::RegisterCamera { id, url } => {
            channel.connect().await?;
            let wait = Duration::from_millis(config.enrollment.reply_timeout_ms);
            let registered = register_camera(channel.as_ref(), &id, &url, wait).await?;
            println!("Camera {registered} registered");
            Ok(())
        }
    }
}

async fn watch(
    config: VigiaConfig,
    channel: Box<dyn RecognitionChannel>,
    device: Box<dyn MediaDevice>,
    multicam: bool,
    dashboard: bool,
) -> Result<()> {
    let telemetry = TelemetryStore::new();
    let mut controller = StreamController::new(&config, channel, device, telemetry.clone())?;
    let (commands, command_rx) = mpsc::channel(16);
    if multicam {
        commands.send(UserCommand::SetMulticam(true)).await?;
    }

    let events = controller.subscribe_events();
    let ui_task = if dashboard {
        let (ui_tx, ui_rx) = std_mpsc::channel();
        tokio::spawn(forward_to_ui(events, ui_tx));
        let ui_commands = commands.clone();
        let summary = config.summary();
        let display = config.display.clone();
        Some(tokio::task::spawn_blocking(move || {
            ui::run(ui_rx, ui_commands, summary, display)
        }))
    } else {
        tokio::spawn(report_alerts(events));
        None
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = commands.send(UserCommand::Shutdown).await;
        }
    });

    controller.run(command_rx).await;
    // Closing the event bus lets the dashboard wind down.
    drop(controller);
    if let Some(task) = ui_task {
        task.await.context("dashboard task failed")??;
    }

    let session = telemetry.session().await;
    info!(
        "Session ended: {} frame(s) sent ({} bytes), renders {:?}, {} alert(s)",
        session.frames_sent,
        session.bytes_sent,
        session.renders_by_camera,
        session.alerts.len()
    );
    Ok(())
}

async fn run_enroll(
    config: &VigiaConfig,
    channel: Box<dyn RecognitionChannel>,
    device: Box<dyn MediaDevice>,
    name: &str,
) -> Result<()> {
    channel.connect().await?;
    let source = device.open().await?;
    let outcome = enroll(channel.as_ref(), name, source.as_ref(), &config.enrollment).await;
    source.stop();

    let result = outcome?;
    if !result.ok {
        bail!("enrollment rejected: {}", result.msg);
    }
    match result.count {
        Some(count) => println!("{} ({count} sample(s) stored)", result.msg),
        None => println!("{}", result.msg),
    }
    Ok(())
}

fn build_channel(config: &VigiaConfig, offline: bool) -> Box<dyn RecognitionChannel> {
    if offline {
        let channel = LocalChannel::new(256);
        DemoService::new(
            channel.clone(),
            config.display.grid_tile_size,
            Duration::from_millis(config.capture.interval_ms),
        )
        .spawn();
        Box::new(channel)
    } else {
        Box::new(TcpChannel::from_config(&config.network))
    }
}

fn build_device(config: &VigiaConfig) -> Result<Box<dyn MediaDevice>> {
    Ok(match config.capture.device {
        DeviceKind::Synthetic => Box::new(SyntheticDevice::new(config.capture.synthetic_size)),
        DeviceKind::Still => {
            let path = config
                .capture
                .still_image
                .clone()
                .context("capture.still_image is required for the still device")?;
            Box::new(StillImageDevice::new(path))
        }
    })
}

async fn report_alerts(mut events: broadcast::Receiver<ClientEvent>) {
    loop {
        match events.recv().await {
            Ok(ClientEvent {
                payload: EventPayload::Alert { message },
                ..
            }) => eprintln!("ALERT: {message}"),
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
}

async fn forward_to_ui(
    mut events: broadcast::Receiver<ClientEvent>,
    ui: std_mpsc::Sender<UiMessage>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if ui.send(UiMessage::Event(event)).is_err() {
                    return;
                }
            }
            Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
    let _ = ui.send(UiMessage::Shutdown);
}

fn load_config(explicit: Option<&Path>) -> VigiaConfig {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var("VIGIA_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("configs/dev.toml"));
    match VigiaConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                default_config()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            default_config()
        }
    }
}

fn default_config() -> VigiaConfig {
    let config = VigiaConfig::default();
    debug_assert!(config.validate().is_ok());
    config
}
