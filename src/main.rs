//! AxSlime CLI
//!
//! - `run`: relay rig telemetry to SlimeVR and serve OSC haptics (default)
//! - `monitor`: print decoded rig telemetry
//! - `command`: send a one-shot rig command
//! - `config`: generate a default config file

use axslime::axis::{AxisCommander, AxisOutputData, NodeBinding, Rgb, NODE_COUNT};
use axslime::config::{generate_default_config, Config, LoggingConfig};
use axslime::{AxisSession, Bridge, HapticsRouter, OscServer};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "axslime")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Axis rig to SlimeVR bridge with OSC haptics")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Relay rig telemetry to SlimeVR and route OSC haptics
    Run,

    /// Print decoded rig telemetry
    Monitor {
        /// Emit one JSON object per sample
        #[arg(long)]
        json: bool,
        /// Minimum time between printed samples (ms)
        #[arg(long, default_value = "500")]
        interval_ms: u64,
    },

    /// Send a command to the rig
    Command {
        #[command(subcommand)]
        action: RigAction,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum RigAction {
    /// Start telemetry streaming
    Start,
    /// Stop telemetry streaming
    Stop,
    /// Reboot and recalibrate the rig
    Reboot,
    /// Zero all node orientations
    Zero,
    /// Single-pose calibration
    Calibrate,
    /// Vibrate a node
    Vibrate {
        /// Node name (e.g. LeftHand) or index
        node: String,
        /// Intensity 0.0 - 1.0
        #[arg(short, long, default_value = "1.0")]
        intensity: f32,
        /// Duration in seconds (max 25.5)
        #[arg(short, long, default_value = "1.0")]
        duration: f32,
    },
    /// Set a node's LED color
    Led {
        /// Node name (e.g. LeftHand) or index
        node: String,
        r: u8,
        g: u8,
        b: u8,
        /// Brightness 0.0 - 1.0
        #[arg(long, default_value = "1.0")]
        brightness: f32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Commands::Config { output }) = &cli.command {
        let config = generate_default_config();
        match output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, &config)?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", config),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_tracing(&config.logging);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await?,
        Commands::Monitor { json, interval_ms } => {
            monitor(config, json, Duration::from_millis(interval_ms)).await?
        }
        Commands::Command { action } => send_command(&config, action)?,
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("axslime={}", logging.level).into());

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting AxSlime v{}", env!("CARGO_PKG_VERSION"));

    let mut rig = AxisSession::new(config.axis.clone());
    rig.start().await?;

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    let mut bridge = Bridge::new(&config.slime);
    let rx = rig.subscribe();
    tasks.push(tokio::spawn({
        let cancel = cancel.clone();
        async move { bridge.run(rx, cancel).await }
    }));

    if config.osc.enabled {
        let server = match OscServer::bind(
            config.osc.endpoint,
            HapticsRouter::new(config.haptics.clone()),
            rig.commander(),
        )
        .await
        {
            Ok(server) => server,
            Err(e) => {
                shutdown(&cancel, tasks, &mut rig).await;
                return Err(e.into());
            }
        };
        tasks.push(tokio::spawn(server.run(cancel.clone())));
    } else {
        tracing::info!("OSC haptics disabled");
    }

    shutdown_signal().await;
    shutdown(&cancel, tasks, &mut rig).await;

    tracing::info!("AxSlime shutdown complete");
    Ok(())
}

/// Cancel the relay tasks, wait for them and tell the rig to stop streaming
async fn shutdown(
    cancel: &CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    rig: &mut AxisSession,
) {
    cancel.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Task ended abnormally");
        }
    }
    rig.stop().await;
}

async fn monitor(
    config: Config,
    json: bool,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut rig = AxisSession::new(config.axis.clone());
    rig.start().await?;
    let mut rx = rig.subscribe();
    let mut last_print: Option<Instant> = None;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let data = rx.borrow_and_update().clone();
                let now = Instant::now();
                if last_print.is_some_and(|t| now.duration_since(t) < interval) {
                    continue;
                }
                last_print = Some(now);

                if json {
                    println!("{}", serde_json::to_string(&data)?);
                } else {
                    print_sample(&data, now);
                }
            }
        }
    }

    rig.stop().await;
    Ok(())
}

fn print_sample(data: &AxisOutputData, now: Instant) {
    println!("{:-<78}", "");
    for tracker in data.trackers() {
        let q = tracker.rotation();
        let extra = match (tracker.acceleration(), tracker.position()) {
            (Some(a), _) => format!("acc ({:7.3}, {:7.3}, {:7.3})", a.x, a.y, a.z),
            (_, Some(p)) => format!("pos ({:7.3}, {:7.3}, {:7.3})", p.x, p.y, p.z),
            _ => String::new(),
        };
        println!(
            "{:>8} {} rot ({:6.3}, {:6.3}, {:6.3}, {:6.3}) {}",
            tracker.slot().to_string(),
            if tracker.is_active_at(now) { "*" } else { " " },
            q.x,
            q.y,
            q.z,
            q.w,
            extra
        );
    }
}

fn send_command(config: &Config, action: RigAction) -> Result<(), Box<dyn std::error::Error>> {
    let commander = AxisCommander::standalone(config.axis.command_endpoint)?;

    match action {
        RigAction::Start => commander.start_streaming(),
        RigAction::Stop => commander.stop_streaming(),
        RigAction::Reboot => commander.reboot(),
        RigAction::Zero => commander.zero_all(),
        RigAction::Calibrate => commander.single_pose_calibration(),
        RigAction::Vibrate {
            node,
            intensity,
            duration,
        } => commander.set_node_vibration(parse_node(&node)?, intensity, duration),
        RigAction::Led {
            node,
            r,
            g,
            b,
            brightness,
        } => commander.set_node_led(parse_node(&node)?, Rgb::new(r, g, b), brightness),
    }

    println!("Command sent to {}", config.axis.command_endpoint);
    Ok(())
}

/// Accept a node binding name or a raw node index
fn parse_node(s: &str) -> Result<u8, String> {
    if let Some(binding) = NodeBinding::from_name(s) {
        return Ok(binding.node_index());
    }
    match s.parse::<u8>() {
        Ok(index) if (index as usize) < NODE_COUNT => Ok(index),
        _ => Err(format!(
            "Unknown node '{}': expected a name like LeftHand or an index below {}",
            s, NODE_COUNT
        )),
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
