//! Pi5 Fan Controller - temperature driven fan levels for the Raspberry Pi 5.
//!
//! This daemon averages the SoC temperature sensors and drives the thermal
//! cooling device through five discrete levels, with hysteresis on the way
//! down so the fan does not chatter around a threshold.

use clap::Parser;
use pi5_fan_controller::config::Settings;
use pi5_fan_controller::controller::{ControlLoop, StopToken};
use pi5_fan_controller::error::DaemonError;
use pi5_fan_controller::fan_control::SysfsFan;
use pi5_fan_controller::logging::{self, LogFormat, LogGuard, LogOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Temperature driven fan level controller for the Raspberry Pi 5.
#[derive(Parser, Debug)]
#[command(version)]
#[command(after_help = "Configuration file: /etc/pi5-fan-controller/pi5-fan-controller.conf\n\
Environment variables: FAN_PATH, HWMON0_NAME, HWMON1_NAME, TEMP_HWMON0_PATH, TEMP_HWMON1_PATH,\n\
HYSTERESIS, OFF_THRESHOLD, LOW_THRESHOLD, MEDIUM_THRESHOLD, HIGH_THRESHOLD, FULL_THRESHOLD,\n\
INTERVAL_SECONDS, DEBUG")]
struct Cli {
    /// Read settings from this file instead of the system file or environment
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging regardless of the DEBUG setting
    #[arg(long)]
    debug: bool,

    /// Format of log lines written to stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Also write JSON logs to a daily rotating file in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Print the resolved settings as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// Validate the setup (paths, sensors, thresholds) and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Outlives `run` so a final error still reaches the log writers
    let mut log_guard = None;

    match run(Cli::parse(), &mut log_guard).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_failure(&e);
            ExitCode::FAILURE
        }
    }
}

/// Report a fatal error once: through the logger when it is installed,
/// otherwise on stderr.
fn report_failure(err: &DaemonError) {
    if tracing::dispatcher::has_been_set() {
        error!("Pi5 fan controller error: {}", err);
    } else {
        eprintln!("pi5-fan-controller: {}", err);
    }
}

/// Resolve settings, set up logging and run the daemon.
///
/// Errors are returned, never printed here.
async fn run(cli: Cli, log_guard: &mut Option<LogGuard>) -> Result<(), DaemonError> {
    // Settings decide the log level, so they are loaded before logging exists
    let settings = Settings::load(cli.config.as_deref())?;

    if cli.print_config {
        let json = serde_json::to_string_pretty(&settings)
            .map_err(|e| DaemonError::Runtime(format!("failed to serialize settings: {}", e)))?;
        println!("{}", json);
        return Ok(());
    }

    *log_guard = Some(logging::init_logging(&LogOptions {
        debug: settings.debug || cli.debug,
        format: cli.log_format,
        log_dir: cli.log_dir.clone(),
    })?);

    info!("Pi5 fan controller {} starting...", env!("CARGO_PKG_VERSION"));

    run_daemon(settings, cli.check).await?;
    info!("Pi5 fan controller shut down gracefully");
    Ok(())
}

/// Initialize the controller and run it until a termination signal arrives.
async fn run_daemon(settings: Settings, check_only: bool) -> Result<(), DaemonError> {
    if unsafe { libc::geteuid() } != 0 {
        warn!("Not running as root, writes to the fan control file may be refused");
    }

    let stop = StopToken::new();
    let fan = SysfsFan::new(&settings.fan_path);
    let mut controller = ControlLoop::new(&settings, fan, stop.clone());
    controller.initialize()?;

    if check_only {
        info!("Configuration check passed");
        return Ok(());
    }

    // Signal handling (replaces any process-wide controller handle)
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!("Signal handler error: {}", e);
        }
        stop.stop();
    });

    // The loop is synchronous and blocking, keep it off the async workers
    let controller = tokio::task::spawn_blocking(move || {
        controller.run();
        controller
    })
    .await
    .map_err(|e| DaemonError::Runtime(format!("control loop task failed: {}", e)))?;

    let metrics = controller.metrics();
    info!(
        ticks = metrics.ticks,
        skipped = metrics.skipped_ticks,
        held = metrics.held_decreases,
        increases = metrics.increases,
        decreases = metrics.decreases,
        resyncs = metrics.resyncs,
        uptime_sec = metrics.uptime_sec,
        "Final speed {} after {} transition(s)",
        controller.state().current_speed,
        metrics.transitions
    );
    Ok(())
}

/// Wait for SIGTERM or SIGINT.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
        }
    }

    Ok(())
}

/// Fallback for non-Unix platforms (development builds)
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");
    Ok(())
}
