//! leadlamp: colour the living-room lamps after the race leader, in sync
//! with the delayed TV broadcast.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ll_core::config::{Config, DEFAULT_LOG_LEVEL};
use ll_core::driver::DriverRoster;
use ll_daemon::daemon::Daemon;
use ll_harness::os_signals::wait_for_shutdown_signal;
use ll_harness::ShutdownSignal;
use ll_integrations::feed::{EventSource, ReplaySource};
use ll_integrations::hue::HueBridge;
use tracing::{error, info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "leadlamp", version, about)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the feed and drive the lamps until SIGINT/SIGTERM.
    Run {
        /// Recorded feed to read, `-` for stdin.
        #[arg(long, value_name = "FILE", default_value = "-")]
        replay: String,
        /// Space events by their recorded timestamps.
        #[arg(long)]
        realtime: bool,
    },
    /// List the lights found on the bridge.
    Lights,
    /// Validate configuration and the driver roster, then print them.
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = Config::from_env();
    let level = config
        .as_ref()
        .map(|c| c.log_level.as_str())
        .unwrap_or(DEFAULT_LOG_LEVEL);
    if cli.json_logs {
        ll_telemetry::logging::init_logging_json("leadlamp", level);
    } else {
        ll_telemetry::logging::init_logging("leadlamp", level);
    }

    let result = match config.context("invalid configuration") {
        Ok(config) => dispatch(cli.command, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %format!("{e:#}"), "leadlamp failed");
            ExitCode::from(1)
        }
    }
}

async fn dispatch(command: Commands, config: Config) -> Result<u8> {
    match command {
        Commands::Run { replay, realtime } => run(config, replay, realtime).await,
        Commands::Lights => lights(config).await,
        Commands::CheckConfig => check_config(config),
    }
}

async fn run(config: Config, replay: String, realtime: bool) -> Result<u8> {
    let roster = load_roster(&config)?;
    let bridge = HueBridge::from_config(&config).context("failed to build bridge client")?;
    let lights = bridge
        .list_lights()
        .await
        .with_context(|| format!("failed to discover lights on {}", config.bridge_ip))?;
    if lights.is_empty() {
        warn!(bridge = %config.bridge_ip, "no lights found, leader changes will not be shown");
    }

    let source: Box<dyn EventSource> = if replay == "-" {
        info!("reading feed from stdin");
        Box::new(ReplaySource::stdin().realtime(realtime))
    } else {
        let path = PathBuf::from(&replay);
        let source = ReplaySource::open(&path)
            .await
            .with_context(|| format!("failed to open replay {}", path.display()))?;
        info!(path = %path.display(), realtime, "replaying recorded feed");
        Box::new(source.realtime(realtime))
    };

    let shutdown = ShutdownSignal::new();
    let _signals = shutdown.trigger_on(wait_for_shutdown_signal());

    let daemon = Daemon::new(&config, roster, Arc::new(bridge), lights);
    let summary = daemon.run(source, shutdown.wait()).await;
    Ok(summary.exit_code())
}

async fn lights(config: Config) -> Result<u8> {
    let bridge = HueBridge::from_config(&config).context("failed to build bridge client")?;
    let devices = bridge
        .list_devices()
        .await
        .with_context(|| format!("failed to list devices on {}", config.bridge_ip))?;

    let mut found = 0;
    for device in &devices {
        if let Some(light) = device.light_id() {
            found += 1;
            println!(
                "{:<38} {:<24} {}",
                light, device.metadata.name, device.product_data.product_name
            );
        }
    }
    println!("{found} light(s) on {}", config.bridge_ip);
    Ok(0)
}

fn check_config(config: Config) -> Result<u8> {
    let roster = load_roster(&config)?;
    println!("{config:#?}");
    println!("drivers: {}", roster.len());
    Ok(0)
}

fn load_roster(config: &Config) -> Result<DriverRoster> {
    DriverRoster::load(&config.drivers_file).with_context(|| {
        format!(
            "failed to load driver roster from {}",
            config.drivers_file.display()
        )
    })
}
