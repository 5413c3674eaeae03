//! Autodialer CLI
//!
//! Manage the dialer configuration and replay pause-indicator traces through
//! the call-outcome detector to tune its thresholds.
//!
//! Usage from workspace root:
//!   cargo run --bin autodialer -- config init            # Write default config.json
//!   cargo run --bin autodialer -- config show            # Print merged config
//!   cargo run --bin autodialer -- config validate        # Check thresholds and schedule
//!   cargo run --bin autodialer -- simulate --trace 1111111110
//!   cargo run --bin autodialer -- simulate --trace 0000 --latency-ms 550 --json

use anyhow::{bail, Context, Result};
use autodialer::config::DEFAULT_CONFIG_FILE;
use autodialer::{CallStatus, DetectionConfig, DialerConfig};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

mod simulate;

#[derive(Parser)]
#[command(name = "autodialer")]
#[command(about = "📞 Autodialer CLI - call-outcome detection tooling")]
struct Cli {
    /// Path to the dialer config file
    #[clap(long, short = 'c', global = true, env = "AUTODIALER_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or create the config file
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Replay a pause-indicator trace through the detector
    Simulate(SimulateArgs),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the default config (refuses to overwrite without --force)
    Init {
        #[clap(long)]
        force: bool,
    },
    /// Print the config merged over the defaults
    Show,
    /// Validate thresholds, schedule and call pacing
    Validate,
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Indicator samples, one per poll: 1 = visible, 0 = hidden, x = probe error.
    /// The last sample repeats once the trace runs out.
    #[clap(long, short = 't')]
    trace: String,

    /// Simulated cost of each probe call, in milliseconds
    #[clap(long, default_value_t = 0)]
    latency_ms: u64,

    /// Override detect.ring_timeout (seconds)
    #[clap(long)]
    ring_timeout: Option<f64>,

    /// Override detect.off_busy_threshold (seconds)
    #[clap(long)]
    off_busy_threshold: Option<f64>,

    /// Override detect.answered_grace (seconds)
    #[clap(long)]
    answered_grace: Option<f64>,

    /// Override detect.poll_interval (seconds)
    #[clap(long)]
    poll_interval: Option<f64>,

    /// Override detect.busy_slack (seconds)
    #[clap(long)]
    busy_slack: Option<f64>,

    /// Print the result as JSON
    #[clap(long)]
    json: bool,
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,autodialer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Config(ConfigCommands::Init { force }) => config_init(&cli.config, force),
        Commands::Config(ConfigCommands::Show) => config_show(&cli.config),
        Commands::Config(ConfigCommands::Validate) => config_validate(&cli.config),
        Commands::Simulate(args) => run_simulation(&cli.config, args),
    }
}

/// Load the config if present, otherwise fall back to the defaults without
/// touching the filesystem.
fn load_config(path: &Path) -> Result<DialerConfig> {
    if path.exists() {
        DialerConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))
    } else {
        debug!("No config at {}, using defaults", path.display());
        Ok(DialerConfig::default())
    }
}

fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    DialerConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote default config to {}", path.display());
    println!("{} {}", "✅ Wrote".green(), path.display());
    Ok(())
}

fn config_show(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn config_validate(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    config.validate().context("Config is invalid")?;
    let detection = config.detection()?;
    println!("{} {}", "✅ Valid:".green(), path.display());
    println!("  ring timeout       {:?}", detection.ring_timeout());
    println!("  busy boundary      {:?}", detection.busy_boundary());
    println!("  answered boundary  {:?}", detection.answered_boundary());
    println!("  poll interval      {:?}", detection.poll_interval());
    println!("  calling window     {}", config.call_window()?);
    Ok(())
}

fn detection_with_overrides(config: &DialerConfig, args: &SimulateArgs) -> Result<DetectionConfig> {
    let mut settings = config.detect.clone();
    if let Some(v) = args.ring_timeout {
        settings.ring_timeout = v;
    }
    if let Some(v) = args.off_busy_threshold {
        settings.off_busy_threshold = v;
    }
    if let Some(v) = args.answered_grace {
        settings.answered_grace = v;
    }
    if args.poll_interval.is_some() {
        settings.poll_interval = args.poll_interval;
    }
    if args.busy_slack.is_some() {
        settings.busy_slack = args.busy_slack;
    }
    DetectionConfig::try_from(&settings).context("Invalid detection thresholds")
}

fn run_simulation(path: &Path, args: SimulateArgs) -> Result<()> {
    let config = load_config(path)?;
    let detection = detection_with_overrides(&config, &args)?;
    let report = simulate::simulate(
        detection,
        &args.trace,
        Duration::from_millis(args.latency_ms),
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let status = report.outcome.status();
    let label = match status {
        CallStatus::Answered => status.to_string().green(),
        CallStatus::EndedAfterAnswer => status.to_string().yellow(),
        CallStatus::PoweredOffOrBusy => status.to_string().red(),
        CallStatus::NoAnswer => status.to_string().dimmed(),
    };
    println!(
        "{label}  duration {:.1}s  ({} samples, {:.1}s simulated)",
        report.outcome.duration_secs(),
        report.samples,
        report.elapsed
    );
    println!(
        "  busy <= {:.2}s  answered >= {:.2}s  poll {:.2}s",
        report.busy_boundary, report.answered_boundary, report.poll_interval
    );
    Ok(())
}
