use anyhow::Result;
use clap::{Parser, ValueEnum};
use fleet_worker::{WorkerConfig, WorkerOrchestrator};
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fleet-worker")]
#[command(about = "Worker that drives a peer over HTTP and reports to a message bus")]
#[command(version)]
#[command(long_about = "A worker whose run state (INIT, RUNNING, PAUSED, SHUTDOWN) is set over \
HTTP. While running it publishes work messages, calls its peer and reports the outcome to the \
message bus. On SHUTDOWN it stops every container on the host, itself last.")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "fleet-worker.toml")]
    config: String,

    /// Debug level logging
    #[arg(short, long, conflicts_with_all = ["verbose", "quiet"])]
    debug: bool,

    /// Info level logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only
    #[arg(short, long)]
    quiet: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    validate_config: bool,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Validate the configuration and build every client, but connect to nothing
    #[arg(long)]
    dry_run: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Args {
    fn log_level(&self) -> &'static str {
        match (self.debug, self.verbose, self.quiet) {
            (true, _, _) => "debug",
            (_, true, _) => "info",
            (_, _, true) => "error",
            _ => "warn",
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    if args.print_config {
        println!("# Fleet worker configuration file");
        println!("# Every key may be overridden with FLEET_WORKER_<SECTION>__<KEY>");
        println!();
        println!("{}", toml::to_string_pretty(&WorkerConfig::default())?);
        return Ok(ExitCode::SUCCESS);
    }

    init_logging(&args);

    info!("Starting fleet worker v{}", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration from {}: {}", args.config, e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        return Ok(ExitCode::FAILURE);
    }
    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(ExitCode::SUCCESS);
    }

    let mut orchestrator = WorkerOrchestrator::new(config).map_err(|e| {
        error!("Failed to build worker clients: {}", e);
        e
    })?;
    orchestrator.initialize().await?;

    if args.dry_run {
        let config = orchestrator.config();
        println!("✓ Configuration is valid and all clients were built");
        println!(
            "  bus {}:{}, peer {}:{}{}, control {}:{}",
            config.bus.service_name,
            config.bus.port,
            config.peer.service_name,
            config.peer.port,
            config.peer.path,
            config.control.ip,
            config.control.port
        );
        return Ok(ExitCode::SUCCESS);
    }

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start worker: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("Worker error during execution: {}", e);
        e
    })?;

    info!("Fleet worker exited with code: {}", exit_code);
    Ok(ExitCode::from(u8::try_from(exit_code).unwrap_or(1)))
}

fn init_logging(args: &Args) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fleet_worker={}", args.log_level())));

    let fmt_layer = match args.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();
}
