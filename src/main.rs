use anyhow::Result;
use apsystems_ez1_exporter::config::{
    collect_interval_from_env, resolve_inverter_address, AddressCandidate, AddressSource, Config,
    LogLevel, DEFAULT_INVERTER_PORT,
};
use apsystems_ez1_exporter::error::ExporterError;
use apsystems_ez1_exporter::server;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "/etc/apsystemsez1/config.ini")]
    config_file: String,

    /// Port to expose the metrics on (overrides config)
    #[arg(short, long, env = "METRIC_PORT")]
    metric_port: Option<u16>,

    /// Base collection interval in seconds (overrides config)
    #[arg(long)]
    collect_interval_seconds: Option<u64>,

    /// IP or hostname of the inverter
    #[arg(long)]
    inverter_ip: Option<String>,

    /// API port of the inverter
    #[arg(long, default_value_t = DEFAULT_INVERTER_PORT)]
    inverter_port: u16,

    /// debug, info, warning, error, critical (or 10..50)
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(&args.config_file)?;

    // Override with CLI arguments if provided
    if let Some(port) = args.metric_port {
        config.server.port = port;
    }
    if let Some(interval) = args
        .collect_interval_seconds
        .or_else(collect_interval_from_env)
    {
        config.collector.collect_interval_seconds = interval;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.directive())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting APsystems EZ1 Prometheus Exporter v{} (log level {})",
        env!("CARGO_PKG_VERSION"),
        config.logging.level
    );

    let candidates = [
        AddressCandidate::new(
            AddressSource::CommandLine,
            args.inverter_ip,
            Some(args.inverter_port),
        ),
        AddressCandidate::from_env(),
        AddressCandidate::from_file(&config.inverter),
    ];
    let address = match resolve_inverter_address(&candidates) {
        Ok((address, source)) => {
            info!("Using inverter {} from {}", address, source);
            address
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Collecting every {}s, metrics on port {}",
        config.collector.collect_interval_seconds, config.server.port
    );

    if let Err(e) = server::start(config, address).await {
        match e.downcast_ref::<ExporterError>() {
            Some(err) if err.is_fatal() => error!("Startup failed: {}", err),
            _ => error!("Server error: {:#}", e),
        }
        std::process::exit(1);
    }

    Ok(())
}
