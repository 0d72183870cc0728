use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use companiond::config::load_dotenv;
use companiond::engine::Bus;
use companiond::engine::EntityFactory;
use companiond::engine::LogBus;
#[cfg(feature = "integration_mqtt")]
use companiond::integrations::mqtt::MqttBus;
#[cfg(feature = "integration_mqtt")]
use companiond::integrations::mqtt::RumqttcClient;
use companiond::Config;
use companiond::LogLevel;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Expose shell commands as Home Assistant entities
#[derive(Parser, Debug)]
#[command(name = "companiond", version)]
struct Args {
    /// Path to the configuration file
    #[arg(default_value = "companiond.toml")]
    config: PathBuf,

    /// Log level, overriding the configured one
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let dotenv = args
        .config
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(".env");
    let dotenv_loaded = load_dotenv(&dotenv)
        .with_context(|| format!("Failed to load {}", dotenv.display()))?;

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    init_logging(&config, args.log_level);

    info!("companiond starting");
    if dotenv_loaded {
        info!("Loaded environment from: {}", dotenv.display());
    }
    info!("Loaded config from: {}", args.config.display());

    if args.check {
        return check(&config);
    }

    let bus = connect_bus(&config).await?;
    let factory = EntityFactory::new(bus, config.devices());
    let (registry, failures) = factory.create_all(config.entity_records());
    if !failures.is_empty() {
        warn!("{} entities could not be created", failures.len());
    }
    info!("Running {} entities", registry.len());

    wait_for_shutdown_signal().await?;

    let aborted = registry.shutdown(config.shutdown_timeout()).await;
    if aborted > 0 {
        warn!("Aborted {} entities that did not stop in time", aborted);
    }
    info!("companiond stopped");

    Ok(())
}

fn init_logging(config: &Config, level: Option<LogLevel>) {
    let level = level.unwrap_or(config.logging.level);
    let targets = config.logging.overrides.iter().fold(
        Targets::new().with_default(LevelFilter::from(level)),
        |targets, (target, level)| targets.with_target(target.clone(), LevelFilter::from(*level)),
    );

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(targets)
        .init();
}

fn check(config: &Config) -> anyhow::Result<()> {
    let errors = config.validate();
    for e in &errors {
        error!("{}", e);
    }
    if !errors.is_empty() {
        anyhow::bail!("{} invalid entities", errors.len());
    }

    info!(
        "Configuration OK ({} entities)",
        config.entity_records().count()
    );
    Ok(())
}

#[cfg(feature = "integration_mqtt")]
async fn connect_bus(config: &Config) -> anyhow::Result<Arc<dyn Bus>> {
    let Some(mqtt) = &config.mqtt else {
        info!("No [mqtt] section, entity values will only be logged");
        return Ok(Arc::new(LogBus));
    };

    let bus = MqttBus::start(RumqttcClient::new(mqtt), mqtt)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start MQTT bus: {}", e))?;
    Ok(Arc::new(bus))
}

#[cfg(not(feature = "integration_mqtt"))]
async fn connect_bus(_config: &Config) -> anyhow::Result<Arc<dyn Bus>> {
    info!("Built without MQTT support, entity values will only be logged");
    Ok(Arc::new(LogBus))
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for SIGINT")?,
        _ = terminate.recv() => {}
    }

    info!("Shutting down");
    Ok(())
}
