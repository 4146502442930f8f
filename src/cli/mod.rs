//! Command-line interface for the StatsD aggregator.
//!
//! The binary is the host process: it loads configuration, starts the
//! service, drives the flush interval and stops on ctrl-c.

use crate::core::config::ConfigBuilder;
use crate::core::{Config, Result, StatsdError};
use crate::service::StatsdService;
use crate::sink::{MetricSink, TracingSink};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// StatsD UDP receiver with in-memory aggregation
#[derive(Parser, Debug)]
#[command(name = "statsd-agg")]
#[command(version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Bind host (default: all interfaces)
    #[arg(long, env = "STATSD_AGG_HOST")]
    pub host: Option<String>,

    /// UDP port number or service name
    #[arg(short, long, env = "STATSD_AGG_PORT")]
    pub port: Option<String>,

    /// Configuration file path (default: ~/.config/statsd-agg/config.yaml)
    #[arg(short, long, env = "STATSD_AGG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Interval between flushes, e.g. "10s"
    #[arg(long, env = "STATSD_AGG_FLUSH_INTERVAL", value_parser = parse_interval)]
    pub flush_interval: Option<Duration>,

    /// Evict idle counters on flush
    #[arg(long, env = "STATSD_AGG_DELETE_COUNTERS")]
    pub delete_counters: bool,

    /// Evict idle timers on flush
    #[arg(long, env = "STATSD_AGG_DELETE_TIMERS")]
    pub delete_timers: bool,

    /// Evict idle gauges on flush
    #[arg(long, env = "STATSD_AGG_DELETE_GAUGES")]
    pub delete_gauges: bool,

    /// Evict idle sets on flush
    #[arg(long, env = "STATSD_AGG_DELETE_SETS")]
    pub delete_sets: bool,

    /// Enable debug logging
    #[arg(short, long, env = "STATSD_AGG_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Show version information
    #[arg(short = 'V', long = "show-version")]
    pub version: bool,
}

fn parse_interval(value: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = if let Some(path) = &self.config {
            path.clone()
        } else {
            let default_path = dirs::config_dir()
                .map(|d| d.join("statsd-agg").join("config.yaml"))
                .unwrap_or_else(|| PathBuf::from("~/.config/statsd-agg/config.yaml"));

            if default_path.exists() {
                default_path
            } else {
                return self.build_config_from_args(builder);
            }
        };

        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                builder = builder.from_yaml(&content)?;
                tracing::info!("Loaded configuration from: {:?}", config_path);
            },
            Err(e) if self.config.is_some() => {
                return Err(StatsdError::config(format!(
                    "Failed to read config file {:?}: {}",
                    config_path, e
                )));
            },
            Err(_) => {
                tracing::debug!("No config file found at {:?}, using defaults", config_path);
            },
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(host) = &self.host {
            builder = builder.host(host.as_str());
        }
        if let Some(port) = &self.port {
            builder = builder.port(port.as_str());
        }
        if let Some(interval) = self.flush_interval {
            builder = builder.flush_interval(interval);
        }

        // Flags only ever enable eviction on top of the file.
        let mut config = builder.debug(self.debug).build()?;
        config.delete.counters |= self.delete_counters;
        config.delete.timers |= self.delete_timers;
        config.delete.gauges |= self.delete_gauges;
        config.delete.sets |= self.delete_sets;
        Ok(config)
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let env_log_level = std::env::var("STATSD_AGG_LOG_LEVEL")
            .unwrap_or_else(|_| config.logging.level.as_str().to_string());
        let log_level = if self.debug || config.debug {
            "debug"
        } else {
            env_log_level.as_str()
        };

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = if config.logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer().with_target(false).compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| StatsdError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the aggregator.
pub async fn execute(cli: Cli) -> Result<()> {
    if cli.version {
        println!("statsd-agg {}", env!("CARGO_PKG_VERSION"));
        println!("StatsD UDP receiver with in-memory aggregation");
        return Ok(());
    }

    let config = cli.load_config().await?;
    cli.init_logging(&config)?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Listen: {}", config.listener.display_target());
        println!("  Flush interval: {:?}", config.flush.interval);
        println!(
            "  Delete idle: counters={} timers={} gauges={} sets={}",
            config.delete.counters, config.delete.timers, config.delete.gauges, config.delete.sets
        );
        for key in config.unknown_keys() {
            println!("  Ignored option: {}", key);
        }
        return Ok(());
    }

    let sink: Arc<dyn MetricSink> = Arc::new(TracingSink);
    let service = StatsdService::start(config, sink).await?;
    tracing::info!("Flushing every {:?}", service.config().flush.interval);

    service.run_until(shutdown_signal()).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal, stopping..."),
        Err(e) => {
            tracing::error!("Unable to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        },
    }
}
