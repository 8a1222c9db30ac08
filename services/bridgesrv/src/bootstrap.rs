//! Service bootstrap
//!
//! Command-line arguments, configuration loading and logging setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use common::LogHandle;
use tracing::info;

use crate::config::{BridgeConfig, CliOverrides};
use crate::error::Result;
use crate::service::BridgeService;

/// Command-line arguments for bridgesrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "bridgesrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Job-queue worker bridging jobs to inbound device sessions",
    long_about = None
)]
pub struct Args {
    /// Configuration file (YAML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Append-only log file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Job server address, repeatable (host:port)
    #[arg(short = 's', long = "server")]
    pub servers: Vec<String>,

    /// Function name to register
    #[arg(short = 'f', long)]
    pub function: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}

impl Args {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            log_level: self.log_level.clone(),
            log_file: self.log_file.clone(),
            servers: self.servers.clone(),
            function: self.function.clone(),
        }
    }
}

/// Load configuration with the command-line overrides applied
pub fn load_configuration(args: &Args) -> Result<BridgeConfig> {
    BridgeConfig::load(args.config.as_deref(), &args.overrides())
}

/// Install the global subscriber; keep the handle alive
pub fn initialize_logging(config: &BridgeConfig, args: &Args) -> Result<LogHandle> {
    let handle = common::logging::init_with_config(config.log_config(!args.no_color))?;
    handle.enable_sighup_reopen();
    Ok(handle)
}

/// Log the effective settings once at startup
pub fn log_startup(config: &BridgeConfig) {
    info!("bridgesrv v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Job servers: {} | function: {} | max concurrent jobs: {}",
        config.worker.servers.join(", "),
        config.worker.function,
        match config.worker.max_concurrent_jobs {
            0 => "unlimited".to_string(),
            n => n.to_string(),
        }
    );
    info!(
        "Device sessions on {}: accept {} ms, exchange {} ms, checksum {:?}/{:?}",
        config.session.bind_host,
        config.session.accept_timeout_ms,
        config.session.exchange_timeout_ms,
        config.checksum.algorithm,
        config.checksum.byte_order
    );
}

pub fn build_service(config: &BridgeConfig) -> BridgeService {
    BridgeService::new(config.session.clone(), Arc::new(config.checksum))
}
