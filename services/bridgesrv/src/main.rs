//! Device Bridge Service (bridgesrv)
//!
//! Gearman worker that answers each job by waiting for the addressed device
//! to dial in on the job's port and relaying its reply.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use bridgesrv::bootstrap::{self, Args};
use bridgesrv::gearman::Worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = bootstrap::load_configuration(&args).context("Failed to load configuration")?;
    let _log_handle = bootstrap::initialize_logging(&config, &args)
        .context("Failed to initialize logging")?;
    bootstrap::log_startup(&config);

    // Validation mode: validate and exit
    if args.validate {
        info!("Validation completed successfully");
        return Ok(());
    }

    let service = Arc::new(bootstrap::build_service(&config));
    let shutdown = common::shutdown::shutdown_token();

    Worker::new(config.worker.clone(), service)
        .run(shutdown)
        .await
        .context("Job worker failed")?;

    info!("bridgesrv stopped");
    Ok(())
}
