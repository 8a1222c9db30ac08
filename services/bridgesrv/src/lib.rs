//! Device Bridge Service Library
//!
//! Bridges a Gearman job queue to a binary device protocol. Each job opens a
//! transient listener on its port, waits for the device to dial in and runs
//! one or more request/response exchanges over that single connection.
//!
//! - `protocol`: frame assembly, checksum, response decoding
//! - `transport`: device session lifecycle and the `FrameTransport` seam
//! - `executor`: templated and direct-frame exchanges
//! - `job` / `service`: payload model and the per-job pipeline
//! - `gearman`: worker-protocol client
//! - `config` / `bootstrap`: configuration layers and startup

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod executor;
pub mod gearman;
pub mod job;
pub mod protocol;
pub mod service;
pub mod transport;

pub use config::BridgeConfig;
pub use error::{BridgeError, ErrorExt, Result};
pub use executor::CommandExecutor;
pub use job::{JobMode, JobPlan, JobRequest, JobResult};
pub use service::BridgeService;
pub use transport::{DeviceSession, FrameTransport, SessionConfig, SessionState};
