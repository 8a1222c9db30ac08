//! Gearman worker
//!
//! One connection loop per configured server. Each loop registers the
//! function, then cycles through
//!
//! ```text
//! GRAB_JOB ──NO_JOB──> PRE_SLEEP ──NOOP──> GRAB_JOB
//!    │
//!    └──JOB_ASSIGN──> spawn job task ──> GRAB_JOB
//! ```
//!
//! Job tasks report back through a per-connection channel; the loop writes
//! the `WORK_*` packet. A job slot (semaphore permit) is taken before every
//! `GRAB_JOB` so the worker never holds more jobs than it may run. The slot
//! is given back on `NO_JOB`; a sleeping connection holds none.
//!
//! On shutdown each loop stops grabbing and waits up to
//! `shutdown_grace_ms` for its running jobs so their results still reach
//! the server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::codec::GearmanCodec;
use super::packet::{Job, Packet, PacketType};
use crate::error::{BridgeError, ErrorExt, Result};

/// Processes one job payload into result bytes
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> Result<Vec<u8>>;
}

/// How a failed job is reported to the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReply {
    /// `WORK_COMPLETE` carrying the error message
    #[default]
    Complete,
    /// `WORK_EXCEPTION` carrying the error message
    Exception,
    /// `WORK_FAIL`, message only logged
    Fail,
}

impl ErrorReply {
    fn packet(self, handle: &[u8], err: &BridgeError) -> Packet {
        let message = err.to_string();
        match self {
            Self::Complete => Packet::work_complete(handle, message.as_bytes()),
            Self::Exception => Packet::work_exception(handle, message.as_bytes()),
            Self::Fail => Packet::work_fail(handle),
        }
    }
}

/// Worker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Job servers as `host:port`
    pub servers: Vec<String>,
    /// Registered function name
    pub function: String,
    /// Optional `SET_CLIENT_ID` value
    pub client_id: Option<String>,
    /// Concurrent jobs across all servers, 0 = unlimited
    pub max_concurrent_jobs: usize,
    pub connect_timeout_ms: u64,
    pub reconnect_interval_ms: u64,
    /// How long shutdown waits for running jobs
    pub shutdown_grace_ms: u64,
    pub error_reply: ErrorReply,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            servers: vec!["127.0.0.1:4730".to_string()],
            function: "Anviz".to_string(),
            client_id: None,
            max_concurrent_jobs: 0,
            connect_timeout_ms: 5_000,
            reconnect_interval_ms: 3_000,
            shutdown_grace_ms: 5_000,
            error_reply: ErrorReply::Complete,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(BridgeError::config("worker.servers cannot be empty"));
        }
        if let Some(server) = self.servers.iter().find(|s| s.trim().is_empty()) {
            return Err(BridgeError::config(format!(
                "worker.servers contains an empty address: {server:?}"
            )));
        }
        if self.function.trim().is_empty() {
            return Err(BridgeError::config("worker.function cannot be empty"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(BridgeError::config(
                "worker.connect_timeout_ms must be greater than zero",
            ));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(BridgeError::config(
                "worker.reconnect_interval_ms must be greater than zero",
            ));
        }
        Ok(())
    }

    fn slot_count(&self) -> usize {
        match self.max_concurrent_jobs {
            0 => Semaphore::MAX_PERMITS,
            n => n,
        }
    }
}

type GearmanConnection = Framed<TcpStream, GearmanCodec>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Ready to ask for a job once a slot is held
    Idle,
    /// `GRAB_JOB` sent, waiting for `NO_JOB` / `JOB_ASSIGN`
    Grabbing,
    /// `PRE_SLEEP` sent, waiting for `NOOP`
    Sleeping,
}

struct Shared<H> {
    config: WorkerConfig,
    handler: Arc<H>,
    slots: Arc<Semaphore>,
}

/// Gearman worker bound to one job handler
pub struct Worker<H: JobHandler> {
    shared: Arc<Shared<H>>,
}

impl<H: JobHandler> Worker<H> {
    pub fn new(config: WorkerConfig, handler: Arc<H>) -> Self {
        let slots = Arc::new(Semaphore::new(config.slot_count()));
        Self {
            shared: Arc::new(Shared {
                config,
                handler,
                slots,
            }),
        }
    }

    /// Connect to every server and serve jobs until `shutdown` fires
    ///
    /// Failing to register with any server on startup is an error; later
    /// disconnects are retried.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut connections = Vec::with_capacity(self.shared.config.servers.len());
        for server in &self.shared.config.servers {
            let conn = connect(&self.shared.config, server).await?;
            connections.push((server.clone(), conn));
        }

        let mut loops = JoinSet::new();
        for (server, conn) in connections {
            let shared = Arc::clone(&self.shared);
            let token = shutdown.clone();
            loops.spawn(serve(shared, server, conn, token));
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                error!("Worker loop panicked: {e}");
            }
        }
        info!("Gearman worker stopped");
        Ok(())
    }
}

/// Open a connection and register the function
async fn connect(config: &WorkerConfig, server: &str) -> Result<GearmanConnection> {
    let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
    let stream = timeout(connect_timeout, TcpStream::connect(server))
        .await
        .queue_error(&format!("Connecting to job server {server} timed out"))?
        .queue_error(&format!("Failed to connect to job server {server}"))?;

    let mut conn = Framed::new(stream, GearmanCodec::new());
    if let Some(client_id) = &config.client_id {
        conn.send(Packet::set_client_id(client_id)).await?;
    }
    conn.send(Packet::can_do(&config.function)).await?;

    info!(
        "Registered function '{}' with job server {server}",
        config.function
    );
    Ok(conn)
}

/// Connection loop for one server, reconnecting until shutdown
async fn serve<H: JobHandler>(
    shared: Arc<Shared<H>>,
    server: String,
    mut conn: GearmanConnection,
    shutdown: CancellationToken,
) {
    let reconnect_interval = Duration::from_millis(shared.config.reconnect_interval_ms);
    let mut jobs = JoinSet::new();
    loop {
        match run_connection(&shared, &mut conn, &mut jobs, &shutdown).await {
            Ok(()) => {
                debug!("Connection loop for {server} stopped");
                return;
            },
            Err(e) => warn!(error_code = e.error_code(), "Lost job server {server}: {e}"),
        }

        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,
                () = sleep(reconnect_interval) => {},
            }
            match connect(&shared.config, &server).await {
                Ok(fresh) => {
                    conn = fresh;
                    break;
                },
                Err(e) => warn!("Reconnect failed, retrying in {reconnect_interval:?}: {e}"),
            }
        }
    }
}

/// Drive one registered connection; `Ok` only on shutdown
///
/// Jobs outlive a lost connection in `jobs`; their results are dropped.
async fn run_connection<H: JobHandler>(
    shared: &Arc<Shared<H>>,
    conn: &mut GearmanConnection,
    jobs: &mut JoinSet<()>,
    shutdown: &CancellationToken,
) -> Result<()> {
    let (replies_tx, mut replies_rx) = mpsc::unbounded_channel::<Packet>();
    let mut phase = Phase::Idle;
    let mut slot: Option<OwnedSemaphorePermit> = None;

    loop {
        if phase == Phase::Idle && slot.is_some() {
            conn.send(Packet::grab_job()).await?;
            phase = Phase::Grabbing;
        }

        tokio::select! {
            () = shutdown.cancelled() => {
                let grace = Duration::from_millis(shared.config.shutdown_grace_ms);
                drain_jobs(conn, jobs, &mut replies_rx, grace).await;
                return Ok(());
            },

            permit = Arc::clone(&shared.slots).acquire_owned(), if phase == Phase::Idle && slot.is_none() => {
                slot = Some(permit.map_err(|_| BridgeError::queue("job slots closed"))?);
            },

            Some(reply) = replies_rx.recv() => {
                conn.send(reply).await?;
            },

            Some(joined) = jobs.join_next(), if !jobs.is_empty() => {
                if let Err(e) = joined {
                    error!("Job task failed: {e}");
                }
            },

            incoming = conn.next() => {
                let packet = match incoming {
                    Some(packet) => packet?,
                    None => return Err(BridgeError::queue("job server closed the connection")),
                };

                match packet.kind {
                    PacketType::NoJob => {
                        slot = None;
                        conn.send(Packet::pre_sleep()).await?;
                        phase = Phase::Sleeping;
                    },
                    PacketType::Noop => {
                        if phase == Phase::Sleeping {
                            phase = Phase::Idle;
                        }
                    },
                    PacketType::JobAssign | PacketType::JobAssignUniq => {
                        let job = Job::from_packet(&packet)?;
                        spawn_job(shared, jobs, job, slot.take(), replies_tx.clone());
                        phase = Phase::Idle;
                    },
                    PacketType::EchoRes => debug!("Echo from job server"),
                    PacketType::Error => {
                        let detail = String::from_utf8_lossy(&packet.data).replace('\0', ": ");
                        warn!("Job server reported error: {detail}");
                    },
                    other => debug!("Ignoring {other:?} packet"),
                }
            },
        }
    }
}

/// Forward results of running jobs until they finish or `grace` runs out
async fn drain_jobs(
    conn: &mut GearmanConnection,
    jobs: &mut JoinSet<()>,
    replies: &mut mpsc::UnboundedReceiver<Packet>,
    grace: Duration,
) {
    if !jobs.is_empty() {
        info!("Waiting up to {grace:?} for {} running job(s)", jobs.len());
    }
    let deadline = Instant::now() + grace;

    while !jobs.is_empty() {
        tokio::select! {
            Some(reply) = replies.recv() => {
                if let Err(e) = conn.send(reply).await {
                    warn!("Job server gone during shutdown: {e}");
                    jobs.abort_all();
                    return;
                }
            },
            joined = timeout_at(deadline, jobs.join_next()) => match joined {
                Ok(Some(Err(e))) => error!("Job task failed: {e}"),
                Ok(_) => {},
                Err(_) => {
                    warn!("{} job(s) still running after {grace:?}, aborting", jobs.len());
                    jobs.abort_all();
                    break;
                },
            },
        }
    }

    while let Ok(reply) = replies.try_recv() {
        if let Err(e) = conn.send(reply).await {
            warn!("Job server gone during shutdown: {e}");
            return;
        }
    }
}

fn spawn_job<H: JobHandler>(
    shared: &Arc<Shared<H>>,
    jobs: &mut JoinSet<()>,
    job: Job,
    slot: Option<OwnedSemaphorePermit>,
    replies: mpsc::UnboundedSender<Packet>,
) {
    let handler = Arc::clone(&shared.handler);
    let policy = shared.config.error_reply;
    let span = info_span!("job", handle = %job.handle_str(), function = %job.function);

    jobs.spawn(
        async move {
            let _slot = slot;
            let reply = match handler.handle(&job).await {
                Ok(result) => {
                    info!("Job completed with {} result bytes", result.len());
                    Packet::work_complete(&job.handle, &result)
                },
                Err(e) => {
                    error!(error_code = e.error_code(), "Job failed: {e}");
                    policy.packet(&job.handle, &e)
                },
            };
            if replies.send(reply).is_err() {
                warn!("Job server connection gone, result dropped");
            }
        }
        .instrument(span),
    );
}
