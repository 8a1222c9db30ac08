//! Bridge service: turns one queue job into one device session
//!
//! payload -> [`JobPlan`] -> [`DeviceSession`] -> [`CommandExecutor`] ->
//! result bytes. Payload errors are reported before any port is bound and
//! the session is always closed before the result is returned.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, info_span, Instrument};

use crate::error::Result;
use crate::executor::CommandExecutor;
use crate::gearman::{Job, JobHandler};
use crate::job::{JobPlan, JobRequest, JobResult};
use crate::protocol::checksum::Checksum;
use crate::transport::{DeviceSession, FrameTransport, SessionConfig};

#[derive(Debug, Clone)]
pub struct BridgeService {
    session: SessionConfig,
    checksum: Arc<dyn Checksum>,
}

impl BridgeService {
    pub fn new(session: SessionConfig, checksum: Arc<dyn Checksum>) -> Self {
        Self { session, checksum }
    }

    /// Run one job payload end to end
    pub async fn process(&self, payload: &[u8]) -> Result<JobResult> {
        let request = JobRequest::from_payload(payload)?;
        let id = request.id;
        let plan = request.into_plan()?;

        let span = info_span!("device", id, port = plan.port, mode = plan.mode.name());
        self.run_plan(plan).instrument(span).await
    }

    async fn run_plan(&self, plan: JobPlan) -> Result<JobResult> {
        let mut session = DeviceSession::open(plan.port, self.session.clone()).await?;

        let outcome = CommandExecutor::new(&mut session, self.checksum.as_ref())
            .execute(&plan.mode)
            .await;

        let stats = session.stats();
        session.close().await;
        debug!(
            "Session closed: {} frames sent, {} received",
            stats.frames_sent, stats.frames_received
        );

        if outcome.is_ok() {
            info!("Device exchange finished");
        }
        outcome
    }
}

#[async_trait]
impl JobHandler for BridgeService {
    async fn handle(&self, job: &Job) -> Result<Vec<u8>> {
        self.process(&job.workload).await?.to_payload()
    }
}
