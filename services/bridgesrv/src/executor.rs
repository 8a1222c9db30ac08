//! Command executor
//!
//! Drives request/response exchanges over one transport for one job.
//! Exchanges are strictly sequential and the first failure aborts the job;
//! answers already collected are discarded.

use tracing::debug;

use crate::error::Result;
use crate::job::{JobMode, JobResult};
use crate::protocol::checksum::Checksum;
use crate::protocol::frame::{build_frame, decode_response, TemplatedCommand};
use crate::transport::FrameTransport;

pub struct CommandExecutor<'a, T: FrameTransport> {
    transport: &'a mut T,
    checksum: &'a dyn Checksum,
}

impl<'a, T: FrameTransport> CommandExecutor<'a, T> {
    pub fn new(transport: &'a mut T, checksum: &'a dyn Checksum) -> Self {
        Self {
            transport,
            checksum,
        }
    }

    async fn exchange(&mut self, frame: &[u8]) -> Result<String> {
        self.transport.send_frame(frame).await?;
        let raw = self.transport.recv_frame().await?;
        Ok(decode_response(&raw))
    }

    /// Build one frame from semantic fields and return the device answer
    pub async fn execute_templated(&mut self, command: &TemplatedCommand) -> Result<String> {
        let frame = build_frame(command, self.checksum);
        debug!(
            "Templated exchange: device {} command {:02X} over {}",
            command.device_id,
            command.command,
            self.transport.name()
        );
        self.exchange(&frame).await
    }

    /// Send pre-built frames one after another, one answer per frame
    pub async fn execute_direct(&mut self, frames: &[Vec<u8>]) -> Result<Vec<String>> {
        let mut answers = Vec::with_capacity(frames.len());
        for (index, frame) in frames.iter().enumerate() {
            debug!("Direct exchange {}/{}", index + 1, frames.len());
            answers.push(self.exchange(frame).await?);
        }
        Ok(answers)
    }

    /// Run a validated job mode
    pub async fn execute(&mut self, mode: &JobMode) -> Result<JobResult> {
        match mode {
            JobMode::Templated(command) => {
                Ok(JobResult::Single(self.execute_templated(command).await?))
            },
            JobMode::Single(frame) => Ok(JobResult::Single(self.exchange(frame).await?)),
            JobMode::Multi(frames) => Ok(JobResult::Multi(self.execute_direct(frames).await?)),
        }
    }
}
