//! Transport Layer Traits
//!
//! The executor only needs "send one frame, receive one frame". Keeping that
//! behind a trait lets the device session be swapped for a scripted mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Per-session exchange counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl ExchangeStats {
    /// Record a written frame
    pub fn record_sent(&mut self, bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Record a received frame
    pub fn record_received(&mut self, bytes: usize) {
        self.frames_received += 1;
        self.bytes_received += bytes as u64;
    }
}

/// Frame-oriented transport to a single device
#[async_trait]
pub trait FrameTransport: Send + fmt::Debug {
    /// Human-readable transport name for logs
    fn name(&self) -> &str;

    /// Write one complete frame
    async fn send_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Read one complete response frame
    async fn recv_frame(&mut self) -> Result<Vec<u8>>;

    /// Counters for this transport
    fn stats(&self) -> ExchangeStats;
}
