//! Mock Transport for Testing
//!
//! Scripted stand-in for a device session: responses (or failures) are
//! queued up front and every exchange is recorded in order, so executor
//! logic can be checked without sockets.

use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::debug;

use super::traits::{ExchangeStats, FrameTransport};
use crate::error::{BridgeError, Result};

/// One recorded exchange step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Sent(Vec<u8>),
    Received(Vec<u8>),
}

/// Mock transport implementation
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: VecDeque<Result<Vec<u8>>>,
    events: Vec<MockEvent>,
    /// Zero-based index of the write that should fail
    fail_send_at: Option<usize>,
    writes: usize,
    stats: ExchangeStats,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that answers each write with the given frames, in order
    pub fn with_responses<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut mock = Self::new();
        for response in responses {
            mock.push_response(response);
        }
        mock
    }

    /// Queue a successful response
    pub fn push_response(&mut self, frame: Vec<u8>) {
        self.responses.push_back(Ok(frame));
    }

    /// Queue a receive failure
    pub fn push_failure(&mut self, error: BridgeError) {
        self.responses.push_back(Err(error));
    }

    /// Make the `index`-th write (zero-based) fail
    pub fn fail_send_at(&mut self, index: usize) {
        self.fail_send_at = Some(index);
    }

    /// Every exchange step in the order it happened
    pub fn events(&self) -> &[MockEvent] {
        &self.events
    }

    /// Frames written so far
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.events
            .iter()
            .filter_map(|event| match event {
                MockEvent::Sent(frame) => Some(frame.clone()),
                MockEvent::Received(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl FrameTransport for MockTransport {
    fn name(&self) -> &str {
        "Mock Transport"
    }

    async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        let index = self.writes;
        self.writes += 1;
        if self.fail_send_at == Some(index) {
            return Err(BridgeError::io(format!("Mock send failure on write {index}")));
        }

        debug!("Mock transport sent {} bytes", frame.len());
        self.stats.record_sent(frame.len());
        self.events.push(MockEvent::Sent(frame.to_vec()));
        Ok(())
    }

    async fn recv_frame(&mut self) -> Result<Vec<u8>> {
        let frame = self
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(BridgeError::io("Mock transport has no scripted response")))?;

        self.stats.record_received(frame.len());
        self.events.push(MockEvent::Received(frame.clone()));
        Ok(frame)
    }

    fn stats(&self) -> ExchangeStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_exchange() {
        let mut mock = MockTransport::with_responses([vec![0x01], vec![0x02]]);

        mock.send_frame(&[0xAA]).await.unwrap();
        assert_eq!(mock.recv_frame().await.unwrap(), vec![0x01]);
        mock.send_frame(&[0xBB]).await.unwrap();
        assert_eq!(mock.recv_frame().await.unwrap(), vec![0x02]);

        assert!(mock.recv_frame().await.is_err());
        assert_eq!(mock.sent_frames(), vec![vec![0xAA], vec![0xBB]]);
        assert_eq!(mock.stats().frames_sent, 2);
        assert_eq!(mock.stats().frames_received, 2);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let mut mock = MockTransport::new();
        mock.push_failure(BridgeError::io("reset"));
        mock.fail_send_at(1);

        mock.send_frame(&[0x01]).await.unwrap();
        assert_eq!(mock.recv_frame().await, Err(BridgeError::io("reset")));
        assert!(mock.send_frame(&[0x02]).await.is_err());
        assert_eq!(mock.events(), &[MockEvent::Sent(vec![0x01])]);
    }
}
