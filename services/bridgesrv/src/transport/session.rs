//! Device Session
//!
//! One job, one port, one device. The session binds a listener on the
//! job's port, waits for the device to dial in, drops the listener as soon
//! as the first connection is accepted and then exchanges frames until
//! closed.
//!
//! ```text
//! Idle -> Listening -> Accepted -> Closed
//!             |
//!             +-----> TimedOut
//! ```
//!
//! The accepted socket gets an absolute deadline (`exchange_timeout` from
//! the moment of accept) that bounds every read and write of the session.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use common::hex::format_hex_pretty;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::traits::{ExchangeStats, FrameTransport};
use crate::error::{BridgeError, Result};
use crate::protocol::frame::{ResponseLayout, CHECKSUM_LEN};

/// Device session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interface the per-job listener binds to
    pub bind_host: IpAddr,
    /// How long to wait for the device to dial in
    pub accept_timeout_ms: u64,
    /// Deadline for all exchanges, counted from accept
    pub exchange_timeout_ms: u64,
    /// Largest payload length accepted in a device reply
    pub max_response_payload: usize,
    /// Header layout of device replies
    pub response: ResponseLayout,
    /// TCP no-delay on the accepted socket
    pub no_delay: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            accept_timeout_ms: 5_000,
            exchange_timeout_ms: 15_000,
            max_response_payload: 4_096,
            response: ResponseLayout::default(),
            no_delay: true,
        }
    }
}

impl SessionConfig {
    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.accept_timeout_ms == 0 {
            return Err(BridgeError::config(
                "session.accept_timeout_ms must be greater than zero",
            ));
        }
        if self.exchange_timeout_ms == 0 {
            return Err(BridgeError::config(
                "session.exchange_timeout_ms must be greater than zero",
            ));
        }
        if self.max_response_payload > usize::from(u16::MAX) {
            return Err(BridgeError::config(
                "session.max_response_payload cannot exceed 65535",
            ));
        }
        self.response.validate()
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Listening,
    Accepted,
    TimedOut,
    Closed,
}

/// Single-use TCP session with one inbound device
#[derive(Debug)]
pub struct DeviceSession {
    port: u16,
    config: SessionConfig,
    state: SessionState,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    deadline: Option<Instant>,
    stats: ExchangeStats,
}

impl DeviceSession {
    /// Fresh session in the `Idle` state
    pub fn new(port: u16, config: SessionConfig) -> Self {
        Self {
            port,
            config,
            state: SessionState::Idle,
            listener: None,
            stream: None,
            peer: None,
            deadline: None,
            stats: ExchangeStats::default(),
        }
    }

    /// Bind the listener and wait for the device
    pub async fn open(port: u16, config: SessionConfig) -> Result<Self> {
        let mut session = Self::new(port, config);
        session.listen().await?;
        session.accept().await?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Address of the bound listener (useful with port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Bind the per-job listener: `Idle -> Listening`
    pub async fn listen(&mut self) -> Result<SocketAddr> {
        if self.state != SessionState::Idle {
            return Err(BridgeError::state(format!(
                "cannot listen on port {} from state {:?}",
                self.port, self.state
            )));
        }

        let addr = SocketAddr::new(self.config.bind_host, self.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::bind(format!("Failed to bind {addr}: {e}")))?;
        let local = listener
            .local_addr()
            .map_err(|e| BridgeError::bind(format!("Failed to read local address: {e}")))?;

        debug!("Listening for device on {local}");
        self.listener = Some(listener);
        self.state = SessionState::Listening;
        Ok(local)
    }

    /// Accept exactly one device: `Listening -> Accepted | TimedOut`
    pub async fn accept(&mut self) -> Result<SocketAddr> {
        let listener = match (self.state, self.listener.take()) {
            (SessionState::Listening, Some(listener)) => listener,
            (state, _) => {
                return Err(BridgeError::state(format!(
                    "cannot accept on port {} from state {:?}",
                    self.port, state
                )))
            },
        };

        let accept_timeout = self.config.accept_timeout();
        match timeout(accept_timeout, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                // No further connections on this port for this job
                drop(listener);

                if self.config.no_delay {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY: {e}");
                    }
                }

                self.deadline = Some(Instant::now() + self.config.exchange_timeout());
                self.stream = Some(stream);
                self.peer = Some(peer);
                self.state = SessionState::Accepted;
                info!("New connection from {peer}");
                Ok(peer)
            },
            Ok(Err(e)) => {
                self.state = SessionState::Closed;
                Err(BridgeError::io(format!(
                    "Accept on port {} failed: {e}",
                    self.port
                )))
            },
            Err(_) => {
                self.state = SessionState::TimedOut;
                let msg = format!(
                    "No device connected on port {} within {:?}",
                    self.port, accept_timeout
                );
                warn!("{msg}");
                Err(BridgeError::connect_timeout(msg))
            },
        }
    }

    /// Release all sockets; idempotent
    pub async fn close(&mut self) {
        self.listener = None;
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Error during device socket shutdown: {e}");
            }
            debug!("Closed device session on port {}", self.port);
        }
        self.state = SessionState::Closed;
    }

    fn connection(&mut self) -> Result<(&mut TcpStream, Instant)> {
        match (self.state, self.stream.as_mut(), self.deadline) {
            (SessionState::Accepted, Some(stream), Some(deadline)) => Ok((stream, deadline)),
            (state, _, _) => Err(BridgeError::state(format!(
                "no device connection on port {} (state {:?})",
                self.port, state
            ))),
        }
    }

    /// Fill `buf` completely, looping over partial reads until the deadline
    async fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        let exchange_timeout = self.config.exchange_timeout();
        let (stream, deadline) = self.connection()?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = match timeout_at(deadline, stream.read(&mut buf[filled..])).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(BridgeError::io(format!("Failed to read from device: {e}"))),
                Err(_) => {
                    return Err(BridgeError::io(format!(
                        "Exchange deadline of {exchange_timeout:?} expired after {filled} of {} bytes",
                        buf.len()
                    )))
                },
            };
            if n == 0 {
                return Err(BridgeError::io(format!(
                    "Device closed the connection after {filled} of {} bytes",
                    buf.len()
                )));
            }
            filled += n;
        }
        Ok(())
    }

    /// Write one frame under the session deadline
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let exchange_timeout = self.config.exchange_timeout();
        let (stream, deadline) = self.connection()?;
        match timeout_at(deadline, stream.write_all(frame)).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err(BridgeError::io(format!("Failed to write to device: {e}"))),
            Err(_) => {
                return Err(BridgeError::io(format!(
                    "Exchange deadline of {exchange_timeout:?} expired while writing"
                )))
            },
        }

        self.stats.record_sent(frame.len());
        debug!(hex_data = %format_hex_pretty(frame), length = frame.len(), direction = "send", "[Device Session] Raw frame");
        Ok(())
    }

    /// Read one response frame: header, declared payload, checksum
    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let layout = self.config.response;
        let mut frame = vec![0u8; layout.header_len];
        self.read_full(&mut frame).await?;

        let payload_len = layout.payload_len(&frame)?;
        if payload_len > self.config.max_response_payload {
            return Err(BridgeError::protocol(format!(
                "Device announced {payload_len} payload bytes, limit is {}",
                self.config.max_response_payload
            )));
        }

        frame.resize(layout.header_len + payload_len + CHECKSUM_LEN, 0);
        self.read_full(&mut frame[layout.header_len..]).await?;

        self.stats.record_received(frame.len());
        debug!(hex_data = %format_hex_pretty(&frame), length = frame.len(), direction = "recv", "[Device Session] Raw frame");
        Ok(frame)
    }
}

#[async_trait]
impl FrameTransport for DeviceSession {
    fn name(&self) -> &str {
        "Device Session"
    }

    async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.write_frame(frame).await
    }

    async fn recv_frame(&mut self) -> Result<Vec<u8>> {
        self.read_frame().await
    }

    fn stats(&self) -> ExchangeStats {
        self.stats
    }
}
