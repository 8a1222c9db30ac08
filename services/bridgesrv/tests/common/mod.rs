//! Shared helpers for integration tests: loopback device simulator

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use bridgesrv::protocol::{Checksum, Crc16Checksum};
use bridgesrv::SessionConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Session config bound to loopback with short timeouts
pub fn loopback_config(accept_timeout_ms: u64, exchange_timeout_ms: u64) -> SessionConfig {
    SessionConfig {
        bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        accept_timeout_ms,
        exchange_timeout_ms,
        ..Default::default()
    }
}

/// A loopback port that was free a moment ago
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Device reply: header with declared length, payload, checksum
pub fn reply_frame(device_id: [u8; 4], command: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0xA5];
    frame.extend_from_slice(&device_id);
    frame.push(command);
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    let trailer = Crc16Checksum::default().compute(&frame);
    frame.extend_from_slice(&trailer);
    frame
}

/// One request/response step of the simulated device
#[derive(Debug, Clone)]
pub struct Step {
    /// Bytes to read before answering
    pub request_len: usize,
    pub reply: Vec<u8>,
    /// Write the reply in chunks of this size with a pause in between
    pub chunk: Option<usize>,
}

impl Step {
    pub fn new(request_len: usize, reply: Vec<u8>) -> Self {
        Self {
            request_len,
            reply,
            chunk: None,
        }
    }

    pub fn fragmented(mut self, chunk: usize) -> Self {
        self.chunk = Some(chunk);
        self
    }
}

/// Dial the bridge, retrying until its listener is up
pub async fn connect_with_retry(addr: SocketAddr) -> TcpStream {
    for _ in 0..200 {
        if let Ok(stream) = TcpStream::connect(addr).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("bridge never listened on {addr}");
}

/// Run the device script; resolves to the requests it received
pub fn spawn_device(port: u16, steps: Vec<Step>) -> JoinHandle<Vec<Vec<u8>>> {
    tokio::spawn(async move {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        let mut stream = connect_with_retry(addr).await;
        let mut requests = Vec::with_capacity(steps.len());

        for step in steps {
            let mut request = vec![0u8; step.request_len];
            stream.read_exact(&mut request).await.unwrap();
            requests.push(request);

            match step.chunk {
                Some(size) => {
                    for piece in step.reply.chunks(size) {
                        stream.write_all(piece).await.unwrap();
                        stream.flush().await.unwrap();
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    }
                },
                None => stream.write_all(&step.reply).await.unwrap(),
            }
        }
        requests
    })
}
