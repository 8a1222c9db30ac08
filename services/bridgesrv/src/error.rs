//! Error handling for the bridge service
//!
//! Every per-job failure is one of these variants and is returned to the
//! job-queue boundary; none of them stops the worker. Only startup failures
//! (configuration, initial queue registration) end the process.

use thiserror::Error;

/// Bridge service error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Listening port unavailable (in use, insufficient privilege)
    #[error("Bind error: {0}")]
    Bind(String),

    /// No device dialed in within the accept window
    #[error("Connect timeout: {0}")]
    ConnectTimeout(String),

    /// Read/write failure or deadline expiry during an exchange
    #[error("IO error: {0}")]
    Io(String),

    /// Malformed hex or out-of-range frame fields in the job payload
    #[error("Frame encoding error: {0}")]
    FrameEncoding(String),

    /// Job payload is not a valid job (bad JSON, malformed port)
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// Peer violated framing (device reply or job-queue packet)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration load or validation failure
    #[error("Configuration error: {0}")]
    Config(String),

    /// Job-queue server connection failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Session used outside its lifecycle (accept twice, exchange after close)
    #[error("State error: {0}")]
    State(String),
}

/// Result type alias for the bridge service
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    pub fn bind(msg: impl Into<String>) -> Self {
        BridgeError::Bind(msg.into())
    }

    pub fn connect_timeout(msg: impl Into<String>) -> Self {
        BridgeError::ConnectTimeout(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        BridgeError::Io(msg.into())
    }

    pub fn frame_encoding(msg: impl Into<String>) -> Self {
        BridgeError::FrameEncoding(msg.into())
    }

    pub fn invalid_job(msg: impl Into<String>) -> Self {
        BridgeError::InvalidJob(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        BridgeError::Protocol(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        BridgeError::Config(msg.into())
    }

    pub fn queue(msg: impl Into<String>) -> Self {
        BridgeError::Queue(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        BridgeError::State(msg.into())
    }

    /// Stable code used as a structured log field
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Bind(_) => "BRIDGE_BIND_ERROR",
            Self::ConnectTimeout(_) => "BRIDGE_CONNECT_TIMEOUT",
            Self::Io(_) => "BRIDGE_IO_ERROR",
            Self::FrameEncoding(_) => "BRIDGE_FRAME_ENCODING_ERROR",
            Self::InvalidJob(_) => "BRIDGE_INVALID_JOB",
            Self::Protocol(_) => "BRIDGE_PROTOCOL_ERROR",
            Self::Config(_) => "BRIDGE_CONFIG_ERROR",
            Self::Queue(_) => "BRIDGE_QUEUE_ERROR",
            Self::State(_) => "BRIDGE_STATE_ERROR",
        }
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::InvalidJob(format!("JSON: {err}"))
    }
}

impl From<hex::FromHexError> for BridgeError {
    fn from(err: hex::FromHexError) -> Self {
        BridgeError::FrameEncoding(format!("hex: {err}"))
    }
}

impl From<figment::Error> for BridgeError {
    fn from(err: figment::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

impl From<common::LoggingError> for BridgeError {
    fn from(err: common::LoggingError) -> Self {
        BridgeError::Config(format!("logging: {err}"))
    }
}

// ============================================================================
// Extension trait for adding context to errors
// ============================================================================

/// Extension trait for adding context to errors
pub trait ErrorExt<T> {
    fn queue_error(self, msg: &str) -> Result<T>;
}

impl<T, E> ErrorExt<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn queue_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| BridgeError::Queue(format!("{msg}: {e}")))
    }
}
