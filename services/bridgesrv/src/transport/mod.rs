//! Device transport
//!
//! - `traits`: the `FrameTransport` seam used by the executor
//! - `session`: per-job TCP listener/accept/deadline lifecycle
//! - `mock`: scripted transport for tests (`test-utils` feature)

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod session;
pub mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockEvent, MockTransport};
pub use session::{DeviceSession, SessionConfig, SessionState};
pub use traits::{ExchangeStats, FrameTransport};
