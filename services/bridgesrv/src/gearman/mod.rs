//! Gearman worker-protocol client
//!
//! Only the worker role: register a function, grab jobs, report results.

pub mod codec;
pub mod packet;
pub mod worker;

pub use codec::{GearmanCodec, MAX_PACKET_SIZE};
pub use packet::{Job, Magic, Packet, PacketType};
pub use worker::{ErrorReply, JobHandler, Worker, WorkerConfig};
