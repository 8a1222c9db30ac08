//! Gearman binary packets
//!
//! ```text
//! magic(4) | type(4, BE) | size(4, BE) | data(size)
//! ```
//!
//! `\0REQ` marks packets sent by the worker, `\0RES` packets sent by the
//! server. Arguments inside `data` are separated by NUL bytes; the last
//! argument (usually the opaque workload) may itself contain NULs.

use bytes::Bytes;

use crate::error::{BridgeError, Result};

/// magic + type + size
pub const HEADER_LEN: usize = 12;

pub const REQ_MAGIC: [u8; 4] = *b"\0REQ";
pub const RES_MAGIC: [u8; 4] = *b"\0RES";

/// Packet direction marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Magic {
    Req,
    Res,
}

impl Magic {
    pub fn bytes(self) -> [u8; 4] {
        match self {
            Self::Req => REQ_MAGIC,
            Self::Res => RES_MAGIC,
        }
    }

    pub fn parse(raw: &[u8]) -> Result<Self> {
        match raw {
            m if m == REQ_MAGIC => Ok(Self::Req),
            m if m == RES_MAGIC => Ok(Self::Res),
            other => Err(BridgeError::protocol(format!(
                "invalid gearman magic {:02X?}",
                other
            ))),
        }
    }
}

/// Packet types a worker sends or handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    CanDo,
    PreSleep,
    Noop,
    GrabJob,
    NoJob,
    JobAssign,
    WorkComplete,
    WorkFail,
    EchoReq,
    EchoRes,
    Error,
    SetClientId,
    WorkException,
    JobAssignUniq,
    /// Anything else the server may send
    Other(u32),
}

impl PacketType {
    pub fn code(self) -> u32 {
        match self {
            Self::CanDo => 1,
            Self::PreSleep => 4,
            Self::Noop => 6,
            Self::GrabJob => 9,
            Self::NoJob => 10,
            Self::JobAssign => 11,
            Self::WorkComplete => 13,
            Self::WorkFail => 14,
            Self::EchoReq => 16,
            Self::EchoRes => 17,
            Self::Error => 19,
            Self::SetClientId => 22,
            Self::WorkException => 25,
            Self::JobAssignUniq => 31,
            Self::Other(code) => code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::CanDo,
            4 => Self::PreSleep,
            6 => Self::Noop,
            9 => Self::GrabJob,
            10 => Self::NoJob,
            11 => Self::JobAssign,
            13 => Self::WorkComplete,
            14 => Self::WorkFail,
            16 => Self::EchoReq,
            17 => Self::EchoRes,
            19 => Self::Error,
            22 => Self::SetClientId,
            25 => Self::WorkException,
            31 => Self::JobAssignUniq,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub magic: Magic,
    pub kind: PacketType,
    pub data: Bytes,
}

impl Packet {
    /// Worker-to-server packet with NUL-joined arguments
    pub fn request(kind: PacketType, args: &[&[u8]]) -> Self {
        Self {
            magic: Magic::Req,
            kind,
            data: Bytes::from(join_args(args)),
        }
    }

    /// Server-to-worker packet with NUL-joined arguments
    pub fn response(kind: PacketType, args: &[&[u8]]) -> Self {
        Self {
            magic: Magic::Res,
            kind,
            data: Bytes::from(join_args(args)),
        }
    }

    pub fn can_do(function: &str) -> Self {
        Self::request(PacketType::CanDo, &[function.as_bytes()])
    }

    pub fn set_client_id(id: &str) -> Self {
        Self::request(PacketType::SetClientId, &[id.as_bytes()])
    }

    pub fn grab_job() -> Self {
        Self::request(PacketType::GrabJob, &[])
    }

    pub fn pre_sleep() -> Self {
        Self::request(PacketType::PreSleep, &[])
    }

    pub fn work_complete(handle: &[u8], result: &[u8]) -> Self {
        Self::request(PacketType::WorkComplete, &[handle, result])
    }

    pub fn work_exception(handle: &[u8], message: &[u8]) -> Self {
        Self::request(PacketType::WorkException, &[handle, message])
    }

    pub fn work_fail(handle: &[u8]) -> Self {
        Self::request(PacketType::WorkFail, &[handle])
    }

    /// Split `data` into exactly `n` arguments; the last keeps any NULs
    pub fn args(&self, n: usize) -> Result<Vec<&[u8]>> {
        let args: Vec<&[u8]> = self.data.splitn(n, |&b| b == 0).collect();
        if args.len() != n {
            return Err(BridgeError::protocol(format!(
                "{:?} packet carries {} arguments, expected {}",
                self.kind,
                args.len(),
                n
            )));
        }
        Ok(args)
    }

    /// Total encoded length
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.data.len()
    }
}

fn join_args(args: &[&[u8]]) -> Vec<u8> {
    let len = args.iter().map(|a| a.len()).sum::<usize>() + args.len().saturating_sub(1);
    let mut data = Vec::with_capacity(len);
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            data.push(0);
        }
        data.extend_from_slice(arg);
    }
    data
}

/// A job handed out by `JOB_ASSIGN` / `JOB_ASSIGN_UNIQ`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub handle: Bytes,
    pub function: String,
    pub unique: Option<String>,
    pub workload: Bytes,
}

impl Job {
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        match packet.kind {
            PacketType::JobAssign => {
                let args = packet.args(3)?;
                Ok(Self {
                    handle: Bytes::copy_from_slice(args[0]),
                    function: String::from_utf8_lossy(args[1]).into_owned(),
                    unique: None,
                    workload: Bytes::copy_from_slice(args[2]),
                })
            },
            PacketType::JobAssignUniq => {
                let args = packet.args(4)?;
                Ok(Self {
                    handle: Bytes::copy_from_slice(args[0]),
                    function: String::from_utf8_lossy(args[1]).into_owned(),
                    unique: Some(String::from_utf8_lossy(args[2]).into_owned()),
                    workload: Bytes::copy_from_slice(args[3]),
                })
            },
            other => Err(BridgeError::protocol(format!(
                "{other:?} is not a job assignment"
            ))),
        }
    }

    /// Handle as text for logs
    pub fn handle_str(&self) -> String {
        String::from_utf8_lossy(&self.handle).into_owned()
    }
}
