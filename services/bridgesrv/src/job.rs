//! Job payload model
//!
//! A job arrives as a JSON object with PascalCase keys:
//!
//! ```json
//! { "Id": 1, "Port": ":5010", "Command": "01", "Type": 0, "Data": "", "Length": 0 }
//! ```
//!
//! [`JobRequest`] mirrors the payload as received; [`JobRequest::into_plan`]
//! validates it into a [`JobPlan`] so that malformed jobs fail before any
//! socket is opened.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BridgeError, Result};
use crate::protocol::frame::{decode_hex, DeviceId, TemplatedCommand};

/// `Type` value selecting multi-frame mode
pub const MULTI_FRAME_TYPE: i64 = 1;

/// `Command` is either one hex string or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandField {
    One(String),
    Many(Vec<String>),
}

/// Job payload as received from the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobRequest {
    #[serde(default, alias = "id")]
    pub id: i64,
    #[serde(alias = "port")]
    pub port: String,
    #[serde(alias = "command")]
    pub command: CommandField,
    #[serde(default, alias = "data")]
    pub data: String,
    #[serde(default, alias = "length")]
    pub length: i64,
    #[serde(default, rename = "Type", alias = "type")]
    pub job_type: i64,
}

/// What the executor should do for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobMode {
    /// Build one frame from the job fields
    Templated(TemplatedCommand),
    /// Send one pre-built frame
    Single(Vec<u8>),
    /// Send every pre-built frame in order
    Multi(Vec<Vec<u8>>),
}

impl JobMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Templated(_) => "templated",
            Self::Single(_) => "single",
            Self::Multi(_) => "multi",
        }
    }
}

/// Validated job: device port plus execution mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPlan {
    pub port: u16,
    pub mode: JobMode,
}

/// Device answers for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Single(String),
    Multi(Vec<String>),
}

impl JobResult {
    /// Bytes handed back to the queue: the bare hex string, or a JSON array
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        match self {
            Self::Single(hex) => Ok(hex.clone().into_bytes()),
            Self::Multi(list) => Ok(serde_json::to_vec(list)?),
        }
    }
}

impl JobRequest {
    /// Decode a raw job payload
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| BridgeError::invalid_job(format!("payload is not a valid job: {e}")))
    }

    /// Validate the request into an executable plan
    pub fn into_plan(self) -> Result<JobPlan> {
        let port = parse_port(&self.port)?;

        let mode = match (self.job_type, self.command) {
            (MULTI_FRAME_TYPE, CommandField::One(frame)) => {
                JobMode::Multi(vec![decode_hex(&frame, "command frame")?])
            },
            (MULTI_FRAME_TYPE, CommandField::Many(frames)) => {
                JobMode::Multi(decode_frames(&frames)?)
            },
            (_, CommandField::One(command)) => {
                let device_id = DeviceId::try_from(self.id)?;
                JobMode::Templated(TemplatedCommand::from_hex(
                    device_id,
                    &command,
                    &self.data,
                    self.length,
                )?)
            },
            (_, CommandField::Many(frames)) => {
                let mut frames = decode_frames(&frames)?;
                if frames.len() > 1 {
                    warn!(
                        "Single-frame job carries {} frames, only the first is sent",
                        frames.len()
                    );
                }
                JobMode::Single(frames.swap_remove(0))
            },
        };

        Ok(JobPlan { port, mode })
    }
}

fn decode_frames(frames: &[String]) -> Result<Vec<Vec<u8>>> {
    if frames.is_empty() {
        return Err(BridgeError::frame_encoding("command list is empty"));
    }
    frames
        .iter()
        .enumerate()
        .map(|(i, frame)| decode_hex(frame, &format!("command frame {i}")))
        .collect()
}

/// Parse `":<port>"` or a bare port number
pub fn parse_port(port: &str) -> Result<u16> {
    let trimmed = port.trim();
    let digits = trimmed.strip_prefix(':').unwrap_or(trimmed);
    match digits.parse::<u16>() {
        Ok(0) | Err(_) => Err(BridgeError::invalid_job(format!(
            "port {port:?} is not a valid TCP port"
        ))),
        Ok(port) => Ok(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(json: &str) -> Result<JobPlan> {
        JobRequest::from_payload(json.as_bytes())?.into_plan()
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(":5010").unwrap(), 5010);
        assert_eq!(parse_port("5010").unwrap(), 5010);
        assert_eq!(parse_port(" :80 ").unwrap(), 80);

        for bad in ["", ":", ":0", ":65536", "abc", "::5010", ":-1"] {
            assert!(
                matches!(parse_port(bad), Err(BridgeError::InvalidJob(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_templated_plan() {
        let plan = plan(r#"{"Id":1,"Port":":5010","Command":"01","Data":"","Length":0}"#).unwrap();
        assert_eq!(plan.port, 5010);
        match plan.mode {
            JobMode::Templated(cmd) => {
                assert_eq!(cmd.device_id.value(), 1);
                assert_eq!(cmd.command, 0x01);
                assert!(cmd.payload.is_empty());
                assert_eq!(cmd.declared_len, 0);
            },
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let plan = plan(r#"{"Id":7,"Port":":5010","Command":"5A"}"#).unwrap();
        assert_eq!(plan.mode.name(), "templated");
    }

    #[test]
    fn test_lowercase_keys_accepted() {
        let plan = plan(r#"{"id":7,"port":":5010","command":"5A","type":0}"#).unwrap();
        assert_eq!(plan.mode.name(), "templated");
    }

    #[test]
    fn test_multi_plan() {
        let plan = plan(r#"{"Port":":5010","Type":1,"Command":["A501","A502","A503"]}"#).unwrap();
        assert_eq!(
            plan.mode,
            JobMode::Multi(vec![vec![0xA5, 0x01], vec![0xA5, 0x02], vec![0xA5, 0x03]])
        );
    }

    #[test]
    fn test_multi_with_bare_string_is_one_frame() {
        let plan = plan(r#"{"Port":":5010","Type":1,"Command":"A501"}"#).unwrap();
        assert_eq!(plan.mode, JobMode::Multi(vec![vec![0xA5, 0x01]]));
    }

    #[test]
    fn test_single_direct_uses_first_frame() {
        let plan = plan(r#"{"Port":":5010","Type":0,"Command":["A501","A502"]}"#).unwrap();
        assert_eq!(plan.mode, JobMode::Single(vec![0xA5, 0x01]));
    }

    #[test]
    fn test_invalid_payloads() {
        assert!(matches!(plan("not json"), Err(BridgeError::InvalidJob(_))));
        assert!(matches!(
            plan(r#"{"Command":"01"}"#),
            Err(BridgeError::InvalidJob(_))
        ));
        assert!(matches!(
            plan(r#"{"Port":"x","Command":"01"}"#),
            Err(BridgeError::InvalidJob(_))
        ));
        assert!(matches!(
            plan(r#"{"Port":":5010","Type":1,"Command":[]}"#),
            Err(BridgeError::FrameEncoding(_))
        ));
        assert!(matches!(
            plan(r#"{"Port":":5010","Type":1,"Command":["A5","XYZ"]}"#),
            Err(BridgeError::FrameEncoding(_))
        ));
        assert!(matches!(
            plan(r#"{"Id":100000000,"Port":":5010","Command":"01"}"#),
            Err(BridgeError::FrameEncoding(_))
        ));
    }

    #[test]
    fn test_result_payload() {
        assert_eq!(
            JobResult::Single("A501".into()).to_payload().unwrap(),
            b"A501".to_vec()
        );
        assert_eq!(
            JobResult::Multi(vec!["A501".into(), "".into()])
                .to_payload()
                .unwrap(),
            br#"["A501",""]"#.to_vec()
        );
    }
}
