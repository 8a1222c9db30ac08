//! Device frame codec
//!
//! Request frame layout:
//!
//! ```text
//! offset 0      STX 0xA5
//! offset 1-4    device id (8 decimal digits read as 4 hex bytes)
//! offset 5      command
//! offset 6-7    payload length, big-endian
//! offset 8..    payload (0-400 bytes)
//! trailing 2    checksum over everything before it
//! ```
//!
//! Pure functions only; socket handling lives in `transport::session`.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::checksum::Checksum;
use crate::error::{BridgeError, Result};

/// Start-of-frame marker
pub const STX: u8 = 0xA5;

/// STX + device id + command + length
pub const REQUEST_HEADER_LEN: usize = 8;

/// Checksum trailer length
pub const CHECKSUM_LEN: usize = 2;

/// Largest payload the device accepts in one frame
pub const MAX_PAYLOAD_LEN: usize = 400;

/// Largest device id representable in 8 decimal digits
pub const MAX_DEVICE_ID: u32 = 99_999_999;

/// Device identifier, 0..=99_999_999
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct DeviceId(u32);

impl DeviceId {
    pub fn new(id: u32) -> Result<Self> {
        if id > MAX_DEVICE_ID {
            return Err(BridgeError::frame_encoding(format!(
                "device id {id} exceeds 8 decimal digits"
            )));
        }
        Ok(Self(id))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Wire bytes: the zero-padded decimal digits taken pairwise as hex
    ///
    /// `1` -> `00 00 00 01`, `12345678` -> `12 34 56 78`
    pub fn to_bytes(self) -> [u8; 4] {
        let mut digits = self.0;
        let mut out = [0u8; 4];
        for slot in out.iter_mut().rev() {
            let low = (digits % 10) as u8;
            digits /= 10;
            let high = (digits % 10) as u8;
            digits /= 10;
            *slot = (high << 4) | low;
        }
        out
    }
}

impl TryFrom<i64> for DeviceId {
    type Error = BridgeError;

    fn try_from(value: i64) -> Result<Self> {
        let id = u32::try_from(value)
            .map_err(|_| BridgeError::frame_encoding(format!("device id {value} out of range")))?;
        Self::new(id)
    }
}

impl From<DeviceId> for u32 {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}

/// Semantic fields of a templated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplatedCommand {
    pub device_id: DeviceId,
    pub command: u8,
    pub payload: Vec<u8>,
    /// Declared length written into the header; not checked against `payload`
    pub declared_len: u16,
}

impl TemplatedCommand {
    /// Parse the hex-encoded job fields
    pub fn from_hex(device_id: DeviceId, command: &str, payload: &str, length: i64) -> Result<Self> {
        let payload = decode_hex(payload, "payload")?;
        if payload.len() > MAX_PAYLOAD_LEN {
            warn!(
                "Payload of {} bytes exceeds the device limit of {}",
                payload.len(),
                MAX_PAYLOAD_LEN
            );
        }
        Ok(Self {
            device_id,
            command: parse_command(command)?,
            payload,
            declared_len: parse_length(length)?,
        })
    }
}

/// Decode a hex string, naming the field on failure
pub fn decode_hex(input: &str, field: &str) -> Result<Vec<u8>> {
    hex::decode(input)
        .map_err(|e| BridgeError::frame_encoding(format!("{field} is not valid hex: {e}")))
}

fn parse_command(command: &str) -> Result<u8> {
    match decode_hex(command, "command")?.as_slice() {
        [byte] => Ok(*byte),
        other => Err(BridgeError::frame_encoding(format!(
            "command must be exactly one byte, got {}",
            other.len()
        ))),
    }
}

fn parse_length(length: i64) -> Result<u16> {
    u16::try_from(length).map_err(|_| {
        BridgeError::frame_encoding(format!("declared length {length} does not fit 16 bits"))
    })
}

/// Assemble a request frame and append its checksum
pub fn build_frame(request: &TemplatedCommand, checksum: &dyn Checksum) -> Vec<u8> {
    let mut frame =
        Vec::with_capacity(REQUEST_HEADER_LEN + request.payload.len() + CHECKSUM_LEN);
    frame.push(STX);
    frame.extend_from_slice(&request.device_id.to_bytes());
    frame.push(request.command);
    frame.extend_from_slice(&request.declared_len.to_be_bytes());
    frame.extend_from_slice(&request.payload);

    let trailer = checksum.compute(&frame);
    frame.extend_from_slice(&trailer);
    frame
}

/// Build a frame straight from the hex job fields
pub fn build_frame_hex(
    device_id: u32,
    command: &str,
    payload: &str,
    length: i64,
    checksum: &dyn Checksum,
) -> Result<Vec<u8>> {
    let request = TemplatedCommand::from_hex(DeviceId::new(device_id)?, command, payload, length)?;
    Ok(build_frame(&request, checksum))
}

/// Strip zero padding at both ends of a response
pub fn trim_zero_padding(raw: &[u8]) -> &[u8] {
    let start = raw.iter().position(|&b| b != 0).unwrap_or(raw.len());
    let end = raw.iter().rposition(|&b| b != 0).map_or(start, |i| i + 1);
    &raw[start..end]
}

/// Normalize a raw response to uppercase hex without padding
pub fn decode_response(raw: &[u8]) -> String {
    common::hex::encode_upper(trim_zero_padding(raw))
}

/// Where the payload length sits in a device reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseLayout {
    /// Bytes before the payload
    pub header_len: usize,
    /// Offset of the big-endian u16 payload length inside the header
    pub length_offset: usize,
}

impl Default for ResponseLayout {
    fn default() -> Self {
        Self {
            header_len: REQUEST_HEADER_LEN,
            length_offset: 6,
        }
    }
}

impl ResponseLayout {
    pub fn validate(&self) -> Result<()> {
        if self.length_offset + 2 > self.header_len {
            return Err(BridgeError::config(format!(
                "response length field at offset {} does not fit a {}-byte header",
                self.length_offset, self.header_len
            )));
        }
        Ok(())
    }

    /// Declared payload length read from a complete header
    pub fn payload_len(&self, header: &[u8]) -> Result<usize> {
        let needed = self.header_len.max(self.length_offset + 2);
        if header.len() < needed {
            return Err(BridgeError::protocol(format!(
                "response header truncated: {} of {} bytes",
                header.len(),
                needed
            )));
        }
        let hi = header[self.length_offset];
        let lo = header[self.length_offset + 1];
        Ok(u16::from_be_bytes([hi, lo]) as usize)
    }

    /// Total frame length announced by `header`
    pub fn frame_len(&self, header: &[u8]) -> Result<usize> {
        Ok(self.header_len + self.payload_len(header)? + CHECKSUM_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum::{ByteOrder, Crc16Algorithm, Crc16Checksum};

    fn checksum() -> Crc16Checksum {
        Crc16Checksum::default()
    }

    #[test]
    fn test_device_id_digit_pairs() {
        assert_eq!(DeviceId::new(1).unwrap().to_bytes(), [0x00, 0x00, 0x00, 0x01]);
        assert_eq!(
            DeviceId::new(12_345_678).unwrap().to_bytes(),
            [0x12, 0x34, 0x56, 0x78]
        );
        assert_eq!(
            DeviceId::new(MAX_DEVICE_ID).unwrap().to_bytes(),
            [0x99, 0x99, 0x99, 0x99]
        );
        assert_eq!(DeviceId::new(0).unwrap().to_bytes(), [0; 4]);
    }

    #[test]
    fn test_device_id_matches_hex_decoded_decimal_string() {
        for id in [0u32, 7, 42, 1_000, 31_415_926, MAX_DEVICE_ID] {
            let expected = hex::decode(format!("{:08}", id)).unwrap();
            assert_eq!(DeviceId::new(id).unwrap().to_bytes().to_vec(), expected);
        }
    }

    #[test]
    fn test_device_id_range() {
        assert!(DeviceId::new(MAX_DEVICE_ID + 1).is_err());
        assert!(DeviceId::try_from(-1i64).is_err());
        assert!(DeviceId::try_from(i64::from(u32::MAX) + 1).is_err());
        assert_eq!(DeviceId::try_from(5i64).unwrap().to_string(), "00000005");
    }

    #[test]
    fn test_build_frame_layout() {
        let frame = build_frame_hex(1, "01", "", 0, &checksum()).unwrap();
        assert_eq!(frame.len(), REQUEST_HEADER_LEN + CHECKSUM_LEN);
        assert_eq!(&frame[..8], &[0xA5, 0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00]);
        assert!(checksum().verify(&frame));
    }

    #[test]
    fn test_build_frame_with_payload() {
        let frame = build_frame_hex(12_345_678, "5a", "0102030405", 5, &checksum()).unwrap();
        assert_eq!(frame.len(), 8 + 5 + 2);
        assert_eq!(frame[0], STX);
        assert_eq!(&frame[1..5], &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(frame[5], 0x5A);
        assert_eq!(&frame[6..8], &[0x00, 0x05]);
        assert_eq!(&frame[8..13], &[0x01, 0x02, 0x03, 0x04, 0x05]);

        let trailer = checksum().compute(&frame[..13]);
        assert_eq!(&frame[13..], &trailer);
    }

    #[test]
    fn test_declared_length_not_validated_against_payload() {
        let frame = build_frame_hex(1, "40", "AABB", 0x0123, &checksum()).unwrap();
        assert_eq!(&frame[6..8], &[0x01, 0x23]);
        assert_eq!(frame.len(), 8 + 2 + 2);
    }

    #[test]
    fn test_length_and_checksum_properties_over_payload_sizes() {
        let cs = Crc16Checksum::new(Crc16Algorithm::Kermit, ByteOrder::Big);
        for size in [0usize, 1, 2, 17, 128, MAX_PAYLOAD_LEN] {
            let payload = hex::encode((0..size).map(|i| (i % 251) as u8 + 1).collect::<Vec<_>>());
            let frame = build_frame_hex(99, "01", &payload, size as i64, &cs).unwrap();
            assert_eq!(frame.len(), 8 + size + 2);
            assert_eq!(frame[0], STX);
            assert!(cs.verify(&frame));
        }
    }

    #[test]
    fn test_build_frame_rejects_malformed_input() {
        let cs = checksum();
        assert!(matches!(
            build_frame_hex(1, "0G", "", 0, &cs),
            Err(BridgeError::FrameEncoding(_))
        ));
        assert!(matches!(
            build_frame_hex(1, "0102", "", 0, &cs),
            Err(BridgeError::FrameEncoding(_))
        ));
        assert!(matches!(
            build_frame_hex(1, "01", "ABC", 0, &cs),
            Err(BridgeError::FrameEncoding(_))
        ));
        assert!(matches!(
            build_frame_hex(1, "01", "", 70_000, &cs),
            Err(BridgeError::FrameEncoding(_))
        ));
        assert!(matches!(
            build_frame_hex(100_000_000, "01", "", 0, &cs),
            Err(BridgeError::FrameEncoding(_))
        ));
    }

    #[test]
    fn test_padded_hex_fields_rejected() {
        let cs = checksum();
        assert!(matches!(
            build_frame_hex(1, " 01 ", "", 0, &cs),
            Err(BridgeError::FrameEncoding(_))
        ));
        assert!(matches!(
            build_frame_hex(1, "01", "0102 ", 2, &cs),
            Err(BridgeError::FrameEncoding(_))
        ));
        assert!(decode_hex("\tA501", "command frame").is_err());
    }

    #[test]
    fn test_decode_response_trims_both_ends() {
        assert_eq!(decode_response(&[0x00, 0x00, 0xAB, 0xCD, 0x00]), "ABCD");
        assert_eq!(decode_response(&[0xAB, 0x00, 0xCD]), "AB00CD");
    }

    #[test]
    fn test_decode_response_exact_hex_without_padding() {
        let raw = [0xA5, 0x01, 0x7F, 0x10, 0xFE];
        assert_eq!(decode_response(&raw), "A5017F10FE");
    }

    #[test]
    fn test_decode_response_empty() {
        assert_eq!(decode_response(&[]), "");
        assert_eq!(decode_response(&[0x00, 0x00, 0x00]), "");
    }

    #[test]
    fn test_response_layout() {
        let layout = ResponseLayout::default();
        let header = [0xA5, 0x00, 0x00, 0x00, 0x01, 0x81, 0x00, 0x03];
        assert_eq!(layout.payload_len(&header).unwrap(), 3);
        assert_eq!(layout.frame_len(&header).unwrap(), 13);
        assert!(layout.payload_len(&header[..5]).is_err());

        // ACK + RET header variant
        let reply = ResponseLayout {
            header_len: 9,
            length_offset: 7,
        };
        assert!(reply.validate().is_ok());
        let header = [0xA5, 0x00, 0x00, 0x00, 0x01, 0xC0, 0x00, 0x01, 0x00];
        assert_eq!(reply.frame_len(&header).unwrap(), 9 + 256 + 2);

        let broken = ResponseLayout {
            header_len: 4,
            length_offset: 3,
        };
        assert!(broken.validate().is_err());
    }
}
