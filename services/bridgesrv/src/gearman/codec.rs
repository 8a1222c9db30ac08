//! Gearman packet framing for `tokio_util::codec::Framed`

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::packet::{Magic, Packet, PacketType, HEADER_LEN};
use crate::error::{BridgeError, Result};

/// Largest packet body accepted from the server
pub const MAX_PACKET_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug)]
pub struct GearmanCodec {
    max_packet_size: usize,
}

impl GearmanCodec {
    pub fn new() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
        }
    }

    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Self { max_packet_size }
    }
}

impl Default for GearmanCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for GearmanCodec {
    type Item = Packet;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        // Reject garbage as soon as the header is complete
        let magic = Magic::parse(&src[..4])?;
        let kind = PacketType::from_code(u32::from_be_bytes([src[4], src[5], src[6], src[7]]));
        let size = u32::from_be_bytes([src[8], src[9], src[10], src[11]]) as usize;

        if size > self.max_packet_size {
            return Err(BridgeError::protocol(format!(
                "gearman packet of {size} bytes exceeds limit of {}",
                self.max_packet_size
            )));
        }

        let total_len = HEADER_LEN + size;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let data: Bytes = src.split_to(size).freeze();
        Ok(Some(Packet { magic, kind, data }))
    }
}

impl Encoder<Packet> for GearmanCodec {
    type Error = BridgeError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        if item.data.len() > self.max_packet_size {
            return Err(BridgeError::protocol(format!(
                "gearman packet of {} bytes exceeds limit of {}",
                item.data.len(),
                self.max_packet_size
            )));
        }
        let size = u32::try_from(item.data.len())
            .map_err(|_| BridgeError::protocol("gearman packet size overflows u32"))?;

        dst.reserve(item.wire_len());
        dst.put_slice(&item.magic.bytes());
        dst.put_u32(item.kind.code());
        dst.put_u32(size);
        dst.put_slice(&item.data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let mut codec = GearmanCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Packet::can_do("Anviz"), &mut buf).unwrap();

        assert_eq!(&buf[..4], b"\0REQ");
        assert_eq!(&buf[4..8], &[0, 0, 0, 1]);
        assert_eq!(&buf[8..12], &[0, 0, 0, 5]);
        assert_eq!(&buf[12..], b"Anviz");
    }

    #[test]
    fn test_decode_waits_for_complete_packet() {
        let mut codec = GearmanCodec::new();
        let mut wire = BytesMut::new();
        codec
            .encode(
                Packet::response(PacketType::JobAssign, &[b"H:1", b"Anviz", b"{}"]),
                &mut wire,
            )
            .unwrap();
        codec
            .encode(Packet::response(PacketType::Noop, &[]), &mut wire)
            .unwrap();

        let mut src = BytesMut::new();
        src.extend_from_slice(&wire[..5]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(&wire[5..20]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(&wire[20..]);

        let first = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(first.magic, Magic::Res);
        assert_eq!(first.kind, PacketType::JobAssign);
        assert_eq!(&first.data[..], b"H:1\0Anviz\0{}");

        let second = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(second.kind, PacketType::Noop);
        assert!(second.data.is_empty());
        assert!(src.is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut codec = GearmanCodec::new();
        let mut src = BytesMut::from(&b"HTTP/1.1 200"[..]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(BridgeError::Protocol(_))
        ));
    }

    #[test]
    fn test_decode_rejects_oversize() {
        let mut codec = GearmanCodec::with_max_packet_size(4);
        let mut src = BytesMut::new();
        src.put_slice(b"\0RES");
        src.put_u32(6);
        src.put_u32(5);
        assert!(matches!(
            codec.decode(&mut src),
            Err(BridgeError::Protocol(_))
        ));
    }
}
