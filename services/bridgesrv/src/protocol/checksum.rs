//! Frame checksum
//!
//! The trailer is a 16-bit CRC whose exact variant is fixed by the device
//! firmware. [`Checksum`] keeps the codec independent of the variant;
//! [`Crc16Checksum`] covers the common CRC-16 catalog entries and the
//! trailer byte order.

use std::fmt;

use crc::{
    Crc, CRC_16_ARC, CRC_16_IBM_3740, CRC_16_KERMIT, CRC_16_MCRF4XX, CRC_16_MODBUS,
    CRC_16_XMODEM,
};
use serde::{Deserialize, Serialize};

/// Checksum appended to every request frame
pub trait Checksum: Send + Sync + fmt::Debug {
    /// Compute the 2 trailer bytes over `data`, in wire order
    fn compute(&self, data: &[u8]) -> [u8; 2];

    /// Check that the last 2 bytes of `frame` match the checksum of the rest
    fn verify(&self, frame: &[u8]) -> bool {
        if frame.len() < 2 {
            return false;
        }
        let (body, trailer) = frame.split_at(frame.len() - 2);
        self.compute(body) == [trailer[0], trailer[1]]
    }
}

/// Supported CRC-16 variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crc16Algorithm {
    /// Reflected 0x1021, init 0xFFFF, no xorout
    Mcrf4xx,
    /// Reflected 0x1021, init 0x0000
    Kermit,
    /// Reflected 0x8005, init 0xFFFF
    Modbus,
    /// 0x1021, init 0xFFFF (a.k.a. CCITT-FALSE)
    CcittFalse,
    /// 0x1021, init 0x0000
    Xmodem,
    /// Reflected 0x8005, init 0x0000
    Arc,
}

const MCRF4XX: Crc<u16> = Crc::<u16>::new(&CRC_16_MCRF4XX);
const KERMIT: Crc<u16> = Crc::<u16>::new(&CRC_16_KERMIT);
const MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);
const CCITT_FALSE: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);
const XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);
const ARC: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

impl Crc16Algorithm {
    pub fn checksum(self, data: &[u8]) -> u16 {
        match self {
            Self::Mcrf4xx => MCRF4XX.checksum(data),
            Self::Kermit => KERMIT.checksum(data),
            Self::Modbus => MODBUS.checksum(data),
            Self::CcittFalse => CCITT_FALSE.checksum(data),
            Self::Xmodem => XMODEM.checksum(data),
            Self::Arc => ARC.checksum(data),
        }
    }
}

/// Byte order of the checksum trailer on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    Big,
    Little,
}

/// CRC-16 checksum with configurable variant and trailer order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crc16Checksum {
    pub algorithm: Crc16Algorithm,
    pub byte_order: ByteOrder,
}

impl Crc16Checksum {
    pub const fn new(algorithm: Crc16Algorithm, byte_order: ByteOrder) -> Self {
        Self {
            algorithm,
            byte_order,
        }
    }
}

impl Default for Crc16Checksum {
    fn default() -> Self {
        Self::new(Crc16Algorithm::Mcrf4xx, ByteOrder::Little)
    }
}

impl Checksum for Crc16Checksum {
    fn compute(&self, data: &[u8]) -> [u8; 2] {
        let crc = self.algorithm.checksum(data);
        match self.byte_order {
            ByteOrder::Big => crc.to_be_bytes(),
            ByteOrder::Little => crc.to_le_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECK_INPUT: &[u8] = b"123456789";

    #[test]
    fn test_catalog_check_values() {
        // Standard check values over "123456789"
        assert_eq!(Crc16Algorithm::Mcrf4xx.checksum(CHECK_INPUT), 0x6F91);
        assert_eq!(Crc16Algorithm::Kermit.checksum(CHECK_INPUT), 0x2189);
        assert_eq!(Crc16Algorithm::Modbus.checksum(CHECK_INPUT), 0x4B37);
        assert_eq!(Crc16Algorithm::CcittFalse.checksum(CHECK_INPUT), 0x29B1);
        assert_eq!(Crc16Algorithm::Xmodem.checksum(CHECK_INPUT), 0x31C3);
        assert_eq!(Crc16Algorithm::Arc.checksum(CHECK_INPUT), 0xBB3D);
    }

    #[test]
    fn test_trailer_byte_order() {
        let little = Crc16Checksum::new(Crc16Algorithm::Modbus, ByteOrder::Little);
        let big = Crc16Checksum::new(Crc16Algorithm::Modbus, ByteOrder::Big);
        assert_eq!(little.compute(CHECK_INPUT), [0x37, 0x4B]);
        assert_eq!(big.compute(CHECK_INPUT), [0x4B, 0x37]);
    }

    #[test]
    fn test_verify() {
        let checksum = Crc16Checksum::default();
        let mut frame = vec![0xA5, 0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00];
        let trailer = checksum.compute(&frame);
        frame.extend_from_slice(&trailer);

        assert!(checksum.verify(&frame));
        frame[5] ^= 0xFF;
        assert!(!checksum.verify(&frame));
        assert!(!checksum.verify(&[0x01]));
    }

    #[test]
    fn test_serde_names() {
        let parsed: Crc16Checksum =
            serde_json::from_str(r#"{"algorithm":"ccitt_false","byte_order":"big"}"#).unwrap();
        assert_eq!(
            parsed,
            Crc16Checksum::new(Crc16Algorithm::CcittFalse, ByteOrder::Big)
        );
    }
}
