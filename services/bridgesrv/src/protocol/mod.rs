//! Device protocol: frame codec and checksum

pub mod checksum;
pub mod frame;

pub use checksum::{ByteOrder, Checksum, Crc16Algorithm, Crc16Checksum};
pub use frame::{
    build_frame, build_frame_hex, decode_response, trim_zero_padding, DeviceId, ResponseLayout,
    TemplatedCommand,
};
