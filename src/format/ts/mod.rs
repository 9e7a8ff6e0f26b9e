//! # MPEG Transport Stream (TS) Implementation
//!
//! Stateless encode/decode of single 188-byte TS packets and the PES packets they carry.
//! There is no demuxer or muxer here: callers hand this module one packet's worth of bytes at
//! a time and get a [`TsPacket`] back, or vice versa.
//!
//! ## Example
//!
//! ```rust
//! use broadcore::format::ts::{TsPacket, TsHeader, TS_PACKET_SIZE};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut data = [0u8; TS_PACKET_SIZE];
//! data[0] = 0x47;
//! let packet = TsPacket::decode(&data)?;
//! assert_eq!(packet.header.pid, 0x1FFF);
//! # Ok(())
//! # }
//! ```

/// PES packet header encode/decode
pub mod pes;

/// Core TS packet, header, and adaptation field types
pub mod types;

pub use pes::{PesOptionalHeader, PesPacket};
pub use types::{
    AdaptationField, AdaptationFieldData, ProgramClockReference, TsHeader, TsPacket, TsPayload,
    SYNC_BYTE, TS_HEADER_SIZE, TS_PACKET_SIZE,
};
