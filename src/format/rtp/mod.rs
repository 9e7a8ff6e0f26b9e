//! # Real-time Transport Protocol (RTP) Implementation
//!
//! This module provides RTP (RFC 3550) packet encode/decode plus two small pieces of ambient
//! machinery built on top of it: a reordering [`JitterBuffer`] and a stateful transmit-side
//! [`Session`].
//!
//! ## Example: Creating and Parsing RTP Packets
//!
//! ```rust
//! use broadcore::format::rtp::RtpPacket;
//! use bytes::Bytes;
//!
//! let payload = Bytes::from(vec![1, 2, 3, 4]);
//! let packet = RtpPacket::new(96, 1000, 90000, 0x12345678, true, payload);
//! let encoded = packet.encode().unwrap();
//! let parsed = RtpPacket::decode(&encoded).unwrap();
//! assert_eq!(parsed.sequence_number, 1000);
//! ```
//!
//! ## Example: Using Jitter Buffer
//!
//! ```rust
//! use broadcore::format::rtp::{JitterBuffer, RtpPacket};
//! use bytes::Bytes;
//!
//! let mut jitter = JitterBuffer::new(32);
//! let packet = RtpPacket::new(96, 1000, 90000, 0x12345678, false, Bytes::from(vec![1, 2, 3]));
//! jitter.push(packet).unwrap();
//!
//! while let Some(packet) = jitter.pop() {
//!     println!("processing packet {}", packet.sequence_number);
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Errors that can occur during RTP operations.
#[derive(Debug, Error)]
pub enum RtpError {
    #[error("RTP packet shorter than the 12-byte fixed header")]
    TooShort,

    #[error("RTP packet is truncated: {0}")]
    Truncated(&'static str),

    #[error("unsupported RTP version: {0}")]
    UnsupportedVersion(u8),

    /// The packet decoded cleanly but carried no payload bytes; every header field is still
    /// populated on the returned packet.
    #[error("RTP packet has no payload")]
    NoPayload,

    #[error("field '{field}' does not fit in {max_bits} bits: {value}")]
    FieldOutOfRange {
        field: &'static str,
        max_bits: u32,
        value: u64,
    },

    #[error("jitter buffer is full")]
    BufferOverflow,

    #[error("sequence number wrapped around the buffer window")]
    SequenceWrapped,
}

/// Specialized Result type for RTP operations.
pub type Result<T> = std::result::Result<T, RtpError>;

/// An RTP packet (RFC 3550 §5.1) containing media data and metadata.
#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    /// Extension header as `(profile, data)`; `data`'s length in bytes is written on the wire
    /// directly (not in 4-byte words).
    pub extension_data: Option<(u16, Bytes)>,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn new(
        payload_type: u8,
        sequence_number: u16,
        timestamp: u32,
        ssrc: u32,
        marker: bool,
        payload: Bytes,
    ) -> Self {
        Self {
            version: 2,
            padding: false,
            extension: false,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            extension_data: None,
            payload,
        }
    }

    /// Decodes an RTP packet. A packet that parses cleanly but has an empty payload after
    /// stripping CSRCs/extension/padding is reported as [`RtpError::NoPayload`] even though
    /// every header field is populated on the returned value — callers that only need header
    /// metadata can still use it.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(RtpError::TooShort);
        }

        let first_byte = data[0];
        let second_byte = data[1];

        let version = (first_byte >> 6) & 0x03;
        if version != 2 {
            return Err(RtpError::UnsupportedVersion(version));
        }

        let padding = (first_byte & 0x20) != 0;
        let extension = (first_byte & 0x10) != 0;
        let csrc_count = first_byte & 0x0F;

        let marker = (second_byte & 0x80) != 0;
        let payload_type = second_byte & 0x7F;

        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut offset = 12;

        let mut csrc = Vec::with_capacity(csrc_count as usize);
        for _ in 0..csrc_count {
            if offset + 4 > data.len() {
                return Err(RtpError::Truncated("CSRC list"));
            }
            csrc.push(u32::from_be_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]));
            offset += 4;
        }

        let extension_data = if extension {
            if offset + 4 > data.len() {
                return Err(RtpError::Truncated("extension header"));
            }
            let profile = u16::from_be_bytes([data[offset], data[offset + 1]]);
            let data_len = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4;

            if offset + data_len > data.len() {
                return Err(RtpError::Truncated("extension data"));
            }
            let ext_data = Bytes::copy_from_slice(&data[offset..offset + data_len]);
            offset += data_len;
            Some((profile, ext_data))
        } else {
            None
        };

        let payload = if padding {
            if data.is_empty() {
                return Err(RtpError::Truncated("padding length octet"));
            }
            let padding_len = data[data.len() - 1] as usize;
            if padding_len == 0 || offset + padding_len > data.len() {
                return Err(RtpError::Truncated("padding"));
            }
            Bytes::copy_from_slice(&data[offset..data.len() - padding_len])
        } else {
            Bytes::copy_from_slice(&data[offset..])
        };

        let packet = Self {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_data,
            payload,
        };

        if packet.payload.is_empty() {
            return Err(RtpError::NoPayload);
        }
        Ok(packet)
    }

    pub fn encode(&self) -> Result<Bytes> {
        if self.version > 2 {
            return Err(RtpError::FieldOutOfRange {
                field: "version",
                max_bits: 2,
                value: self.version as u64,
            });
        }
        if self.csrc.len() > 15 {
            return Err(RtpError::FieldOutOfRange {
                field: "csrc_count",
                max_bits: 4,
                value: self.csrc.len() as u64,
            });
        }
        if self.payload_type > 127 {
            return Err(RtpError::FieldOutOfRange {
                field: "payload_type",
                max_bits: 7,
                value: self.payload_type as u64,
            });
        }
        if let Some((_, data)) = &self.extension_data {
            if data.len() > 0xFFFF {
                return Err(RtpError::FieldOutOfRange {
                    field: "extension_data_len",
                    max_bits: 16,
                    value: data.len() as u64,
                });
            }
        }

        let mut buf = BytesMut::with_capacity(12 + self.payload.len());

        let mut b0 = self.version << 6;
        if self.padding {
            b0 |= 0x20;
        }
        if self.extension {
            b0 |= 0x10;
        }
        b0 |= self.csrc.len() as u8 & 0x0F;
        buf.put_u8(b0);

        let mut b1 = self.payload_type & 0x7F;
        if self.marker {
            b1 |= 0x80;
        }
        buf.put_u8(b1);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if let Some((profile, data)) = &self.extension_data {
            buf.put_u16(*profile);
            buf.put_u16(data.len() as u16);
            buf.put_slice(data);
        }

        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }
}

/// A buffer for reordering out-of-order RTP packets by sequence number.
pub struct JitterBuffer {
    packets: BTreeMap<u16, RtpPacket>,
    min_seq: u16,
    max_seq: u16,
    buffer_size: usize,
}

impl fmt::Debug for JitterBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JitterBuffer")
            .field("min_seq", &self.min_seq)
            .field("max_seq", &self.max_seq)
            .field("buffer_size", &self.buffer_size)
            .field("packet_count", &self.packets.len())
            .finish()
    }
}

impl JitterBuffer {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            packets: BTreeMap::new(),
            min_seq: 0,
            max_seq: 0,
            buffer_size,
        }
    }

    pub fn push(&mut self, packet: RtpPacket) -> Result<()> {
        let seq = packet.sequence_number;

        if self.packets.is_empty() {
            self.min_seq = seq;
            self.max_seq = seq;
            self.packets.insert(seq, packet);
            return Ok(());
        }

        if (seq < 0x4000 && self.max_seq > 0xC000) || (seq > 0xC000 && self.min_seq < 0x4000) {
            return Err(RtpError::SequenceWrapped);
        }

        if seq < self.min_seq {
            self.min_seq = seq;
        }
        if seq > self.max_seq {
            self.max_seq = seq;
        }

        if self.packets.len() >= self.buffer_size {
            return Err(RtpError::BufferOverflow);
        }

        self.packets.insert(seq, packet);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<RtpPacket> {
        if let Some((&seq, _)) = self.packets.first_key_value() {
            if seq == self.min_seq {
                let packet = self.packets.remove(&seq)?;
                self.min_seq = self.min_seq.wrapping_add(1);
                return Some(packet);
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }
}

/// Tracks the transmit-side state for one RTP stream: sequence number, accumulated timestamp,
/// and sync source, advancing the timestamp from wall-clock time elapsed between calls.
///
/// Not safe for concurrent use; callers must externally serialize [`Session::transmit`].
pub struct Session {
    sequence_number: u16,
    accumulated_timestamp: u32,
    ssrc: u32,
    clock_rate: u32,
    last_transmit: Option<Instant>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("sequence_number", &self.sequence_number)
            .field("accumulated_timestamp", &self.accumulated_timestamp)
            .field("ssrc", &self.ssrc)
            .field("clock_rate", &self.clock_rate)
            .finish()
    }
}

impl Session {
    /// Creates a new session with the given clock rate (in Hz) and explicit initial
    /// sequence/timestamp/SSRC. Real deployments should randomize these; this crate leaves
    /// randomness to the caller rather than bringing in an RNG dependency of its own.
    pub fn new(clock_rate: u32, initial_sequence: u16, initial_timestamp: u32, ssrc: u32) -> Self {
        Self {
            sequence_number: initial_sequence,
            accumulated_timestamp: initial_timestamp,
            ssrc,
            clock_rate,
            last_transmit: None,
        }
    }

    /// Stamps `packet` with this session's version, sequence number, timestamp, and SSRC (only
    /// filling in the SSRC if the packet's is zero), then advances the session's internal
    /// state. The timestamp advance is `floor(seconds_since_last_transmit * clock_rate)`; the
    /// very first call advances by zero since there is no prior transmit to measure from.
    pub fn transmit(&mut self, mut packet: RtpPacket) -> RtpPacket {
        if packet.version == 0 {
            packet.version = 2;
        }

        packet.sequence_number = self.sequence_number;
        self.sequence_number = self.sequence_number.wrapping_add(1);

        let now = Instant::now();
        let elapsed = match self.last_transmit {
            Some(last) => now.duration_since(last),
            None => Duration::ZERO,
        };
        let ticks = (elapsed.as_secs_f64() * self.clock_rate as f64).floor() as u32;

        packet.timestamp = self.accumulated_timestamp.wrapping_add(ticks);
        self.accumulated_timestamp = self.accumulated_timestamp.wrapping_add(ticks);
        self.last_transmit = Some(now);

        if packet.ssrc == 0 {
            packet.ssrc = self.ssrc;
        }

        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtp_packet_creation() {
        let payload = Bytes::from(vec![1, 2, 3, 4]);
        let packet = RtpPacket::new(96, 1000, 90000, 0x12345678, true, payload.clone());

        assert_eq!(packet.version, 2);
        assert_eq!(packet.payload_type, 96);
        assert_eq!(packet.sequence_number, 1000);
        assert_eq!(packet.timestamp, 90000);
        assert_eq!(packet.ssrc, 0x12345678);
        assert!(packet.marker);
        assert_eq!(packet.payload, payload);
    }

    #[test]
    fn test_round_trip_basic_packet() {
        let packet = RtpPacket::new(96, 1000, 90000, 0x12345678, true, Bytes::from_static(b"audio"));
        let encoded = packet.encode().unwrap();
        let decoded = RtpPacket::decode(&encoded).unwrap();

        assert_eq!(decoded.sequence_number, 1000);
        assert_eq!(decoded.timestamp, 90000);
        assert_eq!(decoded.ssrc, 0x12345678);
        assert_eq!(decoded.payload, Bytes::from_static(b"audio"));
    }

    #[test]
    fn test_round_trip_with_csrc_and_extension() {
        let mut packet = RtpPacket::new(97, 1, 1, 0xAABBCCDD, false, Bytes::from_static(b"x"));
        packet.csrc = vec![1, 2, 3];
        packet.extension = true;
        packet.extension_data = Some((0x1234, Bytes::from_static(b"ext-bytes")));

        let encoded = packet.encode().unwrap();
        let decoded = RtpPacket::decode(&encoded).unwrap();

        assert_eq!(decoded.csrc, vec![1, 2, 3]);
        let (profile, data) = decoded.extension_data.unwrap();
        assert_eq!(profile, 0x1234);
        assert_eq!(data, Bytes::from_static(b"ext-bytes"));
    }

    #[test]
    fn test_decode_reports_no_payload_with_headers_populated() {
        let packet = RtpPacket::new(96, 42, 1, 1, false, Bytes::new());
        let encoded = packet.encode().unwrap();
        let err = RtpPacket::decode(&encoded).unwrap_err();
        assert!(matches!(err, RtpError::NoPayload));
    }

    #[test]
    fn test_encode_rejects_oversized_csrc_count() {
        let mut packet = RtpPacket::new(96, 1, 1, 1, false, Bytes::from_static(b"x"));
        packet.csrc = vec![0; 16];
        assert!(packet.encode().is_err());
    }

    #[test]
    fn test_encode_rejects_payload_type_out_of_range() {
        let packet = RtpPacket::new(200, 1, 1, 1, false, Bytes::from_static(b"x"));
        assert!(packet.encode().is_err());
    }

    #[test]
    fn test_jitter_buffer_operations() {
        let mut jb = JitterBuffer::new(16);

        let packets = vec![(1000, vec![1]), (1002, vec![3]), (1001, vec![2]), (1003, vec![4])];

        for (seq, payload) in packets {
            let packet = RtpPacket::new(96, seq, 90000, 0x12345678, false, Bytes::from(payload));
            jb.push(packet).unwrap();
        }

        for i in 0..4 {
            let packet = jb.pop().unwrap();
            assert_eq!(packet.sequence_number, 1000 + i as u16);
            assert_eq!(packet.payload[0], (i + 1) as u8);
        }

        assert!(jb.is_empty());
    }

    #[test]
    fn test_session_stamps_sequence_and_ssrc() {
        let mut session = Session::new(90_000, 5, 0, 0x42);
        let first = session.transmit(RtpPacket::new(96, 0, 0, 0, false, Bytes::from_static(b"a")));
        let second = session.transmit(RtpPacket::new(96, 0, 0, 0, false, Bytes::from_static(b"b")));

        assert_eq!(first.sequence_number, 5);
        assert_eq!(second.sequence_number, 6);
        assert_eq!(first.ssrc, 0x42);
        assert_eq!(second.ssrc, 0x42);
    }

    #[test]
    fn test_session_preserves_explicit_ssrc() {
        let mut session = Session::new(90_000, 0, 0, 0x42);
        let packet = session.transmit(RtpPacket::new(96, 0, 0, 0x99, false, Bytes::from_static(b"a")));
        assert_eq!(packet.ssrc, 0x99);
    }
}
