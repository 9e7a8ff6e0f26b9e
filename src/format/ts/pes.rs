//! Packetized Elementary Stream (PES) header codec.
//!
//! A PES packet always begins with the start-code prefix `00 00 01`, unlike a bare TS payload,
//! so [`PesPacket::decode`]/[`PesPacket::encode`] read and write that prefix themselves.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, VdkError};
use crate::utils::bits::pack_pts;

const START_CODE_PREFIX: [u8; 3] = [0x00, 0x00, 0x01];

/// The optional PES header that follows the stream ID and packet length, present whenever the
/// first header byte carries the `10` marker bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesOptionalHeader {
    pub scrambling_control: u8,
    pub priority: bool,
    pub data_alignment: bool,
    pub copyright: bool,
    pub original: bool,
    pub escr_flag: bool,
    pub es_rate_flag: bool,
    pub dsm_trick_mode_flag: bool,
    pub additional_copy_info_flag: bool,
    pub crc_flag: bool,
    pub extension_flag: bool,
    /// Presentation timestamp, in 90kHz ticks.
    pub pts: Option<u64>,
    /// Decode timestamp, in 90kHz ticks.
    pub dts: Option<u64>,
    /// Bytes of the optional header this crate does not interpret (ESCR, ES rate, trick mode,
    /// additional copy info, previous CRC, extension), preserved verbatim so a decoded packet
    /// re-encodes byte-for-byte.
    pub extra_header_data: Vec<u8>,
}

impl Default for PesOptionalHeader {
    fn default() -> Self {
        Self {
            scrambling_control: 0,
            priority: false,
            data_alignment: false,
            copyright: false,
            original: false,
            escr_flag: false,
            es_rate_flag: false,
            dsm_trick_mode_flag: false,
            additional_copy_info_flag: false,
            crc_flag: false,
            extension_flag: false,
            pts: None,
            dts: None,
            extra_header_data: Vec::new(),
        }
    }
}

impl PesOptionalHeader {
    pub fn with_pts(mut self, pts_ticks: u64) -> Self {
        self.pts = Some(pts_ticks);
        self
    }

    pub fn with_dts(mut self, dts_ticks: u64) -> Self {
        self.dts = Some(dts_ticks);
        self
    }

    fn pts_dts_flags(&self) -> u8 {
        match (self.pts.is_some(), self.dts.is_some()) {
            (true, true) => 0b11,
            (true, false) => 0b10,
            (false, false) => 0b00,
            (false, true) => 0b00, // unreachable: rejected before encoding
        }
    }

    fn header_data_length(&self) -> u8 {
        let ts_bytes = match (self.pts.is_some(), self.dts.is_some()) {
            (true, true) => 10,
            (true, false) => 5,
            _ => 0,
        };
        (ts_bytes + self.extra_header_data.len()) as u8
    }
}

/// A Packetized Elementary Stream packet, including its start code and stream ID.
#[derive(Debug, Clone)]
pub struct PesPacket {
    pub stream_id: u8,
    pub header: Option<PesOptionalHeader>,
    pub payload: Bytes,
}

impl PesPacket {
    pub fn new(stream_id: u8, payload: Bytes) -> Self {
        Self {
            stream_id,
            header: Some(PesOptionalHeader::default()),
            payload,
        }
    }

    pub fn with_pts(mut self, pts_ticks: u64) -> Self {
        let header = self.header.get_or_insert_with(PesOptionalHeader::default);
        header.pts = Some(pts_ticks);
        self
    }

    pub fn with_dts(mut self, dts_ticks: u64) -> Self {
        let header = self.header.get_or_insert_with(PesOptionalHeader::default);
        header.dts = Some(dts_ticks);
        self
    }

    /// Decodes a PES packet, including its `00 00 01` start code.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 6 {
            return Err(VdkError::BufferUnderflow("PES packet shorter than fixed header".into()));
        }
        if data[0..3] != START_CODE_PREFIX {
            return Err(VdkError::Framing(format!(
                "invalid PES start code prefix: {:02x}{:02x}{:02x}",
                data[0], data[1], data[2]
            )));
        }
        let stream_id = data[3];
        let packet_length = u16::from_be_bytes([data[4], data[5]]) as usize;
        let rest = &data[6..];

        if rest.is_empty() {
            return Ok(Self {
                stream_id,
                header: None,
                payload: Bytes::new(),
            });
        }
        if rest[0] >> 6 != 0b10 {
            // Not every stream (padding_stream, program_stream_map, ...) carries the optional
            // header; out of scope here, so the raw bytes pass through as payload.
            let payload = Self::slice_payload(rest, packet_length, rest.len());
            return Ok(Self {
                stream_id,
                header: None,
                payload,
            });
        }

        let flags1 = rest[0];
        let flags2 = rest[1];
        let header_data_length = rest[2] as usize;
        if rest.len() < 3 + header_data_length {
            return Err(VdkError::BufferUnderflow("PES optional header truncated".into()));
        }

        let scrambling_control = (flags1 >> 4) & 0x03;
        let priority = flags1 & 0x08 != 0;
        let data_alignment = flags1 & 0x04 != 0;
        let copyright = flags1 & 0x02 != 0;
        let original = flags1 & 0x01 != 0;

        let pts_dts_flags = (flags2 >> 6) & 0x03;
        let escr_flag = flags2 & 0x20 != 0;
        let es_rate_flag = flags2 & 0x10 != 0;
        let dsm_trick_mode_flag = flags2 & 0x08 != 0;
        let additional_copy_info_flag = flags2 & 0x04 != 0;
        let crc_flag = flags2 & 0x02 != 0;
        let extension_flag = flags2 & 0x01 != 0;

        if pts_dts_flags == 0b01 {
            return Err(VdkError::InvariantViolation(
                "PES timestamp flags indicate DTS without PTS".into(),
            ));
        }

        let mut pos = 3;
        let header_end = 3 + header_data_length;

        let pts = if pts_dts_flags & 0b10 != 0 {
            let ts = Self::read_timestamp(rest, pos, if pts_dts_flags == 0b11 { 0x3 } else { 0x2 })?;
            pos += 5;
            Some(ts)
        } else {
            None
        };

        let dts = if pts_dts_flags == 0b11 {
            let ts = Self::read_timestamp(rest, pos, 0x1)?;
            pos += 5;
            Some(ts)
        } else {
            None
        };

        let extra_header_data = rest[pos..header_end].to_vec();

        let header = Some(PesOptionalHeader {
            scrambling_control,
            priority,
            data_alignment,
            copyright,
            original,
            escr_flag,
            es_rate_flag,
            dsm_trick_mode_flag,
            additional_copy_info_flag,
            crc_flag,
            extension_flag,
            pts,
            dts,
            extra_header_data,
        });

        let payload_start = header_end;
        let payload = Self::slice_payload(rest, packet_length, payload_start);

        Ok(Self {
            stream_id,
            header,
            payload,
        })
    }

    /// `packet_length` counts bytes of `rest` (everything after the 2-byte length field
    /// itself); `0` means "unbounded, payload runs to the end of the buffer" (used for long
    /// video PES packets).
    fn slice_payload(rest: &[u8], packet_length: usize, consumed: usize) -> Bytes {
        if packet_length == 0 {
            return Bytes::copy_from_slice(&rest[consumed..]);
        }
        let end = packet_length.min(rest.len());
        Bytes::copy_from_slice(&rest[consumed.min(end)..end])
    }

    fn read_timestamp(data: &[u8], pos: usize, expected_marker: u8) -> Result<u64> {
        if data.len() < pos + 5 {
            return Err(VdkError::BufferUnderflow("PES timestamp truncated".into()));
        }
        let bytes = &data[pos..pos + 5];
        let marker = (bytes[0] >> 4) & 0x0F;
        if marker != expected_marker {
            return Err(VdkError::Framing(format!(
                "corrupt PES timestamp: marker nibble {:#06b}, expected {:#06b}",
                marker, expected_marker
            )));
        }
        if bytes[0] & 0x01 != 1 || bytes[1] & 0x01 != 1 || bytes[3] & 0x01 != 1 {
            return Err(VdkError::Framing("corrupt PES timestamp: check bits not all 1".into()));
        }
        // byte0: marker(4) ts[32..30](3) check(1)
        // byte1..2: ts[29..15](15) check(1)
        // byte3..4: ts[14..0](15) check(1)
        let hi = ((bytes[0] >> 1) & 0x07) as u64;
        let mid = (((bytes[1] as u64) << 7) | ((bytes[2] as u64) >> 1)) & 0x7FFF;
        let lo = (((bytes[3] as u64) << 7) | ((bytes[4] as u64) >> 1)) & 0x7FFF;
        let ticks = (hi << 30) | (mid << 15) | lo;
        Ok(ticks)
    }

    fn write_timestamp(buf: &mut BytesMut, marker: u8, ticks: u64) -> Result<()> {
        // Validate the 33-bit range with the same helper SCTE-35 uses, even though PES spreads
        // the value's bits across the buffer differently than the flat 5-byte container.
        pack_pts(ticks)?;
        let hi = ((ticks >> 30) & 0x07) as u8;
        let mid = ((ticks >> 15) & 0x7FFF) as u16;
        let lo = (ticks & 0x7FFF) as u16;

        buf.put_u8((marker << 4) | (hi << 1) | 0x01);
        buf.put_u16((mid << 1) | 0x01);
        buf.put_u16((lo << 1) | 0x01);
        Ok(())
    }

    /// Returns the encoded length of just the optional header, in bytes (including its own
    /// 3-byte flags/header-data-length prefix), or 0 if no optional header is present.
    fn header_len(&self) -> usize {
        match &self.header {
            Some(h) => 3 + h.header_data_length() as usize,
            None => 0,
        }
    }

    pub fn encoded_len(&self) -> usize {
        6 + self.header_len() + self.payload.len()
    }

    pub fn encode(&self) -> Result<Bytes> {
        if let Some(header) = &self.header {
            if header.dts.is_some() && header.pts.is_none() {
                return Err(VdkError::InvariantViolation(
                    "cannot encode a PES DTS without a PTS".into(),
                ));
            }
        }

        let packet_length = self.header_len() + self.payload.len();
        if packet_length > 0xFFFF {
            return Err(VdkError::FieldOutOfRange {
                field: "pes.packet_length",
                max_bits: 16,
                value: packet_length as u64,
            });
        }

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(&START_CODE_PREFIX);
        buf.put_u8(self.stream_id);
        buf.put_u16(packet_length as u16);

        if let Some(header) = &self.header {
            let mut flags1 = 0b1000_0000u8 | (header.scrambling_control & 0x03) << 4;
            if header.priority {
                flags1 |= 0x08;
            }
            if header.data_alignment {
                flags1 |= 0x04;
            }
            if header.copyright {
                flags1 |= 0x02;
            }
            if header.original {
                flags1 |= 0x01;
            }
            buf.put_u8(flags1);

            let mut flags2 = header.pts_dts_flags() << 6;
            if header.escr_flag {
                flags2 |= 0x20;
            }
            if header.es_rate_flag {
                flags2 |= 0x10;
            }
            if header.dsm_trick_mode_flag {
                flags2 |= 0x08;
            }
            if header.additional_copy_info_flag {
                flags2 |= 0x04;
            }
            if header.crc_flag {
                flags2 |= 0x02;
            }
            if header.extension_flag {
                flags2 |= 0x01;
            }
            buf.put_u8(flags2);
            buf.put_u8(header.header_data_length());

            match (header.pts, header.dts) {
                (Some(pts), Some(dts)) => {
                    Self::write_timestamp(&mut buf, 0x3, pts)?;
                    Self::write_timestamp(&mut buf, 0x1, dts)?;
                }
                (Some(pts), None) => {
                    Self::write_timestamp(&mut buf, 0x2, pts)?;
                }
                (None, None) => {}
                (None, Some(_)) => unreachable!("checked above"),
            }

            buf.put_slice(&header.extra_header_data);
        }

        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pes_packet_creation() {
        let payload = Bytes::from(vec![0; 10]);
        let packet = PesPacket::new(0xe0, payload.clone()).with_pts(90_000).with_dts(90_000);

        assert_eq!(packet.stream_id, 0xe0);
        assert_eq!(packet.payload, payload);
        assert!(packet.header.as_ref().unwrap().pts.is_some());
        assert!(packet.header.as_ref().unwrap().dts.is_some());
    }

    #[test]
    fn test_pes_round_trips_pts_only() {
        let packet = PesPacket::new(0xe0, Bytes::from_static(b"video-frame")).with_pts(12_345);
        let encoded = packet.encode().unwrap();
        let decoded = PesPacket::decode(&encoded).unwrap();

        assert_eq!(decoded.stream_id, 0xe0);
        assert_eq!(decoded.header.unwrap().pts, Some(12_345));
        assert_eq!(decoded.payload, Bytes::from_static(b"video-frame"));
    }

    #[test]
    fn test_pes_round_trips_pts_and_dts() {
        let packet = PesPacket::new(0xc0, Bytes::from_static(b"audio"))
            .with_pts(1_000_000)
            .with_dts(999_700);
        let encoded = packet.encode().unwrap();
        let decoded = PesPacket::decode(&encoded).unwrap();

        let header = decoded.header.unwrap();
        assert_eq!(header.pts, Some(1_000_000));
        assert_eq!(header.dts, Some(999_700));
    }

    #[test]
    fn test_pes_rejects_dts_without_pts() {
        let mut packet = PesPacket::new(0xe0, Bytes::new());
        packet.header.as_mut().unwrap().dts = Some(123);
        assert!(packet.encode().is_err());
    }

    #[test]
    fn test_pes_decode_rejects_bad_start_code() {
        let data = [0x00, 0x00, 0x02, 0xe0, 0x00, 0x00];
        assert!(PesPacket::decode(&data).is_err());
    }

    #[test]
    fn test_pes_decode_rejects_corrupt_check_bits() {
        let packet = PesPacket::new(0xe0, Bytes::from_static(b"x")).with_pts(42);
        let mut encoded = packet.encode().unwrap().to_vec();
        // Corrupt the lowest check bit of the first timestamp byte.
        encoded[9] &= 0xFE;
        assert!(PesPacket::decode(&encoded).is_err());
    }
}
