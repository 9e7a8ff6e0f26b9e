//! Core MPEG Transport Stream packet types: the 4-byte fixed header, the optional adaptation
//! field, and the 188-byte packet that ties them to a payload.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, VdkError};

use super::pes::PesPacket;

/// Size of a Transport Stream packet in bytes.
pub const TS_PACKET_SIZE: usize = 188;
/// Size of the fixed Transport Stream header in bytes.
pub const TS_HEADER_SIZE: usize = 4;
/// Sync byte that must start every TS packet.
pub const SYNC_BYTE: u8 = 0x47;

/// The fixed 4-byte prefix of every TS packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsHeader {
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    /// 13-bit packet identifier.
    pub pid: u16,
    /// 2-bit transport scrambling control.
    pub scrambling_control: u8,
    /// 4-bit continuity counter.
    pub continuity_counter: u8,
}

impl Default for TsHeader {
    fn default() -> Self {
        Self {
            transport_error: false,
            payload_unit_start: false,
            transport_priority: false,
            pid: 0x1FFF,
            scrambling_control: 0,
            continuity_counter: 0,
        }
    }
}

/// A 48-bit Program Clock Reference, stored as its 33-bit base and 9-bit extension so that a
/// decoded value re-encodes to the exact same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramClockReference {
    pub base: u64,
    pub extension: u16,
}

impl ProgramClockReference {
    pub fn from_ticks_27mhz(ticks: u64) -> Self {
        Self {
            base: ticks / 300,
            extension: (ticks % 300) as u16,
        }
    }

    pub fn ticks_27mhz(&self) -> u64 {
        self.base * 300 + self.extension as u64
    }

    fn decode(bytes: &[u8; 6]) -> Self {
        let base = ((bytes[0] as u64) << 25)
            | ((bytes[1] as u64) << 17)
            | ((bytes[2] as u64) << 9)
            | ((bytes[3] as u64) << 1)
            | ((bytes[4] as u64 & 0x80) >> 7);
        let extension = (((bytes[4] & 0x01) as u16) << 8) | bytes[5] as u16;
        Self { base, extension }
    }

    fn encode(&self) -> Result<[u8; 6]> {
        if self.base > (1u64 << 33) - 1 {
            return Err(VdkError::FieldOutOfRange {
                field: "pcr.base",
                max_bits: 33,
                value: self.base,
            });
        }
        if self.extension > 511 {
            return Err(VdkError::FieldOutOfRange {
                field: "pcr.extension",
                max_bits: 9,
                value: self.extension as u64,
            });
        }
        let mut out = [0u8; 6];
        out[0] = (self.base >> 25) as u8;
        out[1] = (self.base >> 17) as u8;
        out[2] = (self.base >> 9) as u8;
        out[3] = (self.base >> 1) as u8;
        out[4] = (((self.base & 0x1) as u8) << 7) | 0b0111_1110 | (((self.extension >> 8) & 0x1) as u8);
        out[5] = (self.extension & 0xFF) as u8;
        Ok(out)
    }
}

/// The decoded contents of a non-empty adaptation field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdaptationFieldData {
    pub discontinuity: bool,
    pub random_access: bool,
    pub es_priority: bool,
    pub pcr: Option<ProgramClockReference>,
    pub opcr: Option<ProgramClockReference>,
    pub splice_countdown: Option<i8>,
    pub private_data: Option<Vec<u8>>,
    pub extension: Option<Vec<u8>>,
    /// Trailing `0xFF` stuffing bytes, preserved for an exact round-trip.
    pub stuffing_len: usize,
}

/// An adaptation field is either present-but-empty (length byte `0`) or present with flags and
/// optional fields; `None` on [`TsPacket`] means no adaptation field at all, which is a
/// distinct, round-trippable state from the empty case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdaptationField {
    Empty,
    Data(AdaptationFieldData),
}

impl AdaptationField {
    fn encoded_len(&self) -> Result<usize> {
        match self {
            AdaptationField::Empty => Ok(1), // just the length byte
            AdaptationField::Data(d) => {
                let mut n = 2; // length byte + flags byte
                if d.pcr.is_some() {
                    n += 6;
                }
                if d.opcr.is_some() {
                    n += 6;
                }
                if d.splice_countdown.is_some() {
                    n += 1;
                }
                if let Some(pd) = &d.private_data {
                    if pd.len() > 255 {
                        return Err(VdkError::FieldOutOfRange {
                            field: "adaptation_field.private_data",
                            max_bits: 8,
                            value: pd.len() as u64,
                        });
                    }
                    n += 1 + pd.len();
                }
                if let Some(ext) = &d.extension {
                    n += 1 + ext.len();
                }
                n += d.stuffing_len;
                Ok(n)
            }
        }
    }
}

/// The payload carried after a TS packet's header and optional adaptation field.
#[derive(Debug, Clone)]
pub enum TsPayload {
    Pes(PesPacket),
    Raw(Bytes),
}

/// A single 188-byte MPEG Transport Stream packet.
#[derive(Debug, Clone)]
pub struct TsPacket {
    pub header: TsHeader,
    pub adaptation_field: Option<AdaptationField>,
    pub payload: Option<TsPayload>,
}

impl TsPacket {
    /// Decodes exactly one 188-byte TS packet.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != TS_PACKET_SIZE {
            return Err(VdkError::Framing(format!(
                "TS packet must be exactly {} bytes, got {}",
                TS_PACKET_SIZE,
                data.len()
            )));
        }
        if data[0] != SYNC_BYTE {
            return Err(VdkError::Framing(format!("invalid sync byte: {:#04x}, expected 0x47", data[0])));
        }

        let header = TsHeader {
            transport_error: data[1] & 0x80 != 0,
            payload_unit_start: data[1] & 0x40 != 0,
            transport_priority: data[1] & 0x20 != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            continuity_counter: data[3] & 0x0F,
        };

        let adaptation_control = (data[3] >> 4) & 0x03;
        let (has_adaptation, has_payload) = match adaptation_control {
            0b00 => {
                return Err(VdkError::Framing(
                    "adaptation field control 00 is reserved and invalid".into(),
                ))
            }
            0b01 => (false, true),
            0b10 => (true, false),
            0b11 => (true, true),
            _ => unreachable!(),
        };

        let mut pos = TS_HEADER_SIZE;
        let adaptation_field = if has_adaptation {
            let (field, consumed) = Self::decode_adaptation_field(&data[pos..])?;
            pos += consumed;
            Some(field)
        } else {
            None
        };

        let payload = if has_payload {
            let raw = &data[pos..];
            if raw.len() >= 3 && raw[0..3] == [0x00, 0x00, 0x01] && header.payload_unit_start {
                Some(TsPayload::Pes(PesPacket::decode(raw)?))
            } else {
                Some(TsPayload::Raw(Bytes::copy_from_slice(raw)))
            }
        } else {
            None
        };

        Ok(Self {
            header,
            adaptation_field,
            payload,
        })
    }

    fn decode_adaptation_field(data: &[u8]) -> Result<(AdaptationField, usize)> {
        if data.is_empty() {
            return Err(VdkError::BufferUnderflow("adaptation field length byte missing".into()));
        }
        let length = data[0] as usize;
        if length == 0 {
            return Ok((AdaptationField::Empty, 1));
        }
        if data.len() < 1 + length {
            return Err(VdkError::BufferUnderflow("adaptation field shorter than declared length".into()));
        }

        let flags = data[1];
        let mut field = AdaptationFieldData {
            discontinuity: flags & 0x80 != 0,
            random_access: flags & 0x40 != 0,
            es_priority: flags & 0x20 != 0,
            ..Default::default()
        };
        let pcr_flag = flags & 0x10 != 0;
        let opcr_flag = flags & 0x08 != 0;
        let splicing_point_flag = flags & 0x04 != 0;
        let private_data_flag = flags & 0x02 != 0;
        let extension_flag = flags & 0x01 != 0;

        let body_end = 1 + length;
        let mut pos = 2;

        if pcr_flag {
            if body_end < pos + 6 {
                return Err(VdkError::BufferUnderflow("PCR truncated in adaptation field".into()));
            }
            let bytes: [u8; 6] = data[pos..pos + 6].try_into().unwrap();
            field.pcr = Some(ProgramClockReference::decode(&bytes));
            pos += 6;
        }

        if opcr_flag {
            if body_end < pos + 6 {
                return Err(VdkError::BufferUnderflow("OPCR truncated in adaptation field".into()));
            }
            let bytes: [u8; 6] = data[pos..pos + 6].try_into().unwrap();
            field.opcr = Some(ProgramClockReference::decode(&bytes));
            pos += 6;
        }

        if splicing_point_flag {
            if body_end < pos + 1 {
                return Err(VdkError::BufferUnderflow("splice countdown truncated in adaptation field".into()));
            }
            field.splice_countdown = Some(data[pos] as i8);
            pos += 1;
        }

        if private_data_flag {
            if body_end < pos + 1 {
                return Err(VdkError::BufferUnderflow("private data length byte missing".into()));
            }
            let private_len = data[pos] as usize;
            pos += 1;
            if body_end < pos + private_len {
                return Err(VdkError::BufferUnderflow("private data truncated in adaptation field".into()));
            }
            field.private_data = Some(data[pos..pos + private_len].to_vec());
            pos += private_len;
        }

        if extension_flag {
            if body_end < pos + 1 {
                return Err(VdkError::BufferUnderflow("extension length byte missing".into()));
            }
            let ext_len = data[pos] as usize;
            pos += 1;
            if body_end < pos + ext_len {
                return Err(VdkError::BufferUnderflow("extension data truncated in adaptation field".into()));
            }
            field.extension = Some(data[pos..pos + ext_len].to_vec());
            pos += ext_len;
        }

        if body_end > pos {
            let stuffing = &data[pos..body_end];
            if !stuffing.iter().all(|&b| b == 0xFF) {
                return Err(VdkError::Framing("adaptation field stuffing bytes must all be 0xFF".into()));
            }
            field.stuffing_len = stuffing.len();
        }

        Ok((AdaptationField::Data(field), body_end))
    }

    /// Encodes this packet to exactly 188 bytes.
    pub fn encode(&self) -> Result<[u8; TS_PACKET_SIZE]> {
        if self.header.pid > 0x1FFF {
            return Err(VdkError::FieldOutOfRange {
                field: "ts_header.pid",
                max_bits: 13,
                value: self.header.pid as u64,
            });
        }
        if self.header.continuity_counter > 0x0F {
            return Err(VdkError::FieldOutOfRange {
                field: "ts_header.continuity_counter",
                max_bits: 4,
                value: self.header.continuity_counter as u64,
            });
        }
        if self.adaptation_field.is_none() && self.payload.is_none() {
            return Err(VdkError::InvariantViolation(
                "a TS packet must carry an adaptation field, a payload, or both".into(),
            ));
        }

        let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
        buf.put_u8(SYNC_BYTE);

        let mut b1 = 0u8;
        if self.header.transport_error {
            b1 |= 0x80;
        }
        if self.header.payload_unit_start {
            b1 |= 0x40;
        }
        if self.header.transport_priority {
            b1 |= 0x20;
        }
        b1 |= ((self.header.pid >> 8) & 0x1F) as u8;
        buf.put_u8(b1);
        buf.put_u8((self.header.pid & 0xFF) as u8);

        let adaptation_control: u8 = match (&self.adaptation_field, &self.payload) {
            (Some(_), Some(_)) => 0b11,
            (Some(_), None) => 0b10,
            (None, Some(_)) => 0b01,
            (None, None) => unreachable!("checked above"),
        };
        let b3 = (self.header.scrambling_control << 6) | (adaptation_control << 4) | (self.header.continuity_counter & 0x0F);
        buf.put_u8(b3);

        if let Some(field) = &self.adaptation_field {
            Self::encode_adaptation_field(&mut buf, field)?;
        }

        if let Some(payload) = &self.payload {
            match payload {
                TsPayload::Pes(pes) => buf.put_slice(&pes.encode()?),
                TsPayload::Raw(bytes) => buf.put_slice(bytes),
            }
        }

        if buf.len() > TS_PACKET_SIZE {
            return Err(VdkError::BufferOverflow {
                needed: buf.len(),
                available: TS_PACKET_SIZE,
            });
        }
        while buf.len() < TS_PACKET_SIZE {
            buf.put_u8(0xFF);
        }

        let mut out = [0u8; TS_PACKET_SIZE];
        out.copy_from_slice(&buf);
        Ok(out)
    }

    fn encode_adaptation_field(buf: &mut BytesMut, field: &AdaptationField) -> Result<()> {
        let length = field.encoded_len()? - 1; // length byte excludes itself
        if length > 0xFF {
            return Err(VdkError::FieldOutOfRange {
                field: "adaptation_field.length",
                max_bits: 8,
                value: length as u64,
            });
        }
        buf.put_u8(length as u8);

        let data = match field {
            AdaptationField::Empty => return Ok(()),
            AdaptationField::Data(d) => d,
        };

        let mut flags = 0u8;
        if data.discontinuity {
            flags |= 0x80;
        }
        if data.random_access {
            flags |= 0x40;
        }
        if data.es_priority {
            flags |= 0x20;
        }
        if data.pcr.is_some() {
            flags |= 0x10;
        }
        if data.opcr.is_some() {
            flags |= 0x08;
        }
        if data.splice_countdown.is_some() {
            flags |= 0x04;
        }
        if data.private_data.is_some() {
            flags |= 0x02;
        }
        if data.extension.is_some() {
            flags |= 0x01;
        }
        buf.put_u8(flags);

        if let Some(pcr) = &data.pcr {
            buf.put_slice(&pcr.encode()?);
        }
        if let Some(opcr) = &data.opcr {
            buf.put_slice(&opcr.encode()?);
        }
        if let Some(countdown) = data.splice_countdown {
            buf.put_u8(countdown as u8);
        }
        if let Some(private_data) = &data.private_data {
            buf.put_u8(private_data.len() as u8);
            buf.put_slice(private_data);
        }
        if let Some(extension) = &data.extension {
            buf.put_u8(extension.len() as u8);
            buf.put_slice(extension);
        }
        for _ in 0..data.stuffing_len {
            buf.put_u8(0xFF);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_packet(pid: u16) -> TsPacket {
        TsPacket {
            header: TsHeader {
                pid,
                ..Default::default()
            },
            adaptation_field: None,
            payload: Some(TsPayload::Raw(Bytes::from(vec![0xAB; 184]))),
        }
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let short = vec![0x47u8; 10];
        assert!(TsPacket::decode(&short).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_sync_byte() {
        let mut data = [0u8; TS_PACKET_SIZE];
        data[0] = 0x48;
        assert!(TsPacket::decode(&data).is_err());
    }

    #[test]
    fn test_decode_rejects_reserved_adaptation_control() {
        let mut data = [0u8; TS_PACKET_SIZE];
        data[0] = SYNC_BYTE;
        data[3] = 0x00; // adaptation_field_control = 00
        assert!(TsPacket::decode(&data).is_err());
    }

    #[test]
    fn test_round_trip_payload_only() {
        let packet = minimal_packet(256);
        let encoded = packet.encode().unwrap();
        let decoded = TsPacket::decode(&encoded).unwrap();

        assert_eq!(decoded.header.pid, 256);
        assert!(decoded.adaptation_field.is_none());
        assert!(matches!(decoded.payload, Some(TsPayload::Raw(_))));
    }

    #[test]
    fn test_round_trip_empty_adaptation_field_is_distinct_from_absent() {
        let mut packet = minimal_packet(300);
        packet.adaptation_field = Some(AdaptationField::Empty);
        let encoded = packet.encode().unwrap();
        let decoded = TsPacket::decode(&encoded).unwrap();

        assert_eq!(decoded.adaptation_field, Some(AdaptationField::Empty));
    }

    #[test]
    fn test_round_trip_pcr() {
        let mut packet = minimal_packet(301);
        packet.adaptation_field = Some(AdaptationField::Data(AdaptationFieldData {
            pcr: Some(ProgramClockReference::from_ticks_27mhz(1_234_567_890)),
            ..Default::default()
        }));
        let encoded = packet.encode().unwrap();
        let decoded = TsPacket::decode(&encoded).unwrap();

        match decoded.adaptation_field {
            Some(AdaptationField::Data(d)) => {
                assert_eq!(d.pcr.unwrap().ticks_27mhz(), 1_234_567_890);
            }
            _ => panic!("expected adaptation field data"),
        }
    }

    #[test]
    fn test_encode_rejects_pid_out_of_range() {
        let packet = minimal_packet(0x2000);
        assert!(packet.encode().is_err());
    }

    #[test]
    fn test_encode_rejects_neither_adaptation_nor_payload() {
        let packet = TsPacket {
            header: TsHeader::default(),
            adaptation_field: None,
            payload: None,
        };
        assert!(packet.encode().is_err());
    }

    #[test]
    fn test_decode_rejects_non_ff_stuffing() {
        let mut packet = minimal_packet(302);
        packet.adaptation_field = Some(AdaptationField::Data(AdaptationFieldData {
            stuffing_len: 3,
            ..Default::default()
        }));
        let mut encoded = packet.encode().unwrap();
        // Corrupt one stuffing byte inside the adaptation field.
        encoded[6] = 0x00;
        assert!(TsPacket::decode(&encoded).is_err());
    }
}
