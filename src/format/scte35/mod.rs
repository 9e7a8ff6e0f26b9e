//! SCTE-35 `splice_info_section` binary codec (ANSI/SCTE 35).
//!
//! ```rust
//! use broadcore::format::scte35::SpliceInfoSection;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let b64 = "/DAvAAAAAAAA///wFAVIAACPf+/+c2nALv4AUsz1AAAAAAAKAAhDVUVJAAABNWLbowo=";
//! let section = SpliceInfoSection::decode_base64(b64)?;
//! assert_eq!(section.to_base64()?, b64);
//! # Ok(())
//! # }
//! ```

/// Polymorphic `splice_command` variants.
pub mod command;
/// Splice descriptor loop and `SegmentationDescriptor`/`SegmentationUpid` variants.
pub mod descriptor;

pub use command::{
    BreakDuration, Command, PrivateCommand, ScheduledEvent, SpliceInsert, TimeSignal,
};
pub use descriptor::{
    AudioComponent, AudioDescriptor, AvailDescriptor, DeliveryRestrictions, DeviceRestrictions, DtmfDescriptor,
    PrivateDescriptor, SegmentationDescriptor, SegmentationUpid, SpliceDescriptor, TimeDescriptor, UpidValue,
    CUEI_IDENTIFIER, UPID_TYPE_MID,
};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::{BufMut, BytesMut};

use crate::error::{Result, VdkError};
use crate::utils::bits::{pack_pts, unpack_pts, PTS_MAX};
use crate::utils::crc::Crc32Bzip2;
use crate::utils::hex;

pub const TABLE_ID: u8 = 0xFC;

/// A full `splice_info_section`, the top-level SCTE-35 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceInfoSection {
    /// Stream Access Point type, a 2-bit field (`3` means unspecified/"None").
    pub sap_type: u8,
    /// Set when the section carries encrypted command/descriptor bytes. Ciphertext itself is
    /// never interpreted; only the layout (cipher id, alignment stuffing, `e_crc_32`) round-trips.
    pub encrypted: Option<EncryptionInfo>,
    pub pts_adjustment: u64,
    /// Control word index, meaningless and conventionally `0xFF` when unencrypted.
    pub cw_index: u8,
    pub tier: u16,
    pub splice_command: Command,
    pub descriptors: Vec<SpliceDescriptor>,
    /// Trailing `0xFF` bytes present for byte alignment, preserved verbatim.
    pub alignment_stuffing: Vec<u8>,
}

/// Layout metadata for an encrypted section. Cipher operations are out of scope; this only
/// round-trips the fields that advertise encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionInfo {
    pub cipher: u8,
    pub e_crc_32: u32,
}

impl SpliceInfoSection {
    pub fn decode(data: &[u8]) -> Result<Self> {
        log::debug!("decoding splice_info_section, {} bytes", data.len());
        if data.len() < 14 {
            return Err(VdkError::BufferUnderflow("splice_info_section shorter than fixed header".into()));
        }
        if data[0] != TABLE_ID {
            return Err(VdkError::Framing(format!("expected table_id {:#04x}, got {:#04x}", TABLE_ID, data[0])));
        }

        let b1b2 = u16::from_be_bytes([data[1], data[2]]);
        let section_syntax_indicator = b1b2 & 0x8000 != 0;
        let private_indicator = b1b2 & 0x4000 != 0;
        let sap_type = ((b1b2 >> 12) & 0x03) as u8;
        let section_length = (b1b2 & 0x0FFF) as usize;
        if section_syntax_indicator || private_indicator {
            return Err(VdkError::Framing(
                "splice_info_section section_syntax_indicator/private_indicator must be 0".into(),
            ));
        }
        if data.len() != 3 + section_length {
            return Err(VdkError::Framing(format!(
                "section_length {} does not match buffer length {}",
                section_length,
                data.len() - 3
            )));
        }

        let protocol_version = data[3];
        if protocol_version != 0 {
            return Err(VdkError::Unsupported(format!("unsupported protocol_version {}", protocol_version)));
        }

        let encrypted_packet = data[4] & 0x80 != 0;
        let encryption_algorithm = (data[4] >> 1) & 0x3F;
        let mut pts_bytes = [0u8; 5];
        pts_bytes[0] = data[4] & 0x01;
        pts_bytes[1..5].copy_from_slice(&data[5..9]);
        let pts_adjustment = unpack_pts(&pts_bytes);

        let cw_index = data[9];
        let b10b11b12 = ((data[10] as u32) << 16) | ((data[11] as u32) << 8) | data[12] as u32;
        let tier = (b10b11b12 >> 12) as u16;
        let command_length = (b10b11b12 & 0x0FFF) as usize;
        let command_type = data[13];

        let trailer_len = if encrypted_packet { 8 } else { 4 };

        let mut pos = 14;
        let legacy_length = command_length == 0x0FFF;
        let command = if legacy_length {
            // Legacy encoders sometimes report the sentinel length 0xFFF instead of the real
            // byte count; fall back to decoding to the end of the buffer minus the trailers.
            if data.len() < pos + trailer_len {
                return Err(VdkError::BufferUnderflow("splice_command truncated".into()));
            }
            Command::decode(command_type, &data[pos..data.len() - trailer_len])?
        } else {
            if data.len() < pos + command_length {
                return Err(VdkError::BufferUnderflow("splice_command truncated".into()));
            }
            let command = Command::decode(command_type, &data[pos..pos + command_length])?;
            pos += command_length;
            command
        };
        if legacy_length {
            pos += command.encode()?.len();
        }

        if data.len() < pos + 2 {
            return Err(VdkError::BufferUnderflow("descriptor_loop_length truncated".into()));
        }
        let descriptor_loop_length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2;
        if data.len() < pos + descriptor_loop_length {
            return Err(VdkError::BufferUnderflow("descriptor loop truncated".into()));
        }
        let descriptor_loop_end = pos + descriptor_loop_length;
        let mut descriptors = Vec::new();
        while pos < descriptor_loop_end {
            if descriptor_loop_end - pos < 6 {
                return Err(VdkError::BufferUnderflow("splice_descriptor header truncated".into()));
            }
            let tag = data[pos];
            let length = data[pos + 1] as usize;
            let identifier = u32::from_be_bytes([data[pos + 2], data[pos + 3], data[pos + 4], data[pos + 5]]);
            let payload_start = pos + 6;
            let payload_len = length.saturating_sub(4);
            if descriptor_loop_end < payload_start + payload_len {
                return Err(VdkError::BufferUnderflow("splice_descriptor payload truncated".into()));
            }
            descriptors.push(SpliceDescriptor::decode(tag, identifier, &data[payload_start..payload_start + payload_len])?);
            pos = payload_start + payload_len;
        }

        if data.len() < pos + trailer_len {
            return Err(VdkError::BufferUnderflow("splice_info_section trailer truncated".into()));
        }
        let alignment_stuffing = data[pos..data.len() - trailer_len].to_vec();

        let encrypted = if encrypted_packet {
            let e_crc_32 = u32::from_be_bytes([
                data[data.len() - 8],
                data[data.len() - 7],
                data[data.len() - 6],
                data[data.len() - 5],
            ]);
            Some(EncryptionInfo {
                cipher: encryption_algorithm,
                e_crc_32,
            })
        } else {
            None
        };

        let stored_crc = u32::from_be_bytes([
            data[data.len() - 4],
            data[data.len() - 3],
            data[data.len() - 2],
            data[data.len() - 1],
        ]);
        let computed_crc = Crc32Bzip2::new().calculate(&data[..data.len() - 4]);
        if stored_crc != computed_crc {
            log::debug!("splice_info_section CRC mismatch: stored {:#010x}, computed {:#010x}", stored_crc, computed_crc);
            return Err(VdkError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        Ok(Self {
            sap_type,
            encrypted,
            pts_adjustment,
            cw_index,
            tier,
            splice_command: command,
            descriptors,
            alignment_stuffing,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.tier > 0x0FFF {
            return Err(VdkError::FieldOutOfRange {
                field: "splice_info_section.tier",
                max_bits: 12,
                value: self.tier as u64,
            });
        }
        if self.pts_adjustment > PTS_MAX {
            return Err(VdkError::FieldOutOfRange {
                field: "splice_info_section.pts_adjustment",
                max_bits: 33,
                value: self.pts_adjustment,
            });
        }

        let command_bytes = self.splice_command.encode()?;
        if command_bytes.len() > 0x0FFF {
            return Err(VdkError::FieldOutOfRange {
                field: "splice_info_section.splice_command_length",
                max_bits: 12,
                value: command_bytes.len() as u64,
            });
        }

        let mut descriptor_loop = BytesMut::new();
        for descriptor in &self.descriptors {
            let (tag, identifier, payload) = descriptor.encode()?;
            let length = 4 + payload.len();
            if length > 0xFF {
                return Err(VdkError::FieldOutOfRange {
                    field: "splice_descriptor.descriptor_length",
                    max_bits: 8,
                    value: length as u64,
                });
            }
            descriptor_loop.put_u8(tag);
            descriptor_loop.put_u8(length as u8);
            descriptor_loop.put_u32(identifier);
            descriptor_loop.put_slice(&payload);
        }
        if descriptor_loop.len() > 0xFFFF {
            return Err(VdkError::FieldOutOfRange {
                field: "splice_info_section.descriptor_loop_length",
                max_bits: 16,
                value: descriptor_loop.len() as u64,
            });
        }

        let mut body = BytesMut::new();
        body.put_u8(0); // protocol_version
        let pts_packed = pack_pts(self.pts_adjustment)?;
        let mut byte4 = pts_packed[0] & 0x01;
        if self.encrypted.is_some() {
            byte4 |= 0x80;
        }
        if let Some(info) = &self.encrypted {
            byte4 |= (info.cipher & 0x3F) << 1;
        }
        body.put_u8(byte4);
        body.put_slice(&pts_packed[1..5]);
        body.put_u8(self.cw_index);

        let tier_and_len = ((self.tier as u32) << 12) | (command_bytes.len() as u32 & 0x0FFF);
        body.put_u8((tier_and_len >> 16) as u8);
        body.put_u8((tier_and_len >> 8) as u8);
        body.put_u8(tier_and_len as u8);
        body.put_u8(self.splice_command.command_type());
        body.put_slice(&command_bytes);

        body.put_u16(descriptor_loop.len() as u16);
        body.put_slice(&descriptor_loop);
        body.put_slice(&self.alignment_stuffing);

        if let Some(info) = &self.encrypted {
            body.put_u32(info.e_crc_32);
        }

        let section_length = body.len() + 4; // + crc_32
        if section_length > 0x0FFF {
            return Err(VdkError::FieldOutOfRange {
                field: "splice_info_section.section_length",
                max_bits: 12,
                value: section_length as u64,
            });
        }

        let mut out = BytesMut::with_capacity(3 + section_length);
        out.put_u8(TABLE_ID);
        out.put_u16(((self.sap_type as u16 & 0x03) << 12) | section_length as u16);
        out.put_slice(&body);

        let crc = Crc32Bzip2::new().calculate(&out);
        out.put_u32(crc);

        Ok(out.to_vec())
    }

    pub fn crc_32(&self) -> Result<u32> {
        let encoded = self.encode()?;
        Ok(u32::from_be_bytes([
            encoded[encoded.len() - 4],
            encoded[encoded.len() - 3],
            encoded[encoded.len() - 2],
            encoded[encoded.len() - 1],
        ]))
    }

    /// Decodes a `0x`-prefix-tolerant base64 string.
    pub fn decode_base64(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = BASE64_STANDARD
            .decode(s)
            .map_err(|e| VdkError::Parser(format!("invalid base64: {}", e)))?;
        Self::decode(&bytes)
    }

    /// Decodes a `0x`-prefix-tolerant hex string.
    pub fn decode_hex(s: &str) -> Result<Self> {
        Self::decode(&hex::decode(s)?)
    }

    pub fn to_base64(&self) -> Result<String> {
        Ok(BASE64_STANDARD.encode(self.encode()?))
    }

    pub fn to_hex(&self) -> Result<String> {
        Ok(hex::encode(&self.encode()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const TIME_SIGNAL_B64: &str =
        "/DA0AAAAAAAA///wBQb+cr0AUAAeAhxDVUVJSAAAjn/PAAGlmbAICAAAAAAsoKGKNAIAmsnRfg==";
    const SPLICE_INSERT_B64: &str = "/DAvAAAAAAAA///wFAVIAACPf+/+c2nALv4AUsz1AAAAAAAKAAhDVUVJAAABNWLbowo=";

    #[test]
    fn test_time_signal_fixture_decodes_and_round_trips() {
        let section = SpliceInfoSection::decode_base64(TIME_SIGNAL_B64).unwrap();

        assert_eq!(section.sap_type, 3);
        assert_eq!(section.cw_index, 0xFF);
        assert_eq!(section.tier, 0x0FFF);
        assert_eq!(
            section.splice_command,
            Command::TimeSignal(TimeSignal {
                splice_time: Some(0x0_72BD_0050)
            })
        );
        assert_eq!(section.descriptors.len(), 1);
        match &section.descriptors[0] {
            SpliceDescriptor::Segmentation(seg) => {
                assert_eq!(seg.event_id, 0x4800008E);
                assert_eq!(seg.duration, Some(0x0001A599B0));
                assert_eq!(seg.segmentation_type_id, 0x34);
                assert_eq!(seg.segment_num, 2);
                assert_eq!(
                    seg.delivery_restrictions,
                    Some(DeliveryRestrictions {
                        web_delivery_allowed: false,
                        no_regional_blackout: true,
                        archive_allowed: true,
                        device_restrictions: DeviceRestrictions::None,
                    })
                );
                assert_eq!(
                    seg.upid,
                    SegmentationUpid {
                        upid_type: 0x08,
                        value: UpidValue::Bytes(Bytes::from_static(&[
                            0x00, 0x00, 0x00, 0x00, 0x2C, 0xA0, 0xA1, 0x8A
                        ])),
                    }
                );
            }
            other => panic!("expected Segmentation descriptor, got {other:?}"),
        }
        assert_eq!(section.crc_32().unwrap(), 0x9AC9D17E);
        assert_eq!(section.to_base64().unwrap(), TIME_SIGNAL_B64);
    }

    #[test]
    fn test_splice_insert_fixture_decodes_and_round_trips() {
        let section = SpliceInfoSection::decode_base64(SPLICE_INSERT_B64).unwrap();

        match &section.splice_command {
            Command::SpliceInsert(insert) => {
                assert_eq!(insert.event_id, 0x4800008F);
                assert!(insert.out_of_network);
                assert_eq!(insert.splice_time, Some(0x07369C02E));
                assert_eq!(
                    insert.duration,
                    Some(BreakDuration {
                        auto_return: true,
                        ticks: 0x00052CCF5
                    })
                );
            }
            other => panic!("expected SpliceInsert command, got {other:?}"),
        }
        assert_eq!(section.descriptors.len(), 1);
        assert_eq!(
            section.descriptors[0],
            SpliceDescriptor::Avail(AvailDescriptor {
                provider_avail_id: 0x0000_0135
            })
        );
        assert_eq!(section.crc_32().unwrap(), 0x62DBA30A);
        assert_eq!(section.to_base64().unwrap(), SPLICE_INSERT_B64);
    }

    #[test]
    fn test_decode_rejects_wrong_table_id() {
        let mut bytes = BASE64_STANDARD.decode(SPLICE_INSERT_B64).unwrap();
        bytes[0] = 0x00;
        assert!(SpliceInfoSection::decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_detects_crc_mismatch() {
        let mut bytes = BASE64_STANDARD.decode(SPLICE_INSERT_B64).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        match SpliceInfoSection::decode(&bytes) {
            Err(VdkError::ChecksumMismatch { .. }) => {}
            other => panic!("expected ChecksumMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_hex_strips_0x_prefix() {
        let bytes = BASE64_STANDARD.decode(SPLICE_INSERT_B64).unwrap();
        let hex_str = format!("0x{}", hex::encode(&bytes));
        let section = SpliceInfoSection::decode_hex(&hex_str).unwrap();
        assert_eq!(section.to_hex().unwrap(), hex::encode(&bytes));
    }

    #[test]
    fn test_splice_null_round_trips() {
        let section = SpliceInfoSection {
            sap_type: 3,
            encrypted: None,
            pts_adjustment: 0,
            cw_index: 0xFF,
            tier: 0x0FFF,
            splice_command: Command::SpliceNull,
            descriptors: vec![],
            alignment_stuffing: vec![],
        };
        let encoded = section.encode().unwrap();
        let decoded = SpliceInfoSection::decode(&encoded).unwrap();
        assert_eq!(decoded, section);
    }

    #[test]
    fn test_alignment_stuffing_round_trips() {
        let section = SpliceInfoSection {
            sap_type: 3,
            encrypted: None,
            pts_adjustment: 0,
            cw_index: 0xFF,
            tier: 0x0FFF,
            splice_command: Command::SpliceNull,
            descriptors: vec![],
            alignment_stuffing: vec![0xFF, 0xFF],
        };
        let encoded = section.encode().unwrap();
        let decoded = SpliceInfoSection::decode(&encoded).unwrap();
        assert_eq!(decoded.alignment_stuffing, vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_encrypted_section_round_trips() {
        let section = SpliceInfoSection {
            sap_type: 0,
            encrypted: Some(EncryptionInfo {
                cipher: 0x01,
                e_crc_32: 0xAABBCCDD,
            }),
            pts_adjustment: 12345,
            cw_index: 3,
            tier: 1,
            splice_command: Command::SpliceNull,
            descriptors: vec![],
            alignment_stuffing: vec![],
        };
        let encoded = section.encode().unwrap();
        let decoded = SpliceInfoSection::decode(&encoded).unwrap();
        assert_eq!(decoded, section);
    }

    #[test]
    fn test_rejects_oversized_tier() {
        let section = SpliceInfoSection {
            sap_type: 0,
            encrypted: None,
            pts_adjustment: 0,
            cw_index: 0xFF,
            tier: 0x1FFF,
            splice_command: Command::SpliceNull,
            descriptors: vec![],
            alignment_stuffing: vec![],
        };
        assert!(section.encode().is_err());
    }
}
