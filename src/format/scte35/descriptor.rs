//! Splice descriptor loop: `[tag: u8][length: u8][identifier: u32][payload]` records.
//!
//! Every descriptor with the CUEI identifier (ASCII `"CUEI"`, `0x43554549`) decodes its payload
//! by tag; everything else round-trips as a [`PrivateDescriptor`] carrying the raw payload
//! bytes, whether or not the tag happens to collide with a CUEI tag value.

use bytes::{Bytes, BytesMut};

use crate::error::{Result, VdkError};

pub const CUEI_IDENTIFIER: u32 = 0x4355_4549;

pub const TAG_AVAIL: u8 = 0x00;
pub const TAG_DTMF: u8 = 0x01;
pub const TAG_SEGMENTATION: u8 = 0x02;
pub const TAG_TIME: u8 = 0x03;
pub const TAG_AUDIO: u8 = 0x04;

/// `avail_descriptor()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailDescriptor {
    pub provider_avail_id: u32,
}

/// `DTMF_descriptor()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtmfDescriptor {
    pub preroll: u8,
    pub dtmf_chars: Vec<u8>,
}

/// `time_descriptor()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeDescriptor {
    pub tai_seconds: u64,
    pub tai_ns: u32,
    pub utc_offset: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioComponent {
    pub component_tag: u8,
    pub iso_code: [u8; 3],
    pub bit_stream_mode: u8,
    pub num_channels: u8,
    pub full_srvc_audio: bool,
}

/// `audio_descriptor()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDescriptor {
    pub components: Vec<AudioComponent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRestrictions {
    RestrictGroup0,
    RestrictGroup1,
    RestrictGroup2,
    None,
}

impl DeviceRestrictions {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => DeviceRestrictions::RestrictGroup0,
            1 => DeviceRestrictions::RestrictGroup1,
            2 => DeviceRestrictions::RestrictGroup2,
            _ => DeviceRestrictions::None,
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            DeviceRestrictions::RestrictGroup0 => 0,
            DeviceRestrictions::RestrictGroup1 => 1,
            DeviceRestrictions::RestrictGroup2 => 2,
            DeviceRestrictions::None => 3,
        }
    }
}

/// Delivery restrictions, present when `delivery_not_restricted = false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryRestrictions {
    pub web_delivery_allowed: bool,
    pub no_regional_blackout: bool,
    pub archive_allowed: bool,
    pub device_restrictions: DeviceRestrictions,
}

/// The `segmentation_upid`: either a single opaque value, or, for `type = 0x0D` (MID), a
/// recursive list of sub-entries each shaped the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpidValue {
    Bytes(Bytes),
    Mid(Vec<SegmentationUpid>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationUpid {
    pub upid_type: u8,
    pub value: UpidValue,
}

pub const UPID_TYPE_MID: u8 = 0x0D;

impl SegmentationUpid {
    fn decode(upid_type: u8, data: &[u8]) -> Result<Self> {
        if upid_type == UPID_TYPE_MID {
            let mut entries = Vec::new();
            let mut pos = 0;
            while pos < data.len() {
                if data.len() < pos + 2 {
                    return Err(VdkError::BufferUnderflow("MID sub-UPID truncated".into()));
                }
                let sub_type = data[pos];
                let sub_len = data[pos + 1] as usize;
                pos += 2;
                if data.len() < pos + sub_len {
                    return Err(VdkError::BufferUnderflow("MID sub-UPID truncated".into()));
                }
                entries.push(SegmentationUpid::decode(sub_type, &data[pos..pos + sub_len])?);
                pos += sub_len;
            }
            Ok(SegmentationUpid {
                upid_type,
                value: UpidValue::Mid(entries),
            })
        } else {
            Ok(SegmentationUpid {
                upid_type,
                value: UpidValue::Bytes(Bytes::copy_from_slice(data)),
            })
        }
    }

    /// Returns the encoded payload bytes (excluding the type/length prefix).
    fn encode_value(&self) -> Result<Vec<u8>> {
        match &self.value {
            UpidValue::Bytes(b) => Ok(b.to_vec()),
            UpidValue::Mid(entries) => {
                let mut buf = Vec::new();
                for entry in entries {
                    let encoded = entry.encode_value()?;
                    if encoded.len() > 0xFF {
                        return Err(VdkError::FieldOutOfRange {
                            field: "segmentation_upid.mid_entry_length",
                            max_bits: 8,
                            value: encoded.len() as u64,
                        });
                    }
                    buf.push(entry.upid_type);
                    buf.push(encoded.len() as u8);
                    buf.extend_from_slice(&encoded);
                }
                Ok(buf)
            }
        }
    }
}

/// `segmentation_descriptor()`, the CUEI payload for tag `0x02`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationDescriptor {
    pub event_id: u32,
    pub cancel: bool,
    pub event_id_compliance: bool,
    /// `None` when `delivery_not_restricted = true`.
    pub delivery_restrictions: Option<DeliveryRestrictions>,
    /// 40-bit duration, present when `segmentation_duration_flag = 1`.
    pub duration: Option<u64>,
    pub upid: SegmentationUpid,
    pub segmentation_type_id: u8,
    pub segment_num: u8,
    pub segments_expected: u8,
    pub sub_segment: Option<(u8, u8)>,
}

/// Segmentation type IDs for which a sub-segment number/count pair follows `segments_expected`.
fn has_sub_segment(type_id: u8) -> bool {
    matches!(type_id, 0x34 | 0x35 | 0x36 | 0x37 | 0x38 | 0x39 | 0x3A | 0x3B)
}

impl SegmentationDescriptor {
    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 5 {
            return Err(VdkError::BufferUnderflow("segmentation_descriptor truncated".into()));
        }
        let event_id = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let cancel = data[4] & 0x80 != 0;
        let event_id_compliance = data[4] & 0x40 != 0;

        if cancel {
            return Ok(Self {
                event_id,
                cancel: true,
                event_id_compliance,
                delivery_restrictions: None,
                duration: None,
                upid: SegmentationUpid {
                    upid_type: 0,
                    value: UpidValue::Bytes(Bytes::new()),
                },
                segmentation_type_id: 0,
                segment_num: 0,
                segments_expected: 0,
                sub_segment: None,
            });
        }

        if data.len() < 6 {
            return Err(VdkError::BufferUnderflow("segmentation_descriptor truncated".into()));
        }
        let flags = data[5];
        let duration_flag = flags & 0x40 != 0;
        let delivery_not_restricted = flags & 0x20 != 0;
        let delivery_restrictions = if delivery_not_restricted {
            None
        } else {
            Some(DeliveryRestrictions {
                web_delivery_allowed: flags & 0x10 != 0,
                no_regional_blackout: flags & 0x08 != 0,
                archive_allowed: flags & 0x04 != 0,
                device_restrictions: DeviceRestrictions::from_bits(flags),
            })
        };

        let mut pos = 6;
        let duration = if duration_flag {
            if data.len() < pos + 5 {
                return Err(VdkError::BufferUnderflow("segmentation duration truncated".into()));
            }
            let bytes = &data[pos..pos + 5];
            let ticks = ((bytes[0] as u64) << 32)
                | ((bytes[1] as u64) << 24)
                | ((bytes[2] as u64) << 16)
                | ((bytes[3] as u64) << 8)
                | bytes[4] as u64;
            pos += 5;
            Some(ticks)
        } else {
            None
        };

        if data.len() < pos + 2 {
            return Err(VdkError::BufferUnderflow("segmentation UPID header truncated".into()));
        }
        let upid_type = data[pos];
        let upid_length = data[pos + 1] as usize;
        pos += 2;
        if data.len() < pos + upid_length {
            return Err(VdkError::BufferUnderflow("segmentation UPID truncated".into()));
        }
        let upid = SegmentationUpid::decode(upid_type, &data[pos..pos + upid_length])?;
        pos += upid_length;

        if data.len() < pos + 3 {
            return Err(VdkError::BufferUnderflow("segmentation_descriptor truncated".into()));
        }
        let segmentation_type_id = data[pos];
        let segment_num = data[pos + 1];
        let segments_expected = data[pos + 2];
        pos += 3;

        let sub_segment = if has_sub_segment(segmentation_type_id) {
            if data.len() < pos + 2 {
                return Err(VdkError::BufferUnderflow("sub-segment fields truncated".into()));
            }
            Some((data[pos], data[pos + 1]))
        } else {
            None
        };

        Ok(Self {
            event_id,
            cancel: false,
            event_id_compliance,
            delivery_restrictions,
            duration,
            upid,
            segmentation_type_id,
            segment_num,
            segments_expected,
            sub_segment,
        })
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        use bytes::BufMut;

        buf.put_u32(self.event_id);
        let mut byte4 = 0x3Fu8; // reserved bits set to 1
        if self.cancel {
            byte4 |= 0x80;
        }
        if self.event_id_compliance {
            byte4 |= 0x40;
        }
        buf.put_u8(byte4);
        if self.cancel {
            return Ok(());
        }

        let mut flags = 0b1000_0000u8; // program_segmentation_flag = 1
        if self.duration.is_some() {
            flags |= 0x40;
        }
        match self.delivery_restrictions {
            None => flags |= 0x20 | 0x1F, // delivery_not_restricted=1, reserved(5)=1
            Some(r) => {
                if r.web_delivery_allowed {
                    flags |= 0x10;
                }
                if r.no_regional_blackout {
                    flags |= 0x08;
                }
                if r.archive_allowed {
                    flags |= 0x04;
                }
                flags |= r.device_restrictions.to_bits();
            }
        }
        buf.put_u8(flags);

        if let Some(ticks) = self.duration {
            if ticks > (1u64 << 40) - 1 {
                return Err(VdkError::FieldOutOfRange {
                    field: "segmentation_descriptor.duration",
                    max_bits: 40,
                    value: ticks,
                });
            }
            buf.put_u8((ticks >> 32) as u8);
            buf.put_u32(ticks as u32);
        }

        let upid_bytes = self.upid.encode_value()?;
        if upid_bytes.len() > 0xFF {
            return Err(VdkError::FieldOutOfRange {
                field: "segmentation_descriptor.segmentation_upid_length",
                max_bits: 8,
                value: upid_bytes.len() as u64,
            });
        }
        buf.put_u8(self.upid.upid_type);
        buf.put_u8(upid_bytes.len() as u8);
        buf.put_slice(&upid_bytes);

        buf.put_u8(self.segmentation_type_id);
        buf.put_u8(self.segment_num);
        buf.put_u8(self.segments_expected);
        if let Some((num, expected)) = self.sub_segment {
            buf.put_u8(num);
            buf.put_u8(expected);
        }
        Ok(())
    }
}

/// Raw descriptor bytes, used both for genuinely unknown (non-CUEI) descriptors and for CUEI
/// tags this crate does not parse further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateDescriptor {
    pub tag: u8,
    pub identifier: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceDescriptor {
    Avail(AvailDescriptor),
    Dtmf(DtmfDescriptor),
    Segmentation(SegmentationDescriptor),
    Time(TimeDescriptor),
    Audio(AudioDescriptor),
    Private(PrivateDescriptor),
}

impl SpliceDescriptor {
    fn tag(&self) -> u8 {
        match self {
            SpliceDescriptor::Avail(_) => TAG_AVAIL,
            SpliceDescriptor::Dtmf(_) => TAG_DTMF,
            SpliceDescriptor::Segmentation(_) => TAG_SEGMENTATION,
            SpliceDescriptor::Time(_) => TAG_TIME,
            SpliceDescriptor::Audio(_) => TAG_AUDIO,
            SpliceDescriptor::Private(p) => p.tag,
        }
    }

    pub fn decode(tag: u8, identifier: u32, payload: &[u8]) -> Result<Self> {
        if identifier != CUEI_IDENTIFIER {
            log::debug!("non-CUEI descriptor identifier {:#010x}, storing raw", identifier);
            return Ok(SpliceDescriptor::Private(PrivateDescriptor {
                tag,
                identifier,
                data: payload.to_vec(),
            }));
        }
        match tag {
            TAG_AVAIL => {
                if payload.len() != 4 {
                    return Err(VdkError::Framing("avail_descriptor payload must be 4 bytes".into()));
                }
                Ok(SpliceDescriptor::Avail(AvailDescriptor {
                    provider_avail_id: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
                }))
            }
            TAG_DTMF => {
                if payload.len() < 2 {
                    return Err(VdkError::BufferUnderflow("DTMF_descriptor truncated".into()));
                }
                let preroll = payload[0];
                let count = (payload[1] >> 5) as usize;
                if payload.len() < 2 + count {
                    return Err(VdkError::BufferUnderflow("DTMF_descriptor truncated".into()));
                }
                Ok(SpliceDescriptor::Dtmf(DtmfDescriptor {
                    preroll,
                    dtmf_chars: payload[2..2 + count].to_vec(),
                }))
            }
            TAG_SEGMENTATION => Ok(SpliceDescriptor::Segmentation(SegmentationDescriptor::decode(payload)?)),
            TAG_TIME => {
                if payload.len() != 12 {
                    return Err(VdkError::Framing("time_descriptor payload must be 12 bytes".into()));
                }
                let tai_seconds = ((payload[0] as u64) << 40)
                    | ((payload[1] as u64) << 32)
                    | ((payload[2] as u64) << 24)
                    | ((payload[3] as u64) << 16)
                    | ((payload[4] as u64) << 8)
                    | payload[5] as u64;
                let tai_ns = u32::from_be_bytes([payload[6], payload[7], payload[8], payload[9]]);
                let utc_offset = u16::from_be_bytes([payload[10], payload[11]]);
                Ok(SpliceDescriptor::Time(TimeDescriptor {
                    tai_seconds,
                    tai_ns,
                    utc_offset,
                }))
            }
            TAG_AUDIO => {
                if payload.is_empty() {
                    return Err(VdkError::BufferUnderflow("audio_descriptor truncated".into()));
                }
                let count = payload[0] as usize;
                let mut components = Vec::with_capacity(count);
                let mut pos = 1;
                for _ in 0..count {
                    if payload.len() < pos + 4 {
                        return Err(VdkError::BufferUnderflow("audio component truncated".into()));
                    }
                    components.push(AudioComponent {
                        component_tag: payload[pos],
                        iso_code: [payload[pos + 1], payload[pos + 2], payload[pos + 3]],
                        bit_stream_mode: (payload[pos + 4] >> 5) & 0x07,
                        num_channels: (payload[pos + 4] >> 1) & 0x0F,
                        full_srvc_audio: payload[pos + 4] & 0x01 != 0,
                    });
                    pos += 5;
                }
                Ok(SpliceDescriptor::Audio(AudioDescriptor { components }))
            }
            other => {
                log::debug!("unrecognized CUEI descriptor tag {:#04x}, storing raw", other);
                Ok(SpliceDescriptor::Private(PrivateDescriptor {
                    tag: other,
                    identifier,
                    data: payload.to_vec(),
                }))
            }
        }
    }

    pub fn encode(&self) -> Result<(u8, u32, Vec<u8>)> {
        use bytes::BufMut;
        let mut buf = BytesMut::new();
        let identifier = match self {
            SpliceDescriptor::Private(p) => p.identifier,
            _ => CUEI_IDENTIFIER,
        };
        match self {
            SpliceDescriptor::Avail(a) => buf.put_u32(a.provider_avail_id),
            SpliceDescriptor::Dtmf(d) => {
                buf.put_u8(d.preroll);
                if d.dtmf_chars.len() > 7 {
                    return Err(VdkError::FieldOutOfRange {
                        field: "dtmf_descriptor.dtmf_count",
                        max_bits: 3,
                        value: d.dtmf_chars.len() as u64,
                    });
                }
                buf.put_u8(((d.dtmf_chars.len() as u8) << 5) | 0x1F);
                buf.put_slice(&d.dtmf_chars);
            }
            SpliceDescriptor::Segmentation(s) => s.encode(&mut buf)?,
            SpliceDescriptor::Time(t) => {
                buf.put_u16((t.tai_seconds >> 32) as u16);
                buf.put_u32(t.tai_seconds as u32);
                buf.put_u32(t.tai_ns);
                buf.put_u16(t.utc_offset);
            }
            SpliceDescriptor::Audio(a) => {
                if a.components.len() > 0xFF {
                    return Err(VdkError::FieldOutOfRange {
                        field: "audio_descriptor.audio_count",
                        max_bits: 8,
                        value: a.components.len() as u64,
                    });
                }
                buf.put_u8(a.components.len() as u8);
                for c in &a.components {
                    buf.put_u8(c.component_tag);
                    buf.put_slice(&c.iso_code);
                    let byte = (c.bit_stream_mode << 5) | (c.num_channels << 1) | (c.full_srvc_audio as u8);
                    buf.put_u8(byte);
                }
            }
            SpliceDescriptor::Private(p) => buf.put_slice(&p.data),
        }
        Ok((self.tag(), identifier, buf.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avail_descriptor_round_trips() {
        let descriptor = SpliceDescriptor::Avail(AvailDescriptor {
            provider_avail_id: 0x0000_0135,
        });
        let (tag, identifier, payload) = descriptor.encode().unwrap();
        assert_eq!(tag, TAG_AVAIL);
        assert_eq!(identifier, CUEI_IDENTIFIER);
        let decoded = SpliceDescriptor::decode(tag, identifier, &payload).unwrap();
        assert_eq!(decoded, descriptor);
    }

    #[test]
    fn test_non_cuei_descriptor_becomes_private() {
        let decoded = SpliceDescriptor::decode(0x02, 0xDEADBEEF, &[1, 2, 3]).unwrap();
        assert_eq!(
            decoded,
            SpliceDescriptor::Private(PrivateDescriptor {
                tag: 0x02,
                identifier: 0xDEADBEEF,
                data: vec![1, 2, 3],
            })
        );
    }

    #[test]
    fn test_segmentation_descriptor_round_trips_known_fixture() {
        let descriptor = SpliceDescriptor::Segmentation(SegmentationDescriptor {
            event_id: 0x4800008E,
            cancel: false,
            event_id_compliance: true,
            delivery_restrictions: Some(DeliveryRestrictions {
                web_delivery_allowed: false,
                no_regional_blackout: true,
                archive_allowed: true,
                device_restrictions: DeviceRestrictions::None,
            }),
            duration: Some(0x0001A599B0),
            upid: SegmentationUpid {
                upid_type: 0x08,
                value: UpidValue::Bytes(Bytes::from_static(&[0x00, 0x00, 0x00, 0x00, 0x2C, 0xA0, 0xA1, 0x8A])),
            },
            segmentation_type_id: 0x34,
            segment_num: 2,
            segments_expected: 0,
            sub_segment: None,
        });
        let (tag, identifier, payload) = descriptor.encode().unwrap();
        assert_eq!(tag, TAG_SEGMENTATION);
        assert_eq!(
            payload,
            vec![
                0x48, 0x00, 0x00, 0x8E, 0x7F, 0xCF, 0x00, 0x01, 0xA5, 0x99, 0xB0, 0x08, 0x08, 0x00, 0x00, 0x00, 0x00,
                0x2C, 0xA0, 0xA1, 0x8A, 0x34, 0x02, 0x00,
            ]
        );
        let decoded = SpliceDescriptor::decode(tag, identifier, &payload).unwrap();
        assert_eq!(decoded, descriptor);
    }

    #[test]
    fn test_mid_upid_round_trips_recursively() {
        let upid = SegmentationUpid {
            upid_type: UPID_TYPE_MID,
            value: UpidValue::Mid(vec![
                SegmentationUpid {
                    upid_type: 0x03,
                    value: UpidValue::Bytes(Bytes::from_static(b"AD-ID012")),
                },
                SegmentationUpid {
                    upid_type: 0x06,
                    value: UpidValue::Bytes(Bytes::from_static(&[1; 8])),
                },
            ]),
        };
        let encoded = upid.encode_value().unwrap();
        let decoded = SegmentationUpid::decode(UPID_TYPE_MID, &encoded).unwrap();
        assert_eq!(decoded, upid);
    }

    #[test]
    fn test_dtmf_descriptor_round_trips() {
        let descriptor = SpliceDescriptor::Dtmf(DtmfDescriptor {
            preroll: 50,
            dtmf_chars: b"123*".to_vec(),
        });
        let (tag, identifier, payload) = descriptor.encode().unwrap();
        let decoded = SpliceDescriptor::decode(tag, identifier, &payload).unwrap();
        assert_eq!(decoded, descriptor);
    }

    #[test]
    fn test_time_descriptor_round_trips() {
        let descriptor = SpliceDescriptor::Time(TimeDescriptor {
            tai_seconds: 0x0000_CAFE_BABE,
            tai_ns: 123_456_789,
            utc_offset: 37,
        });
        let (tag, identifier, payload) = descriptor.encode().unwrap();
        assert_eq!(tag, TAG_TIME);
        assert_eq!(payload.len(), 12);
        let decoded = SpliceDescriptor::decode(tag, identifier, &payload).unwrap();
        assert_eq!(decoded, descriptor);
    }

    #[test]
    fn test_audio_descriptor_round_trips() {
        let descriptor = SpliceDescriptor::Audio(AudioDescriptor {
            components: vec![
                AudioComponent {
                    component_tag: 1,
                    iso_code: *b"eng",
                    bit_stream_mode: 0,
                    num_channels: 2,
                    full_srvc_audio: true,
                },
                AudioComponent {
                    component_tag: 2,
                    iso_code: *b"spa",
                    bit_stream_mode: 3,
                    num_channels: 1,
                    full_srvc_audio: false,
                },
            ],
        });
        let (tag, identifier, payload) = descriptor.encode().unwrap();
        assert_eq!(tag, TAG_AUDIO);
        let decoded = SpliceDescriptor::decode(tag, identifier, &payload).unwrap();
        assert_eq!(decoded, descriptor);
    }
}
