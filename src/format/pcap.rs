//! libpcap savefile codec (see pcap-savefile(5)).
//!
//! A savefile is a 24-byte global header followed by a stream of `{timestamp, captured_len,
//! original_len}` record headers, each immediately followed by `captured_len` bytes of captured
//! data. Byte order of every field after the magic is determined by which magic was seen.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, VdkError};

const MAGIC_LE: u32 = 0xA1B2_C3D4;
const MAGIC_BE: u32 = 0xD4C3_B2A1;
const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

/// The 24-byte global header of a pcap savefile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalHeader {
    pub version_major: u16,
    pub version_minor: u16,
    /// GMT-to-local correction, seconds; almost always `0`.
    pub this_zone: i32,
    /// Timestamp accuracy; almost always `0`.
    pub sig_figs: u32,
    pub snap_len: u32,
    /// libpcap `LINKTYPE_*` value.
    pub network: u32,
}

impl Default for GlobalHeader {
    fn default() -> Self {
        GlobalHeader {
            version_major: 2,
            version_minor: 4,
            this_zone: 0,
            sig_figs: 0,
            snap_len: 262_144,
            network: 1,
        }
    }
}

/// One captured packet: a timestamp (seconds plus microsecond fraction), the original on-wire
/// length, and however many bytes of it were actually captured (`data.len()`, which may be less
/// than `original_len` when `snap_len` truncated it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp_secs: u32,
    /// Microseconds since `timestamp_secs`; this codec only supports µs-resolution savefiles.
    pub timestamp_micros: u32,
    pub original_len: u32,
    pub data: Bytes,
}

/// A fully decoded savefile: one global header plus its packet records, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub header: GlobalHeader,
    pub records: Vec<Record>,
}

fn get_u16(buf: &mut Bytes, endian: Endian) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(VdkError::BufferUnderflow("pcap field".to_string()));
    }
    Ok(match endian {
        Endian::Little => buf.get_u16_le(),
        Endian::Big => buf.get_u16(),
    })
}

fn get_u32(buf: &mut Bytes, endian: Endian) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(VdkError::BufferUnderflow("pcap field".to_string()));
    }
    Ok(match endian {
        Endian::Little => buf.get_u32_le(),
        Endian::Big => buf.get_u32(),
    })
}

fn put_u16(out: &mut BytesMut, value: u16) {
    out.put_u16_le(value);
}

fn put_u32(out: &mut BytesMut, value: u32) {
    out.put_u32_le(value);
}

/// Decodes a full savefile, validating the magic, version, and every record boundary.
pub fn decode(data: &[u8]) -> Result<Capture> {
    if data.len() < GLOBAL_HEADER_LEN {
        return Err(VdkError::BufferUnderflow("pcap global header".to_string()));
    }
    let mut buf = Bytes::copy_from_slice(data);

    let magic = buf.get_u32();
    let endian = match magic {
        MAGIC_LE => Endian::Little,
        MAGIC_BE => Endian::Big,
        other => return Err(VdkError::Framing(format!("unrecognized pcap magic 0x{:08X}", other))),
    };

    let version_major = get_u16(&mut buf, endian)?;
    let version_minor = get_u16(&mut buf, endian)?;
    if (version_major, version_minor) != (2, 4) {
        return Err(VdkError::Framing(format!(
            "unsupported pcap version {}.{}, only 2.4 is supported",
            version_major, version_minor
        )));
    }
    let this_zone = get_u32(&mut buf, endian)? as i32;
    let sig_figs = get_u32(&mut buf, endian)?;
    let snap_len = get_u32(&mut buf, endian)?;
    let network = get_u32(&mut buf, endian)?;

    let header = GlobalHeader { version_major, version_minor, this_zone, sig_figs, snap_len, network };

    let mut records = Vec::new();
    while buf.has_remaining() {
        if buf.remaining() < RECORD_HEADER_LEN {
            return Err(VdkError::BufferUnderflow("pcap record header".to_string()));
        }
        let timestamp_secs = get_u32(&mut buf, endian)?;
        let timestamp_micros = get_u32(&mut buf, endian)?;
        let captured_len = get_u32(&mut buf, endian)?;
        let original_len = get_u32(&mut buf, endian)?;

        if buf.remaining() < captured_len as usize {
            return Err(VdkError::BufferOverflow {
                needed: captured_len as usize,
                available: buf.remaining(),
            });
        }
        let packet_data = buf.copy_to_bytes(captured_len as usize);
        records.push(Record { timestamp_secs, timestamp_micros, original_len, data: packet_data });
    }

    Ok(Capture { header, records })
}

/// Serializes a [`Capture`] back to savefile bytes, always writing the little-endian magic.
pub fn encode(capture: &Capture) -> Bytes {
    let total_len = GLOBAL_HEADER_LEN
        + capture.records.iter().map(|r| RECORD_HEADER_LEN + r.data.len()).sum::<usize>();
    let mut out = BytesMut::with_capacity(total_len);

    out.put_u32_le(MAGIC_LE);
    put_u16(&mut out, capture.header.version_major);
    put_u16(&mut out, capture.header.version_minor);
    put_u32(&mut out, capture.header.this_zone as u32);
    put_u32(&mut out, capture.header.sig_figs);
    put_u32(&mut out, capture.header.snap_len);
    put_u32(&mut out, capture.header.network);

    for record in &capture.records {
        put_u32(&mut out, record.timestamp_secs);
        put_u32(&mut out, record.timestamp_micros);
        put_u32(&mut out, record.data.len() as u32);
        put_u32(&mut out, record.original_len);
        out.extend_from_slice(&record.data);
    }

    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_udp_fixture() -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(MAGIC_LE);
        out.put_u16_le(2);
        out.put_u16_le(4);
        out.put_i32_le(0);
        out.put_u32_le(0);
        out.put_u32_le(524_288);
        out.put_u32_le(1);

        let payload = b"hello, this is a 45 byte udp payload!!!!!!!!";
        assert_eq!(payload.len(), 45);
        out.put_u32_le(1_721_314_372);
        out.put_u32_le(204_926);
        out.put_u32_le(payload.len() as u32);
        out.put_u32_le(45);
        out.extend_from_slice(payload);

        out.freeze()
    }

    #[test]
    fn test_decodes_seed_fixture() {
        let bytes = text_udp_fixture();
        let capture = decode(&bytes).unwrap();
        assert_eq!(capture.header.snap_len, 524_288);
        assert_eq!(capture.records.len(), 1);
        assert_eq!(capture.records[0].timestamp_secs, 1_721_314_372);
        assert_eq!(capture.records[0].timestamp_micros, 204_926);
        assert_eq!(capture.records[0].original_len, 45);
    }

    #[test]
    fn test_round_trips_seed_fixture_byte_for_byte() {
        let bytes = text_udp_fixture();
        let capture = decode(&bytes).unwrap();
        assert_eq!(encode(&capture), bytes);
    }

    #[test]
    fn test_decodes_big_endian_magic() {
        let mut out = BytesMut::new();
        out.put_u32(MAGIC_BE);
        out.put_u16(2);
        out.put_u16(4);
        out.put_i32(0);
        out.put_u32(0);
        out.put_u32(65535);
        out.put_u32(1);
        let capture = decode(&out.freeze()).unwrap();
        assert_eq!(capture.header.snap_len, 65535);
        assert!(capture.records.is_empty());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let bytes = [0u8; 24];
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_rejects_unsupported_version() {
        let mut out = BytesMut::new();
        out.put_u32_le(MAGIC_LE);
        out.put_u16_le(2);
        out.put_u16_le(2);
        out.put_i32_le(0);
        out.put_u32_le(0);
        out.put_u32_le(65535);
        out.put_u32_le(1);
        assert!(decode(&out.freeze()).is_err());
    }

    #[test]
    fn test_rejects_truncated_record_payload() {
        let mut out = BytesMut::new();
        out.put_u32_le(MAGIC_LE);
        out.put_u16_le(2);
        out.put_u16_le(4);
        out.put_i32_le(0);
        out.put_u32_le(0);
        out.put_u32_le(65535);
        out.put_u32_le(1);
        out.put_u32_le(0);
        out.put_u32_le(0);
        out.put_u32_le(10);
        out.put_u32_le(10);
        out.extend_from_slice(&[0u8; 3]);
        assert!(decode(&out.freeze()).is_err());
    }
}
