//! WAV/RIFF header codec.
//!
//! A WAV file is a RIFF container (`'RIFF'`, length, `'WAVE'`) holding a `'fmt '` chunk
//! describing the PCM format, an optional 24-byte extension when the format tag is the
//! `WAVE_FORMAT_EXTENSIBLE` sentinel `0xFFFE`, and a `'data'` chunk. Any bytes after the chunk
//! triple are the audio bitstream itself and are not interpreted.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, VdkError};

const RIFF_ID: &[u8; 4] = b"RIFF";
const WAVE_ID: &[u8; 4] = b"WAVE";
const FMT_ID: &[u8; 4] = b"fmt ";
const DATA_ID: &[u8; 4] = b"data";

/// `WAVE_FORMAT_EXTENSIBLE`; signals that a 24-byte extension follows the base `fmt ` fields.
pub const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// The 24-byte extension appended to a `fmt ` chunk when `format_tag == WAVE_FORMAT_EXTENSIBLE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatExtension {
    pub valid_bits_per_sample: u16,
    pub channel_mask: u32,
    /// 16-byte sub-format GUID; its first two bytes carry the real format tag.
    pub sub_format: [u8; 16],
}

/// The decoded `fmt ` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatChunk {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub extension: Option<FormatExtension>,
}

/// A fully decoded WAV file: its format description plus the raw audio bitstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavFile {
    pub format: FormatChunk,
    pub data: Bytes,
}

fn read_chunk_id(buf: &mut Bytes, expected: &[u8; 4], what: &str) -> Result<()> {
    if buf.remaining() < 4 {
        return Err(VdkError::BufferUnderflow(format!("{} id", what)));
    }
    let mut id = [0u8; 4];
    buf.copy_to_slice(&mut id);
    if &id != expected {
        return Err(VdkError::Framing(format!(
            "expected '{}' chunk id, found {:?}",
            what,
            String::from_utf8_lossy(&id)
        )));
    }
    Ok(())
}

/// Decodes a WAV file's RIFF/fmt/data chunk triple, validating every chunk id.
pub fn decode(data: &[u8]) -> Result<WavFile> {
    let mut buf = Bytes::copy_from_slice(data);

    read_chunk_id(&mut buf, RIFF_ID, "RIFF")?;
    if buf.remaining() < 4 {
        return Err(VdkError::BufferUnderflow("RIFF length".to_string()));
    }
    let _riff_len = buf.get_u32_le();
    read_chunk_id(&mut buf, WAVE_ID, "WAVE")?;

    read_chunk_id(&mut buf, FMT_ID, "fmt ")?;
    if buf.remaining() < 4 {
        return Err(VdkError::BufferUnderflow("fmt chunk length".to_string()));
    }
    let fmt_len = buf.get_u32_le();
    if fmt_len < 16 {
        return Err(VdkError::Framing(format!("fmt chunk too short: {} bytes", fmt_len)));
    }
    if buf.remaining() < 16 {
        return Err(VdkError::BufferUnderflow("fmt chunk body".to_string()));
    }
    let format_tag = buf.get_u16_le();
    let channels = buf.get_u16_le();
    let sample_rate = buf.get_u32_le();
    let byte_rate = buf.get_u32_le();
    let block_align = buf.get_u16_le();
    let bits_per_sample = buf.get_u16_le();

    let mut consumed_in_fmt = 16u32;
    let extension = if format_tag == FORMAT_EXTENSIBLE {
        if fmt_len < 16 + 24 {
            return Err(VdkError::Framing("WAVE_FORMAT_EXTENSIBLE fmt chunk missing 24-byte extension".to_string()));
        }
        if buf.remaining() < 24 {
            return Err(VdkError::BufferUnderflow("fmt chunk extension".to_string()));
        }
        let ext_size = buf.get_u16_le();
        let valid_bits_per_sample = buf.get_u16_le();
        let channel_mask = buf.get_u32_le();
        let mut sub_format = [0u8; 16];
        buf.copy_to_slice(&mut sub_format);
        consumed_in_fmt += 2 + ext_size as u32;
        Some(FormatExtension { valid_bits_per_sample, channel_mask, sub_format })
    } else {
        None
    };

    let padding = (fmt_len - consumed_in_fmt) as usize;
    if buf.remaining() < padding {
        return Err(VdkError::BufferUnderflow("fmt chunk padding".to_string()));
    }
    buf.advance(padding);

    read_chunk_id(&mut buf, DATA_ID, "data")?;
    if buf.remaining() < 4 {
        return Err(VdkError::BufferUnderflow("data chunk length".to_string()));
    }
    let data_len = buf.get_u32_le() as usize;
    if buf.remaining() < data_len {
        return Err(VdkError::BufferOverflow { needed: data_len, available: buf.remaining() });
    }
    let audio = buf.copy_to_bytes(data_len);

    Ok(WavFile {
        format: FormatChunk { format_tag, channels, sample_rate, byte_rate, block_align, bits_per_sample, extension },
        data: audio,
    })
}

/// Serializes a [`WavFile`] back to RIFF bytes, composing chunks in RIFF/fmt/data order.
pub fn encode(wav: &WavFile) -> Bytes {
    let has_extension = wav.format.extension.is_some();
    let fmt_len: u32 = if has_extension { 16 + 24 } else { 16 };
    let data_len = wav.data.len() as u32;
    let riff_len = 4 + (8 + fmt_len) + (8 + data_len);

    let mut out = BytesMut::with_capacity(8 + riff_len as usize);
    out.extend_from_slice(RIFF_ID);
    out.put_u32_le(riff_len);
    out.extend_from_slice(WAVE_ID);

    out.extend_from_slice(FMT_ID);
    out.put_u32_le(fmt_len);
    out.put_u16_le(wav.format.format_tag);
    out.put_u16_le(wav.format.channels);
    out.put_u32_le(wav.format.sample_rate);
    out.put_u32_le(wav.format.byte_rate);
    out.put_u16_le(wav.format.block_align);
    out.put_u16_le(wav.format.bits_per_sample);
    if let Some(ext) = &wav.format.extension {
        out.put_u16_le(22);
        out.put_u16_le(ext.valid_bits_per_sample);
        out.put_u32_le(ext.channel_mask);
        out.extend_from_slice(&ext.sub_format);
    }

    out.extend_from_slice(DATA_ID);
    out.put_u32_le(data_len);
    out.extend_from_slice(&wav.data);

    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_fixture() -> WavFile {
        WavFile {
            format: FormatChunk {
                format_tag: 1,
                channels: 2,
                sample_rate: 44_100,
                byte_rate: 44_100 * 2 * 2,
                block_align: 4,
                bits_per_sample: 16,
                extension: None,
            },
            data: Bytes::from_static(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]),
        }
    }

    #[test]
    fn test_round_trips_pcm_fixture() {
        let wav = pcm_fixture();
        let bytes = encode(&wav);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, wav);
    }

    #[test]
    fn test_round_trips_extensible_fixture() {
        let wav = WavFile {
            format: FormatChunk {
                format_tag: FORMAT_EXTENSIBLE,
                channels: 6,
                sample_rate: 48_000,
                byte_rate: 48_000 * 6 * 3,
                block_align: 18,
                bits_per_sample: 24,
                extension: Some(FormatExtension {
                    valid_bits_per_sample: 24,
                    channel_mask: 0x3F,
                    sub_format: [1, 0, 0, 0, 0, 0, 0x10, 0, 0x80, 0, 0, 0xAA, 0, 0x38, 0x9B, 0x71],
                }),
            },
            data: Bytes::from_static(&[0xAA; 18]),
        };
        let bytes = encode(&wav);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, wav);
    }

    #[test]
    fn test_rejects_wrong_riff_id() {
        let mut bytes = encode(&pcm_fixture()).to_vec();
        bytes[0] = b'X';
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_rejects_wrong_wave_id() {
        let mut bytes = encode(&pcm_fixture()).to_vec();
        bytes[8] = b'X';
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_rejects_truncated_data_chunk() {
        let mut bytes = encode(&pcm_fixture()).to_vec();
        let len = bytes.len();
        bytes.truncate(len - 4);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_rejects_short_fmt_chunk() {
        let mut wav_bytes = encode(&pcm_fixture()).to_vec();
        // Corrupt the fmt chunk length field (bytes 16..20) to claim fewer than 16 bytes.
        wav_bytes[16] = 8;
        wav_bytes[17] = 0;
        wav_bytes[18] = 0;
        wav_bytes[19] = 0;
        assert!(decode(&wav_bytes).is_err());
    }
}
