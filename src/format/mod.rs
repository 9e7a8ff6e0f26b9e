//! # Media Format Implementations
//!
//! Every format in this module is a pure, synchronous codec: a pair of `decode`/`encode`
//! functions (or associated functions on a value type) operating on in-memory buffers. None of
//! them hold a socket, a file handle, or a background task.
//!
//! - **ts**: MPEG Transport Stream packets and PES headers
//! - **rtp**: RTP packet transport, jitter buffering, and transmit-side sessions
//! - **scte35**: SCTE-35 `splice_info_section` encode/decode
//! - **hls**: HLS (m3u8) playlist lexing, parsing, and writing
//! - **sdp**: Session Description Protocol (RFC 8866)
//! - **pcap**: libpcap savefile reading
//! - **wav**: WAV/RIFF header encode/decode
//! - **cmcd**: Common Media Client Data (CTA-5004) key/value encode/decode
//!
//! ## Example: decoding a SCTE-35 time_signal
//!
//! ```rust
//! use broadcore::format::scte35::SpliceInfoSection;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let b64 = "/DAvAAAAAAAA///wFAVIAACPf+/+c2nALv4AUsz1AAAAAAAKAAhDVUVJAAABNWLbowo=";
//! let section = SpliceInfoSection::decode_base64(b64)?;
//! println!("{:?}", section.splice_command);
//! # Ok(())
//! # }
//! ```

/// Common Media Client Data (CTA-5004)
pub mod cmcd;
/// HLS playlist lexer, parser, and writer
pub mod hls;
/// libpcap savefile reading
pub mod pcap;
/// Real-time Transport Protocol (RTP) implementation for media streaming
pub mod rtp;
/// SCTE-35 splice_info_section codec
pub mod scte35;
/// Session Description Protocol (RFC 8866)
pub mod sdp;
/// MPEG Transport Stream (TS) packet and PES codec
pub mod ts;
/// WAV/RIFF header codec
pub mod wav;

// Re-export commonly used types
pub use self::rtp::{JitterBuffer, RtpPacket, Session as RtpSession};
pub use self::scte35::SpliceInfoSection;
pub use self::ts::{TsPacket, TS_PACKET_SIZE};
