#![doc(html_root_url = "https://docs.rs/broadcore/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # broadcore
//!
//! `broadcore` is a collection of bit-level codecs for broadcast and streaming wire formats.
//! Every codec in this crate is a pure, synchronous, stateless pair of decode/encode
//! functions over in-memory buffers — there is no I/O, no background task, and no client for
//! any particular transport. Bring your own socket, file, or pipeline.
//!
//! ## Features
//!
//! - SCTE-35 splice_info_section encode/decode, with CRC-32/BZIP2 validation
//! - MPEG-TS packet and PES header encode/decode
//! - RTP packet encode/decode plus a small stateful transmit-side `Session`
//! - HLS (m3u8) lexing, strict parsing, and strict writing, including `SCTE35-IN`/`OUT`
//! - SDP (RFC 8866) strict parsing and writing
//! - pcap savefile reading for captured UDP traffic
//! - WAV/RIFF header encode/decode
//! - CMCD (CTA-5004) key/value encode/decode
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! broadcore = "0.1.0"
//! ```
//!
//! ### Decoding an MPEG-TS packet
//!
//! ```rust
//! use broadcore::format::ts::{TsPacket, TS_PACKET_SIZE};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = [0u8; TS_PACKET_SIZE]; // stand-in for a real 188-byte packet
//! let mut packet = data;
//! packet[0] = 0x47; // sync byte
//! let ts = TsPacket::decode(&packet)?;
//! assert_eq!(ts.header.pid, 0x1FFF);
//! # Ok(())
//! # }
//! ```
//!
//! ### Decoding a SCTE-35 splice_info_section
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
//!
//! ## Module Overview
//!
//! - `format`: codec implementations
//!   - `ts`: MPEG Transport Stream packets and PES headers
//!   - `rtp`: RTP packet transport
//!   - `scte35`: SCTE-35 splice_info_section
//!   - `hls`: HLS playlist lexing, parsing, writing
//!   - `sdp`: Session Description Protocol
//!   - `pcap`, `wav`, `cmcd`: smaller fixed/tokenized formats
//!
//! - `error`: the crate-wide error type and `Result` alias
//!
//! - `utils`: bitstream reading/writing, CRC, epoch/tick-rate conversions
//!
//! - `config`: optional host-level tunables; never consulted by any decode/encode path

/// Error types and utilities
pub mod error;

/// Media format implementations (TS, RTP, SCTE-35, HLS, SDP, pcap, WAV, CMCD)
pub mod format;

/// Common utilities and helper functions
pub mod utils;

/// Configuration module for host programs embedding this crate
pub mod config;

pub use error::{Result, VdkError};
