//! # Error Types
//!
//! This module provides the error types used throughout the broadcore library.
//! It defines a central error type `VdkError` that encapsulates all possible
//! errors that can occur while decoding or encoding a broadcast wire format.
//!
//! ## Example Usage
//!
//! ```rust
//! use broadcore::error::{Result, VdkError};
//!
//! fn parse_payload(data: &[u8]) -> Result<()> {
//!     if data.is_empty() {
//!         return Err(VdkError::InvalidData("empty payload".to_string()));
//!     }
//!
//!     // parse payload...
//!     Ok(())
//! }
//! ```

use std::num::ParseIntError;
use thiserror::Error;

/// Primary error type for the broadcore library
#[derive(Error, Debug)]
pub enum VdkError {
    /// I/O errors that occur during file or network operations
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors related to codec-level operations
    #[error("codec error: {0}")]
    Codec(String),

    /// Errors related to streaming protocols (RTP, HLS, SDP, etc.)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Errors that occur during parsing of various formats
    #[error("parser error: {0}")]
    Parser(String),

    /// Errors for invalid or malformed input data
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Errors that occur during integer parsing
    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),

    /// Raised when a buffer ends before a fixed-size or length-prefixed field finishes decoding
    #[error("buffer underflow: {0}")]
    BufferUnderflow(String),

    /// Raised when a caller-supplied buffer is too small to hold an encoded structure
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferOverflow { needed: usize, available: usize },

    /// Raised when a value does not fit the bit width of the field it is being packed into
    #[error("field '{field}' does not fit in {max_bits} bits: {value}")]
    FieldOutOfRange {
        field: &'static str,
        max_bits: u32,
        value: u64,
    },

    /// Raised when a framing constant (sync byte, fixed reserved bits, table id, ...) is wrong
    #[error("framing error: {0}")]
    Framing(String),

    /// Raised when a stored checksum does not match the one computed over the payload
    #[error("checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    /// Raised when two fields that must agree with each other do not
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Raised for a value this crate recognizes but declines to encode or decode
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// A specialized Result type for broadcore operations.
///
/// This type is used throughout the broadcore library to handle operations
/// that can produce a `VdkError`.
///
/// ## Example
///
/// ```rust
/// use broadcore::error::{Result, VdkError};
///
/// fn validate_stream_id(id: &str) -> Result<i32> {
///     id.parse::<i32>().map_err(VdkError::from)
/// }
/// ```
pub type Result<T> = std::result::Result<T, VdkError>;
