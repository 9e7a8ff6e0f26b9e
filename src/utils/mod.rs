//! # Utility Functions and Types
//!
//! This module provides common utility functions and types shared by the codecs in this
//! crate:
//!
//! - Bit-level reading, writing, and 33-bit timestamp packing
//! - CRC-32 calculation (MPEG-2 and BZIP2 variants)
//! - Epoch and tick-rate conversions
//!
//! ## Bit Operations
//!
//! ```rust
//! use broadcore::utils::BitReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = vec![0b10110011u8];
//! let mut reader = BitReader::new(&data);
//!
//! let value = reader.read_bits(3)?; // Reads first 3 bits (101)
//! assert_eq!(value, 0b101);
//! # Ok(())
//! # }
//! ```
//!
//! ## CRC Calculation
//!
//! ```rust
//! use broadcore::utils::Crc32Bzip2;
//!
//! # fn main() {
//! let crc = Crc32Bzip2::new();
//! println!("CRC32/BZIP2: {:08x}", crc.calculate(b"Hello, world!"));
//! # }
//! ```

/// Bit manipulation, bitstream reading/writing, and 33-bit timestamp packing
pub mod bits;

/// Epoch and tick-rate conversions
pub mod clock;

/// CRC calculation implementations
pub mod crc;

/// Lowercase hex encode/decode
pub mod hex;

// Re-export commonly used types
pub use bits::*;
pub use clock::*;
pub use crc::{Crc32Bzip2, Crc32Mpeg2};
