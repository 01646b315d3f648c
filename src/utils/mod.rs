//! # Utility Functions and Types
//!
//! Bit-level readers/writers used by the codec helpers, and the MPEG-2 CRC32
//! used by PSI tables and the program stream map.
//!
//! ```rust
//! use mpegio::utils::{BitReader, BitWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = BitWriter::new();
//! writer.write_bits(0b101, 3);
//! writer.write_bits(0b10011, 5);
//! let bytes = writer.into_bytes();
//!
//! let mut reader = BitReader::new(&bytes);
//! assert_eq!(reader.read_bits(3)?, 0b101);
//! # Ok(())
//! # }
//! ```

/// Bit manipulation utilities
pub mod bits;

/// CRC calculation implementations
pub mod crc;

pub use bits::*;
pub use crc::Crc32Mpeg2;
