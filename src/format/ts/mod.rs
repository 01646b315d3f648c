//! # MPEG Transport Stream (TS)
//!
//! Section-level codec plus a multiplexer:
//!
//! - [`types`]: TS header, adaptation field and PCR, PAT/PMT sections with
//!   CRC32, the supported [`StreamType`]s
//! - [`parser`]: decoding of the same structures, CRC-checked
//! - [`muxer`]: [`TsMuxer`], which turns elementary frames into 188-byte
//!   packets handed to a [`PacketSink`]
//!
//! ```rust
//! use mpegio::av::{CodecId, MediaKind};
//! use mpegio::format::ts::{TSPacketParser, TsMuxer, PID_PMT, TS_PACKET_SIZE};
//!
//! # fn main() -> mpegio::Result<()> {
//! let mut muxer = TsMuxer::new(Vec::new());
//! muxer.add_track(MediaKind::Audio, CodecId::Aac, Some(&[0x12, 0x10]))?;
//! muxer.write_header()?;
//! muxer.input(0, &[0x21, 0x10, 0x04], 0, 0, true)?;
//!
//! let out = muxer.into_sink();
//! assert_eq!(out.len(), 3 * TS_PACKET_SIZE);
//!
//! let parser = TSPacketParser::new();
//! let pmt = parser.parse_packet(&out[TS_PACKET_SIZE..])?;
//! assert_eq!(pmt.header.pid, PID_PMT);
//! # Ok(())
//! # }
//! ```

/// TS muxer implementation for creating MPEG-TS packets
pub mod muxer;

/// Low-level TS packet parsing utilities
pub mod parser;

/// Core TS types and constants
pub mod types;

pub use muxer::{CallbackSink, IoSink, PacketSink, TsMuxer};
pub use parser::{TSPacket, TSPacketParser};
pub use types::{
    AdaptationField, Pcr, StreamType, TSHeader, PAT, PID_PAT, PID_PMT, PMT, TS_PACKET_SIZE,
};
