#![doc(html_root_url = "https://docs.rs/mpegio/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # mpegio - MPEG PS to TS remuxing core
//!
//! `mpegio` demultiplexes MPEG program streams (as sent by GB28181 cameras and
//! NVRs) into elementary stream frames, and multiplexes elementary frames into
//! a transport stream of 188-byte packets.
//!
//! Both directions are synchronous and incremental. Nothing here does I/O:
//! bytes go in through `input`, results come out through a handler or sink
//! owned by the session.
//!
//! ## Features
//!
//! - PS pack header, system header and program stream map parsing
//! - PES parsing in the MPEG-2 and MPEG-1 layouts, unbounded PES included
//! - Frame reassembly with loss detection and keyframe classification
//! - TS header, adaptation field, PCR, PAT and PMT encoding and decoding
//! - TS muxing of H.264, H.265, AAC and G.711
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! mpegio = "0.1.0"
//! ```
//!
//! ### PS to TS
//!
//! ```rust
//! use mpegio::av::{CodecId, MediaKind};
//! use mpegio::format::ps::{PacketHandler, PsDemuxerContext};
//! use mpegio::format::ts::TsMuxer;
//!
//! struct Remux {
//!     muxer: TsMuxer<Vec<u8>>,
//!     frame: Vec<u8>,
//! }
//!
//! impl PacketHandler for Remux {
//!     fn on_part_packet(&mut self, _: usize, _: MediaKind, _: CodecId, data: &[u8], first: bool) {
//!         if first {
//!             self.frame.clear();
//!         }
//!         self.frame.extend_from_slice(data);
//!     }
//!
//!     fn on_loss_packet(&mut self, _: usize, _: MediaKind, _: CodecId) {
//!         self.frame.clear();
//!     }
//!
//!     fn on_complete_packet(
//!         &mut self,
//!         track: usize,
//!         _: MediaKind,
//!         _: CodecId,
//!         dts: u64,
//!         pts: u64,
//!         key: bool,
//!     ) -> mpegio::Result<()> {
//!         self.muxer.input(track, &self.frame, pts, dts, key)
//!     }
//! }
//!
//! # fn main() -> mpegio::Result<()> {
//! let mut muxer = TsMuxer::new(Vec::new());
//! muxer.add_track(MediaKind::Video, CodecId::H264, None)?;
//! muxer.write_header()?;
//!
//! let mut session = PsDemuxerContext::new(Remux { muxer, frame: Vec::new() });
//! # let ps_bytes: &[u8] = &[];
//! session.input(ps_bytes)?;
//! session.flush()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: media kinds, codec ids and the mux input [`av::Packet`]
//! - `codec`: keyframe classification, decoder configuration records, ADTS
//! - `format`: the PS demuxer and the TS codec and muxer
//! - `config`: per-session settings with environment overrides
//! - `error`: [`MpegError`] and the crate [`Result`]
//! - `utils`: bit reader and writer, MPEG-2 CRC32

/// Media kinds, codec ids and packets
pub mod av;

/// Codec helpers for H.264, H.265 and AAC
pub mod codec;

/// Session configuration
pub mod config;

/// Error types and utilities
pub mod error;

/// PS and TS container formats
pub mod format;

/// Common utilities and helper functions
pub mod utils;

pub use error::{MpegError, Result};
