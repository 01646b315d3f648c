//! # MPEG Program Stream (PS)
//!
//! - [`types`]: pack header, system header and program stream map
//! - [`demuxer`]: [`PsDemuxer`], an incremental parser that hands out
//!   elementary stream fragments as soon as they arrive
//! - [`context`]: [`PsDemuxerContext`], which buffers split input and turns
//!   fragments into partial, lost and complete frame events
//!
//! The demuxer never copies payload. Fragments and partial packets borrow the
//! caller's buffer and are only valid during the callback.

/// Frame reassembly on top of the demuxer
pub mod context;

/// Incremental PS parser
pub mod demuxer;

/// PS header structures
pub mod types;

pub use context::{DemuxObserver, FrameAssembler, PacketHandler, PsDemuxerContext};
pub use demuxer::{EsFragment, EsHandler, PsDemuxer};
pub use types::{ElementaryStream, PackHeader, ProgramStreamMap, SystemHeader};
