//! Container formats: the MPEG program stream demuxer and the transport
//! stream codec and muxer. Both share the PES header in [`pes`].

/// PES header shared by PS and TS
pub mod pes;

/// Program stream demuxing and frame reassembly
pub mod ps;

/// Transport stream sections and muxing
pub mod ts;

pub use self::pes::PESHeader;
pub use self::ps::{PsDemuxer, PsDemuxerContext};
pub use self::ts::TsMuxer;
