use std::fmt;

/// Whether an elementary stream carries audio or video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// Codecs that can travel through the PS demuxer and TS muxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    H264,
    H265,
    Aac,
    /// G.711 A-law
    G711A,
    /// G.711 µ-law
    G711U,
}

impl CodecId {
    pub fn media_kind(&self) -> MediaKind {
        match self {
            CodecId::H264 | CodecId::H265 => MediaKind::Video,
            CodecId::Aac | CodecId::G711A | CodecId::G711U => MediaKind::Audio,
        }
    }
}

mod packet;
pub use packet::*;
