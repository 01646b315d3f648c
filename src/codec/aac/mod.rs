//! AAC configuration parsing and ADTS framing.
//!
//! Transport streams carry AAC as ADTS, while FLV/MP4 sources carry raw
//! frames plus an `AudioSpecificConfig`. [`AdtsTemplate`] bridges the two.

pub mod parser;
pub mod types;

pub use parser::{parse_adts_header, parse_audio_specific_config};
pub use types::{ADTSHeader, AdtsTemplate, AudioSpecificConfig, ProfileType, ADTS_HEADER_SIZE};
