//! # H.264/AVC helpers
//!
//! Keyframe classification from the leading NAL units of a frame, the access
//! unit delimiter the TS muxer puts in front of every video PES, and the
//! `avcC` decoder configuration record.
//!
//! ```rust
//! use mpegio::codec::h264;
//!
//! let idr = [0x00, 0x00, 0x00, 0x01, 0x09, 0xF0, 0x00, 0x00, 0x00, 0x01, 0x65, 0x88];
//! assert!(h264::is_keyframe(&idr));
//! ```

pub mod types;

pub use types::NALUnitType;

use bytes::Bytes;

use super::{nal_units, ConfigurationRecord, DecoderConfigRecord, ParameterSet, RecordReader};
use crate::error::{MpegError, Result};

/// Access unit delimiter, primary_pic_type = 7 (any slice type).
pub const AUD: [u8; 6] = [0x00, 0x00, 0x00, 0x01, 0x09, 0xF0];

/// Returns true once an IDR slice shows up, false on the first non-IDR slice.
/// Parameter sets, SEI and delimiters ahead of the slice are skipped.
pub fn is_keyframe(data: &[u8]) -> bool {
    nal_units(data)
        .find_map(|nal| classify_nal(nal[0]))
        .unwrap_or(false)
}

/// `Some(true)` for an IDR slice, `Some(false)` for any other slice, `None`
/// for units that say nothing about the picture.
pub fn classify_nal(header: u8) -> Option<bool> {
    match NALUnitType::from_header(header) {
        NALUnitType::CodedSliceIDR => Some(true),
        t if t.is_slice() => Some(false),
        _ => None,
    }
}

/// `AVCDecoderConfigurationRecord` (ISO/IEC 14496-15 5.2.4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcDecoderConfigurationRecord {
    pub base: ConfigurationRecord,
    pub profile_compatibility: u8,
}

impl AvcDecoderConfigurationRecord {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = RecordReader::new(data);

        let configuration_version = reader.read_u8()?;
        if configuration_version != 1 {
            return Err(MpegError::Parser(format!(
                "unsupported avcC version {}",
                configuration_version
            )));
        }
        let profile_indication = reader.read_u8()?;
        let profile_compatibility = reader.read_u8()?;
        let level_indication = reader.read_u8()?;
        let nal_length_size = (reader.read_u8()? & 0x03) + 1;

        let mut parameter_sets = Vec::new();
        let sps_count = reader.read_u8()? & 0x1F;
        for _ in 0..sps_count {
            let len = reader.read_u16()? as usize;
            parameter_sets.push(ParameterSet {
                nal_type: 7,
                data: Bytes::copy_from_slice(reader.read_bytes(len)?),
            });
        }
        let pps_count = reader.read_u8()?;
        for _ in 0..pps_count {
            let len = reader.read_u16()? as usize;
            parameter_sets.push(ParameterSet {
                nal_type: 8,
                data: Bytes::copy_from_slice(reader.read_bytes(len)?),
            });
        }

        Ok(Self {
            base: ConfigurationRecord {
                configuration_version,
                profile_indication,
                level_indication,
                nal_length_size,
                parameter_sets,
            },
            profile_compatibility,
        })
    }
}

impl DecoderConfigRecord for AvcDecoderConfigurationRecord {
    fn base(&self) -> &ConfigurationRecord {
        &self.base
    }

    fn profile_bytes(&self) -> Vec<u8> {
        vec![self.base.profile_indication, self.profile_compatibility]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_keyframe_detection() {
        let idr = [0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x00, 0x00, 0x01, 0x65];
        assert!(is_keyframe(&idr));

        let p_slice = [0x00, 0x00, 0x00, 0x01, 0x09, 0xF0, 0x00, 0x00, 0x00, 0x01, 0x41, 0x9A];
        assert!(!is_keyframe(&p_slice));

        // SEI then IDR, header byte with nal_ref_idc bits set
        let sei_idr = [0x00, 0x00, 0x01, 0x06, 0x05, 0x00, 0x00, 0x01, 0x25, 0xB8];
        assert!(is_keyframe(&sei_idr));

        assert!(!is_keyframe(&[]));
    }

    #[test]
    fn test_parse_avcc() {
        let record = [
            0x01, 0x64, 0x00, 0x1F, 0xFF, // version, profile 100, compat, level 3.1, 4-byte lengths
            0xE1, 0x00, 0x04, 0x67, 0x64, 0x00, 0x1F, // one SPS
            0x01, 0x00, 0x03, 0x68, 0xEE, 0x3C, // one PPS
        ];
        let avcc = AvcDecoderConfigurationRecord::parse(&record).unwrap();

        assert_eq!(avcc.base.nal_length_size, 4);
        assert_eq!(avcc.profile_bytes(), vec![0x64, 0x00]);
        assert_eq!(avcc.level_bytes(), vec![0x1F]);
        assert_eq!(avcc.parameter_sets().len(), 2);
        assert_eq!(
            avcc.annexb(),
            vec![
                0x00, 0x00, 0x00, 0x01, 0x67, 0x64, 0x00, 0x1F, 0x00, 0x00, 0x00, 0x01, 0x68, 0xEE,
                0x3C
            ]
        );
    }

    #[test]
    fn test_parse_truncated_avcc() {
        let record = [0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x10, 0x67];
        assert!(AvcDecoderConfigurationRecord::parse(&record).is_err());
    }
}
