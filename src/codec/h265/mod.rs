//! # H.265/HEVC helpers
//!
//! Same surface as the H.264 module: IRAP detection from a frame's first NAL
//! units, the access unit delimiter and the `hvcC` decoder configuration record.
//!
//! The HEVC record is modelled as the shared [`ConfigurationRecord`] plus the
//! HEVC-only fields, exposed through [`DecoderConfigRecord`].

pub mod types;

pub use types::NALUnitType;

use bytes::Bytes;

use super::{nal_units, ConfigurationRecord, DecoderConfigRecord, ParameterSet, RecordReader};
use crate::error::{MpegError, Result};

/// Access unit delimiter, pic_type = 2 (I, P and B slices).
pub const AUD: [u8; 7] = [0x00, 0x00, 0x00, 0x01, 0x46, 0x01, 0x50];

pub fn is_keyframe(data: &[u8]) -> bool {
    nal_units(data)
        .find_map(|nal| classify_nal(nal[0]))
        .unwrap_or(false)
}

/// IRAP units are keyframes, other VCL units are not.
pub fn classify_nal(header: u8) -> Option<bool> {
    let nal_type = NALUnitType::from_header(header);
    if nal_type.is_irap() {
        Some(true)
    } else if nal_type.is_vcl() {
        Some(false)
    } else {
        None
    }
}

/// `HEVCDecoderConfigurationRecord` (ISO/IEC 14496-15 8.3.3.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcDecoderConfigurationRecord {
    pub base: ConfigurationRecord,
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_compatibility_flags: u32,
    /// 48 bits
    pub general_constraint_indicator_flags: u64,
    pub min_spatial_segmentation_idc: u16,
    pub parallelism_type: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub avg_frame_rate: u16,
    pub constant_frame_rate: u8,
    pub num_temporal_layers: u8,
    pub temporal_id_nested: bool,
}

impl HevcDecoderConfigurationRecord {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = RecordReader::new(data);

        let configuration_version = reader.read_u8()?;
        if configuration_version != 1 {
            return Err(MpegError::Parser(format!(
                "unsupported hvcC version {}",
                configuration_version
            )));
        }

        let profile = reader.read_u8()?;
        let compat = reader.read_bytes(4)?;
        let general_profile_compatibility_flags =
            u32::from_be_bytes([compat[0], compat[1], compat[2], compat[3]]);
        let general_constraint_indicator_flags = reader
            .read_bytes(6)?
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64);
        let level_indication = reader.read_u8()?;
        let min_spatial_segmentation_idc = reader.read_u16()? & 0x0FFF;
        let parallelism_type = reader.read_u8()? & 0x03;
        let chroma_format_idc = reader.read_u8()? & 0x03;
        let bit_depth_luma_minus8 = reader.read_u8()? & 0x07;
        let bit_depth_chroma_minus8 = reader.read_u8()? & 0x07;
        let avg_frame_rate = reader.read_u16()?;
        let flags = reader.read_u8()?;
        let num_arrays = reader.read_u8()?;

        let mut parameter_sets = Vec::new();
        for _ in 0..num_arrays {
            let nal_type = reader.read_u8()? & 0x3F;
            let count = reader.read_u16()?;
            for _ in 0..count {
                let len = reader.read_u16()? as usize;
                parameter_sets.push(ParameterSet {
                    nal_type,
                    data: Bytes::copy_from_slice(reader.read_bytes(len)?),
                });
            }
        }

        Ok(Self {
            base: ConfigurationRecord {
                configuration_version,
                profile_indication: profile & 0x1F,
                level_indication,
                nal_length_size: (flags & 0x03) + 1,
                parameter_sets,
            },
            general_profile_space: profile >> 6,
            general_tier_flag: profile & 0x20 != 0,
            general_profile_compatibility_flags,
            general_constraint_indicator_flags,
            min_spatial_segmentation_idc,
            parallelism_type,
            chroma_format_idc,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            avg_frame_rate,
            constant_frame_rate: flags >> 6,
            num_temporal_layers: (flags >> 3) & 0x07,
            temporal_id_nested: flags & 0x04 != 0,
        })
    }
}

impl DecoderConfigRecord for HevcDecoderConfigurationRecord {
    fn base(&self) -> &ConfigurationRecord {
        &self.base
    }

    /// profile_space/tier/profile_idc, compatibility flags, constraint flags.
    fn profile_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(11);
        out.push(
            (self.general_profile_space << 6)
                | ((self.general_tier_flag as u8) << 5)
                | self.base.profile_indication,
        );
        out.extend_from_slice(&self.general_profile_compatibility_flags.to_be_bytes());
        out.extend_from_slice(&self.general_constraint_indicator_flags.to_be_bytes()[2..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_keyframe_detection() {
        // VPS, SPS, PPS, IDR_W_RADL
        let idr = [
            0x00, 0x00, 0x00, 0x01, 0x40, 0x01, 0x00, 0x00, 0x00, 0x01, 0x42, 0x01, 0x00, 0x00,
            0x00, 0x01, 0x44, 0x01, 0x00, 0x00, 0x00, 0x01, 0x26, 0x01,
        ];
        assert!(is_keyframe(&idr));

        // AUD then TRAIL_R
        let trail = [0x00, 0x00, 0x00, 0x01, 0x46, 0x01, 0x50, 0x00, 0x00, 0x01, 0x02, 0x01];
        assert!(!is_keyframe(&trail));

        // CRA
        assert!(is_keyframe(&[0x00, 0x00, 0x01, 0x2A, 0x01]));
    }

    #[test]
    fn test_nal_type_ranges() {
        assert!(NALUnitType::from_u8(19).is_irap());
        assert!(NALUnitType::from_u8(23).is_irap());
        assert!(!NALUnitType::from_u8(24).is_irap());
        assert!(NALUnitType::from_u8(24).is_vcl());
        assert_eq!(NALUnitType::from_header(0x40), NALUnitType::Vps);
        assert!(!NALUnitType::Vps.is_vcl());
    }

    #[test]
    fn test_parse_hvcc() {
        let mut record = vec![
            0x01, // version
            0x01, // profile_space 0, tier 0, profile_idc 1 (Main)
            0x60, 0x00, 0x00, 0x00, // compatibility flags
            0x90, 0x00, 0x00, 0x00, 0x00, 0x00, // constraint flags
            0x5D, // level 3.1
            0xF0, 0x00, // min_spatial_segmentation_idc
            0xFC, // parallelism
            0xFD, // chroma 4:2:0
            0xF8, 0xF8, // bit depths
            0x00, 0x00, // avg frame rate
            0x0F, // 1 temporal layer, nested, 4-byte lengths
            0x02, // two arrays
        ];
        record.extend_from_slice(&[0xA0, 0x00, 0x01, 0x00, 0x02, 0x40, 0x01]); // VPS
        record.extend_from_slice(&[0xA1, 0x00, 0x01, 0x00, 0x03, 0x42, 0x01, 0x01]); // SPS

        let hvcc = HevcDecoderConfigurationRecord::parse(&record).unwrap();
        assert_eq!(hvcc.base.profile_indication, 1);
        assert_eq!(hvcc.base.level_indication, 0x5D);
        assert_eq!(hvcc.base.nal_length_size, 4);
        assert_eq!(hvcc.chroma_format_idc, 1);
        assert_eq!(hvcc.num_temporal_layers, 1);
        assert!(hvcc.temporal_id_nested);
        assert_eq!(
            hvcc.profile_bytes(),
            vec![0x01, 0x60, 0x00, 0x00, 0x00, 0x90, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(hvcc.parameter_sets()[0].nal_type, 32);
        assert_eq!(
            hvcc.annexb(),
            vec![0x00, 0x00, 0x00, 0x01, 0x40, 0x01, 0x00, 0x00, 0x00, 0x01, 0x42, 0x01, 0x01]
        );
    }
}
