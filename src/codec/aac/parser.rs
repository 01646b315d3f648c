use super::types::{ADTSHeader, AudioSpecificConfig, ProfileType, SAMPLE_RATES};
use crate::utils::BitReader;
use crate::{MpegError, Result};

/// Parses the leading fields of an MPEG-4 `AudioSpecificConfig`
/// (ISO/IEC 14496-3 1.6.2.1), as found in FLV/MP4 AAC sequence headers.
pub fn parse_audio_specific_config(data: &[u8]) -> Result<AudioSpecificConfig> {
    if data.len() < 2 {
        return Err(MpegError::Parser("AudioSpecificConfig too short".into()));
    }

    let mut reader = BitReader::new(data);

    let mut object_type = reader.read_bits(5)? as u8;
    if object_type == 31 {
        object_type = 32 + reader.read_bits(6)? as u8;
    }

    let mut sample_rate_index = reader.read_bits(4)? as u8;
    let sample_rate = if sample_rate_index == 0x0F {
        let rate = reader.read_bits(24)?;
        sample_rate_index = nearest_sample_rate_index(rate);
        rate
    } else {
        *SAMPLE_RATES
            .get(sample_rate_index as usize)
            .ok_or_else(|| {
                MpegError::Parser(format!(
                    "reserved sampling frequency index {}",
                    sample_rate_index
                ))
            })?
    };

    let channel_configuration = reader.read_bits(4)? as u8;
    if channel_configuration > 7 {
        return Err(MpegError::Parser(format!(
            "channel configuration {} cannot be carried in ADTS",
            channel_configuration
        )));
    }

    Ok(AudioSpecificConfig {
        object_type,
        sample_rate_index,
        sample_rate,
        channel_configuration,
    })
}

fn nearest_sample_rate_index(rate: u32) -> u8 {
    SAMPLE_RATES
        .iter()
        .enumerate()
        .min_by_key(|(_, &r)| r.abs_diff(rate))
        .map(|(i, _)| i as u8)
        .unwrap_or(4)
}

pub fn parse_adts_header(data: &[u8]) -> Result<ADTSHeader> {
    if data.len() < 7 {
        return Err(MpegError::Parser("ADTS header too short".into()));
    }

    let mut reader = BitReader::new(data);

    let sync_word = reader.read_bits(12)? as u16;
    if sync_word != 0xFFF {
        return Err(MpegError::Parser("Invalid ADTS sync word".into()));
    }

    let id = reader.read_bits(1)? as u8;
    let layer = reader.read_bits(2)? as u8;
    let protection_absent = reader.read_bit()?;
    let profile = ProfileType::from(reader.read_bits(2)? as u8);
    let sample_rate_index = reader.read_bits(4)? as u8;
    let private_bit = reader.read_bit()?;
    let channel_configuration = reader.read_bits(3)? as u8;
    let original_copy = reader.read_bit()?;
    let home = reader.read_bit()?;
    let copyright_id_bit = reader.read_bit()?;
    let copyright_id_start = reader.read_bit()?;
    let frame_length = reader.read_bits(13)? as u16;
    let buffer_fullness = reader.read_bits(11)? as u16;
    let number_of_raw_blocks = reader.read_bits(2)? as u8;

    Ok(ADTSHeader {
        sync_word,
        id,
        layer,
        protection_absent,
        profile,
        sample_rate_index,
        private_bit,
        channel_configuration,
        original_copy,
        home,
        copyright_id_bit,
        copyright_id_start,
        frame_length,
        buffer_fullness,
        number_of_raw_blocks,
    })
}
