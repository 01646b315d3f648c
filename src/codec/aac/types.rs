use crate::error::{MpegError, Result};
use crate::utils::BitWriter;

pub const ADTS_HEADER_SIZE: usize = 7;
/// Largest value the 13-bit ADTS frame_length can hold.
pub const ADTS_MAX_FRAME_LENGTH: usize = 0x1FFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileType {
    Main = 0,
    LC = 1,
    SSR = 2,
    LTP = 3,
}

impl From<u8> for ProfileType {
    fn from(value: u8) -> Self {
        match value & 0x03 {
            0 => ProfileType::Main,
            1 => ProfileType::LC,
            2 => ProfileType::SSR,
            _ => ProfileType::LTP,
        }
    }
}

pub const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// The fields of an MPEG-4 `AudioSpecificConfig` that ADTS can express.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub object_type: u8,
    pub sample_rate_index: u8,
    pub sample_rate: u32,
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    /// ADTS profile for this object type. Object types ADTS cannot signal
    /// (SBR, PS, ...) are carried as LC, which decoders upsample implicitly.
    pub fn adts_profile(&self) -> ProfileType {
        match self.object_type {
            1..=4 => ProfileType::from(self.object_type - 1),
            _ => ProfileType::LC,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ADTSHeader {
    pub sync_word: u16,           // 12 bits
    pub id: u8,                   // 1 bit, 0=MPEG-4, 1=MPEG-2
    pub layer: u8,                // 2 bits
    pub protection_absent: bool,  // 1 bit
    pub profile: ProfileType,     // 2 bits
    pub sample_rate_index: u8,    // 4 bits
    pub private_bit: bool,        // 1 bit
    pub channel_configuration: u8, // 3 bits
    pub original_copy: bool,      // 1 bit
    pub home: bool,               // 1 bit
    pub copyright_id_bit: bool,   // 1 bit
    pub copyright_id_start: bool, // 1 bit
    pub frame_length: u16,        // 13 bits, header included
    pub buffer_fullness: u16,     // 11 bits
    pub number_of_raw_blocks: u8, // 2 bits
}

impl ADTSHeader {
    /// Header for one raw AAC frame of `payload_len` bytes.
    pub fn new(config: &AudioSpecificConfig, payload_len: usize) -> Result<Self> {
        let frame_length = ADTS_HEADER_SIZE + payload_len;
        if frame_length > ADTS_MAX_FRAME_LENGTH {
            return Err(MpegError::InvalidData(format!(
                "AAC frame of {} bytes does not fit an ADTS header",
                payload_len
            )));
        }
        Ok(Self {
            sync_word: 0xFFF,
            id: 0,
            layer: 0,
            protection_absent: true,
            profile: config.adts_profile(),
            sample_rate_index: config.sample_rate_index,
            private_bit: false,
            channel_configuration: config.channel_configuration,
            original_copy: false,
            home: false,
            copyright_id_bit: false,
            copyright_id_start: false,
            frame_length: frame_length as u16,
            buffer_fullness: 0x7FF,
            number_of_raw_blocks: 0,
        })
    }

    pub fn sync_word_valid(&self) -> bool {
        self.sync_word == 0xFFF
    }

    pub fn sample_rate(&self) -> Option<u32> {
        SAMPLE_RATES.get(self.sample_rate_index as usize).copied()
    }

    pub fn to_bytes(&self) -> [u8; ADTS_HEADER_SIZE] {
        let mut writer = BitWriter::new();
        writer.write_bits(self.sync_word as u32, 12);
        writer.write_bits(self.id as u32, 1);
        writer.write_bits(self.layer as u32, 2);
        writer.write_bit(self.protection_absent);
        writer.write_bits(self.profile as u32, 2);
        writer.write_bits(self.sample_rate_index as u32, 4);
        writer.write_bit(self.private_bit);
        writer.write_bits(self.channel_configuration as u32, 3);
        writer.write_bit(self.original_copy);
        writer.write_bit(self.home);
        writer.write_bit(self.copyright_id_bit);
        writer.write_bit(self.copyright_id_start);
        writer.write_bits(self.frame_length as u32, 13);
        writer.write_bits(self.buffer_fullness as u32, 11);
        writer.write_bits(self.number_of_raw_blocks as u32, 2);

        let bytes = writer.into_bytes();
        let mut out = [0u8; ADTS_HEADER_SIZE];
        out.copy_from_slice(&bytes);
        out
    }
}

/// A pre-encoded ADTS header whose frame_length is patched per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdtsTemplate {
    bytes: [u8; ADTS_HEADER_SIZE],
}

impl AdtsTemplate {
    pub fn new(config: &AudioSpecificConfig) -> Result<Self> {
        Ok(Self {
            bytes: ADTSHeader::new(config, 0)?.to_bytes(),
        })
    }

    /// The 7 header bytes for a raw frame of `payload_len` bytes.
    pub fn header(&self, payload_len: usize) -> Result<[u8; ADTS_HEADER_SIZE]> {
        let frame_length = ADTS_HEADER_SIZE + payload_len;
        if frame_length > ADTS_MAX_FRAME_LENGTH {
            return Err(MpegError::InvalidData(format!(
                "AAC frame of {} bytes does not fit an ADTS header",
                payload_len
            )));
        }

        // frame_length occupies the low 2 bits of byte 3, byte 4 and the
        // high 3 bits of byte 5.
        let mut out = self.bytes;
        out[3] = (out[3] & 0xFC) | ((frame_length >> 11) & 0x03) as u8;
        out[4] = ((frame_length >> 3) & 0xFF) as u8;
        out[5] = (out[5] & 0x1F) | (((frame_length & 0x07) as u8) << 5);
        Ok(out)
    }
}
