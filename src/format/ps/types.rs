use bytes::{BufMut, BytesMut};

use crate::error::{MpegError, Result};
use crate::format::ts::types::{Descriptor, StreamType};
use crate::format::ts::TSPacketParser;
use crate::utils::{BitReader, BitWriter, Crc32Mpeg2};

// Start codes (the byte after 00 00 01)
pub const START_CODE_PACK: u8 = 0xba;
pub const START_CODE_SYSTEM_HEADER: u8 = 0xbb;
pub const START_CODE_PSM: u8 = 0xbc;
pub const STREAM_ID_PRIVATE_1: u8 = 0xbd;
pub const STREAM_ID_PADDING: u8 = 0xbe;
pub const STREAM_ID_PRIVATE_2: u8 = 0xbf;
/// Lowest code that ends a PES packet of unknown length.
pub const START_CODE_SYSTEM_MIN: u8 = 0xb9;

pub fn is_audio_stream_id(id: u8) -> bool {
    (0xc0..=0xdf).contains(&id)
}

pub fn is_video_stream_id(id: u8) -> bool {
    (0xe0..=0xef).contains(&id)
}

/// Pack header (ISO/IEC 13818-1 2.5.3.3, ISO/IEC 11172-1 2.4.3.2).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackHeader {
    pub mpeg1: bool,
    /// System clock reference, 90 kHz part
    pub scr_base: u64,
    /// 27 MHz remainder, always 0 for MPEG-1
    pub scr_extension: u16,
    /// In units of 50 bytes/s
    pub program_mux_rate: u32,
    pub stuffing_length: u8,
}

impl PackHeader {
    /// Parses a pack header starting at its start code.
    /// Returns the header and its size, or `None` if `data` is too short.
    pub fn parse(data: &[u8]) -> Result<Option<(Self, usize)>> {
        if data.len() < 5 {
            return Ok(None);
        }

        if data[4] & 0xc0 == 0x40 {
            if data.len() < 14 {
                return Ok(None);
            }
            let mut reader = BitReader::new(&data[4..14]);
            reader.skip_bits(2)?;
            let scr_base = read_marked_timestamp(&mut reader)?;
            let scr_extension = reader.read_bits(9)? as u16;
            reader.skip_bits(1)?;
            let program_mux_rate = reader.read_bits(22)?;
            reader.skip_bits(2 + 5)?;
            let stuffing_length = reader.read_bits(3)? as u8;

            let size = 14 + stuffing_length as usize;
            if data.len() < size {
                return Ok(None);
            }
            Ok(Some((
                Self {
                    mpeg1: false,
                    scr_base,
                    scr_extension,
                    program_mux_rate,
                    stuffing_length,
                },
                size,
            )))
        } else if data[4] & 0xf0 == 0x20 {
            if data.len() < 12 {
                return Ok(None);
            }
            let mut reader = BitReader::new(&data[4..12]);
            reader.skip_bits(4)?;
            let scr_base = read_marked_timestamp(&mut reader)?;
            reader.skip_bits(1)?;
            let program_mux_rate = reader.read_bits(22)?;
            Ok(Some((
                Self {
                    mpeg1: true,
                    scr_base,
                    scr_extension: 0,
                    program_mux_rate,
                    stuffing_length: 0,
                },
                12,
            )))
        } else {
            Err(MpegError::InvalidData(format!(
                "unknown pack header layout 0x{:02x}",
                data[4]
            )))
        }
    }

    /// Writes the MPEG-2 layout.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&[0x00, 0x00, 0x01, START_CODE_PACK]);

        let mut writer = BitWriter::new();
        writer.write_bits(0b01, 2);
        write_marked_timestamp(&mut writer, self.scr_base);
        writer.write_bits(self.scr_extension as u32, 9);
        writer.write_bit(true);
        writer.write_bits(self.program_mux_rate, 22);
        writer.write_bits(0b11, 2);
        writer.write_bits(0x1f, 5);
        writer.write_bits((self.stuffing_length & 0x07) as u32, 3);
        buf.put_slice(&writer.into_bytes());
        buf.put_bytes(0xff, (self.stuffing_length & 0x07) as usize);
    }
}

// 3 + 15 + 15 bits of a 33-bit clock, each group followed by a marker bit.
fn read_marked_timestamp(reader: &mut BitReader) -> Result<u64> {
    let high = reader.read_bits(3)? as u64;
    reader.skip_bits(1)?;
    let mid = reader.read_bits(15)? as u64;
    reader.skip_bits(1)?;
    let low = reader.read_bits(15)? as u64;
    reader.skip_bits(1)?;
    Ok(high << 30 | mid << 15 | low)
}

fn write_marked_timestamp(writer: &mut BitWriter, ts: u64) {
    writer.write_bits(((ts >> 30) & 0x07) as u32, 3);
    writer.write_bit(true);
    writer.write_bits(((ts >> 15) & 0x7fff) as u32, 15);
    writer.write_bit(true);
    writer.write_bits((ts & 0x7fff) as u32, 15);
    writer.write_bit(true);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamBound {
    pub stream_id: u8,
    pub buffer_bound_scale: bool,
    pub buffer_size_bound: u16,
}

/// System header (ISO/IEC 13818-1 2.5.3.5).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemHeader {
    pub rate_bound: u32,
    pub audio_bound: u8,
    pub fixed: bool,
    pub csps: bool,
    pub system_audio_lock: bool,
    pub system_video_lock: bool,
    pub video_bound: u8,
    pub packet_rate_restriction: bool,
    pub streams: Vec<StreamBound>,
}

impl SystemHeader {
    pub fn parse(data: &[u8]) -> Result<Option<(Self, usize)>> {
        let Some(size) = length_prefixed_size(data) else {
            return Ok(None);
        };
        if size < 12 {
            return Err(MpegError::InvalidData(format!(
                "system header of {} bytes",
                size
            )));
        }

        let mut reader = BitReader::new(&data[6..12]);
        reader.skip_bits(1)?;
        let rate_bound = reader.read_bits(22)?;
        reader.skip_bits(1)?;
        let audio_bound = reader.read_bits(6)? as u8;
        let fixed = reader.read_bit()?;
        let csps = reader.read_bit()?;
        let system_audio_lock = reader.read_bit()?;
        let system_video_lock = reader.read_bit()?;
        reader.skip_bits(1)?;
        let video_bound = reader.read_bits(5)? as u8;
        let packet_rate_restriction = reader.read_bit()?;

        let mut streams = Vec::new();
        let mut pos = 12;
        while pos + 3 <= size && data[pos] & 0x80 != 0 {
            streams.push(StreamBound {
                stream_id: data[pos],
                buffer_bound_scale: data[pos + 1] & 0x20 != 0,
                buffer_size_bound: u16::from_be_bytes([data[pos + 1] & 0x1f, data[pos + 2]]),
            });
            pos += 3;
        }

        Ok(Some((
            Self {
                rate_bound,
                audio_bound,
                fixed,
                csps,
                system_audio_lock,
                system_video_lock,
                video_bound,
                packet_rate_restriction,
                streams,
            },
            size,
        )))
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        let mut writer = BitWriter::new();
        writer.write_bit(true);
        writer.write_bits(self.rate_bound, 22);
        writer.write_bit(true);
        writer.write_bits(self.audio_bound as u32, 6);
        writer.write_bit(self.fixed);
        writer.write_bit(self.csps);
        writer.write_bit(self.system_audio_lock);
        writer.write_bit(self.system_video_lock);
        writer.write_bit(true);
        writer.write_bits(self.video_bound as u32, 5);
        writer.write_bit(self.packet_rate_restriction);
        writer.write_bits(0x7f, 7);
        for stream in &self.streams {
            writer.write_bits(stream.stream_id as u32, 8);
            writer.write_bits(0b11, 2);
            writer.write_bit(stream.buffer_bound_scale);
            writer.write_bits(stream.buffer_size_bound as u32, 13);
        }
        let body = writer.into_bytes();

        buf.put_slice(&[0x00, 0x00, 0x01, START_CODE_SYSTEM_HEADER]);
        buf.put_u16(body.len() as u16);
        buf.put_slice(&body);
    }
}

/// One entry of the elementary stream map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryStream {
    pub stream_type: u8,
    pub stream_id: u8,
    pub descriptors: Vec<Descriptor>,
}

impl ElementaryStream {
    pub fn new(stream_type: StreamType, stream_id: u8) -> Self {
        Self {
            stream_type: stream_type.into(),
            stream_id,
            descriptors: Vec::new(),
        }
    }
}

/// Program stream map (ISO/IEC 13818-1 2.5.4).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramStreamMap {
    pub current_next: bool,
    pub version: u8,
    pub descriptors: Vec<Descriptor>,
    pub streams: Vec<ElementaryStream>,
    /// False when the trailing CRC_32 did not match
    pub crc_valid: bool,
}

impl ProgramStreamMap {
    pub fn parse(data: &[u8]) -> Result<Option<(Self, usize)>> {
        let Some(size) = length_prefixed_size(data) else {
            return Ok(None);
        };
        if size < 16 {
            return Err(MpegError::InvalidData(format!(
                "program stream map of {} bytes",
                size
            )));
        }

        let parser = TSPacketParser::new();
        let map = &data[..size];
        let current_next = map[6] & 0x80 != 0;
        let version = map[6] & 0x1f;

        let info_length = u16::from_be_bytes([map[8], map[9]]) as usize;
        let mut pos = 10;
        if pos + info_length + 2 > size - 4 {
            return Err(MpegError::InvalidData(
                "program_stream_info_length past end of map".into(),
            ));
        }
        let descriptors = parser.parse_descriptors(&map[pos..pos + info_length])?;
        pos += info_length;

        let es_map_length = u16::from_be_bytes([map[pos], map[pos + 1]]) as usize;
        pos += 2;
        let es_map_end = pos + es_map_length;
        if es_map_end > size - 4 {
            return Err(MpegError::InvalidData(
                "elementary_stream_map_length past end of map".into(),
            ));
        }

        let mut streams = Vec::new();
        while pos + 4 <= es_map_end {
            let stream_type = map[pos];
            let stream_id = map[pos + 1];
            let es_info_length = u16::from_be_bytes([map[pos + 2], map[pos + 3]]) as usize;
            pos += 4;
            if pos + es_info_length > es_map_end {
                return Err(MpegError::InvalidData(
                    "elementary_stream_info_length past end of map".into(),
                ));
            }
            streams.push(ElementaryStream {
                stream_type,
                stream_id,
                descriptors: parser.parse_descriptors(&map[pos..pos + es_info_length])?,
            });
            pos += es_info_length;
        }

        Ok(Some((
            Self {
                current_next,
                version,
                descriptors,
                streams,
                crc_valid: Crc32Mpeg2::verify(map),
            },
            size,
        )))
    }

    pub fn find(&self, stream_id: u8) -> Option<&ElementaryStream> {
        self.streams.iter().find(|s| s.stream_id == stream_id)
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        let start = buf.len();
        let info_length: usize = self.descriptors.iter().map(Descriptor::encoded_len).sum();
        let es_map_length: usize = self
            .streams
            .iter()
            .map(|s| 4 + s.descriptors.iter().map(Descriptor::encoded_len).sum::<usize>())
            .sum();
        let map_length = 6 + info_length + es_map_length + 4;

        buf.put_slice(&[0x00, 0x00, 0x01, START_CODE_PSM]);
        buf.put_u16(map_length as u16);
        buf.put_u8((self.current_next as u8) << 7 | 0x60 | (self.version & 0x1f));
        buf.put_u8(0xff);
        buf.put_u16(info_length as u16);
        put_descriptors(buf, &self.descriptors);
        buf.put_u16(es_map_length as u16);
        for stream in &self.streams {
            buf.put_u8(stream.stream_type);
            buf.put_u8(stream.stream_id);
            let len: usize = stream.descriptors.iter().map(Descriptor::encoded_len).sum();
            buf.put_u16(len as u16);
            put_descriptors(buf, &stream.descriptors);
        }
        let crc = Crc32Mpeg2::checksum(&buf[start..]);
        buf.put_u32(crc);
    }
}

fn put_descriptors(buf: &mut BytesMut, descriptors: &[Descriptor]) {
    for desc in descriptors {
        desc.write_to(buf);
    }
}

/// Size of a `00 00 01 xx` structure followed by a 16-bit length, once all
/// of it is in `data`.
pub fn length_prefixed_size(data: &[u8]) -> Option<usize> {
    if data.len() < 6 {
        return None;
    }
    let size = 6 + u16::from_be_bytes([data[4], data[5]]) as usize;
    (data.len() >= size).then_some(size)
}
