use std::convert::TryFrom;
use std::time::Duration;

use bytes::{BufMut, BytesMut};

use crate::av::CodecId;
use crate::error::{MpegError, Result};
use crate::utils::Crc32Mpeg2;

pub const SYNC_BYTE: u8 = 0x47;

// PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_PMT: u16 = 0x1000;
pub const PID_NULL: u16 = 0x1fff;
/// PID of the first elementary track.
pub const TS_PACKET_START_PID: u16 = 0x100;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;

// PES stream IDs used on output
pub const STREAM_ID_VIDEO: u8 = 0xe0;
pub const STREAM_ID_AUDIO: u8 = 0xc0;

// Constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
pub const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;
pub const PCR_SIZE: usize = 6;
pub const PCR_HZ: u64 = 27_000_000;
/// PTS/DTS and the PCR base are 33-bit counters.
pub const TIMESTAMP_MASK: u64 = 0x1_ffff_ffff;

/// Elementary stream types this crate can demux from PS and mux into TS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StreamType {
    H264 = 0x1b,
    H265 = 0x24,
    Aac = 0x0f,
    G711A = 0x90,
    G711U = 0x91,
}

impl StreamType {
    pub fn codec(self) -> CodecId {
        match self {
            StreamType::H264 => CodecId::H264,
            StreamType::H265 => CodecId::H265,
            StreamType::Aac => CodecId::Aac,
            StreamType::G711A => CodecId::G711A,
            StreamType::G711U => CodecId::G711U,
        }
    }
}

impl From<CodecId> for StreamType {
    fn from(codec: CodecId) -> Self {
        match codec {
            CodecId::H264 => StreamType::H264,
            CodecId::H265 => StreamType::H265,
            CodecId::Aac => StreamType::Aac,
            CodecId::G711A => StreamType::G711A,
            CodecId::G711U => StreamType::G711U,
        }
    }
}

impl From<StreamType> for u8 {
    fn from(stream_type: StreamType) -> Self {
        stream_type as u8
    }
}

impl TryFrom<u8> for StreamType {
    type Error = MpegError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x1b => Ok(StreamType::H264),
            0x24 => Ok(StreamType::H265),
            0x0f => Ok(StreamType::Aac),
            0x90 => Ok(StreamType::G711A),
            0x91 => Ok(StreamType::G711U),
            other => Err(MpegError::UnsupportedStreamType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PATEntry {
    pub program_number: u16,
    pub network_pid: u16,
    pub program_map_pid: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PAT {
    pub transport_stream_id: u16,
    pub entries: Vec<PATEntry>,
}

impl PAT {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-program table mapping `program_number` to `pmt_pid`.
    pub fn single_program(transport_stream_id: u16, program_number: u16, pmt_pid: u16) -> Self {
        Self {
            transport_stream_id,
            entries: vec![PATEntry {
                program_number,
                network_pid: 0,
                program_map_pid: pmt_pid,
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len() * 4
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        for entry in &self.entries {
            buf.put_u16(entry.program_number);
            if entry.program_number == 0 {
                buf.put_u16(entry.network_pid & 0x1fff | 7 << 13);
            } else {
                buf.put_u16(entry.program_map_pid & 0x1fff | 7 << 13);
            }
        }
    }

    /// Writes the whole `program_association_section`, starting at table_id.
    pub fn write_section(&self, with_crc: bool, buf: &mut BytesMut) {
        let mut body = BytesMut::with_capacity(self.len());
        self.write_to(&mut body);
        write_psi_section(buf, TABLE_ID_PAT, self.transport_stream_id, &body, with_crc);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub tag: u8,
    /// At most [`Descriptor::MAX_LEN`] bytes, the limit of descriptor_length.
    pub data: Vec<u8>,
}

impl Descriptor {
    pub const MAX_LEN: usize = 0xff;

    pub fn new(tag: u8, data: Vec<u8>) -> Result<Self> {
        if data.len() > Self::MAX_LEN {
            return Err(MpegError::InvalidData(format!(
                "descriptor 0x{:02x} has {} bytes, at most {} fit",
                tag,
                data.len(),
                Self::MAX_LEN
            )));
        }
        Ok(Self { tag, data })
    }

    pub fn encoded_len(&self) -> usize {
        2 + self.data.len()
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        debug_assert!(
            self.data.len() <= Self::MAX_LEN,
            "descriptor 0x{:02x} longer than {} bytes",
            self.tag,
            Self::MAX_LEN
        );
        buf.put_u8(self.tag);
        buf.put_u8(self.data.len() as u8);
        buf.put_slice(&self.data);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryStreamInfo {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub descriptors: Vec<Descriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PMT {
    pub program_number: u16,
    pub pcr_pid: u16,
    pub program_descriptors: Vec<Descriptor>,
    pub elementary_stream_infos: Vec<ElementaryStreamInfo>,
}

impl PMT {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let mut n = 4; // PCR PID + program info length

        for desc in &self.program_descriptors {
            n += desc.encoded_len();
        }

        for info in &self.elementary_stream_infos {
            n += 5; // stream_type + elementary_pid + ES info length
            for desc in &info.descriptors {
                n += desc.encoded_len();
            }
        }

        n
    }

    pub fn is_empty(&self) -> bool {
        self.elementary_stream_infos.is_empty()
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u16(self.pcr_pid & 0x1fff | 7 << 13);

        write_descriptors(buf, &self.program_descriptors);

        for info in &self.elementary_stream_infos {
            buf.put_u8(info.stream_type);
            buf.put_u16(info.elementary_pid & 0x1fff | 7 << 13);
            write_descriptors(buf, &info.descriptors);
        }
    }

    /// Writes the whole `TS_program_map_section`, starting at table_id.
    pub fn write_section(&self, with_crc: bool, buf: &mut BytesMut) {
        let mut body = BytesMut::with_capacity(self.len());
        self.write_to(&mut body);
        write_psi_section(buf, TABLE_ID_PMT, self.program_number, &body, with_crc);
    }
}

fn write_descriptors(buf: &mut BytesMut, descriptors: &[Descriptor]) {
    let len = descriptors.iter().map(Descriptor::encoded_len).sum::<usize>();
    buf.put_u16((len as u16) & 0x3ff | 0xf << 12);

    for desc in descriptors {
        desc.write_to(buf);
    }
}

/// Long-form PSI section: version 0, current, section 0 of 0.
///
/// Without `with_crc` the trailing CRC_32 is left out and section_length
/// shrinks accordingly.
pub fn write_psi_section(
    buf: &mut BytesMut,
    table_id: u8,
    table_id_extension: u16,
    body: &[u8],
    with_crc: bool,
) {
    let start = buf.len();
    let section_length = 5 + body.len() + if with_crc { 4 } else { 0 };

    buf.put_u8(table_id);
    // section_syntax_indicator, '0', reserved
    buf.put_u16(0xb000 | (section_length as u16 & 0x3ff));
    buf.put_u16(table_id_extension);
    buf.put_u8(0xc1);
    buf.put_u8(0);
    buf.put_u8(0);
    buf.put_slice(body);

    if with_crc {
        let crc = Crc32Mpeg2::checksum(&buf[start..]);
        buf.put_u32(crc);
    }
}

/// Program clock reference: 33-bit base at 90 kHz plus a 9-bit extension
/// counting the remaining 27 MHz ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pcr {
    pub base: u64,
    pub extension: u16,
}

impl Pcr {
    /// Splits a 27 MHz clock value.
    pub fn from_clock(clock: u64) -> Self {
        Self {
            base: (clock / 300) & TIMESTAMP_MASK,
            extension: (clock % 300) as u16,
        }
    }

    pub fn clock(&self) -> u64 {
        self.base * 300 + self.extension as u64
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        let base = self.base & TIMESTAMP_MASK;
        let ext = self.extension & 0x1ff;
        buf.put_u8((base >> 25) as u8);
        buf.put_u8((base >> 17) as u8);
        buf.put_u8((base >> 9) as u8);
        buf.put_u8((base >> 1) as u8);
        buf.put_u8(((base & 1) << 7) as u8 | 0x7e | (ext >> 8) as u8);
        buf.put_u8(ext as u8);
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < PCR_SIZE {
            return Err(MpegError::InvalidData("PCR data too short".into()));
        }
        let base = ((data[0] as u64) << 25)
            | ((data[1] as u64) << 17)
            | ((data[2] as u64) << 9)
            | ((data[3] as u64) << 1)
            | ((data[4] & 0x80) as u64 >> 7);
        let extension = (((data[4] & 0x01) as u16) << 8) | data[5] as u16;
        Ok(Self { base, extension })
    }

    pub fn to_duration(&self) -> Duration {
        Duration::from_nanos(((self.clock() as u128 * 1_000_000_000) / PCR_HZ as u128) as u64)
    }
}

/// Adaptation field contents. The encoded length is derived from the fields,
/// `stuffing` counts trailing 0xFF bytes.
///
/// The one-byte form (`adaptation_field_length = 0`, no flags byte) is not
/// modelled here, see [`write_empty_adaptation_field`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdaptationField {
    pub discontinuity: bool,
    pub random_access: bool,
    pub es_priority: bool,
    pub pcr: Option<Pcr>,
    pub opcr: Option<Pcr>,
    pub splice_countdown: Option<i8>,
    pub private_data: Option<Vec<u8>>,
    pub stuffing: usize,
}

impl AdaptationField {
    pub fn with_pcr(pcr: Pcr) -> Self {
        Self {
            pcr: Some(pcr),
            ..Default::default()
        }
    }

    /// Flags byte plus stuffing, occupying exactly `size` (at least 2) bytes.
    pub fn stuffing(size: usize) -> Self {
        debug_assert!(size >= 2);
        Self {
            stuffing: size.saturating_sub(2),
            ..Default::default()
        }
    }

    pub fn flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.discontinuity {
            flags |= 0x80;
        }
        if self.random_access {
            flags |= 0x40;
        }
        if self.es_priority {
            flags |= 0x20;
        }
        if self.pcr.is_some() {
            flags |= 0x10;
        }
        if self.opcr.is_some() {
            flags |= 0x08;
        }
        if self.splice_countdown.is_some() {
            flags |= 0x04;
        }
        if self.private_data.is_some() {
            flags |= 0x02;
        }
        flags
    }

    /// Bytes the field occupies in the packet, length byte included.
    pub fn encoded_len(&self) -> usize {
        let mut n = 2;
        if self.pcr.is_some() {
            n += PCR_SIZE;
        }
        if self.opcr.is_some() {
            n += PCR_SIZE;
        }
        if self.splice_countdown.is_some() {
            n += 1;
        }
        if let Some(data) = &self.private_data {
            n += 1 + data.len();
        }
        n + self.stuffing
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8((self.encoded_len() - 1) as u8);
        buf.put_u8(self.flags());
        if let Some(pcr) = &self.pcr {
            pcr.write_to(buf);
        }
        if let Some(opcr) = &self.opcr {
            opcr.write_to(buf);
        }
        if let Some(countdown) = self.splice_countdown {
            buf.put_i8(countdown);
        }
        if let Some(data) = &self.private_data {
            buf.put_u8(data.len() as u8);
            buf.put_slice(data);
        }
        buf.put_bytes(0xff, self.stuffing);
    }
}

/// A single `adaptation_field_length = 0` byte, absorbing exactly one byte of
/// packet space.
pub fn write_empty_adaptation_field(buf: &mut BytesMut) {
    buf.put_u8(0);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TSHeader {
    pub sync_byte: u8, // Always 0x47
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_exists: bool,
    pub contains_payload: bool,
    pub continuity_counter: u8,
}

impl Default for TSHeader {
    fn default() -> Self {
        Self {
            sync_byte: SYNC_BYTE,
            transport_error: false,
            payload_unit_start: false,
            transport_priority: false,
            pid: 0,
            scrambling_control: 0,
            adaptation_field_exists: false,
            contains_payload: true,
            continuity_counter: 0,
        }
    }
}

impl TSHeader {
    pub fn new(pid: u16, continuity_counter: u8) -> Self {
        Self {
            pid,
            continuity_counter,
            ..Default::default()
        }
    }

    /// The 2-bit adaptation_field_control value.
    pub fn adaptation_field_control(&self) -> u8 {
        ((self.adaptation_field_exists as u8) << 1) | self.contains_payload as u8
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.sync_byte);

        let mut b1 = 0u8;
        if self.transport_error {
            b1 |= 0x80;
        }
        if self.payload_unit_start {
            b1 |= 0x40;
        }
        if self.transport_priority {
            b1 |= 0x20;
        }
        b1 |= ((self.pid >> 8) & 0x1f) as u8;
        buf.put_u8(b1);

        buf.put_u8((self.pid & 0xff) as u8);

        let b3 = (self.scrambling_control & 0x03) << 6
            | self.adaptation_field_control() << 4
            | (self.continuity_counter & 0x0f);
        buf.put_u8(b3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stream_type_table() {
        for codec in [
            CodecId::H264,
            CodecId::H265,
            CodecId::Aac,
            CodecId::G711A,
            CodecId::G711U,
        ] {
            let stream_type = StreamType::from(codec);
            assert_eq!(stream_type.codec(), codec);
            assert_eq!(StreamType::try_from(u8::from(stream_type)).unwrap(), stream_type);
        }
        assert_eq!(u8::from(StreamType::H265), 0x24);
        assert!(matches!(
            StreamType::try_from(0x03),
            Err(MpegError::UnsupportedStreamType(0x03))
        ));
    }

    #[test]
    fn test_pcr_layout() {
        let mut buf = BytesMut::new();
        let pcr = Pcr::from_clock(90_000 * 300 + 299);
        assert_eq!(pcr.base, 90_000);
        assert_eq!(pcr.extension, 299);

        pcr.write_to(&mut buf);
        assert_eq!(&buf[..], &[0x00, 0x00, 0xaf, 0xc8, 0x7f, 0x2b]);
        assert_eq!(Pcr::parse(&buf).unwrap(), pcr);
        assert_eq!(pcr.to_duration(), Duration::from_nanos(1_000_011_074));
    }

    #[test]
    fn test_adaptation_field_sizes() {
        let mut buf = BytesMut::new();
        write_empty_adaptation_field(&mut buf);
        assert_eq!(&buf[..], &[0x00]);

        buf.clear();
        AdaptationField::stuffing(2).write_to(&mut buf);
        assert_eq!(&buf[..], &[0x01, 0x00]);

        buf.clear();
        AdaptationField::stuffing(5).write_to(&mut buf);
        assert_eq!(&buf[..], &[0x04, 0x00, 0xff, 0xff, 0xff]);

        let mut field = AdaptationField::with_pcr(Pcr::from_clock(0));
        assert_eq!(field.encoded_len(), 8);
        field.stuffing = 3;
        buf.clear();
        field.write_to(&mut buf);
        assert_eq!(buf.len(), 11);
        assert_eq!(buf[0], 10);
        assert_eq!(buf[1], 0x10);
        assert_eq!(&buf[8..], &[0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_pat_section_with_crc() {
        let mut buf = BytesMut::new();
        PAT::single_program(1, 1, PID_PMT).write_section(true, &mut buf);
        assert_eq!(
            &buf[..],
            &[
                0x00, 0xb0, 0x0d, 0x00, 0x01, 0xc1, 0x00, 0x00, 0x00, 0x01, 0xf0, 0x00, 0x2a,
                0xb1, 0x04, 0xb2
            ]
        );

        buf.clear();
        PAT::single_program(1, 1, PID_PMT).write_section(false, &mut buf);
        assert_eq!(buf.len(), 12);
        assert_eq!(buf[2], 0x09);
    }

    #[test]
    fn test_descriptor_length_limit() {
        let desc = Descriptor::new(0x05, vec![0x48; Descriptor::MAX_LEN]).unwrap();
        let mut buf = BytesMut::new();
        desc.write_to(&mut buf);
        assert_eq!(buf.len(), desc.encoded_len());
        assert_eq!(&buf[..2], &[0x05, 0xff]);

        assert!(matches!(
            Descriptor::new(0x05, vec![0; Descriptor::MAX_LEN + 1]),
            Err(MpegError::InvalidData(_))
        ));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "longer than 255 bytes")]
    fn test_oversized_descriptor_is_not_truncated() {
        let desc = Descriptor {
            tag: 0x05,
            data: vec![0; 256],
        };
        desc.write_to(&mut BytesMut::new());
    }

    #[test]
    fn test_ts_header_write() {
        let mut buf = BytesMut::new();
        let header = TSHeader {
            payload_unit_start: true,
            adaptation_field_exists: true,
            ..TSHeader::new(0x101, 0x1f)
        };
        header.write_to(&mut buf);
        assert_eq!(&buf[..], &[0x47, 0x41, 0x01, 0x3f]);
    }
}
