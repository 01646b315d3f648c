use bytes::{BufMut, BytesMut};

use crate::error::{MpegError, Result};
use crate::format::ts::types::TIMESTAMP_MASK;

/// PTS and DTS both present.
pub const PTS_DTS_BOTH: u8 = 0x03;
pub const PTS_ONLY: u8 = 0x02;

/// Size of a PES header carrying both PTS and DTS.
pub const PES_HEADER_SIZE_PTS_DTS: usize = 19;

/// Packetized Elementary Stream (PES) header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PESHeader {
    /// Stream identifier indicating content type (video/audio/etc.)
    pub stream_id: u8,
    /// Bytes following the packet_length field, 0 when unbounded
    pub packet_length: u16,
    pub scrambling_control: u8,
    pub priority: bool,
    pub data_alignment: bool,
    pub copyright: bool,
    pub original: bool,
    /// Two bits, `PTS_ONLY` or `PTS_DTS_BOTH`
    pub pts_dts_flags: u8,
    /// Length of the optional fields following header_data_length
    pub header_data_length: u8,
    /// Presentation Time Stamp (33 bits)
    pub pts: Option<u64>,
    /// Decoding Time Stamp (33 bits)
    pub dts: Option<u64>,
    /// MPEG-1 packet layout rather than the MPEG-2 one
    pub mpeg1: bool,
}

impl PESHeader {
    pub fn new(stream_id: u8) -> Self {
        Self {
            stream_id,
            ..Default::default()
        }
    }

    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = Some(pts & TIMESTAMP_MASK);
        self.update_flags();
        self
    }

    pub fn with_dts(mut self, dts: u64) -> Self {
        self.dts = Some(dts & TIMESTAMP_MASK);
        self.update_flags();
        self
    }

    fn update_flags(&mut self) {
        // A DTS is only legal next to a PTS.
        self.pts_dts_flags = match (self.pts, self.dts) {
            (Some(_), Some(_)) => PTS_DTS_BOTH,
            (Some(_), None) => PTS_ONLY,
            (None, Some(dts)) => {
                self.pts = Some(dts);
                self.dts = None;
                PTS_ONLY
            }
            (None, None) => 0,
        };
        self.header_data_length = match self.pts_dts_flags {
            PTS_DTS_BOTH => 10,
            PTS_ONLY => 5,
            _ => 0,
        };
    }

    /// Bytes `write_to` produces.
    pub fn encoded_len(&self) -> usize {
        9 + self.header_data_length as usize
    }

    /// Writes the MPEG-2 header layout.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&[0x00, 0x00, 0x01]);
        buf.put_u8(self.stream_id);
        buf.put_u16(self.packet_length);

        let mut flags = 0x80 | (self.scrambling_control & 0x03) << 4;
        if self.priority {
            flags |= 0x08;
        }
        if self.data_alignment {
            flags |= 0x04;
        }
        if self.copyright {
            flags |= 0x02;
        }
        if self.original {
            flags |= 0x01;
        }
        buf.put_u8(flags);
        buf.put_u8(self.pts_dts_flags << 6);
        buf.put_u8(self.header_data_length);

        let written = buf.len();
        if let Some(pts) = self.pts {
            let marker = if self.pts_dts_flags == PTS_DTS_BOTH { 0x30 } else { 0x20 };
            write_timestamp(buf, marker, pts);
        }
        if let (PTS_DTS_BOTH, Some(dts)) = (self.pts_dts_flags, self.dts) {
            write_timestamp(buf, 0x10, dts);
        }

        let padding = (self.header_data_length as usize).saturating_sub(buf.len() - written);
        buf.put_bytes(0xff, padding);
    }

    /// Elementary stream bytes following the header, 0 when unbounded.
    pub fn es_length(&self) -> usize {
        if self.packet_length == 0 {
            return 0;
        }
        let header_rest = self.header_size() - 6;
        (self.packet_length as usize).saturating_sub(header_rest)
    }

    /// Header size as parsed, start code included.
    pub fn header_size(&self) -> usize {
        if self.mpeg1 {
            6 + self.header_data_length as usize
        } else {
            9 + self.header_data_length as usize
        }
    }

    /// Parses a PES header at the start of `data`.
    ///
    /// Returns `Ok(None)` when `data` does not yet hold the whole header.
    pub fn parse(data: &[u8]) -> Result<Option<Self>> {
        if data.len() < 6 {
            return Ok(None);
        }
        if data[0] != 0x00 || data[1] != 0x00 || data[2] != 0x01 {
            return Err(MpegError::InvalidData("PES start code missing".into()));
        }

        let mut header = PESHeader::new(data[3]);
        header.packet_length = u16::from_be_bytes([data[4], data[5]]);

        if data.len() < 7 {
            return Ok(None);
        }
        if data[6] & 0xc0 == 0x80 {
            Self::parse_mpeg2(data, header)
        } else {
            Self::parse_mpeg1(data, header)
        }
    }

    fn parse_mpeg2(data: &[u8], mut header: PESHeader) -> Result<Option<Self>> {
        if data.len() < 9 {
            return Ok(None);
        }
        let flags = data[6];
        header.scrambling_control = (flags >> 4) & 0x03;
        header.priority = flags & 0x08 != 0;
        header.data_alignment = flags & 0x04 != 0;
        header.copyright = flags & 0x02 != 0;
        header.original = flags & 0x01 != 0;
        header.pts_dts_flags = data[7] >> 6;
        header.header_data_length = data[8];

        if data.len() < header.header_size() {
            return Ok(None);
        }

        match header.pts_dts_flags {
            PTS_ONLY if header.header_data_length >= 5 => {
                header.pts = Some(read_timestamp(&data[9..14]));
            }
            PTS_DTS_BOTH if header.header_data_length >= 10 => {
                header.pts = Some(read_timestamp(&data[9..14]));
                header.dts = Some(read_timestamp(&data[14..19]));
            }
            0 => {}
            flags => {
                return Err(MpegError::InvalidData(format!(
                    "PES PTS_DTS_flags {:#04b} with header_data_length {}",
                    flags, header.header_data_length
                )))
            }
        }

        Ok(Some(header))
    }

    // ISO/IEC 11172-1 2.4.3.3: up to 16 stuffing bytes, optional STD buffer
    // fields, then PTS, PTS+DTS or the single byte 0x0F.
    fn parse_mpeg1(data: &[u8], mut header: PESHeader) -> Result<Option<Self>> {
        header.mpeg1 = true;
        let mut pos = 6;

        loop {
            match data.get(pos) {
                None => return Ok(None),
                Some(0xff) if pos - 6 < 16 => pos += 1,
                Some(0xff) => {
                    return Err(MpegError::InvalidData("too many PES stuffing bytes".into()))
                }
                Some(_) => break,
            }
        }

        if data[pos] & 0xc0 == 0x40 {
            pos += 2;
        }
        let Some(&marker) = data.get(pos) else {
            return Ok(None);
        };

        match marker & 0xf0 {
            0x20 => {
                if data.len() < pos + 5 {
                    return Ok(None);
                }
                header.pts = Some(read_timestamp(&data[pos..pos + 5]));
                header.pts_dts_flags = PTS_ONLY;
                pos += 5;
            }
            0x30 => {
                if data.len() < pos + 10 {
                    return Ok(None);
                }
                header.pts = Some(read_timestamp(&data[pos..pos + 5]));
                header.dts = Some(read_timestamp(&data[pos + 5..pos + 10]));
                header.pts_dts_flags = PTS_DTS_BOTH;
                pos += 10;
            }
            _ if marker == 0x0f => pos += 1,
            _ => {
                return Err(MpegError::InvalidData(format!(
                    "unexpected MPEG-1 PES header byte 0x{:02x}",
                    marker
                )))
            }
        }

        header.header_data_length = (pos - 6) as u8;
        Ok(Some(header))
    }
}

/// Writes a 5-byte timestamp: 4-bit marker prefix, 33 bits, marker bits.
pub fn write_timestamp(buf: &mut BytesMut, marker: u8, ts: u64) {
    let ts = ts & TIMESTAMP_MASK;

    buf.put_u8(marker | ((ts >> 29) & 0x0E) as u8 | 0x01);
    buf.put_u16((((ts >> 14) & 0xFFFE) | 0x01) as u16);
    buf.put_u16((((ts << 1) & 0xFFFE) | 0x01) as u16);
}

pub fn read_timestamp(data: &[u8]) -> u64 {
    (((data[0] >> 1) & 0x07) as u64) << 30
        | (data[1] as u64) << 22
        | ((data[2] >> 1) as u64) << 15
        | (data[3] as u64) << 7
        | (data[4] >> 1) as u64
}
