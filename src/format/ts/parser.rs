use super::types::*;
use crate::error::{MpegError, Result};
use crate::utils::Crc32Mpeg2;

/// One 188-byte packet split into its parts. `payload` borrows from the
/// packet buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TSPacket<'a> {
    pub header: TSHeader,
    pub adaptation_field: Option<AdaptationField>,
    pub payload: &'a [u8],
}

/// Stateless decoder for TS packets and PSI sections.
#[derive(Debug, Default, Clone, Copy)]
pub struct TSPacketParser;

impl TSPacketParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_header(&self, data: &[u8]) -> Result<TSHeader> {
        if data.len() < TS_HEADER_SIZE {
            return Err(MpegError::InvalidData("TS packet too short".into()));
        }

        if data[0] != SYNC_BYTE {
            return Err(MpegError::InvalidData("Invalid sync byte".into()));
        }

        Ok(TSHeader {
            sync_byte: data[0],
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            contains_payload: (data[3] & 0x10) != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }

    /// Parses the adaptation field at `offset`, which must point at its
    /// length byte. Returns `None` when the header announces no field.
    pub fn parse_adaptation_field(
        &self,
        data: &[u8],
        offset: usize,
    ) -> Result<Option<AdaptationField>> {
        if data.len() < TS_HEADER_SIZE || (data[3] & 0x20) == 0 {
            return Ok(None);
        }
        if data.len() <= offset {
            return Err(MpegError::InvalidData("Adaptation field missing".into()));
        }

        let adaptation_field_length = data[offset] as usize;
        if adaptation_field_length == 0 {
            return Ok(Some(AdaptationField::default()));
        }

        let end = offset + 1 + adaptation_field_length;
        if data.len() < end {
            return Err(MpegError::InvalidData("Adaptation field too short".into()));
        }

        let flags = data[offset + 1];
        let mut field = AdaptationField {
            discontinuity: (flags & 0x80) != 0,
            random_access: (flags & 0x40) != 0,
            es_priority: (flags & 0x20) != 0,
            ..Default::default()
        };

        let mut pos = offset + 2;

        if (flags & 0x10) != 0 {
            if end < pos + PCR_SIZE {
                return Err(MpegError::InvalidData("PCR data too short".into()));
            }
            field.pcr = Some(Pcr::parse(&data[pos..])?);
            pos += PCR_SIZE;
        }

        if (flags & 0x08) != 0 {
            if end < pos + PCR_SIZE {
                return Err(MpegError::InvalidData("OPCR data too short".into()));
            }
            field.opcr = Some(Pcr::parse(&data[pos..])?);
            pos += PCR_SIZE;
        }

        if (flags & 0x04) != 0 {
            if end < pos + 1 {
                return Err(MpegError::InvalidData("Splice countdown too short".into()));
            }
            field.splice_countdown = Some(data[pos] as i8);
            pos += 1;
        }

        if (flags & 0x02) != 0 {
            if end < pos + 1 {
                return Err(MpegError::InvalidData(
                    "Private data length byte missing".into(),
                ));
            }
            let private_data_length = data[pos] as usize;
            pos += 1;
            if end < pos + private_data_length {
                return Err(MpegError::InvalidData("Private data too short".into()));
            }
            field.private_data = Some(data[pos..pos + private_data_length].to_vec());
            pos += private_data_length;
        }

        // adaptation_field_extension is skipped along with the stuffing
        if (flags & 0x01) == 0 {
            field.stuffing = end - pos;
        }

        Ok(Some(field))
    }

    pub fn parse_packet<'a>(&self, data: &'a [u8]) -> Result<TSPacket<'a>> {
        if data.len() < TS_PACKET_SIZE {
            return Err(MpegError::InvalidData(format!(
                "TS packet is {} bytes, expected {}",
                data.len(),
                TS_PACKET_SIZE
            )));
        }
        let data = &data[..TS_PACKET_SIZE];

        let header = self.parse_header(data)?;
        let adaptation_field = self.parse_adaptation_field(data, TS_HEADER_SIZE)?;
        let payload_offset = if header.adaptation_field_exists {
            TS_HEADER_SIZE + 1 + data[TS_HEADER_SIZE] as usize
        } else {
            TS_HEADER_SIZE
        };
        let payload = if header.contains_payload {
            &data[payload_offset.min(TS_PACKET_SIZE)..]
        } else {
            &[]
        };

        Ok(TSPacket {
            header,
            adaptation_field,
            payload,
        })
    }

    /// Strips the pointer field from a payload that starts a PSI section.
    pub fn section_data<'a>(&self, payload: &'a [u8]) -> Result<&'a [u8]> {
        let pointer = *payload
            .first()
            .ok_or_else(|| MpegError::InvalidData("PSI payload is empty".into()))?
            as usize;
        payload
            .get(1 + pointer..)
            .ok_or_else(|| MpegError::InvalidData("pointer_field past end of payload".into()))
    }

    /// Parses a complete `program_association_section`, starting at table_id.
    pub fn parse_pat_section(&self, section: &[u8]) -> Result<PAT> {
        let (table_id_extension, body) = self.check_section(section, TABLE_ID_PAT)?;
        let mut pat = self.parse_pat(body, 0, body.len())?;
        pat.transport_stream_id = table_id_extension;
        Ok(pat)
    }

    /// Parses a complete `TS_program_map_section`, starting at table_id.
    pub fn parse_pmt_section(&self, section: &[u8]) -> Result<PMT> {
        let (table_id_extension, body) = self.check_section(section, TABLE_ID_PMT)?;
        let mut pmt = self.parse_pmt(body, 0, body.len())?;
        pmt.program_number = table_id_extension;
        Ok(pmt)
    }

    /// Validates the long section header and CRC_32, returning
    /// table_id_extension and the bytes between the header and the CRC.
    fn check_section<'a>(&self, section: &'a [u8], table_id: u8) -> Result<(u16, &'a [u8])> {
        if section.len() < 3 {
            return Err(MpegError::InvalidData("PSI section too short".into()));
        }
        if section[0] != table_id {
            return Err(MpegError::InvalidData(format!(
                "expected table_id 0x{:02x}, got 0x{:02x}",
                table_id, section[0]
            )));
        }
        if section[1] & 0x80 == 0 {
            return Err(MpegError::InvalidData(
                "section_syntax_indicator not set".into(),
            ));
        }

        let section_length = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
        let end = 3 + section_length;
        if section_length < 9 || section.len() < end {
            return Err(MpegError::InvalidData(format!(
                "section_length {} exceeds {} available bytes",
                section_length,
                section.len() - 3
            )));
        }

        let section = &section[..end];
        if !Crc32Mpeg2::verify(section) {
            let crc_at = end - 4;
            return Err(MpegError::Crc {
                expected: u32::from_be_bytes([
                    section[crc_at],
                    section[crc_at + 1],
                    section[crc_at + 2],
                    section[crc_at + 3],
                ]),
                actual: Crc32Mpeg2::checksum(&section[..crc_at]),
            });
        }

        let table_id_extension = ((section[3] as u16) << 8) | section[4] as u16;
        Ok((table_id_extension, &section[8..end - 4]))
    }

    pub fn parse_pat(&self, data: &[u8], offset: usize, length: usize) -> Result<PAT> {
        let mut pat = PAT::new();
        let mut pos = offset;
        let end = range_end(data, offset, length)?;

        while pos + 4 <= end {
            let program_number = ((data[pos] as u16) << 8) | data[pos + 1] as u16;
            let pid = (((data[pos + 2] & 0x1F) as u16) << 8) | data[pos + 3] as u16;
            pat.entries.push(PATEntry {
                program_number,
                network_pid: if program_number == 0 { pid } else { 0 },
                program_map_pid: if program_number != 0 { pid } else { 0 },
            });
            pos += 4;
        }

        Ok(pat)
    }

    pub fn parse_pmt(&self, data: &[u8], offset: usize, length: usize) -> Result<PMT> {
        let mut pmt = PMT::new();
        let mut pos = offset;
        let end = range_end(data, offset, length)?;

        if pos + 2 > end {
            return Err(MpegError::InvalidData("PMT too short for PCR PID".into()));
        }

        pmt.pcr_pid = ((data[pos] as u16 & 0x1F) << 8) | data[pos + 1] as u16;
        pos += 2;

        if pos + 2 > end {
            return Err(MpegError::InvalidData(
                "PMT too short for program info length".into(),
            ));
        }

        let program_info_length = ((data[pos] as usize & 0x0F) << 8) | data[pos + 1] as usize;
        pos += 2;

        if program_info_length > 0 {
            if pos + program_info_length > end {
                return Err(MpegError::InvalidData("Program info data too short".into()));
            }
            pmt.program_descriptors =
                self.parse_descriptors(&data[pos..pos + program_info_length])?;
            pos += program_info_length;
        }

        while pos + 5 <= end {
            let stream_type = data[pos];
            let elementary_pid = ((data[pos + 1] as u16 & 0x1F) << 8) | data[pos + 2] as u16;
            let es_info_length = ((data[pos + 3] as usize & 0x0F) << 8) | data[pos + 4] as usize;
            pos += 5;

            if pos + es_info_length > end {
                return Err(MpegError::InvalidData("ES info data too short".into()));
            }

            let descriptors = self.parse_descriptors(&data[pos..pos + es_info_length])?;
            pos += es_info_length;

            pmt.elementary_stream_infos.push(ElementaryStreamInfo {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }

        Ok(pmt)
    }

    pub fn parse_descriptors(&self, data: &[u8]) -> Result<Vec<Descriptor>> {
        let mut descriptors = Vec::new();
        let mut pos = 0;

        while pos + 2 <= data.len() {
            let tag = data[pos];
            let length = data[pos + 1] as usize;
            pos += 2;

            if pos + length > data.len() {
                return Err(MpegError::InvalidData("Descriptor data too short".into()));
            }

            descriptors.push(Descriptor {
                tag,
                data: data[pos..pos + length].to_vec(),
            });
            pos += length;
        }

        Ok(descriptors)
    }
}

// End of the `length` bytes at `offset`, once checked against `data`.
fn range_end(data: &[u8], offset: usize, length: usize) -> Result<usize> {
    offset
        .checked_add(length)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            MpegError::InvalidData(format!(
                "{} bytes at offset {} run past {} available",
                length,
                offset,
                data.len()
            ))
        })
}
