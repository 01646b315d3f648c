//! Codec-level helpers consumed by the PS demuxer and TS muxer.
//!
//! Nothing here decodes media. The helpers answer the few questions the
//! container code needs: is this frame a keyframe, which ADTS header goes in
//! front of an AAC frame, and what Annex-B parameter sets belong before a
//! keyframe.

pub mod aac;
pub mod h264;
pub mod h265;

use bytes::Bytes;
use memchr::memchr;

use crate::av::CodecId;
use crate::error::{MpegError, Result};

pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Finds the next `00 00 01` / `00 00 00 01` start code at or after `from`.
///
/// Returns the offset of the first byte of the start code and its length.
pub fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut pos = from;
    while pos + 3 <= data.len() {
        let one = pos + memchr(0x01, &data[pos..])?;
        if one >= pos + 2 && data[one - 1] == 0 && data[one - 2] == 0 {
            if one >= pos + 3 && data[one - 3] == 0 {
                return Some((one - 3, 4));
            }
            return Some((one - 2, 3));
        }
        pos = one + 1;
    }
    None
}

/// Iterator over the NAL units of an Annex-B buffer, start codes stripped.
///
/// Bytes before the first start code are yielded as a unit of their own, so a
/// bare NAL unit without a start code is still inspected.
pub struct NalUnits<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for NalUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.data.len() {
            let start = match find_start_code(self.data, self.pos) {
                Some((at, len)) if at == self.pos => at + len,
                _ => self.pos,
            };
            let end = find_start_code(self.data, start)
                .map(|(at, _)| at)
                .unwrap_or(self.data.len());
            self.pos = end;
            if end > start {
                return Some(&self.data[start..end]);
            }
        }
        None
    }
}

pub fn nal_units(data: &[u8]) -> NalUnits<'_> {
    NalUnits { data, pos: 0 }
}

/// Keyframe classification of a whole frame.
pub fn is_keyframe(codec: CodecId, data: &[u8]) -> bool {
    KeyframeScanner::new(codec).push(data).unwrap_or(false)
}

// Start code plus NAL header byte.
const SCAN_OVERLAP: usize = 4;

/// Keyframe classification of a frame that arrives in pieces.
///
/// Stays undecided until the first slice NAL unit shows up, so parameter sets
/// and SEI ahead of the slice may span any number of pieces. The last bytes
/// of each piece are kept for the next one, which finds start codes split
/// across pieces. Any split of a frame gives the same answer.
#[derive(Debug, Clone)]
pub struct KeyframeScanner {
    codec: CodecId,
    tail: Vec<u8>,
    seen: usize,
    decision: Option<bool>,
}

impl KeyframeScanner {
    pub fn new(codec: CodecId) -> Self {
        let decision = match codec {
            CodecId::H264 | CodecId::H265 => None,
            CodecId::Aac | CodecId::G711A | CodecId::G711U => Some(true),
        };
        Self {
            codec,
            tail: Vec::new(),
            seen: 0,
            decision,
        }
    }

    /// Scans the next piece of the frame and returns the decision, if any.
    pub fn push(&mut self, data: &[u8]) -> Option<bool> {
        if self.decision.is_some() || data.is_empty() {
            return self.decision;
        }

        // The window still starts at the first byte of the frame
        let at_start = self.seen == self.tail.len();
        self.seen += data.len();
        let mut window = std::mem::take(&mut self.tail);
        window.extend_from_slice(data);

        self.decision = self.scan(&window, at_start);
        if self.decision.is_none() {
            let keep = window.len().min(SCAN_OVERLAP);
            window.drain(..window.len() - keep);
            self.tail = window;
        }
        self.decision
    }

    pub fn decision(&self) -> Option<bool> {
        self.decision
    }

    /// False while undecided.
    pub fn is_keyframe(&self) -> bool {
        self.decision.unwrap_or(false)
    }

    fn scan(&self, window: &[u8], at_start: bool) -> Option<bool> {
        // A frame without a leading start code starts with a bare NAL header
        if at_start {
            if let Some(&header) = window.first().filter(|b| **b != 0) {
                if let Some(key) = self.classify(header) {
                    return Some(key);
                }
            }
        }

        let mut pos = 0;
        while let Some((at, len)) = find_start_code(window, pos) {
            let header = window.get(at + len)?;
            if let Some(key) = self.classify(*header) {
                return Some(key);
            }
            pos = at + len;
        }
        None
    }

    fn classify(&self, header: u8) -> Option<bool> {
        match self.codec {
            CodecId::H264 => h264::classify_nal(header),
            CodecId::H265 => h265::classify_nal(header),
            CodecId::Aac | CodecId::G711A | CodecId::G711U => Some(true),
        }
    }
}

/// One parameter set from a decoder configuration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    pub nal_type: u8,
    pub data: Bytes,
}

/// Fields shared by the AVC and HEVC decoder configuration records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationRecord {
    pub configuration_version: u8,
    pub profile_indication: u8,
    pub level_indication: u8,
    /// Size in bytes of the NAL length prefix used by the samples.
    pub nal_length_size: u8,
    pub parameter_sets: Vec<ParameterSet>,
}

/// Capability interface over avcC / hvcC records.
pub trait DecoderConfigRecord {
    fn base(&self) -> &ConfigurationRecord;

    fn profile_bytes(&self) -> Vec<u8>;

    fn level_bytes(&self) -> Vec<u8> {
        vec![self.base().level_indication]
    }

    fn parameter_sets(&self) -> &[ParameterSet] {
        &self.base().parameter_sets
    }

    /// Parameter sets as an Annex-B byte stream, ready to precede a keyframe.
    fn annexb(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for set in self.parameter_sets() {
            out.extend_from_slice(&START_CODE);
            out.extend_from_slice(&set.data);
        }
        out
    }
}

/// True when `data` looks like an avcC/hvcC record rather than Annex-B.
pub fn is_decoder_config_record(data: &[u8]) -> bool {
    data.first() == Some(&1)
}

pub fn parse_decoder_config_record(
    codec: CodecId,
    data: &[u8],
) -> Result<Box<dyn DecoderConfigRecord>> {
    match codec {
        CodecId::H264 => Ok(Box::new(h264::AvcDecoderConfigurationRecord::parse(data)?)),
        CodecId::H265 => Ok(Box::new(h265::HevcDecoderConfigurationRecord::parse(data)?)),
        other => Err(MpegError::Codec(format!(
            "{:?} has no decoder configuration record",
            other
        ))),
    }
}

/// Byte cursor used by the record parsers.
pub(crate) struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(MpegError::Parser(format!(
                "decoder configuration record truncated at byte {}",
                self.pos
            )));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_start_code() {
        let data = [0xAA, 0x00, 0x00, 0x01, 0x65, 0x00, 0x00, 0x00, 0x01, 0x41];
        assert_eq!(find_start_code(&data, 0), Some((1, 3)));
        assert_eq!(find_start_code(&data, 2), Some((5, 4)));
        assert_eq!(find_start_code(&data, 6), Some((6, 3)));
        assert_eq!(find_start_code(&data, 9), None);
        assert_eq!(find_start_code(&[0x00, 0x00], 0), None);
    }

    #[test]
    fn test_nal_units() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x09, 0xF0, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x00, 0x01,
        ];
        let units: Vec<&[u8]> = nal_units(&data).collect();
        assert_eq!(units, vec![&[0x09, 0xF0][..], &[0x67, 0x42][..]]);

        let bare = [0x65, 0x88, 0x84];
        let units: Vec<&[u8]> = nal_units(&bare).collect();
        assert_eq!(units, vec![&bare[..]]);
    }

    #[test]
    fn test_scanner_waits_for_slice() {
        let frame = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E, 0x00, 0x00, 0x00, 0x01, 0x68, 0xCE,
            0x3C, 0x80, 0x00, 0x00, 0x01, 0x06, 0x05, 0x01, 0x00, 0x00, 0x00, 0x01, 0x65, 0x88,
        ];
        assert!(is_keyframe(CodecId::H264, &frame));

        for cut in 1..frame.len() {
            let mut scanner = KeyframeScanner::new(CodecId::H264);
            scanner.push(&frame[..cut]);
            assert_eq!(scanner.push(&frame[cut..]), Some(true), "cut at {}", cut);
        }

        // Start code split over three pieces
        let mut scanner = KeyframeScanner::new(CodecId::H264);
        assert_eq!(scanner.push(&frame[..24]), None);
        assert_eq!(scanner.push(&frame[24..25]), None);
        assert_eq!(scanner.push(&frame[25..26]), None);
        assert_eq!(scanner.push(&frame[26..27]), Some(true));
        assert!(scanner.is_keyframe());
    }

    #[test]
    fn test_scanner_first_slice_decides() {
        let mut scanner = KeyframeScanner::new(CodecId::H265);
        // AUD, then TRAIL_R
        assert_eq!(scanner.push(&[0x00, 0x00, 0x00, 0x01, 0x46, 0x01, 0x50, 0x00]), None);
        assert_eq!(scanner.push(&[0x00, 0x01, 0x02, 0x01]), Some(false));
        // Later IRAP units do not change the answer
        assert_eq!(scanner.push(&[0x00, 0x00, 0x01, 0x26, 0x01]), Some(false));

        // Bare NAL header at the start of the frame
        let mut scanner = KeyframeScanner::new(CodecId::H264);
        assert_eq!(scanner.push(&[0x65]), Some(true));

        // Leading zeros are a start code in the making, not a NAL header
        let mut scanner = KeyframeScanner::new(CodecId::H265);
        assert_eq!(scanner.push(&[0x00, 0x00]), None);
        assert_eq!(scanner.push(&[0x00, 0x01, 0x26, 0x01]), Some(true));

        assert!(!KeyframeScanner::new(CodecId::H264).is_keyframe());
    }

    #[test]
    fn test_audio_is_always_key() {
        assert!(is_keyframe(CodecId::Aac, &[]));
        assert!(is_keyframe(CodecId::G711A, &[0xD5]));
    }
}
