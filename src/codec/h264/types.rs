#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NALUnitType {
    Unspecified,
    CodedSliceNonIDR,
    CodedSliceDataPartitionA,
    CodedSliceDataPartitionB,
    CodedSliceDataPartitionC,
    CodedSliceIDR,
    SEI,
    SPS,
    PPS,
    AccessUnitDelimiter,
    EndOfSequence,
    EndOfStream,
    FillerData,
    Other(u8),
}

impl NALUnitType {
    /// Classifies a NAL unit by its one-byte header.
    pub fn from_header(header: u8) -> Self {
        Self::from(header & 0x1F)
    }

    pub fn is_slice(&self) -> bool {
        matches!(
            self,
            NALUnitType::CodedSliceNonIDR
                | NALUnitType::CodedSliceDataPartitionA
                | NALUnitType::CodedSliceIDR
        )
    }
}

impl From<u8> for NALUnitType {
    fn from(value: u8) -> Self {
        match value {
            0 => NALUnitType::Unspecified,
            1 => NALUnitType::CodedSliceNonIDR,
            2 => NALUnitType::CodedSliceDataPartitionA,
            3 => NALUnitType::CodedSliceDataPartitionB,
            4 => NALUnitType::CodedSliceDataPartitionC,
            5 => NALUnitType::CodedSliceIDR,
            6 => NALUnitType::SEI,
            7 => NALUnitType::SPS,
            8 => NALUnitType::PPS,
            9 => NALUnitType::AccessUnitDelimiter,
            10 => NALUnitType::EndOfSequence,
            11 => NALUnitType::EndOfStream,
            12 => NALUnitType::FillerData,
            other => NALUnitType::Other(other),
        }
    }
}
