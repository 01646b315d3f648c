// NAL unit types from ITU-T H.265 Table 7-1. Reserved ranges collapse into
// the catch-all variants.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NALUnitType {
    TrailN,
    TrailR,
    TsaN,
    TsaR,
    StsaN,
    StsaR,
    RadlN,
    RadlR,
    RaslN,
    RaslR,
    BlaWLp,
    BlaWRadl,
    BlaNLp,
    IdrWRadl,
    IdrNLp,
    CraNut,
    ReservedIrap(u8),
    ReservedVcl(u8),
    Vps,
    Sps,
    Pps,
    Aud,
    Eos,
    Eob,
    Fd,
    PrefixSei,
    SuffixSei,
    Unspecified(u8),
}

impl NALUnitType {
    /// Classifies a NAL unit by the first byte of its two-byte header.
    pub fn from_header(header: u8) -> Self {
        Self::from_u8((header >> 1) & 0x3F)
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => NALUnitType::TrailN,
            1 => NALUnitType::TrailR,
            2 => NALUnitType::TsaN,
            3 => NALUnitType::TsaR,
            4 => NALUnitType::StsaN,
            5 => NALUnitType::StsaR,
            6 => NALUnitType::RadlN,
            7 => NALUnitType::RadlR,
            8 => NALUnitType::RaslN,
            9 => NALUnitType::RaslR,
            10..=15 => NALUnitType::ReservedVcl(value),
            16 => NALUnitType::BlaWLp,
            17 => NALUnitType::BlaWRadl,
            18 => NALUnitType::BlaNLp,
            19 => NALUnitType::IdrWRadl,
            20 => NALUnitType::IdrNLp,
            21 => NALUnitType::CraNut,
            22 | 23 => NALUnitType::ReservedIrap(value),
            24..=31 => NALUnitType::ReservedVcl(value),
            32 => NALUnitType::Vps,
            33 => NALUnitType::Sps,
            34 => NALUnitType::Pps,
            35 => NALUnitType::Aud,
            36 => NALUnitType::Eos,
            37 => NALUnitType::Eob,
            38 => NALUnitType::Fd,
            39 => NALUnitType::PrefixSei,
            40 => NALUnitType::SuffixSei,
            _ => NALUnitType::Unspecified(value),
        }
    }

    /// Intra random access point picture (BLA, IDR, CRA).
    pub fn is_irap(&self) -> bool {
        matches!(
            self,
            NALUnitType::BlaWLp
                | NALUnitType::BlaWRadl
                | NALUnitType::BlaNLp
                | NALUnitType::IdrWRadl
                | NALUnitType::IdrNLp
                | NALUnitType::CraNut
                | NALUnitType::ReservedIrap(_)
        )
    }

    pub fn is_vcl(&self) -> bool {
        self.is_irap()
            || matches!(
                self,
                NALUnitType::TrailN
                    | NALUnitType::TrailR
                    | NALUnitType::TsaN
                    | NALUnitType::TsaR
                    | NALUnitType::StsaN
                    | NALUnitType::StsaR
                    | NALUnitType::RadlN
                    | NALUnitType::RadlR
                    | NALUnitType::RaslN
                    | NALUnitType::RaslR
                    | NALUnitType::ReservedVcl(_)
            )
    }
}
