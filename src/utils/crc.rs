/// CRC32 for MPEG-2 PSI sections (ITU-T H.222.0 / ISO/IEC 13818-1).
///
/// Polynomial 0x04C11DB7, initial value 0xFFFFFFFF, no reflection, no final xor.
/// Appending the CRC to a section and running the checksum over the whole
/// thing yields 0, which is how decoders verify it.
pub struct Crc32Mpeg2;

const CRC32_MPEG2: u32 = 0x04C11DB7;

static TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ CRC32_MPEG2
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

impl Crc32Mpeg2 {
    pub fn checksum(data: &[u8]) -> u32 {
        data.iter().fold(0xFFFF_FFFF, |crc, &byte| {
            let index = ((crc >> 24) ^ byte as u32) & 0xFF;
            (crc << 8) ^ TABLE[index as usize]
        })
    }

    /// True when `section` ends with a CRC32 that matches the bytes before it.
    pub fn verify(section: &[u8]) -> bool {
        section.len() >= 4 && Self::checksum(section) == 0
    }
}
