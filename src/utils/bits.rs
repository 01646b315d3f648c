use crate::error::{MpegError, Result};

/// A big-endian bit reader over a byte slice.
///
/// ```
/// use mpegio::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011);
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Reads a single bit, 1 as `true`.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.byte_offset >= self.data.len() {
            return Err(MpegError::Codec("Reached end of data".into()));
        }

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads `n` bits (at most 32) as a big-endian number.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(MpegError::Codec("Too many bits requested".into()));
        }
        if (n as usize) > self.available_bits() {
            return Err(MpegError::Codec("Reached end of data".into()));
        }

        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | self.read_bit()? as u64;
        }

        Ok(value as u32)
    }

    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        if (n as usize) > self.available_bits() {
            return Err(MpegError::Codec("Reached end of data".into()));
        }
        let bits = self.bit_offset as usize + n as usize;
        self.byte_offset += bits / 8;
        self.bit_offset = (bits % 8) as u8;
        Ok(())
    }

    /// Skips to the next byte boundary.
    pub fn align_byte(&mut self) {
        if self.bit_offset != 0 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
    }

    pub fn available_bits(&self) -> usize {
        (self.data.len() - self.byte_offset) * 8 - self.bit_offset as usize
    }
}

/// A big-endian bit writer, the mirror of [`BitReader`].
#[derive(Debug, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    bit_offset: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the low `n` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32);
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    pub fn write_bit(&mut self, bit: bool) {
        if self.bit_offset == 0 {
            self.data.push(0);
        }
        if bit {
            let last = self.data.len() - 1;
            self.data[last] |= 1 << (7 - self.bit_offset);
        }
        self.bit_offset = (self.bit_offset + 1) % 8;
    }

    pub fn bit_len(&self) -> usize {
        match self.bit_offset {
            0 => self.data.len() * 8,
            n => (self.data.len() - 1) * 8 + n as usize,
        }
    }

    /// Returns the written bytes, zero-padding the last partial byte.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
