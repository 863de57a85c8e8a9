//! Bit-level writer and reader.
//!
//! Bits are addressed in MSB-first order: bit 0 is the high bit of the first
//! byte. This is the only place where bit order is defined.

use crate::errors::{ReadError, WriteError};

/// Largest value representable with `bits` bits (`bits` <= 64).
pub fn max_value(bits: usize) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Number of bits needed to index `count` distinct values (0 when `count` <= 1).
pub fn index_bits(count: usize) -> usize {
    if count <= 1 {
        0
    } else {
        (usize::BITS - (count - 1).leading_zeros()) as usize
    }
}

/// Growable MSB-first bit sink.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn write_bit(&mut self, bit: u8) {
        let byte_index = self.len / 8;
        let bit_index = self.len % 8;

        if byte_index == self.bytes.len() {
            self.bytes.push(0);
        }
        self.bytes[byte_index] |= (bit & 1) << (7 - bit_index);
        self.len += 1;
    }

    /// Appends the low `n` bits of `value`, most significant first.
    ///
    /// Fails if `value` does not fit in `n` bits or if `n` exceeds 64.
    pub fn write_bits(&mut self, value: u64, n: usize) -> Result<(), WriteError> {
        if n > 64 {
            return Err(WriteError::TooManyBitsWritten(n));
        }
        if value > max_value(n) || (n == 0 && value != 0) {
            return Err(WriteError::OutOfRange {
                definition: format!("{n}-bit field"),
                value: value.to_string(),
            });
        }

        for i in (0..n).rev() {
            self.write_bit(((value >> i) & 1) as u8);
        }

        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_bit(u8::from(value));
    }

    /// Appends every byte as 8 bits.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            for i in (0..8).rev() {
                self.write_bit((byte >> i) & 1);
            }
        }
    }

    /// Packed bytes; the last byte is zero-padded.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// MSB-first cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Number of bits consumed so far.
    pub fn position(&self) -> usize {
        self.bit_pos
    }

    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.bit_pos
    }

    fn read_bit(&mut self) -> u8 {
        let byte_index = self.bit_pos / 8;
        let bit_index = self.bit_pos % 8;
        self.bit_pos += 1;

        (self.data[byte_index] >> (7 - bit_index)) & 1
    }

    /// Reads `n` bits as an unsigned value (max 64 bits). MSB-first.
    pub fn read_bits(&mut self, n: usize) -> Result<u64, ReadError> {
        if n > 64 {
            return Err(ReadError::TooManyBitsRead(n));
        }

        let remaining = self.remaining_bits();
        if n > remaining {
            return Err(ReadError::OutOfBounds {
                requested: n,
                remaining,
            });
        }

        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | u64::from(self.read_bit());
        }

        Ok(value)
    }

    pub fn read_bool(&mut self) -> Result<bool, ReadError> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Reads `count` whole bytes, not necessarily byte aligned.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, ReadError> {
        let remaining = self.remaining_bits();
        if count * 8 > remaining {
            return Err(ReadError::OutOfBounds {
                requested: count * 8,
                remaining,
            });
        }

        (0..count).map(|_| Ok(self.read_bits(8)? as u8)).collect()
    }

    /// Advances to the next byte boundary; no-op when already aligned.
    pub fn align_to_byte(&mut self) {
        let rem = self.bit_pos % 8;
        if rem != 0 {
            self.bit_pos += 8 - rem;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_write_bits_across_byte_boundaries() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3).unwrap();
        writer.write_bits(0b001101, 6).unwrap();
        writer.write_bits(0b1110000, 7).unwrap();

        assert_eq!(writer.len(), 16);
        assert_eq!(writer.to_bytes(), vec![0b10100110, 0b11110000]);

        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(6).unwrap(), 0b001101);
        assert_eq!(reader.read_bits(7).unwrap(), 0b1110000);
        assert_eq!(reader.remaining_bits(), 0);
    }

    #[test]
    fn test_empty_writer_has_no_bytes() {
        let writer = BitWriter::new();
        assert!(writer.is_empty());
        assert!(writer.to_bytes().is_empty());
    }

    #[test]
    fn test_write_bits_rejects_overflow() {
        let mut writer = BitWriter::new();
        assert!(matches!(
            writer.write_bits(16, 4),
            Err(WriteError::OutOfRange { .. })
        ));
        assert!(matches!(
            writer.write_bits(1, 0),
            Err(WriteError::OutOfRange { .. })
        ));
        assert_eq!(
            writer.write_bits(0, 65).unwrap_err(),
            WriteError::TooManyBitsWritten(65)
        );
        assert!(writer.is_empty());
    }

    #[test]
    fn test_write_full_width() {
        let mut writer = BitWriter::new();
        writer.write_bits(u64::MAX, 64).unwrap();
        assert_eq!(writer.to_bytes(), vec![0xFF; 8]);
    }

    #[test]
    fn test_write_bool_and_bytes() {
        let mut writer = BitWriter::new();
        writer.write_bool(true);
        writer.write_bytes(&[0xAB]);
        assert_eq!(writer.len(), 9);
        assert_eq!(writer.to_bytes(), vec![0b11010101, 0b10000000]);
    }

    #[test]
    fn test_read_bits_msb_order() {
        let data = [0b11001010, 0b01101100];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(4).unwrap(), 0b1100);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(3).unwrap(), 0b001);
        assert_eq!(reader.read_bits(6).unwrap(), 0b101100);
    }

    #[test]
    fn test_read_bits_out_of_bounds() {
        let data = [0b11110000];
        let mut reader = BitReader::new(&data);
        reader.read_bits(8).unwrap();
        assert_eq!(
            reader.read_bits(1).unwrap_err(),
            ReadError::OutOfBounds {
                requested: 1,
                remaining: 0
            }
        );
    }

    #[test]
    fn test_read_bits_more_than_64() {
        let data = [0xFF; 16];
        let mut reader = BitReader::new(&data);
        assert_eq!(
            reader.read_bits(65).unwrap_err(),
            ReadError::TooManyBitsRead(65)
        );
    }

    #[test]
    fn test_read_bytes_unaligned() {
        let data = [0b11010101, 0b10000000];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_bytes(1).unwrap(), vec![0xAB]);
        assert!(reader.read_bytes(1).is_err());
    }

    #[test]
    fn test_align_to_byte() {
        let data = [0xFF, 0xFF];
        let mut reader = BitReader::new(&data);
        reader.align_to_byte();
        assert_eq!(reader.position(), 0);

        reader.read_bits(3).unwrap();
        reader.align_to_byte();
        assert_eq!(reader.position(), 8);
        assert_eq!(reader.remaining_bits(), 8);
    }

    #[test]
    fn test_index_bits() {
        assert_eq!(index_bits(0), 0);
        assert_eq!(index_bits(1), 0);
        assert_eq!(index_bits(2), 1);
        assert_eq!(index_bits(3), 2);
        assert_eq!(index_bits(4), 2);
        assert_eq!(index_bits(5), 3);
        assert_eq!(index_bits(23), 5);
    }

    proptest! {
        #[test]
        fn prop_write_then_read(fields in proptest::collection::vec((any::<u64>(), 0usize..=64), 0..32)) {
            let mut writer = BitWriter::new();
            let mut expected = Vec::with_capacity(fields.len());
            for (value, n) in fields {
                let value = value & max_value(n);
                writer.write_bits(value, n).unwrap();
                expected.push((value, n));
            }

            let total = writer.len();
            let bytes = writer.into_bytes();
            prop_assert_eq!(bytes.len(), total.div_ceil(8));

            let mut reader = BitReader::new(&bytes);
            for (value, n) in expected {
                prop_assert_eq!(reader.read_bits(n).unwrap(), value);
            }
            prop_assert!(reader.remaining_bits() < 8);
        }
    }
}
