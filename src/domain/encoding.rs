//! Binary serialization primitives shared by the payload codec and the
//! transaction model.
//!
//! Two distinct variable-length integer forms are in play:
//!
//! - CompactSize: the 1/3/5/9-byte little-endian form used for counts and
//!   byte-vector lengths.
//! - VARINT: the MSB base-128 form used for token ids, where every
//!   continuation byte also subtracts one so each value has a single
//!   encoding.

use super::error::TransactionError;

/// Upper bound the node enforces on any CompactSize-declared length.
pub const MAX_SIZE: u64 = 0x0200_0000;

/// Append-only byte sink.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32_le(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64_le(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_compact_size(&mut self, value: u64) {
        if value < 0xfd {
            self.buf.push(value as u8);
        } else if value <= 0xffff {
            self.buf.push(0xfd);
            self.buf.extend_from_slice(&(value as u16).to_le_bytes());
        } else if value <= 0xffff_ffff {
            self.buf.push(0xfe);
            self.buf.extend_from_slice(&(value as u32).to_le_bytes());
        } else {
            self.buf.push(0xff);
            self.buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    pub fn write_varint(&mut self, mut value: u64) {
        let mut tmp = [0u8; 10];
        let mut len = 0;
        loop {
            tmp[len] = (value & 0x7f) as u8 | if len > 0 { 0x80 } else { 0x00 };
            if value <= 0x7f {
                break;
            }
            value = (value >> 7) - 1;
            len += 1;
        }
        self.buf.extend(tmp[..=len].iter().rev());
    }

    /// CompactSize length followed by the bytes themselves.
    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_compact_size(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a borrowed byte slice. Every read is bounds checked.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], TransactionError> {
        if n > self.remaining() {
            return Err(TransactionError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_u8(&mut self) -> Result<u8, TransactionError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], TransactionError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u16_le(&mut self) -> Result<u16, TransactionError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, TransactionError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, TransactionError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, TransactionError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64_le(&mut self) -> Result<i64, TransactionError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Reads a CompactSize, rejecting non-minimal encodings and values above `MAX_SIZE`.
    pub fn read_compact_size(&mut self) -> Result<u64, TransactionError> {
        let value = match self.read_u8()? {
            0xfd => {
                let v = u64::from(self.read_u16_le()?);
                if v < 0xfd {
                    return Err(non_canonical());
                }
                v
            }
            0xfe => {
                let v = u64::from(self.read_u32_le()?);
                if v <= 0xffff {
                    return Err(non_canonical());
                }
                v
            }
            0xff => {
                let v = self.read_u64_le()?;
                if v <= 0xffff_ffff {
                    return Err(non_canonical());
                }
                v
            }
            b => u64::from(b),
        };
        if value > MAX_SIZE {
            return Err(TransactionError::Invalid(format!(
                "compact size {value} exceeds maximum {MAX_SIZE}"
            )));
        }
        Ok(value)
    }

    pub fn read_varint(&mut self) -> Result<u64, TransactionError> {
        let mut value: u64 = 0;
        loop {
            if value > (u64::MAX >> 7) {
                return Err(TransactionError::Invalid("varint too large".to_string()));
            }
            let byte = self.read_u8()?;
            value = (value << 7) | u64::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            value = value
                .checked_add(1)
                .ok_or_else(|| TransactionError::Invalid("varint too large".to_string()))?;
        }
    }

    /// Reads a CompactSize-prefixed byte vector. The declared length is
    /// checked against what is left before anything is allocated.
    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>, TransactionError> {
        let len = self.read_compact_size()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }
}

fn non_canonical() -> TransactionError {
    TransactionError::Invalid("non-canonical compact size".to_string())
}
