//! Deterministic byte codec.
//!
//! Every consensus-relevant value encodes through this module so that
//! `Hash(encode(x))` is stable and equal across nodes. The format is
//! fixed-width big-endian integers and u32 length-prefixed sequences;
//! decoding is incremental and reports truncation as a distinct error so
//! wire readers can wait for more bytes.

use thiserror::Error;

/// Codec failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended before the value was complete.
    #[error("Not enough bytes: need {needed}, have {have}")]
    NotEnoughBytes { needed: usize, have: usize },

    /// Structurally invalid encoding.
    #[error("Invalid encoding: {0}")]
    Invalid(String),
}

/// Result type for decoding.
pub type CodecResult<T> = Result<T, CodecError>;

/// Canonical serialization into a byte buffer.
pub trait Encode {
    /// Append the canonical encoding of `self` to `buf`.
    fn encode(&self, buf: &mut Vec<u8>);

    /// Encode into a fresh vector.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Canonical deserialization from a byte reader.
pub trait Decode: Sized {
    /// Decode one value, advancing the reader.
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self>;

    /// Decode a value that must consume the entire slice.
    fn decode_exact(bytes: &[u8]) -> CodecResult<Self> {
        let mut reader = Reader::new(bytes);
        let value = Self::decode(&mut reader)?;
        if !reader.is_empty() {
            return Err(CodecError::Invalid(format!(
                "{} trailing bytes",
                reader.remaining()
            )));
        }
        Ok(value)
    }
}

/// Cursor over an input slice.
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader over `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Whether all input has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CodecError::NotEnoughBytes {
                needed: n,
                have: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a single byte.
    pub fn get_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian u32.
    pub fn get_u32(&mut self) -> CodecResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a big-endian u64.
    pub fn get_u64(&mut self) -> CodecResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read a big-endian i64.
    pub fn get_i64(&mut self) -> CodecResult<i64> {
        Ok(self.get_u64()? as i64)
    }

    /// Read `n` raw bytes.
    pub fn get_bytes(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        self.take(n)
    }

    /// Read a u32 length-prefixed byte string.
    pub fn get_var_bytes(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.get_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Read a u32 length prefix for a sequence.
    pub fn get_len(&mut self) -> CodecResult<usize> {
        Ok(self.get_u32()? as usize)
    }
}

/// Append a u32 length-prefixed byte string.
pub fn put_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Append a u32 sequence length prefix.
pub fn put_len(buf: &mut Vec<u8>, len: usize) {
    buf.extend_from_slice(&(len as u32).to_be_bytes());
}

impl Encode for u8 {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(*self);
    }
}

impl Encode for u32 {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl Encode for u64 {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl Decode for u8 {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        reader.get_u8()
    }
}

impl Decode for u32 {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        reader.get_u32()
    }
}

impl Decode for u64 {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        reader.get_u64()
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, buf: &mut Vec<u8>) {
        put_len(buf, self.len());
        for item in self {
            item.encode(buf);
        }
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            None => buf.push(0),
            Some(value) => {
                buf.push(1);
                value.encode(buf);
            }
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let len = reader.get_len()?;
        let mut out = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            out.push(T::decode(reader)?);
        }
        Ok(out)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        match reader.get_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(reader)?)),
            tag => Err(CodecError::Invalid(format!("Bad option tag: {tag}"))),
        }
    }
}

impl Encode for crate::Hash {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }
}

impl Decode for crate::Hash {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let bytes = reader.get_bytes(32)?;
        Ok(crate::Hash::from_slice(bytes).expect("length checked"))
    }
}

impl Encode for crate::U256 {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl Decode for crate::U256 {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let bytes = reader.get_bytes(32)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(crate::U256::from_be_bytes(&arr))
    }
}
