//! Canonical encoding for on-store records.
//!
//! Inode records and directory blobs must round-trip deterministically so
//! that two implementations over the same Store interoperate.
//!
//! # Encoding rules
//!
//! - Integers: little-endian
//! - Strings: u32 byte length followed by UTF-8 bytes
//! - Sequences: u32 length prefix followed by elements
//! - Options: 0x00 for None, 0x01 + value for Some
//! - Maps: u32 count + key-value pairs sorted by key bytes

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Errors during canonical decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough bytes to decode
    #[error("insufficient bytes: expected {expected}, got {available}")]
    InsufficientBytes {
        /// Expected number of bytes
        expected: usize,
        /// Actually available bytes
        available: usize,
    },

    /// Invalid UTF-8 string
    #[error("invalid UTF-8 string: {0}")]
    InvalidUtf8(String),

    /// Invalid tag byte
    #[error("invalid tag: {0}")]
    InvalidTag(u32),

    /// Duplicate map key
    #[error("duplicate map key detected")]
    DuplicateMapKey,

    /// Map keys not sorted
    #[error("map keys not sorted")]
    UnsortedMapKeys,

    /// Custom decode error
    #[error("{0}")]
    Custom(String),
}

/// Trait for types with a canonical byte representation.
pub trait CanonicalEncode {
    /// Encodes the value into the buffer.
    fn encode(&self, buf: &mut BytesMut);

    /// Returns the encoded representation.
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Returns the encoded representation as a Vec.
    fn to_vec(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }
}

/// Trait for types decodable from canonical bytes.
pub trait CanonicalDecode: Sized {
    /// Decodes from the buffer, advancing it.
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError>;

    /// Decodes from a byte slice.
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut buf = Bytes::copy_from_slice(bytes);
        Self::decode(&mut buf)
    }
}

fn need(buf: &Bytes, n: usize) -> Result<(), DecodeError> {
    if buf.remaining() < n {
        return Err(DecodeError::InsufficientBytes {
            expected: n,
            available: buf.remaining(),
        });
    }
    Ok(())
}

macro_rules! impl_int {
    ($($ty:ty => $put:ident / $get:ident, $width:expr;)*) => {
        $(
            impl CanonicalEncode for $ty {
                fn encode(&self, buf: &mut BytesMut) {
                    buf.$put(*self);
                }
            }

            impl CanonicalDecode for $ty {
                fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
                    need(buf, $width)?;
                    Ok(buf.$get())
                }
            }
        )*
    };
}

impl_int! {
    u16 => put_u16_le / get_u16_le, 2;
    u32 => put_u32_le / get_u32_le, 4;
    u64 => put_u64_le / get_u64_le, 8;
    i64 => put_i64_le / get_i64_le, 8;
}

impl CanonicalEncode for u8 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(*self);
    }
}

impl CanonicalDecode for u8 {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        need(buf, 1)?;
        Ok(buf.get_u8())
    }
}

impl CanonicalEncode for String {
    fn encode(&self, buf: &mut BytesMut) {
        self.as_str().encode(buf);
    }
}

impl CanonicalEncode for &str {
    fn encode(&self, buf: &mut BytesMut) {
        let bytes = self.as_bytes();
        assert!(bytes.len() <= u32::MAX as usize, "string length exceeds u32::MAX");
        (bytes.len() as u32).encode(buf);
        buf.put_slice(bytes);
    }
}

impl CanonicalDecode for String {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let len = u32::decode(buf)? as usize;
        need(buf, len)?;
        let bytes = buf.copy_to_bytes(len);
        String::from_utf8(bytes.to_vec()).map_err(|e| DecodeError::InvalidUtf8(e.to_string()))
    }
}

impl<T: CanonicalEncode> CanonicalEncode for Vec<T> {
    fn encode(&self, buf: &mut BytesMut) {
        assert!(self.len() <= u32::MAX as usize, "sequence length exceeds u32::MAX");
        (self.len() as u32).encode(buf);
        for item in self {
            item.encode(buf);
        }
    }
}

impl<T: CanonicalDecode> CanonicalDecode for Vec<T> {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let len = u32::decode(buf)? as usize;
        let mut vec = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            vec.push(T::decode(buf)?);
        }
        Ok(vec)
    }
}

impl<T: CanonicalEncode> CanonicalEncode for Option<T> {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            None => buf.put_u8(0x00),
            Some(value) => {
                buf.put_u8(0x01);
                value.encode(buf);
            }
        }
    }
}

impl<T: CanonicalDecode> CanonicalDecode for Option<T> {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        match u8::decode(buf)? {
            0x00 => Ok(None),
            0x01 => Ok(Some(T::decode(buf)?)),
            tag => Err(DecodeError::InvalidTag(tag as u32)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_layout() {
        assert_eq!(0x1234_5678u32.to_vec(), vec![0x78, 0x56, 0x34, 0x12]);
        assert_eq!(1u64.to_vec(), vec![1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_string_layout() {
        assert_eq!(
            String::from("hi").to_vec(),
            vec![0x02, 0x00, 0x00, 0x00, b'h', b'i']
        );
    }

    #[test]
    fn test_roundtrip() {
        let v: Vec<u32> = vec![1, 2, 3];
        assert_eq!(Vec::<u32>::from_bytes(&v.to_vec()).unwrap(), v);

        let s = String::from("dir entry");
        assert_eq!(String::from_bytes(&s.to_vec()).unwrap(), s);

        let o: Option<u64> = Some(42);
        assert_eq!(Option::<u64>::from_bytes(&o.to_vec()).unwrap(), o);
    }

    #[test]
    fn test_truncated_input() {
        let err = u64::from_bytes(&[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InsufficientBytes {
                expected: 8,
                available: 3
            }
        );
    }

    #[test]
    fn test_bad_option_tag() {
        let err = Option::<u32>::from_bytes(&[0x07]).unwrap_err();
        assert_eq!(err, DecodeError::InvalidTag(7));
    }
}
