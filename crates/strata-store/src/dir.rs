//! Directory blob codec.
//!
//! A directory's data blob is its name→ino map: a u32 entry count
//! followed by (name, ino) pairs sorted by name bytes. Sorting makes the
//! encoding deterministic so independent implementations over the same
//! store interoperate; decoding rejects unsorted or duplicate names.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use strata_core::encoding::{CanonicalDecode, CanonicalEncode, DecodeError};
use strata_core::Ino;

/// In-memory form of a directory's contents.
pub type DirMap = BTreeMap<String, Ino>;

/// Encodes a directory map.
pub fn encode_dir(map: &DirMap) -> Bytes {
    let mut buf = BytesMut::new();
    assert!(map.len() <= u32::MAX as usize, "directory too large");
    (map.len() as u32).encode(&mut buf);
    for (name, ino) in map {
        name.as_str().encode(&mut buf);
        ino.encode(&mut buf);
    }
    buf.freeze()
}

/// Decodes a directory map, validating entry ordering and uniqueness.
pub fn decode_dir(bytes: &[u8]) -> Result<DirMap, DecodeError> {
    let mut buf = Bytes::copy_from_slice(bytes);
    let len = u32::decode(&mut buf)? as usize;
    let mut map = DirMap::new();
    let mut prev: Option<String> = None;
    for _ in 0..len {
        let name = String::decode(&mut buf)?;
        let ino = Ino::decode(&mut buf)?;
        if let Some(prev) = &prev {
            if *prev == name {
                return Err(DecodeError::DuplicateMapKey);
            }
            if prev.as_bytes() > name.as_bytes() {
                return Err(DecodeError::UnsortedMapKeys);
            }
        }
        prev = Some(name.clone());
        map.insert(name, ino);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dir() {
        let map = DirMap::new();
        let encoded = encode_dir(&map);
        assert_eq!(encoded.as_ref(), &[0, 0, 0, 0]);
        assert_eq!(decode_dir(&encoded).unwrap(), map);
    }

    #[test]
    fn test_roundtrip_is_sorted() {
        let mut map = DirMap::new();
        map.insert("zebra".into(), Ino(3));
        map.insert("apple".into(), Ino(1));
        map.insert("mango".into(), Ino(2));

        let encoded = encode_dir(&map);
        let decoded = decode_dir(&encoded).unwrap();
        assert_eq!(decoded, map);

        // Names appear in byte order in the encoding.
        let names: Vec<_> = decoded.keys().cloned().collect();
        assert_eq!(names, vec!["apple", "mango", "zebra"]);
    }

    #[test]
    fn test_rejects_unsorted() {
        let mut buf = BytesMut::new();
        2u32.encode(&mut buf);
        "b".encode(&mut buf);
        Ino(1).encode(&mut buf);
        "a".encode(&mut buf);
        Ino(2).encode(&mut buf);
        assert_eq!(
            decode_dir(&buf.freeze()).unwrap_err(),
            DecodeError::UnsortedMapKeys
        );
    }

    #[test]
    fn test_rejects_duplicates() {
        let mut buf = BytesMut::new();
        2u32.encode(&mut buf);
        "a".encode(&mut buf);
        Ino(1).encode(&mut buf);
        "a".encode(&mut buf);
        Ino(2).encode(&mut buf);
        assert_eq!(
            decode_dir(&buf.freeze()).unwrap_err(),
            DecodeError::DuplicateMapKey
        );
    }
}
