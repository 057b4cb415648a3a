//! Flat key encoding for hierarchical paths.
//!
//! A `(path, key)` pair is stored under
//! `[segment count][u16 BE len][segment]...[key]`. The key is written raw and
//! last, so every key below one fixed path shares the same prefix and keys
//! sort lexicographically within it.

use crate::error::{StoreError, StoreResult};

/// Borrowed hierarchical path.
pub type Path<'a> = &'a [&'a [u8]];

const MAX_SEGMENTS: usize = u8::MAX as usize;
const MAX_SEGMENT_LEN: usize = u16::MAX as usize;

/// Encodes the path portion of a flat key.
pub fn encode_path(path: &[&[u8]]) -> StoreResult<Vec<u8>> {
    if path.len() > MAX_SEGMENTS {
        return Err(StoreError::InvalidPath(format!(
            "{} segments exceeds the maximum of {}",
            path.len(),
            MAX_SEGMENTS
        )));
    }

    let capacity = 1 + path.iter().map(|s| 2 + s.len()).sum::<usize>();
    let mut out = Vec::with_capacity(capacity);
    out.push(path.len() as u8);
    for segment in path {
        if segment.len() > MAX_SEGMENT_LEN {
            return Err(StoreError::InvalidPath(format!(
                "segment of {} bytes exceeds the maximum of {}",
                segment.len(),
                MAX_SEGMENT_LEN
            )));
        }
        out.extend_from_slice(&(segment.len() as u16).to_be_bytes());
        out.extend_from_slice(segment);
    }
    Ok(out)
}

/// Encodes a full `(path, key)` address.
pub fn encode_key(path: &[&[u8]], key: &[u8]) -> StoreResult<Vec<u8>> {
    let mut out = encode_path(path)?;
    out.extend_from_slice(key);
    Ok(out)
}

/// Splits a flat key back into owned path segments and the key.
pub fn decode_key(flat: &[u8]) -> StoreResult<(Vec<Vec<u8>>, Vec<u8>)> {
    let (&count, mut rest) = flat
        .split_first()
        .ok_or_else(|| StoreError::CorruptedKey("empty key".into()))?;

    let mut path = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if rest.len() < 2 {
            return Err(StoreError::CorruptedKey("truncated segment length".into()));
        }
        let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        rest = &rest[2..];
        if rest.len() < len {
            return Err(StoreError::CorruptedKey("truncated segment".into()));
        }
        path.push(rest[..len].to_vec());
        rest = &rest[len..];
    }
    Ok((path, rest.to_vec()))
}
