//! Strict and canonical CBOR helpers on top of [`ciborium`].
//!
//! Authenticators emit CTAP2 canonical CBOR and relying parties are expected
//! to be strict consumers: a decoded item must cover its input exactly (unless
//! the caller explicitly decodes a prefix), maps must not contain duplicate
//! keys, and the indefinite-length encodings have no allowed context. On the
//! way out, map keys are ordered by encoded length and then byte-wise, which
//! is the CTAP2 canonical form.

use std::io::Cursor;

use ciborium::value::Value;

/// Failure while decoding or encoding CBOR, with the input offset where the
/// decoder gave up when one is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CborError {
    /// Byte offset into the input, if the failure maps to one.
    pub offset: Option<usize>,
    /// Short human readable reason.
    pub reason: String,
}

impl std::fmt::Display for CborError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} at offset {offset}", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

impl std::error::Error for CborError {}

impl CborError {
    fn new(offset: Option<usize>, reason: impl Into<String>) -> Self {
        Self {
            offset,
            reason: reason.into(),
        }
    }
}

fn de_error(err: ciborium::de::Error<std::io::Error>) -> CborError {
    match err {
        ciborium::de::Error::Io(e) => CborError::new(None, format!("io: {e}")),
        ciborium::de::Error::Syntax(offset) => CborError::new(Some(offset), "syntax error"),
        ciborium::de::Error::Semantic(offset, reason) => CborError::new(offset, reason),
        ciborium::de::Error::RecursionLimitExceeded => {
            CborError::new(None, "recursion limit exceeded")
        }
    }
}

/// Decode a single CBOR item covering the whole of `bytes`.
///
/// Rejects trailing bytes, duplicate map keys anywhere in the decoded tree,
/// and indefinite-length items.
pub fn from_slice_strict(bytes: &[u8]) -> Result<Value, CborError> {
    let mut cursor = Cursor::new(bytes);
    let value = value_from_reader(&mut cursor)?;
    let consumed = cursor.position() as usize;
    if consumed != bytes.len() {
        return Err(CborError::new(
            Some(consumed),
            format!("{} trailing bytes after item", bytes.len() - consumed),
        ));
    }
    Ok(value)
}

/// Decode a single CBOR item from the cursor, leaving it positioned at the
/// first byte after the item.
///
/// This is the sub-decoder used where a CBOR item is embedded in a larger
/// binary layout, such as the COSE key inside attested credential data.
/// Duplicate map keys and indefinite-length items are rejected; trailing
/// bytes are the caller's business.
pub fn value_from_reader(cursor: &mut Cursor<&[u8]>) -> Result<Value, CborError> {
    let start = cursor.position() as usize;
    // ciborium accepts the indefinite-length forms, which have no allowed
    // context here, so check the framing before decoding.
    scan_definite_item(&cursor.get_ref()[start..], start)?;
    let value: Value = ciborium::de::from_reader(&mut *cursor).map_err(|e| {
        let mut err = de_error(e);
        // ciborium reports offsets relative to where the reader started.
        err.offset = err.offset.map(|o| o + start);
        err
    })?;
    reject_duplicate_keys(&value)?;
    Ok(value)
}

const MAX_NESTING: u8 = 128;

/// Walk the framing of the first encoded item in `buf`, rejecting any
/// indefinite-length encoding inside it. `base` is the offset of `buf` in the
/// overall input, for error reporting. Bytes after the item are not looked at.
fn scan_definite_item(buf: &[u8], base: usize) -> Result<(), CborError> {
    scan_item(buf, 0, base, 0).map(|_| ())
}

fn scan_item(buf: &[u8], mut pos: usize, base: usize, depth: u8) -> Result<usize, CborError> {
    if depth > MAX_NESTING {
        return Err(CborError::new(Some(base + pos), "nesting too deep"));
    }
    let truncated = |at: usize| CborError::new(Some(base + at), "truncated item");

    let initial = *buf.get(pos).ok_or_else(|| truncated(pos))?;
    pos += 1;
    let major = initial >> 5;
    let additional = initial & 0x1f;
    if additional == 31 {
        return Err(CborError::new(
            Some(base + pos - 1),
            "indefinite-length item",
        ));
    }
    let argument = match additional {
        0..=23 => u64::from(additional),
        24..=27 => {
            let n = 1usize << (additional - 24);
            let bytes = buf.get(pos..pos + n).ok_or_else(|| truncated(pos))?;
            pos += n;
            bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
        }
        _ => {
            return Err(CborError::new(
                Some(base + pos - 1),
                "reserved additional information",
            ))
        }
    };

    match major {
        // integers, simple values and floats carry no payload beyond the
        // argument bytes
        0 | 1 | 7 => {}
        2 | 3 => {
            let len = usize::try_from(argument).map_err(|_| truncated(pos))?;
            pos = pos
                .checked_add(len)
                .filter(|end| *end <= buf.len())
                .ok_or_else(|| truncated(pos))?;
        }
        4 => {
            for _ in 0..argument {
                pos = scan_item(buf, pos, base, depth + 1)?;
            }
        }
        5 => {
            for _ in 0..argument {
                pos = scan_item(buf, pos, base, depth + 1)?;
                pos = scan_item(buf, pos, base, depth + 1)?;
            }
        }
        6 => {
            pos = scan_item(buf, pos, base, depth + 1)?;
        }
        // major is three bits, all values covered above
        _ => unreachable!(),
    }
    Ok(pos)
}

fn reject_duplicate_keys(value: &Value) -> Result<(), CborError> {
    match value {
        Value::Map(entries) => {
            let mut keys: Vec<Vec<u8>> = entries
                .iter()
                .map(|(k, _)| encode_value(k))
                .collect::<Result<_, _>>()?;
            keys.sort_unstable();
            if keys.windows(2).any(|w| w[0] == w[1]) {
                return Err(CborError::new(None, "duplicate map key"));
            }
            for (k, v) in entries {
                reject_duplicate_keys(k)?;
                reject_duplicate_keys(v)?;
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(reject_duplicate_keys),
        Value::Tag(_, inner) => reject_duplicate_keys(inner),
        _ => Ok(()),
    }
}

fn encode_value(value: &Value) -> Result<Vec<u8>, CborError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| CborError::new(None, format!("encode: {e}")))?;
    Ok(buf)
}

/// Encode a value in CTAP2 canonical form.
///
/// Map keys are sorted by their encoded length, then byte-wise. Integers are
/// already written in their shortest form by the serializer, and all items get
/// definite lengths.
pub fn to_vec_canonical(value: &Value) -> Result<Vec<u8>, CborError> {
    encode_value(&canonicalize(value)?)
}

fn canonicalize(value: &Value) -> Result<Value, CborError> {
    Ok(match value {
        Value::Map(entries) => {
            let mut encoded: Vec<(Vec<u8>, Value, Value)> = entries
                .iter()
                .map(|(k, v)| {
                    let key = canonicalize(k)?;
                    let val = canonicalize(v)?;
                    Ok((encode_value(&key)?, key, val))
                })
                .collect::<Result<_, CborError>>()?;
            encoded.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));
            Value::Map(encoded.into_iter().map(|(_, k, v)| (k, v)).collect())
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(canonicalize)
                .collect::<Result<_, CborError>>()?,
        ),
        Value::Tag(tag, inner) => Value::Tag(*tag, Box::new(canonicalize(inner)?)),
        other => other.clone(),
    })
}

#[cfg(test)]
mod tests {
    use ciborium::cbor;

    use super::*;

    #[test]
    fn trailing_bytes_are_rejected() {
        // {} followed by one stray byte
        let err = from_slice_strict(&[0xa0, 0x00]).unwrap_err();
        assert_eq!(err.offset, Some(1));
    }

    #[test]
    fn duplicate_map_keys_are_rejected() {
        // {1: 2, 1: 3}
        let err = from_slice_strict(&[0xa2, 0x01, 0x02, 0x01, 0x03]).unwrap_err();
        assert!(err.reason.contains("duplicate"));
    }

    #[test]
    fn indefinite_length_items_are_rejected() {
        // {_ 1: 2}, [_ 1], (_ h'00'), (_ "a"): indefinite map, array, byte
        // string and text string
        for encoding in [
            [0xbf, 0x01, 0x02, 0xff].as_slice(),
            &[0x9f, 0x01, 0xff],
            &[0x5f, 0x41, 0x00, 0xff],
            &[0x7f, 0x61, 0x61, 0xff],
        ] {
            let err = from_slice_strict(encoding).unwrap_err();
            assert!(
                err.reason.contains("indefinite"),
                "expected indefinite-length rejection, got {err}"
            );
        }
    }

    #[test]
    fn nested_indefinite_item_is_rejected() {
        // {1: [_ 2]}: definite map holding an indefinite array
        let err = from_slice_strict(&[0xa1, 0x01, 0x9f, 0x02, 0xff]).unwrap_err();
        assert_eq!(err.offset, Some(2));
        assert!(err.reason.contains("indefinite"));
    }

    #[test]
    fn sub_decoder_rejects_indefinite_items_mid_buffer() {
        // one good item, then an indefinite map where the next item starts
        let input = [0x01, 0xbf, 0xff, 0x00];
        let mut cursor = Cursor::new(input.as_slice());
        value_from_reader(&mut cursor).expect("definite prefix should decode");
        let err = value_from_reader(&mut cursor).unwrap_err();
        assert_eq!(err.offset, Some(1));
        assert!(err.reason.contains("indefinite"));
    }

    #[test]
    fn sub_decoder_leaves_cursor_after_item() {
        let input = [0xa1, 0x01, 0x02, 0xff, 0xff];
        let mut cursor = Cursor::new(input.as_slice());
        let value = value_from_reader(&mut cursor).unwrap();
        assert_eq!(value, cbor!({1 => 2}).unwrap());
        assert_eq!(cursor.position(), 3);
    }

    #[test]
    fn canonical_encoding_sorts_map_keys() {
        let scrambled = Value::Map(vec![
            (Value::Integer(24.into()), Value::Integer(1.into())),
            (Value::Integer((-1).into()), Value::Integer(2.into())),
            (Value::Integer(1.into()), Value::Integer(3.into())),
            (Value::Text("a".into()), Value::Integer(4.into())),
        ]);
        let bytes = to_vec_canonical(&scrambled).unwrap();
        // one-byte keys first (1, -1, "a"), then the two-byte encoding of 24
        assert_eq!(
            bytes,
            vec![0xa4, 0x01, 0x03, 0x20, 0x02, 0x61, 0x61, 0x04, 0x18, 0x18, 0x01]
        );
    }

    #[test]
    fn canonical_input_round_trips_unchanged() {
        let canonical = vec![0xa2, 0x01, 0x02, 0x03, 0x26];
        let decoded = from_slice_strict(&canonical).unwrap();
        assert_eq!(to_vec_canonical(&decoded).unwrap(), canonical);
    }
}
