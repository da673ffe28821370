//! Fast-cache value encoding.
//!
//! ```text
//! ┌────────────┬──────────────────────┬─────────────────┐
//! │ len: u16 BE│ content type (UTF-8) │ raw image bytes │
//! └────────────┴──────────────────────┴─────────────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::StoreError;

/// Size of the length prefix.
const PREFIX_LEN: usize = 2;

/// A decoded fast-cache value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub content_type: String,
    pub data: Bytes,
}

/// Pack a content type and payload into one value.
///
/// Fails if the content type does not fit the 16-bit length prefix.
pub fn encode_envelope(content_type: &str, data: &[u8]) -> Result<Bytes, StoreError> {
    let type_len = u16::try_from(content_type.len()).map_err(|_| {
        StoreError::Backend(format!(
            "content type too long for envelope: {} bytes",
            content_type.len()
        ))
    })?;

    let mut buf = BytesMut::with_capacity(PREFIX_LEN + content_type.len() + data.len());
    buf.put_u16(type_len);
    buf.put_slice(content_type.as_bytes());
    buf.put_slice(data);
    Ok(buf.freeze())
}

/// Unpack a value written by [`encode_envelope`].
///
/// The payload is a zero-copy slice of `raw`. Truncated prefixes, a length
/// running past the end, and non-UTF-8 content types are all rejected.
pub fn decode_envelope(raw: &Bytes) -> Result<Envelope, StoreError> {
    if raw.len() < PREFIX_LEN {
        return Err(malformed("missing length prefix"));
    }

    let type_len = u16::from_be_bytes([raw[0], raw[1]]) as usize;
    let data_start = PREFIX_LEN + type_len;
    if raw.len() < data_start {
        return Err(malformed("content type runs past end of value"));
    }

    let content_type = std::str::from_utf8(&raw[PREFIX_LEN..data_start])
        .map_err(|_| malformed("content type is not UTF-8"))?
        .to_string();

    Ok(Envelope {
        content_type,
        data: raw.slice(data_start..),
    })
}

fn malformed(reason: &str) -> StoreError {
    StoreError::Backend(format!("malformed cache envelope: {}", reason))
}
