//! Stored text body decoding
//!
//! Book tables hold their text either as plain TEXT or as a compressed BLOB.
//! The engine never negotiates which: a binary payload goes through the
//! codec, a textual payload is used verbatim.

use anyhow::Context;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rusqlite::types::ValueRef;
use std::io::{Read, Write};

/// Opaque encode/decode service for stored text bodies
pub trait TextCodec: Send + Sync {
    fn decode(&self, payload: &[u8]) -> anyhow::Result<String>;

    fn encode(&self, text: &str) -> anyhow::Result<Vec<u8>>;
}

/// zlib-compressed UTF-8
#[derive(Debug, Clone, Copy, Default)]
pub struct ZlibCodec;

impl TextCodec for ZlibCodec {
    fn decode(&self, payload: &[u8]) -> anyhow::Result<String> {
        let mut out = String::new();
        ZlibDecoder::new(payload)
            .read_to_string(&mut out)
            .context("zlib body did not inflate to UTF-8 text")?;
        Ok(out)
    }

    fn encode(&self, text: &str) -> anyhow::Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes())?;
        Ok(encoder.finish()?)
    }
}

/// Raw body as read from the row, before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredBody {
    Text(String),
    Compressed(Vec<u8>),
    Empty,
}

impl StoredBody {
    pub fn from_value(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Text(bytes) => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Self::Compressed(bytes.to_vec()),
            ValueRef::Null => Self::Empty,
            ValueRef::Integer(i) => Self::Text(i.to_string()),
            ValueRef::Real(f) => Self::Text(f.to_string()),
        }
    }

    /// Decode into display text; a body that fails to decode becomes empty
    pub fn decode(self, codec: &dyn TextCodec) -> String {
        match self {
            Self::Text(text) => text,
            Self::Empty => String::new(),
            Self::Compressed(bytes) => match codec.decode(&bytes) {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!("Body decode failed, using empty text: {:#}", e);
                    String::new()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zlib_round_trip_arabic() {
        let codec = ZlibCodec;
        let text = "بسم الله الرحمن الرحيم";
        let packed = codec.encode(text).unwrap();
        assert_ne!(packed, text.as_bytes());
        assert_eq!(codec.decode(&packed).unwrap(), text);
    }

    #[test]
    fn test_text_payload_used_verbatim() {
        let body = StoredBody::from_value(ValueRef::Text("نص".as_bytes()));
        assert_eq!(body.decode(&ZlibCodec), "نص");
    }

    #[test]
    fn test_corrupt_blob_decodes_to_empty() {
        let body = StoredBody::from_value(ValueRef::Blob(&[0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(body.decode(&ZlibCodec), "");
    }

    #[test]
    fn test_null_is_empty() {
        assert_eq!(StoredBody::from_value(ValueRef::Null), StoredBody::Empty);
    }
}
