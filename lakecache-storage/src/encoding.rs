// Copyright 2026 lakecache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use lakecache_common::{
    code::{CacheValue, Payload},
    error::{Error, ErrorKind, Result},
};
use serde::{Deserialize, Serialize};

use crate::entry::{CacheEntry, Encoding};

/// Payloads longer than this many bytes are compressed by default.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 200_000;

/// Encoding policy config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Payloads strictly longer than the threshold are compressed.
    pub compression_threshold: usize,
    /// Zstd compression level, `0` means the zstd default.
    pub zstd_level: i32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            zstd_level: 0,
        }
    }
}

/// Encoding policy.
///
/// Byte-like values are stored raw, structured values as JSON. Payloads above the threshold are compressed with zstd.
/// The chosen [`Encoding`] is stored with the entry and decoding dispatches on it only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder {
    config: EncoderConfig,
}

impl Encoder {
    /// Create an encoder with the given config.
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Get the config.
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode a value, or a negative entry if `value` is `None`.
    pub fn encode<V>(&self, id: impl Into<String>, value: Option<&V>) -> Result<CacheEntry>
    where
        V: CacheValue,
    {
        let id = id.into();
        let Some(value) = value else {
            return Ok(CacheEntry::tombstone(id));
        };

        let (data, encoding) = match value.to_payload()? {
            Payload::Bytes(bytes) if bytes.len() > self.config.compression_threshold => {
                (self.compress(&bytes)?, Encoding::Compressed)
            }
            Payload::Bytes(bytes) => (bytes, Encoding::Raw),
            Payload::Json(bytes) if bytes.len() > self.config.compression_threshold => {
                (self.compress(&bytes)?, Encoding::JsonCompressed)
            }
            Payload::Json(bytes) => (bytes, Encoding::Json),
        };

        Ok(CacheEntry {
            id,
            data: Some(data),
            encoding,
        })
    }

    /// Decode an entry.
    ///
    /// Returns `Ok(None)` for a negative entry.
    pub fn decode<V>(entry: CacheEntry) -> Result<Option<V>>
    where
        V: CacheValue,
    {
        let payload = match (entry.encoding, entry.data) {
            (Encoding::None, None) => return Ok(None),
            (Encoding::Raw, Some(data)) => Payload::Bytes(data),
            (Encoding::Compressed, Some(data)) => Payload::Bytes(Self::decompress(&data)?),
            (Encoding::Json, Some(data)) => Payload::Json(data),
            (Encoding::JsonCompressed, Some(data)) => Payload::Json(Self::decompress(&data)?),
            (encoding, data) => return Err(Error::encoding_mismatch(encoding, data.is_some())),
        };
        V::from_payload(payload).map(Some)
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::bulk::compress(data, self.config.zstd_level)
            .map_err(|e| Error::new(ErrorKind::Compression, "zstd compress failed").with_source(e))
    }

    fn decompress(data: &[u8]) -> Result<Vec<u8>> {
        zstd::stream::decode_all(data)
            .map_err(|e| Error::new(ErrorKind::Compression, "zstd decompress failed").with_source(e))
    }
}

#[cfg(test)]
mod tests {
    use lakecache_common::code::Json;
    use serde::{Deserialize, Serialize};

    use super::*;

    const THRESHOLD: usize = 1024;

    fn encoder() -> Encoder {
        Encoder::new(EncoderConfig {
            compression_threshold: THRESHOLD,
            ..Default::default()
        })
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Shelf {
        name: String,
        books: Vec<String>,
    }

    #[test]
    fn test_threshold_boundary() {
        let encoder = encoder();

        let at = vec![7u8; THRESHOLD];
        let entry = encoder.encode("at", Some(&at)).unwrap();
        assert_eq!(entry.encoding, Encoding::Raw);
        assert_eq!(entry.data.as_ref().unwrap().len(), THRESHOLD);
        assert_eq!(Encoder::decode::<Vec<u8>>(entry).unwrap(), Some(at));

        let over = vec![7u8; THRESHOLD + 1];
        let entry = encoder.encode("over", Some(&over)).unwrap();
        assert_eq!(entry.encoding, Encoding::Compressed);
        assert!(entry.data.as_ref().unwrap().len() < THRESHOLD);
        assert_eq!(Encoder::decode::<Vec<u8>>(entry).unwrap(), Some(over));
    }

    #[test]
    fn test_default_threshold() {
        let encoder = Encoder::default();
        let at = vec![1u8; DEFAULT_COMPRESSION_THRESHOLD];
        assert_eq!(encoder.encode("a", Some(&at)).unwrap().encoding, Encoding::Raw);
        let over = vec![1u8; DEFAULT_COMPRESSION_THRESHOLD + 1];
        assert_eq!(encoder.encode("b", Some(&over)).unwrap().encoding, Encoding::Compressed);
    }

    #[test]
    fn test_string_encoding() {
        let encoder = encoder();

        let short = "a short note".to_string();
        let entry = encoder.encode("s", Some(&short)).unwrap();
        assert_eq!(entry.encoding, Encoding::Raw);
        assert_eq!(entry.data.as_deref(), Some(short.as_bytes()));
        assert_eq!(Encoder::decode::<String>(entry).unwrap(), Some(short));

        let long = "lorem ipsum ".repeat(200);
        let entry = encoder.encode("l", Some(&long)).unwrap();
        assert_eq!(entry.encoding, Encoding::Compressed);
        assert_eq!(Encoder::decode::<String>(entry).unwrap(), Some(long));
    }

    #[test]
    fn test_json_encoding() {
        let encoder = encoder();

        let small = Json(Shelf {
            name: "to read".to_string(),
            books: vec!["Dune".to_string()],
        });
        let entry = encoder.encode("small", Some(&small)).unwrap();
        assert_eq!(entry.encoding, Encoding::Json);
        assert_eq!(Encoder::decode::<Json<Shelf>>(entry).unwrap(), Some(small));

        let large = Json(Shelf {
            name: "everything".to_string(),
            books: (0..200).map(|i| format!("book number {i}")).collect(),
        });
        let entry = encoder.encode("large", Some(&large)).unwrap();
        assert_eq!(entry.encoding, Encoding::JsonCompressed);
        assert_eq!(Encoder::decode::<Json<Shelf>>(entry).unwrap(), Some(large));
    }

    #[test]
    fn test_tombstone() {
        let entry = encoder().encode::<Vec<u8>>("none", None).unwrap();
        assert_eq!(entry, CacheEntry::tombstone("none"));
        assert_eq!(Encoder::decode::<Vec<u8>>(entry).unwrap(), None);
    }

    #[test]
    fn test_decode_dispatches_on_tag() {
        // Compressed-looking bytes tagged raw stay raw.
        let compressed = zstd::bulk::compress(b"hello", 0).unwrap();
        let entry = CacheEntry {
            id: "x".to_string(),
            data: Some(compressed.clone()),
            encoding: Encoding::Raw,
        };
        assert_eq!(Encoder::decode::<Vec<u8>>(entry).unwrap(), Some(compressed));
    }

    #[test]
    fn test_decode_errors() {
        let mismatch = CacheEntry {
            id: "x".to_string(),
            data: Some(vec![1]),
            encoding: Encoding::None,
        };
        assert_eq!(
            Encoder::decode::<Vec<u8>>(mismatch).unwrap_err().kind(),
            ErrorKind::Encoding
        );

        let missing = CacheEntry {
            id: "x".to_string(),
            data: None,
            encoding: Encoding::Json,
        };
        assert_eq!(Encoder::decode::<Vec<u8>>(missing).unwrap_err().kind(), ErrorKind::Encoding);

        let garbage = CacheEntry {
            id: "x".to_string(),
            data: Some(vec![1, 2, 3, 4]),
            encoding: Encoding::Compressed,
        };
        assert_eq!(
            Encoder::decode::<Vec<u8>>(garbage).unwrap_err().kind(),
            ErrorKind::Compression
        );
    }
}
