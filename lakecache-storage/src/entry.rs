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

use std::{fmt::Display, str::FromStr};

use lakecache_common::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};

/// How the payload of a [`CacheEntry`] is interpreted on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Encoding {
    /// Natural bytes of a byte-like value.
    Raw,
    /// Zstd-compressed bytes of a byte-like value.
    Compressed,
    /// JSON of a structured value.
    Json,
    /// Zstd-compressed JSON of a structured value.
    JsonCompressed,
    /// Negative entry, the key is known to have no value.
    None,
}

impl Encoding {
    /// All encodings.
    pub const ALL: [Encoding; 5] = [
        Encoding::Raw,
        Encoding::Compressed,
        Encoding::Json,
        Encoding::JsonCompressed,
        Encoding::None,
    ];

    /// The persisted tag of the encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Raw => "raw",
            Encoding::Compressed => "compressed",
            Encoding::Json => "json",
            Encoding::JsonCompressed => "jsonCompressed",
            Encoding::None => "none",
        }
    }

    /// Check if the payload is compressed.
    pub fn is_compressed(&self) -> bool {
        matches!(self, Encoding::Compressed | Encoding::JsonCompressed)
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Encoding::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| Error::new(ErrorKind::Parse, "unknown encoding tag").with_context("tag", s))
    }
}

/// The unit of durable persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The key hash.
    pub id: String,
    /// The encoded payload, absent only for [`Encoding::None`].
    pub data: Option<Vec<u8>>,
    /// How to interpret `data`.
    pub encoding: Encoding,
}

impl CacheEntry {
    /// Create a negative entry.
    pub fn tombstone(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: None,
            encoding: Encoding::None,
        }
    }

    /// Cost of the entry for memory accounting.
    ///
    /// The encoded payload length is used so both tiers account the same footprint. Entries without a meaningful
    /// size cost `1`.
    pub fn cost(&self) -> usize {
        self.data.as_ref().map(|data| data.len()).unwrap_or_default().max(1)
    }
}
