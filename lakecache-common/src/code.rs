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

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};

/// The natural serialized form of a cached value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Byte-like values stored as they are.
    Bytes(Vec<u8>),
    /// Structured values stored as JSON.
    Json(Vec<u8>),
}

impl Payload {
    /// Length of the payload in bytes.
    pub fn len(&self) -> usize {
        match self {
            Payload::Bytes(bytes) | Payload::Json(bytes) => bytes.len(),
        }
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Value that can be stored in a lakecache instance.
///
/// Byte sequences and strings map to [`Payload::Bytes`], structured values map to [`Payload::Json`]. Wrap any serde
/// type with [`Json`] to cache it.
pub trait CacheValue: Sized + Send + Sync + Clone + Debug + 'static {
    /// Convert the value into its natural payload.
    fn to_payload(&self) -> Result<Payload>;

    /// Rebuild the value from a payload produced by [`CacheValue::to_payload`].
    fn from_payload(payload: Payload) -> Result<Self>;
}

impl CacheValue for Vec<u8> {
    fn to_payload(&self) -> Result<Payload> {
        Ok(Payload::Bytes(self.clone()))
    }

    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Bytes(bytes) => Ok(bytes),
            Payload::Json(bytes) => Ok(serde_json::from_slice(&bytes)?),
        }
    }
}

impl CacheValue for bytes::Bytes {
    fn to_payload(&self) -> Result<Payload> {
        Ok(Payload::Bytes(self.to_vec()))
    }

    fn from_payload(payload: Payload) -> Result<Self> {
        Vec::<u8>::from_payload(payload).map(bytes::Bytes::from)
    }
}

impl CacheValue for String {
    fn to_payload(&self) -> Result<Payload> {
        Ok(Payload::Bytes(self.as_bytes().to_vec()))
    }

    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Bytes(bytes) => String::from_utf8(bytes)
                .map_err(|e| Error::new(ErrorKind::Parse, "cached string is not valid utf-8").with_source(e)),
            Payload::Json(bytes) => Ok(serde_json::from_slice(&bytes)?),
        }
    }
}

/// Wrapper that caches any serde type as JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwrap the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Json<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> std::ops::Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> CacheValue for Json<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + Clone + Debug + 'static,
{
    fn to_payload(&self) -> Result<Payload> {
        Ok(Payload::Json(serde_json::to_vec(&self.0)?))
    }

    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Json(bytes) | Payload::Bytes(bytes) => Ok(Json(serde_json::from_slice(&bytes)?)),
        }
    }
}
