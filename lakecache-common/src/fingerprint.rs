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

//! Stable fingerprints for cache keys.
//!
//! A key is serialized to canonical JSON (object keys sorted, no extraneous escaping), hashed with XxHash64 and
//! rendered as URL-safe base64 of the minimal big-endian representation of the hash. The result is short, opaque and
//! safe to use both as a file name and as a primary key.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;
use twox_hash::XxHash64;

use crate::error::Result;

/// Seed of the fingerprint hash. Changing it invalidates every persisted namespace.
pub const FINGERPRINT_SEED: u64 = 0;

/// Serialize the key into its canonical byte form.
///
/// Going through [`serde_json::Value`] sorts object keys, so a struct and a map with the same fields produce the same
/// bytes regardless of declaration order.
pub fn canonical_bytes<K>(key: &K) -> Result<Vec<u8>>
where
    K: Serialize + ?Sized,
{
    let value = serde_json::to_value(key)?;
    let bytes = serde_json::to_vec(&value)?;
    Ok(bytes)
}

/// Fingerprint an encodable key.
///
/// Returns `None` if the key cannot be serialized. Callers treat such keys as uncacheable.
pub fn fingerprint<K>(key: &K) -> Option<String>
where
    K: Serialize + ?Sized,
{
    match canonical_bytes(key) {
        Ok(bytes) => Some(fingerprint_bytes(&bytes)),
        Err(e) => {
            tracing::debug!("[fingerprint]: key is not serializable, treat as uncacheable, error: {e}");
            None
        }
    }
}

/// Fingerprint bytes that are already in canonical form.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    render(XxHash64::oneshot(FINGERPRINT_SEED, bytes))
}

/// Render a hash as URL-safe base64 of its minimal big-endian bytes.
///
/// Leading zero bytes are stripped, a zero hash keeps a single byte.
fn render(hash: u64) -> String {
    let bytes = hash.to_be_bytes();
    let skip = ((hash.leading_zeros() / 8) as usize).min(bytes.len() - 1);
    URL_SAFE_NO_PAD.encode(&bytes[skip..])
}
