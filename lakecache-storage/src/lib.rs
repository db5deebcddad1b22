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

//! Durable tier of lakecache.
//!
//! The durable tier mirrors the memory tier on disk. Entries are encoded by [`encoding::Encoder`], kept by a
//! [`backend::Backend`] and mutated only through the single writer lane in [`flusher`].

pub mod backend;
pub mod encoding;
pub mod entry;
pub mod flusher;
pub mod version;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use backend::{Backend, BackendConfig, FsBackend, SqliteBackend, DEFAULT_SQLITE_READERS};
pub use encoding::{Encoder, EncoderConfig, DEFAULT_COMPRESSION_THRESHOLD};
pub use entry::{CacheEntry, Encoding};
pub use flusher::{sweep, Catalog, Submission, Writer};
pub use version::{build_id, effective_version, VersionCheck};
