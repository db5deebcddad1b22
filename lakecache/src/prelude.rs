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

pub use lakecache_common::{
    code::{CacheValue, Json, Payload},
    error::{Error, ErrorKind, Result},
    fingerprint::{fingerprint, fingerprint_bytes},
};
pub use lakecache_memory::LruConfig;
pub use lakecache_storage::{
    Backend, BackendConfig, CacheEntry, EncoderConfig, Encoding, FsBackend, SqliteBackend, VersionCheck,
    DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_SQLITE_READERS,
};

pub use crate::{
    builder::{CacheBuilder, CacheConfig, DEFAULT_RECONCILE_INTERVAL, DEFAULT_VERSION, DIR_NAME},
    cache::Cache,
};
