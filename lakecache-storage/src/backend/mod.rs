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

use std::{fmt::Debug, path::Path, sync::Arc};

use lakecache_common::error::Result;
use serde::{Deserialize, Serialize};

use crate::entry::CacheEntry;

mod fs;
mod sqlite;

pub use fs::FsBackend;
pub use sqlite::SqliteBackend;

/// Durable tier backend.
///
/// All methods are blocking and are supposed to be called from the writer lane or through
/// [`lakecache_common::asyncify::asyncify`]. Implementations keep exactly one entry per id.
pub trait Backend: Send + Sync + Debug + 'static {
    /// Read all entries. Every call is a fresh read.
    fn items(&self) -> Result<Vec<CacheEntry>>;

    /// Ids of all entries.
    fn ids(&self) -> Result<Vec<String>> {
        Ok(self.items()?.into_iter().map(|entry| entry.id).collect())
    }

    /// Insert or replace the entry with the same id.
    fn upsert(&self, entry: &CacheEntry) -> Result<()>;

    /// Remove the entry with the given id. Removing an absent id is not an error.
    fn remove(&self, id: &str) -> Result<()>;

    /// Remove a batch of entries.
    fn remove_batch(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            self.remove(id)?;
        }
        Ok(())
    }

    /// Remove all entries. The version sentinel is kept.
    fn clear(&self) -> Result<()>;

    /// Check if an entry with the given id exists.
    fn exists(&self, id: &str) -> Result<bool>;

    /// Check if [`Backend::exists`] is cheap enough to back synchronous lookups.
    fn supports_lookup(&self) -> bool {
        false
    }

    /// Read the version sentinel.
    fn version(&self) -> Result<Option<String>>;

    /// Write the version sentinel.
    fn set_version(&self, version: &str) -> Result<()>;
}

/// Default reader connection count of the sqlite backend.
pub const DEFAULT_SQLITE_READERS: usize = 4;

/// Durable tier backend config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Embedded sqlite database, one row per entry.
    Sqlite {
        /// Reader connection count.
        #[serde(default = "default_readers")]
        readers: usize,
    },
    /// One file per entry.
    Fs,
}

fn default_readers() -> usize {
    DEFAULT_SQLITE_READERS
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Sqlite {
            readers: DEFAULT_SQLITE_READERS,
        }
    }
}

impl BackendConfig {
    /// Open the backend in the namespace directory, creating it if absent.
    pub fn open(&self, dir: impl AsRef<Path>) -> Result<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = match self {
            BackendConfig::Sqlite { readers } => Arc::new(SqliteBackend::open(dir, *readers)?),
            BackendConfig::Fs => Arc::new(FsBackend::open(dir)?),
        };
        Ok(backend)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use itertools::Itertools;

    use super::*;
    use crate::entry::Encoding;

    pub fn entry(id: &str, data: &[u8], encoding: Encoding) -> CacheEntry {
        CacheEntry {
            id: id.to_string(),
            data: Some(data.to_vec()),
            encoding,
        }
    }

    fn sorted(mut entries: Vec<CacheEntry>) -> Vec<CacheEntry> {
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    /// Shared behavior every backend must pass.
    pub fn check_backend(backend: &dyn Backend) {
        assert!(backend.items().unwrap().is_empty());
        assert_eq!(backend.version().unwrap(), None);

        let a = entry("AQ", b"alpha", Encoding::Raw);
        let b = entry("Ag", br#"{"b":1}"#, Encoding::Json);
        let c = CacheEntry::tombstone("Aw");
        let d = entry("BA", &zstd::bulk::compress(&[9; 4096], 0).unwrap(), Encoding::Compressed);
        let e = entry("BQ", &zstd::bulk::compress(b"[1,2,3]", 0).unwrap(), Encoding::JsonCompressed);
        for x in [&a, &b, &c, &d, &e] {
            backend.upsert(x).unwrap();
        }
        assert_eq!(
            sorted(backend.items().unwrap()),
            vec![a.clone(), b.clone(), c.clone(), d.clone(), e.clone()]
        );
        assert_eq!(
            backend.ids().unwrap().into_iter().sorted().collect_vec(),
            vec!["AQ", "Ag", "Aw", "BA", "BQ"]
        );

        // upsert replaces, including a change of encoding
        let a2 = entry("AQ", br#""alpha""#, Encoding::Json);
        backend.upsert(&a2).unwrap();
        backend.upsert(&a2).unwrap();
        let items = backend.items().unwrap();
        assert_eq!(items.iter().filter(|x| x.id == "AQ").count(), 1);
        assert!(items.contains(&a2));

        assert!(backend.exists("Aw").unwrap());
        backend.remove("Aw").unwrap();
        backend.remove("Aw").unwrap();
        assert!(!backend.exists("Aw").unwrap());

        backend.remove_batch(&["Ag".to_string(), "missing".to_string()]).unwrap();
        assert_eq!(sorted(backend.items().unwrap()), vec![a2, d, e]);

        backend.set_version("1.0").unwrap();
        backend.set_version("1.1").unwrap();
        assert_eq!(backend.version().unwrap().as_deref(), Some("1.1"));

        backend.clear().unwrap();
        assert!(backend.items().unwrap().is_empty());
        assert!(!backend.exists("AQ").unwrap());
        assert_eq!(backend.version().unwrap().as_deref(), Some("1.1"));
    }

    #[test]
    fn test_backend_config_serde() {
        let config: BackendConfig = serde_json::from_str(r#"{"type":"sqlite"}"#).unwrap();
        assert_eq!(config, BackendConfig::default());
        let config: BackendConfig = serde_json::from_str(r#"{"type":"sqlite","readers":2}"#).unwrap();
        assert_eq!(config, BackendConfig::Sqlite { readers: 2 });
        let config: BackendConfig = serde_json::from_str(r#"{"type":"fs"}"#).unwrap();
        assert_eq!(config, BackendConfig::Fs);
    }

    #[test]
    fn test_backend_config_open() {
        let dir = tempfile::tempdir().unwrap();
        let sqlite = BackendConfig::default().open(dir.path().join("sqlite")).unwrap();
        assert!(sqlite.supports_lookup());
        let fs = BackendConfig::Fs.open(dir.path().join("fs")).unwrap();
        assert!(!fs.supports_lookup());
    }
}
