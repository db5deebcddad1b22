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

use std::{
    fs::create_dir_all,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use lakecache_common::error::{Error, Result};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use super::Backend;
use crate::entry::{CacheEntry, Encoding};

const DATABASE_FILE: &str = "cache.sqlite";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const MIGRATIONS: &str = "
CREATE TABLE IF NOT EXISTS cache (
    id       TEXT PRIMARY KEY,
    data     BLOB,
    encoding TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Embedded sqlite backend, one row per entry.
///
/// The database runs in WAL mode with a single writer connection and a small pool of read-only connections.
#[derive(Debug)]
pub struct SqliteBackend {
    path: PathBuf,
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    cursor: AtomicUsize,
}

impl SqliteBackend {
    /// Open the database in `dir`, creating the directory, the database and the tables if absent.
    pub fn open(dir: impl AsRef<Path>, readers: usize) -> Result<Self> {
        let dir = dir.as_ref();
        create_dir_all(dir).map_err(|e| Error::from(e).with_context("dir", dir.display()))?;
        let path = dir.join(DATABASE_FILE);

        let writer = Connection::open(&path).map_err(|e| Error::from(e).with_context("path", path.display()))?;
        writer.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String = writer.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        writer.pragma_update(None, "synchronous", "NORMAL")?;
        writer.pragma_update(None, "foreign_keys", "OFF")?;
        writer.execute_batch(MIGRATIONS)?;
        tracing::debug!(path = %path.display(), %mode, "[sqlite backend]: database opened");

        let readers = (0..readers.max(1))
            .map(|_| {
                let conn = Connection::open_with_flags(
                    &path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                conn.busy_timeout(BUSY_TIMEOUT)?;
                Ok(Mutex::new(conn))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            path,
            writer: Mutex::new(writer),
            readers,
            cursor: AtomicUsize::new(0),
        })
    }

    /// The database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pick an idle reader, or wait on the next one in turn if all are busy.
    fn reader(&self) -> MutexGuard<'_, Connection> {
        if let Some(conn) = self.readers.iter().find_map(|reader| reader.try_lock()) {
            return conn;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        self.readers[index].lock()
    }

    fn row_to_entry(id: String, data: Option<Vec<u8>>, encoding: String) -> Option<CacheEntry> {
        match encoding.parse::<Encoding>() {
            Ok(encoding) => Some(CacheEntry { id, data, encoding }),
            Err(e) => {
                tracing::warn!("[sqlite backend]: skip entry {id} with unknown encoding, error: {e}");
                None
            }
        }
    }
}

impl Backend for SqliteBackend {
    fn items(&self) -> Result<Vec<CacheEntry>> {
        let conn = self.reader();
        let mut stmt = conn.prepare_cached("SELECT id, data, encoding FROM cache")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<Vec<(String, Option<Vec<u8>>, String)>>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, data, encoding)| Self::row_to_entry(id, data, encoding))
            .collect())
    }

    fn ids(&self) -> Result<Vec<String>> {
        let conn = self.reader();
        let mut stmt = conn.prepare_cached("SELECT id FROM cache")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        let conn = self.writer.lock();
        conn.prepare_cached(
            "INSERT INTO cache (id, data, encoding) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, encoding = excluded.encoding",
        )?
        .execute(params![entry.id, entry.data, entry.encoding.as_str()])?;
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        let conn = self.writer.lock();
        conn.prepare_cached("DELETE FROM cache WHERE id = ?1")?
            .execute(params![id])?;
        Ok(())
    }

    fn remove_batch(&self, ids: &[String]) -> Result<()> {
        let mut conn = self.writer.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM cache WHERE id = ?1")?;
            for id in ids {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut conn = self.writer.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM cache", [])?;
        tx.commit()?;
        Ok(())
    }

    fn exists(&self, id: &str) -> Result<bool> {
        let conn = self.reader();
        let found = conn
            .prepare_cached("SELECT 1 FROM cache WHERE id = ?1 LIMIT 1")?
            .query_row(params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn supports_lookup(&self) -> bool {
        true
    }

    fn version(&self) -> Result<Option<String>> {
        let conn = self.writer.lock();
        let version = conn
            .prepare_cached("SELECT value FROM meta WHERE key = 'version'")?
            .query_row([], |row| row.get(0))
            .optional()?;
        Ok(version)
    }

    fn set_version(&self, version: &str) -> Result<()> {
        let conn = self.writer.lock();
        conn.prepare_cached(
            "INSERT INTO meta (key, value) VALUES ('version', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )?
        .execute(params![version])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::backend::tests::{check_backend, entry};

    #[test_log::test]
    fn test_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::open(dir.path().join("ns"), 2).unwrap();
        check_backend(&backend);
    }

    #[test_log::test]
    fn test_sqlite_backend_schema() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::open(dir.path(), 1).unwrap();
        assert_eq!(backend.path(), dir.path().join("cache.sqlite"));

        let conn = backend.writer.lock();
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)).unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        let columns = conn
            .prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info('cache') ORDER BY cid")
            .unwrap()
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            })
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(
            columns,
            vec![
                ("id".to_string(), "TEXT".to_string(), false, true),
                ("data".to_string(), "BLOB".to_string(), false, false),
                ("encoding".to_string(), "TEXT".to_string(), true, false),
            ]
        );
    }

    #[test_log::test]
    fn test_sqlite_backend_migrations_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = SqliteBackend::open(dir.path(), 1).unwrap();
            backend.upsert(&entry("AQ", b"kept", Encoding::Raw)).unwrap();
            backend.set_version("v1").unwrap();
        }
        let backend = SqliteBackend::open(dir.path(), 1).unwrap();
        assert_eq!(backend.items().unwrap(), vec![entry("AQ", b"kept", Encoding::Raw)]);
        assert_eq!(backend.version().unwrap().as_deref(), Some("v1"));
    }

    #[test_log::test]
    fn test_sqlite_backend_skips_unknown_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::open(dir.path(), 1).unwrap();
        backend.upsert(&entry("AQ", b"ok", Encoding::Raw)).unwrap();
        backend
            .writer
            .lock()
            .execute(
                "INSERT INTO cache (id, data, encoding) VALUES ('Ag', x'00', 'lzfse')",
                [],
            )
            .unwrap();
        assert_eq!(backend.items().unwrap(), vec![entry("AQ", b"ok", Encoding::Raw)]);
        assert_eq!(backend.ids().unwrap().len(), 2);
    }

    #[test_log::test]
    fn test_sqlite_backend_concurrent_readers() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(SqliteBackend::open(dir.path(), 2).unwrap());
        for i in 0..32 {
            backend
                .upsert(&entry(&format!("id{i}"), &[i as u8], Encoding::Raw))
                .unwrap();
        }

        let handles = (0..8)
            .map(|_| {
                let backend = backend.clone();
                thread::spawn(move || {
                    for i in 0..32 {
                        assert!(backend.exists(&format!("id{i}")).unwrap());
                    }
                    assert_eq!(backend.items().unwrap().len(), 32);
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
