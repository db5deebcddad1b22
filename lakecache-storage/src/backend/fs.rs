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
    fs::{create_dir_all, read, read_dir, read_to_string, remove_file, rename, write},
    io::ErrorKind as IoErrorKind,
    path::{Path, PathBuf},
};

use lakecache_common::error::{Error, ErrorKind, Result};

use super::Backend;
use crate::entry::{CacheEntry, Encoding};

const ENTRY_PREFIX: &str = "hash-";
const TEMP_PREFIX: &str = ".tmp-";
const VERSION_FILE: &str = "lru_cache_version.txt";

/// Flat-file backend, one file per entry.
///
/// ```text
/// <dir>/
///   lru_cache_version.txt
///   hash-<id>.raw | .zst | .json | .json.zst | .none
/// ```
///
/// The file extension carries the encoding. Writes go through a temp file and a rename, so a crash never leaves a
/// truncated entry behind.
#[derive(Debug)]
pub struct FsBackend {
    dir: PathBuf,
}

impl FsBackend {
    /// Open the backend in `dir`, creating the directory if absent.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir).map_err(|e| Error::from(e).with_context("dir", dir.display()))?;
        Ok(Self { dir })
    }

    /// The namespace directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn extension(encoding: Encoding) -> &'static str {
        match encoding {
            Encoding::Raw => "raw",
            Encoding::Compressed => "zst",
            Encoding::Json => "json",
            Encoding::JsonCompressed => "json.zst",
            Encoding::None => "none",
        }
    }

    fn filename(id: &str, encoding: Encoding) -> String {
        format!("{ENTRY_PREFIX}{id}.{}", Self::extension(encoding))
    }

    /// Parse `hash-<id>.<ext>` into the id and encoding.
    fn parse(filename: &str) -> Option<(&str, Encoding)> {
        let rest = filename.strip_prefix(ENTRY_PREFIX)?;
        let (id, ext) = rest.split_once('.')?;
        let encoding = Encoding::ALL.into_iter().find(|e| Self::extension(*e) == ext)?;
        (!id.is_empty()).then_some((id, encoding))
    }

    fn validate(id: &str) -> Result<()> {
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Ok(());
        }
        Err(Error::new(ErrorKind::Config, "entry id is not file name safe").with_context("id", id))
    }

    fn remove_file_if_exists(path: &Path) -> Result<()> {
        match remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from(e).with_context("path", path.display())),
        }
    }

    fn write_atomic(&self, filename: &str, data: &[u8]) -> Result<()> {
        let path = self.dir.join(filename);
        let temp = self.dir.join(format!("{TEMP_PREFIX}{filename}"));
        write(&temp, data).map_err(|e| Error::from(e).with_context("path", temp.display()))?;
        rename(&temp, &path).map_err(|e| Error::from(e).with_context("path", path.display()))?;
        Ok(())
    }

    fn read_entry(&self, path: &Path, id: &str, encoding: Encoding) -> Result<CacheEntry> {
        let data = match encoding {
            Encoding::None => None,
            _ => Some(read(path).map_err(|e| Error::from(e).with_context("path", path.display()))?),
        };
        Ok(CacheEntry {
            id: id.to_string(),
            data,
            encoding,
        })
    }

    /// Visit all entry files as `(path, id, encoding)`.
    fn scan(&self) -> Result<Vec<(PathBuf, String, Encoding)>> {
        let mut files = vec![];
        for dirent in read_dir(&self.dir).map_err(|e| Error::from(e).with_context("dir", self.dir.display()))? {
            let dirent = dirent?;
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some((id, encoding)) = Self::parse(name) {
                files.push((dirent.path(), id.to_string(), encoding));
            }
        }
        Ok(files)
    }
}

impl Backend for FsBackend {
    fn items(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = vec![];
        for (path, id, encoding) in self.scan()? {
            match self.read_entry(&path, &id, encoding) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("[fs backend]: skip unreadable entry {id}, error: {e}"),
            }
        }
        Ok(entries)
    }

    fn ids(&self) -> Result<Vec<String>> {
        Ok(self.scan()?.into_iter().map(|(_, id, _)| id).collect())
    }

    fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        Self::validate(&entry.id)?;
        let data = entry.data.as_deref().unwrap_or_default();
        self.write_atomic(&Self::filename(&entry.id, entry.encoding), data)?;
        for encoding in Encoding::ALL.into_iter().filter(|e| *e != entry.encoding) {
            Self::remove_file_if_exists(&self.dir.join(Self::filename(&entry.id, encoding)))?;
        }
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        Self::validate(id)?;
        for encoding in Encoding::ALL {
            Self::remove_file_if_exists(&self.dir.join(Self::filename(id, encoding)))?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        for dirent in read_dir(&self.dir).map_err(|e| Error::from(e).with_context("dir", self.dir.display()))? {
            let dirent = dirent?;
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            if Self::parse(name).is_some() || name.starts_with(TEMP_PREFIX) {
                Self::remove_file_if_exists(&dirent.path())?;
            }
        }
        Ok(())
    }

    fn exists(&self, id: &str) -> Result<bool> {
        Self::validate(id)?;
        Ok(Encoding::ALL
            .into_iter()
            .any(|encoding| self.dir.join(Self::filename(id, encoding)).is_file()))
    }

    fn version(&self) -> Result<Option<String>> {
        let path = self.dir.join(VERSION_FILE);
        match read_to_string(&path) {
            Ok(version) => Ok(Some(version)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::from(e).with_context("path", path.display())),
        }
    }

    fn set_version(&self, version: &str) -> Result<()> {
        self.write_atomic(VERSION_FILE, version.as_bytes())
    }
}
