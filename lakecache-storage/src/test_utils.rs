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

//! Backend wrappers for tests.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use lakecache_common::error::{Error, ErrorKind, Result};
use parking_lot::Mutex;

use crate::{backend::Backend, entry::CacheEntry};

/// A durable operation observed by [`RecordBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// An entry is upserted.
    Upsert(String),
    /// An entry is removed.
    Remove(String),
    /// All entries are removed.
    Clear,
}

/// A backend that records mutations and can be switched to fail every call.
#[derive(Debug)]
pub struct RecordBackend {
    inner: Arc<dyn Backend>,
    records: Mutex<Vec<Record>>,
    broken: AtomicBool,
}

impl RecordBackend {
    /// Wrap a backend.
    pub fn new(inner: Arc<dyn Backend>) -> Self {
        Self {
            inner,
            records: Mutex::new(vec![]),
            broken: AtomicBool::new(false),
        }
    }

    /// Make every following call fail, or recover.
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::Release);
    }

    /// Dump the recorded successful mutations.
    pub fn dump(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    fn check(&self) -> Result<()> {
        if self.broken.load(Ordering::Acquire) {
            return Err(Error::new(ErrorKind::Io, "injected failure"));
        }
        Ok(())
    }
}

impl Backend for RecordBackend {
    fn items(&self) -> Result<Vec<CacheEntry>> {
        self.check()?;
        self.inner.items()
    }

    fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        self.check()?;
        self.inner.upsert(entry)?;
        self.records.lock().push(Record::Upsert(entry.id.clone()));
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.check()?;
        self.inner.remove(id)?;
        self.records.lock().push(Record::Remove(id.to_string()));
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.check()?;
        self.inner.clear()?;
        self.records.lock().push(Record::Clear);
        Ok(())
    }

    fn exists(&self, id: &str) -> Result<bool> {
        self.check()?;
        self.inner.exists(id)
    }

    fn supports_lookup(&self) -> bool {
        self.inner.supports_lookup()
    }

    fn version(&self) -> Result<Option<String>> {
        self.check()?;
        self.inner.version()
    }

    fn set_version(&self, version: &str) -> Result<()> {
        self.check()?;
        self.inner.set_version(version)
    }
}
