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
    collections::HashSet,
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use lakecache_common::{code::CacheValue, fingerprint::fingerprint};
use lakecache_memory::{LruConfig, MemoryCache};
use lakecache_storage::{Backend, CacheEntry, Catalog, Encoder, EncoderConfig, Submission, Writer};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::{runtime::Handle, sync::oneshot};

use crate::reconciler::Reconciler;

/// Keys mutated while the durable tier is still being restored.
///
/// Restored entries must never shadow a mutation made after the cache was built.
#[derive(Debug, Default)]
struct Recovery {
    done: bool,
    cleared: bool,
    touched: HashSet<String>,
}

/// State shared between the cache handle and the writer lane.
struct Shared<V> {
    memory: MemoryCache<Option<V>>,
    encoder: Encoder,
    recovery: Mutex<Recovery>,
}

impl<V> Shared<V>
where
    V: CacheValue,
{
    fn touch(&self, id: &str) {
        let mut recovery = self.recovery.lock();
        if !recovery.done {
            recovery.touched.insert(id.to_string());
        }
    }

    fn touch_all(&self) {
        let mut recovery = self.recovery.lock();
        if !recovery.done {
            recovery.cleared = true;
        }
    }
}

impl<V> Catalog for Shared<V>
where
    V: CacheValue,
{
    fn live_keys(&self) -> HashSet<String> {
        self.memory.keys()
    }

    fn is_live(&self, id: &str) -> bool {
        self.memory.contains(id)
    }

    fn restore(&self, entries: Vec<CacheEntry>) -> usize {
        let decoded = entries
            .into_iter()
            .filter_map(|entry| {
                let id = entry.id.clone();
                let cost = entry.cost();
                match Encoder::decode::<V>(entry) {
                    Ok(value) => Some((id, value, cost)),
                    Err(e) => {
                        tracing::warn!("[lakecache]: skip undecodable entry {id}, error: {e}");
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        let recovery = self.recovery.lock();
        if recovery.cleared {
            return 0;
        }
        decoded
            .into_iter()
            .filter(|(id, _, _)| !recovery.touched.contains(id))
            .filter(|(id, value, cost)| self.memory.insert_cold(id.clone(), value.clone(), *cost))
            .count()
    }

    fn recovered(&self) {
        let mut recovery = self.recovery.lock();
        recovery.done = true;
        recovery.touched = HashSet::new();
    }
}

struct Inner<V> {
    namespace: String,
    version: String,
    path: PathBuf,
    shared: Arc<Shared<V>>,
    backend: Arc<dyn Backend>,
    writer: Writer,
    reconciler: Reconciler,
}

/// Persistent LRU cache.
///
/// Reads and writes are served by the memory tier. Every mutation is mirrored to the durable tier in the background,
/// durable failures are logged and never surface to the caller.
///
/// The handle is cheap to clone.
pub struct Cache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Debug for Cache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("namespace", &self.inner.namespace)
            .field("version", &self.inner.version)
            .field("path", &self.inner.path)
            .field("backend", &self.inner.backend)
            .finish()
    }
}

impl<V> Cache<V>
where
    V: CacheValue,
{
    pub(crate) fn open(
        namespace: String,
        version: String,
        path: PathBuf,
        memory: LruConfig,
        encoder: EncoderConfig,
        backend: Arc<dyn Backend>,
        reconcile_interval: Duration,
    ) -> Self {
        let shared = Arc::new(Shared {
            memory: MemoryCache::new(memory),
            encoder: Encoder::new(encoder),
            recovery: Mutex::new(Recovery::default()),
        });

        let writer = Writer::open(backend.clone(), shared.clone());
        writer.submit(Submission::Recover {
            version: version.clone(),
        });
        let reconciler = Reconciler::new(writer.clone(), reconcile_interval, Handle::current());

        Self {
            inner: Arc::new(Inner {
                namespace,
                version,
                path,
                shared,
                backend,
                writer,
                reconciler,
            }),
        }
    }

    /// Get the value of a key. Negative entries read as `None`.
    pub fn get<K>(&self, key: &K) -> Option<V>
    where
        K: Serialize + ?Sized,
    {
        self.get_entry(key).flatten()
    }

    /// Get the entry of a key.
    ///
    /// Returns `Some(None)` for a negative entry, `None` for a miss.
    pub fn get_entry<K>(&self, key: &K) -> Option<Option<V>>
    where
        K: Serialize + ?Sized,
    {
        let id = fingerprint(key)?;
        self.inner.shared.memory.get(&id)
    }

    /// Insert a value.
    pub fn insert<K>(&self, key: &K, value: V)
    where
        K: Serialize + ?Sized,
    {
        self.set(key, Some(value))
    }

    /// Insert a negative entry, recording that the key is known to have no value.
    pub fn insert_none<K>(&self, key: &K)
    where
        K: Serialize + ?Sized,
    {
        self.set(key, None)
    }

    /// Insert a value, or a negative entry if `value` is `None`.
    ///
    /// If the key or the value can't be encoded, the call is dropped and both tiers are left untouched.
    pub fn set<K>(&self, key: &K, value: Option<V>)
    where
        K: Serialize + ?Sized,
    {
        let Some(id) = fingerprint(key) else {
            return;
        };
        let entry = match self.inner.shared.encoder.encode(id.clone(), value.as_ref()) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("[lakecache]: drop insertion of {id}, encode error: {e}");
                return;
            }
        };

        let shared = &self.inner.shared;
        shared.touch(&id);
        let evicted = {
            // Submit under the memory lock so the durable tier sees writes of a key in memory order.
            let mut lru = shared.memory.lock();
            let evicted = lru.insert(id, value, entry.cost());
            self.inner.writer.submit(Submission::Upsert { entry });
            evicted
        };
        for evicted in evicted {
            tracing::trace!("[lakecache]: evict {} with cost {}", evicted.key, evicted.cost);
        }
        self.inner.reconciler.rearm();
    }

    /// Remove a key from both tiers.
    pub fn remove<K>(&self, key: &K)
    where
        K: Serialize + ?Sized,
    {
        let Some(id) = fingerprint(key) else {
            return;
        };
        self.inner.shared.touch(&id);
        {
            let mut lru = self.inner.shared.memory.lock();
            lru.remove(&id);
            self.inner.writer.submit(Submission::Remove { id });
        }
        self.inner.reconciler.rearm();
    }

    /// Remove all entries from both tiers.
    pub async fn clear(&self) {
        self.inner.shared.touch_all();
        let (tx, rx) = oneshot::channel();
        {
            let mut lru = self.inner.shared.memory.lock();
            lru.clear();
            self.inner.writer.submit(Submission::Clear { tx: Some(tx) });
        }
        let _ = rx.await;
    }

    /// Check if the cache holds an entry for a key, negative entries included.
    ///
    /// Falls back to a lookup on the durable tier when the backend supports it and restoration has finished.
    pub fn contains<K>(&self, key: &K) -> bool
    where
        K: Serialize + ?Sized,
    {
        let Some(id) = fingerprint(key) else {
            return false;
        };
        if self.inner.shared.memory.contains(&id) {
            return true;
        }
        if !self.inner.backend.supports_lookup() || !self.is_ready() {
            return false;
        }
        self.inner.backend.exists(&id).unwrap_or_else(|e| {
            tracing::warn!("[lakecache]: durable lookup of {id} failed, error: {e}");
            false
        })
    }

    /// Entry count of the memory tier.
    pub fn len(&self) -> usize {
        self.inner.shared.memory.len()
    }

    /// Check if the memory tier is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.shared.memory.is_empty()
    }

    /// Summed cost of the memory tier.
    pub fn usage(&self) -> usize {
        self.inner.shared.memory.usage()
    }

    /// Check if the durable tier has been restored.
    pub fn is_ready(&self) -> bool {
        self.inner.writer.is_ready()
    }

    /// Wait until the durable tier has been restored.
    pub async fn wait_ready(&self) {
        self.inner.writer.wait_ready().await
    }

    /// Wait until every durable mutation submitted before this call is applied.
    pub async fn flush(&self) {
        self.inner.writer.wait().await
    }

    /// Remove orphan durable entries now, and wait for it.
    pub async fn reconcile(&self) {
        self.inner.writer.submit(Submission::Reconcile);
        self.flush().await
    }

    /// Flush and stop the background work. Later mutations stay in memory only.
    pub async fn close(&self) {
        self.inner.reconciler.stop();
        self.inner.writer.close().await;
    }

    /// Namespace of the cache.
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Effective version of the cache.
    pub fn version(&self) -> &str {
        &self.inner.version
    }

    /// Directory of the namespace.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

#[cfg(test)]
mod tests {
    use lakecache_common::code::Json;
    use lakecache_storage::{
        test_utils::{Record, RecordBackend},
        BackendConfig, FsBackend,
    };
    use serde::Deserialize;

    use super::*;
    use crate::CacheBuilder;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Article {
        id: u64,
        title: String,
    }

    async fn open<V: CacheValue>(dir: &Path, backend: Arc<dyn Backend>) -> Cache<V> {
        let cache = CacheBuilder::new("test")
            .with_root(dir)
            .with_build_id(false)
            .with_custom_backend(backend)
            .build()
            .await
            .unwrap();
        cache.wait_ready().await;
        cache
    }

    #[test_log::test(tokio::test)]
    async fn test_restore_skips_touched_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(FsBackend::open(dir.path()).unwrap());
        let encoder = Encoder::new(EncoderConfig::default());
        backend.set_version("0").unwrap();
        for (key, value) in [("a", "old"), ("b", "old"), ("c", "old")] {
            let id = fingerprint(key).unwrap();
            backend
                .upsert(&encoder.encode(id, Some(&value.to_string())).unwrap())
                .unwrap();
        }

        let shared = Shared::<String> {
            memory: MemoryCache::new(LruConfig::default()),
            encoder,
            recovery: Mutex::new(Recovery::default()),
        };
        let a = fingerprint("a").unwrap();
        let b = fingerprint("b").unwrap();
        let c = fingerprint("c").unwrap();

        shared.touch(&a);
        shared.memory.insert(a.clone(), Some("new".to_string()), 3);
        shared.touch(&b);

        assert_eq!(shared.restore(backend.items().unwrap()), 1);
        shared.recovered();

        assert_eq!(shared.memory.get(&a), Some(Some("new".to_string())));
        assert_eq!(shared.memory.get(&b), None);
        assert_eq!(shared.memory.get(&c), Some(Some("old".to_string())));

        // Mutations after recovery are not tracked.
        shared.touch(&c);
        assert!(shared.recovery.lock().touched.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_restore_never_evicts_live_entries() {
        let encoder = Encoder::new(EncoderConfig::default());
        let entries = ["x", "y"]
            .into_iter()
            .map(|key| {
                encoder
                    .encode(fingerprint(key).unwrap(), Some(&key.to_string()))
                    .unwrap()
            })
            .collect::<Vec<_>>();

        let shared = Shared::<String> {
            memory: MemoryCache::new(LruConfig::default().with_count_limit(2)),
            encoder,
            recovery: Mutex::new(Recovery::default()),
        };
        let fresh = fingerprint("fresh").unwrap();
        shared.touch(&fresh);
        shared.memory.insert(fresh.clone(), Some("fresh".to_string()), 5);

        assert_eq!(shared.restore(entries), 1);
        shared.recovered();
        assert_eq!(shared.memory.len(), 2);
        assert_eq!(shared.memory.peek(&fresh), Some(Some("fresh".to_string())));

        // The restored entry is older than the live one.
        let restored = shared
            .memory
            .keys()
            .into_iter()
            .find(|id| *id != fresh)
            .unwrap();
        shared.memory.insert(fingerprint("next").unwrap(), None, 1);
        assert!(!shared.memory.contains(&restored));
        assert!(shared.memory.contains(&fresh));
    }

    #[test_log::test(tokio::test)]
    async fn test_restore_after_clear() {
        let shared = Shared::<String> {
            memory: MemoryCache::new(LruConfig::default()),
            encoder: Encoder::new(EncoderConfig::default()),
            recovery: Mutex::new(Recovery::default()),
        };
        shared.touch_all();
        assert_eq!(shared.restore(vec![CacheEntry::tombstone("AQ")]), 0);
        assert!(shared.memory.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_mutations_are_mirrored() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RecordBackend::new(
            BackendConfig::Fs.open(dir.path().join("store")).unwrap(),
        ));
        let cache = open::<Json<Article>>(dir.path(), backend.clone()).await;

        let article = Article {
            id: 1,
            title: "lake".to_string(),
        };
        cache.insert(&1u64, Json(article.clone()));
        cache.insert_none(&2u64);
        cache.remove(&1u64);
        cache.flush().await;

        assert_eq!(cache.get(&1u64), None);
        assert_eq!(cache.get_entry(&2u64), Some(None));
        assert_eq!(
            backend.dump(),
            vec![
                Record::Clear,
                Record::Upsert(fingerprint(&1u64).unwrap()),
                Record::Upsert(fingerprint(&2u64).unwrap()),
                Record::Remove(fingerprint(&1u64).unwrap()),
            ]
        );

        cache.clear().await;
        assert!(cache.is_empty());
        assert_eq!(backend.dump().last(), Some(&Record::Clear));
    }

    #[test_log::test(tokio::test)]
    async fn test_durable_failures_are_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RecordBackend::new(
            BackendConfig::default().open(dir.path().join("store")).unwrap(),
        ));
        backend.set_broken(true);
        let cache = open::<String>(dir.path(), backend.clone()).await;
        assert!(cache.is_ready());

        cache.insert("k", "v".to_string());
        cache.flush().await;
        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert!(!cache.contains("missing"));
        cache.clear().await;
        cache.reconcile().await;
        assert!(backend.dump().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_unserializable_key() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RecordBackend::new(
            BackendConfig::Fs.open(dir.path().join("store")).unwrap(),
        ));
        let cache = open::<String>(dir.path(), backend.clone()).await;

        let key = std::collections::HashMap::from([(vec![1u8], 1u8)]);
        cache.insert(&key, "v".to_string());
        assert_eq!(cache.get(&key), None);
        assert!(!cache.contains(&key));
        assert!(cache.is_empty());
        cache.flush().await;
        assert_eq!(backend.dump(), vec![Record::Clear]);
    }

    #[test_log::test(tokio::test)]
    async fn test_close() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RecordBackend::new(
            BackendConfig::Fs.open(dir.path().join("store")).unwrap(),
        ));
        let cache = open::<String>(dir.path(), backend.clone()).await;
        cache.insert("a", "1".to_string());
        cache.close().await;
        cache.insert("b", "2".to_string());

        assert_eq!(cache.get("b"), Some("2".to_string()));
        assert_eq!(
            backend.dump(),
            vec![Record::Clear, Record::Upsert(fingerprint("a").unwrap())]
        );
    }
}
