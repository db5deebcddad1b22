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

use std::{collections::HashSet, fmt::Debug, future::Future, sync::Arc, time::Instant};

use lakecache_common::{asyncify::asyncify, error::Result};
use tokio::sync::{oneshot, watch};

use crate::{
    backend::Backend,
    entry::CacheEntry,
    version::{self, VersionCheck},
};

/// The live view of the cache, as seen by the writer lane.
///
/// Implemented by the owner of the memory tier.
pub trait Catalog: Send + Sync + 'static {
    /// Snapshot of all key hashes live in memory.
    fn live_keys(&self) -> HashSet<String>;

    /// Check if a key hash is live in memory right now.
    fn is_live(&self, id: &str) -> bool;

    /// Restore durable entries into memory, returning the count of restored entries.
    ///
    /// Keys that are already live must not be overwritten.
    fn restore(&self, entries: Vec<CacheEntry>) -> usize;

    /// Called once when the recovery job ends, whether it succeeded or not.
    fn recovered(&self) {}
}

/// A job for the writer lane.
pub enum Submission {
    /// Run the version gate, then restore all durable entries into memory.
    Recover {
        /// The effective version of the namespace.
        version: String,
    },
    /// Insert or replace a durable entry.
    Upsert {
        /// The entry.
        entry: CacheEntry,
    },
    /// Remove a durable entry.
    Remove {
        /// The key hash.
        id: String,
    },
    /// Remove all durable entries.
    Clear {
        /// Notified after the wipe.
        tx: Option<oneshot::Sender<()>>,
    },
    /// Remove durable entries that are not live in memory.
    Reconcile,
    /// Notify when all previous submissions are handled.
    Wait {
        /// Notified when reached.
        tx: oneshot::Sender<()>,
    },
    /// Stop the writer lane after all previous submissions are handled.
    Close {
        /// Notified when the lane stops.
        tx: oneshot::Sender<()>,
    },
}

impl Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recover { version } => f.debug_struct("Recover").field("version", version).finish(),
            Self::Upsert { entry } => f
                .debug_struct("Upsert")
                .field("id", &entry.id)
                .field("encoding", &entry.encoding)
                .field("len", &entry.data.as_ref().map(|data| data.len()))
                .finish(),
            Self::Remove { id } => f.debug_struct("Remove").field("id", id).finish(),
            Self::Clear { .. } => f.debug_struct("Clear").finish(),
            Self::Reconcile => f.debug_struct("Reconcile").finish(),
            Self::Wait { .. } => f.debug_struct("Wait").finish(),
            Self::Close { .. } => f.debug_struct("Close").finish(),
        }
    }
}

/// Handle of the writer lane.
///
/// Every durable mutation goes through a single background task, so submissions are applied in order and callers
/// never wait for storage I/O.
#[derive(Debug, Clone)]
pub struct Writer {
    tx: flume::Sender<Submission>,
    ready: watch::Receiver<bool>,
}

impl Writer {
    /// Spawn the writer lane on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn open(backend: Arc<dyn Backend>, catalog: Arc<dyn Catalog>) -> Self {
        let (tx, rx) = flume::unbounded();
        let (ready_tx, ready) = watch::channel(false);

        let runner = Runner {
            rx,
            backend,
            catalog,
            ready: ready_tx,
        };
        tokio::spawn(async move { runner.run().await });

        Self { tx, ready }
    }

    /// Submit a job. Never blocks.
    pub fn submit(&self, submission: Submission) {
        tracing::trace!("[writer]: submit task: {submission:?}");
        if let Err(e) = self.tx.send(submission) {
            tracing::warn!("[writer]: writer lane closed, drop task: {:?}", e.into_inner());
        }
    }

    /// Wait until all jobs submitted before this call are handled.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.submit(Submission::Wait { tx });
        async move {
            let _ = rx.await;
        }
    }

    /// Check if the recovery job has finished.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until the recovery job has finished.
    pub async fn wait_ready(&self) {
        let mut ready = self.ready.clone();
        let _ = ready.wait_for(|ready| *ready).await;
    }

    /// Stop the writer lane after all submitted jobs are handled.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        self.submit(Submission::Close { tx });
        let _ = rx.await;
    }
}

struct Runner {
    rx: flume::Receiver<Submission>,
    backend: Arc<dyn Backend>,
    catalog: Arc<dyn Catalog>,
    ready: watch::Sender<bool>,
}

impl Runner {
    async fn run(self) {
        while let Ok(submission) = self.rx.recv_async().await {
            match submission {
                Submission::Recover { version } => {
                    self.recover(version).await;
                    self.catalog.recovered();
                    self.ready.send_replace(true);
                }
                Submission::Upsert { entry } => {
                    let id = entry.id.clone();
                    let backend = self.backend.clone();
                    if let Err(e) = asyncify(move || backend.upsert(&entry)).await.and_then(|r| r) {
                        tracing::warn!("[writer]: upsert entry {id} failed, the entry stays in memory only, error: {e}");
                    }
                }
                Submission::Remove { id } => {
                    let backend = self.backend.clone();
                    let target = id.clone();
                    if let Err(e) = asyncify(move || backend.remove(&target)).await.and_then(|r| r) {
                        tracing::warn!("[writer]: remove entry {id} failed, error: {e}");
                    }
                }
                Submission::Clear { tx } => {
                    let backend = self.backend.clone();
                    if let Err(e) = asyncify(move || backend.clear()).await.and_then(|r| r) {
                        tracing::warn!("[writer]: clear durable tier failed, error: {e}");
                    }
                    if let Some(tx) = tx {
                        let _ = tx.send(());
                    }
                }
                Submission::Reconcile => {
                    let backend = self.backend.clone();
                    let catalog = self.catalog.clone();
                    match asyncify(move || sweep(backend.as_ref(), catalog.as_ref()))
                        .await
                        .and_then(|r| r)
                    {
                        Ok(removed) => tracing::debug!("[writer]: reconciled, {removed} orphan entries removed"),
                        Err(e) => tracing::warn!("[writer]: reconcile failed, retry on next sweep, error: {e}"),
                    }
                }
                Submission::Wait { tx } => {
                    let _ = tx.send(());
                }
                Submission::Close { tx } => {
                    tracing::debug!("[writer]: writer lane closed");
                    let _ = tx.send(());
                    break;
                }
            }
        }
        // Release waiters of a recovery that never ran.
        self.ready.send_replace(true);
    }

    async fn recover(&self, version: String) {
        let now = Instant::now();
        let backend = self.backend.clone();
        let catalog = self.catalog.clone();

        let res = asyncify(move || -> Result<(VersionCheck, usize, usize, usize)> {
            let check = version::gate(backend.as_ref(), &version)?;
            let entries = backend.items()?;
            let total = entries.len();
            let restored = catalog.restore(entries);
            // Entries left out of memory would otherwise wait for the next mutation to be swept.
            let swept = match restored < total {
                true => sweep(backend.as_ref(), catalog.as_ref())?,
                false => 0,
            };
            Ok((check, total, restored, swept))
        })
        .await
        .and_then(|r| r);

        match res {
            Ok((check, total, restored, swept)) => tracing::info!(
                ?check,
                total,
                restored,
                swept,
                "[writer]: recovery finished in {:?}",
                now.elapsed()
            ),
            Err(e) => tracing::error!("[writer]: recovery failed, start with an empty memory tier, error: {e}"),
        }
    }
}

/// Remove durable entries that are not live in memory.
///
/// An id is removed only if it is absent from the snapshot taken at the start of the sweep and still absent when
/// checked again, so entries inserted during the sweep survive.
pub fn sweep(backend: &dyn Backend, catalog: &dyn Catalog) -> Result<usize> {
    let live = catalog.live_keys();
    let orphans = backend
        .ids()?
        .into_iter()
        .filter(|id| !live.contains(id) && !catalog.is_live(id))
        .collect::<Vec<_>>();
    if !orphans.is_empty() {
        backend.remove_batch(&orphans)?;
    }
    Ok(orphans.len())
}
