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

use std::{fmt::Debug, marker::PhantomData, path::PathBuf, sync::Arc, time::Duration};

use lakecache_common::{
    asyncify::asyncify,
    code::CacheValue,
    error::{Error, Result},
};
use lakecache_memory::LruConfig;
use lakecache_storage::{effective_version, Backend, BackendConfig, EncoderConfig};
use serde::{Deserialize, Serialize};

use crate::cache::Cache;

/// Name of the directory under the cache root that holds all namespaces.
pub const DIR_NAME: &str = "LRUFileCache";

/// Version used when none is given.
pub const DEFAULT_VERSION: &str = "0";

/// Default quiet period before the orphan sweep runs.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Serializable config of a [`Cache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Storage partition of the cache. Required.
    pub namespace: String,
    /// Cache generation, [`DEFAULT_VERSION`] if absent.
    pub version: Option<String>,
    /// Append a process-unique suffix to the version.
    pub build_id: bool,
    /// Cache root, the platform cache directory if absent.
    pub root: Option<PathBuf>,
    /// Memory tier limits.
    pub memory: LruConfig,
    /// Durable tier backend.
    pub backend: BackendConfig,
    /// Encoding policy.
    pub encoder: EncoderConfig,
    /// Quiet period before the orphan sweep runs, in milliseconds.
    pub reconcile_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            version: None,
            build_id: cfg!(debug_assertions),
            root: None,
            memory: LruConfig::default(),
            backend: BackendConfig::default(),
            encoder: EncoderConfig::default(),
            reconcile_interval_ms: DEFAULT_RECONCILE_INTERVAL.as_millis() as u64,
        }
    }
}

/// Builder of a [`Cache`].
pub struct CacheBuilder<V> {
    config: CacheConfig,
    backend: Option<Arc<dyn Backend>>,
    _marker: PhantomData<V>,
}

impl<V> Debug for CacheBuilder<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("config", &self.config)
            .field("backend", &self.backend)
            .finish()
    }
}

impl<V> CacheBuilder<V>
where
    V: CacheValue,
{
    /// Create a builder for the given namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::from_config(CacheConfig {
            namespace: namespace.into(),
            ..Default::default()
        })
    }

    /// Create a builder from a deserialized config.
    pub fn from_config(config: CacheConfig) -> Self {
        Self {
            config,
            backend: None,
            _marker: PhantomData,
        }
    }

    /// Set the cache generation. Persisted entries of any other generation are wiped when the cache is built.
    ///
    /// Default: `"0"`.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.config.version = Some(version.into());
        self
    }

    /// Append a process-unique suffix to the version, so every run starts cold.
    ///
    /// Default: enabled in debug builds.
    pub fn with_build_id(mut self, enable: bool) -> Self {
        self.config.build_id = enable;
        self
    }

    /// Set the ceiling of the summed cost of the memory tier, in encoded bytes.
    ///
    /// Default: unlimited.
    pub fn with_total_bytes_limit(mut self, limit: usize) -> Self {
        self.config.memory.total_cost_limit = Some(limit);
        self
    }

    /// Set the ceiling of the entry count of the memory tier.
    ///
    /// Default: unlimited.
    pub fn with_count_limit(mut self, limit: usize) -> Self {
        self.config.memory.count_limit = Some(limit);
        self
    }

    /// Set the cache root. Namespaces live under `<root>/LRUFileCache/`.
    ///
    /// Default: the platform cache directory.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.root = Some(root.into());
        self
    }

    /// Set the durable tier backend.
    ///
    /// Default: sqlite.
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.config.backend = backend;
        self
    }

    /// Use an already opened backend instead of opening one from [`BackendConfig`].
    pub fn with_custom_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Payloads strictly longer than the threshold are stored compressed.
    ///
    /// Default: 200 000 bytes.
    pub fn with_compression_threshold(mut self, threshold: usize) -> Self {
        self.config.encoder.compression_threshold = threshold;
        self
    }

    /// Set the zstd compression level.
    ///
    /// Default: `0`, the zstd default level.
    pub fn with_zstd_level(mut self, level: i32) -> Self {
        self.config.encoder.zstd_level = level;
        self
    }

    /// Set the quiet period before the orphan sweep runs.
    ///
    /// Default: 30s.
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.config.reconcile_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Open the namespace and build the cache.
    ///
    /// The durable tier is restored in the background; use [`Cache::wait_ready`] to observe it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub async fn build(self) -> Result<Cache<V>> {
        let config = self.config;
        validate_namespace(&config.namespace)?;

        let root = match config.root.clone().or_else(dirs::cache_dir) {
            Some(root) => root,
            None => return Err(Error::config("cache root is not resolvable, set it with `with_root`")),
        };
        let path = root.join(DIR_NAME).join(&config.namespace);

        let backend = match self.backend {
            Some(backend) => backend,
            None => {
                let backend_config = config.backend.clone();
                let dir = path.clone();
                asyncify(move || backend_config.open(dir)).await.and_then(|r| r)?
            }
        };

        let version = effective_version(
            config.version.as_deref().unwrap_or(DEFAULT_VERSION),
            config.build_id,
        );

        tracing::info!(
            namespace = %config.namespace,
            %version,
            ?path,
            "[lakecache]: open cache"
        );

        Ok(Cache::open(
            config.namespace,
            version,
            path,
            config.memory,
            config.encoder,
            backend,
            Duration::from_millis(config.reconcile_interval_ms),
        ))
    }
}

fn validate_namespace(namespace: &str) -> Result<()> {
    let invalid = namespace.is_empty()
        || namespace == "."
        || namespace == ".."
        || namespace.contains(['/', '\\', std::path::MAIN_SEPARATOR]);
    if invalid {
        return Err(Error::config("invalid namespace").with_context("namespace", namespace));
    }
    Ok(())
}
