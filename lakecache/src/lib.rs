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

//! lakecache - persistent LRU cache for Rust.
//!
//! A [`Cache`] keeps values in a bounded in-memory LRU and mirrors every mutation to a durable tier in the
//! background, so a cache built with the same namespace and version comes back warm after a restart.
//!
//! ```no_run
//! use lakecache::prelude::*;
//!
//! # async fn run() -> lakecache::prelude::Result<()> {
//! let cache: Cache<String> = CacheBuilder::new("articles")
//!     .with_version(lakecache::cache_version!())
//!     .with_count_limit(1024)
//!     .build()
//!     .await?;
//!
//! cache.insert(&("article", 42), "hello".to_string());
//! assert_eq!(cache.get(&("article", 42)), Some("hello".to_string()));
//! # Ok(())
//! # }
//! ```
//!
//! Keys are any [`serde::Serialize`] value and are fingerprinted into stable ids. Reads never touch the durable
//! tier; it is only read once, when the cache is built.

mod builder;
mod cache;
mod reconciler;

/// Re-exported components of lakecache.
pub mod prelude;

pub use prelude::*;

/// Expands to the `CARGO_PKG_VERSION` of the crate calling it.
///
/// Use it with [`CacheBuilder::with_version`] to invalidate the durable tier on every release of the host crate.
#[macro_export]
macro_rules! cache_version {
    () => {
        env!("CARGO_PKG_VERSION")
    };
}
