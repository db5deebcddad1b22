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
    sync::OnceLock,
    time::{SystemTime, UNIX_EPOCH},
};

use lakecache_common::error::Result;

use crate::backend::Backend;

/// Outcome of the version gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    /// No sentinel was found, the namespace is new or was left half-initialized.
    Fresh,
    /// The persisted version matches, entries are kept.
    Matched,
    /// The persisted version differs, all entries were wiped.
    Mismatched {
        /// The persisted version before the wipe.
        previous: String,
    },
}

/// Identifier unique to the current process.
///
/// Appended to the version in debug builds so every run starts with a cold cache.
pub fn build_id() -> &'static str {
    static BUILD_ID: OnceLock<String> = OnceLock::new();
    BUILD_ID.get_or_init(|| {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        format!("{:x}{:x}", std::process::id(), nanos)
    })
}

/// Build the effective version of a namespace.
pub fn effective_version(version: &str, with_build_id: bool) -> String {
    match with_build_id {
        true => format!("{version}+{}", build_id()),
        false => version.to_string(),
    }
}

/// Compare the persisted sentinel with `version` and wipe the backend on mismatch.
///
/// The sentinel is written unconditionally afterwards. A crash during the wipe leaves the old sentinel in place, so
/// the next open wipes again.
pub fn gate(backend: &dyn Backend, version: &str) -> Result<VersionCheck> {
    let check = match backend.version() {
        Ok(Some(persisted)) if persisted == version => VersionCheck::Matched,
        Ok(Some(persisted)) => VersionCheck::Mismatched { previous: persisted },
        Ok(None) => VersionCheck::Fresh,
        Err(e) => {
            tracing::warn!("[version gate]: read version sentinel failed, treat as fresh, error: {e}");
            VersionCheck::Fresh
        }
    };

    if check != VersionCheck::Matched {
        backend.clear()?;
    }
    backend.set_version(version)?;

    match &check {
        VersionCheck::Mismatched { previous } => {
            tracing::info!("[version gate]: version changed from {previous} to {version}, durable tier wiped")
        }
        VersionCheck::Fresh => tracing::info!("[version gate]: no version sentinel, start with version {version}"),
        VersionCheck::Matched => tracing::debug!("[version gate]: version {version} matched"),
    }

    Ok(check)
}
