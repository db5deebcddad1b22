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
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use lakecache_storage::{Submission, Writer};
use parking_lot::Mutex;
use tokio::{runtime::Handle, task::JoinHandle};

/// Debounced orphan sweep.
///
/// Every mutation re-arms the timer. The sweep is submitted to the writer lane only after the cache has been quiet
/// for a whole interval.
#[derive(Debug)]
pub struct Reconciler {
    writer: Writer,
    interval: Duration,
    runtime: Handle,
    timer: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Reconciler {
    pub fn new(writer: Writer, interval: Duration, runtime: Handle) -> Self {
        Self {
            writer,
            interval,
            runtime,
            timer: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Cancel the pending sweep and schedule a new one.
    pub fn rearm(&self) {
        let writer = self.writer.clone();
        let interval = self.interval;

        let mut timer = self.timer.lock();
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        if let Some(handle) = timer.take() {
            handle.abort();
        }
        *timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            tracing::debug!("[reconciler]: quiet for {interval:?}, submit sweep");
            writer.submit(Submission::Reconcile);
        }));
    }

    /// Cancel the pending sweep, and stop accepting new ones.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.stop();
    }
}
