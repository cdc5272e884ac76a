// Copyright 2025 The SR-IOV Scheduler Authors
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

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

/// Maximum age of a promise. The scheduler is free to ignore our
/// recommendation entirely, in which case no binding ever arrives and the
/// promise must not hold a VF hostage forever.
pub const DEFAULT_PROMISE_EXPIRY: Duration = Duration::from_secs(10);

/// How often stale promises are swept when no interval is configured.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Outstanding provisional VF reservations, keyed by pod UID.
///
/// A promise means "we told the scheduler this pod could land on some
/// VF-capable node; one VF is reserved globally until the binding shows up in
/// the watch stream or the promise ages out". The reservation is global, not
/// per-node: the scheduler picks which of the recommended nodes the pod
/// actually binds to.
pub struct PromiseLedger {
    expiry: Duration,
    promises: HashMap<String, Instant>,
    subscribers: Vec<oneshot::Sender<()>>,
}

impl PromiseLedger {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            promises: HashMap::new(),
            subscribers: Vec::new(),
        }
    }

    /// Records a promise for the pod at the current time. Promising the same
    /// pod again refreshes its timestamp.
    pub fn make(&mut self, uid: &str) {
        self.promises.insert(uid.to_owned(), Instant::now());
    }

    /// Removes the promise for `uid` if one exists and wakes every current
    /// subscriber. Waking all of them is deliberate: each blocked filter call
    /// re-enters the lock and re-evaluates, so a spurious wakeup costs one
    /// evaluation and nothing else.
    pub fn purge(&mut self, uid: &str) -> bool {
        if self.promises.remove(uid).is_none() {
            return false;
        }
        tracing::debug!(uid, "purged promise");
        for subscriber in self.subscribers.drain(..) {
            // The waiter may have timed out and dropped its receiver already.
            let _ = subscriber.send(());
        }
        true
    }

    /// Number of outstanding promises, i.e. globally reserved VFs.
    pub fn count(&self) -> usize {
        self.promises.len()
    }

    /// Registers a one-shot waiter that is signaled on the next purge,
    /// whatever its cause.
    pub fn subscribe(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Purges every promise older than the expiry, as observed at `now`.
    /// Returns the number of promises removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let expired = self
            .promises
            .iter()
            .filter(|(_, made_at)| now.saturating_duration_since(**made_at) >= self.expiry)
            .map(|(uid, _)| uid.clone())
            .collect::<Vec<_>>();
        for uid in &expired {
            self.purge(uid);
        }
        expired.len()
    }
}
