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

/// Per-node count of VFs held by running pods, as observed through the pod
/// watch stream. Entries are created lazily at zero and never removed.
#[derive(Debug, Default)]
pub struct AllocationMap {
    allocated: HashMap<String, i64>,
}

impl AllocationMap {
    pub fn add(&mut self, node: &str) {
        *self.allocated.entry(node.to_owned()).or_insert(0) += 1;
    }

    /// The watch stream replays events after a relist, so a decrement may
    /// arrive for a pod that was never counted. Floor at zero instead of
    /// letting the count go negative.
    pub fn sub(&mut self, node: &str) {
        let count = self.allocated.entry(node.to_owned()).or_insert(0);
        if *count > 0 {
            *count -= 1;
        } else {
            tracing::warn!(node, "VF release for a node with no allocations");
        }
    }

    pub fn get(&self, node: &str) -> i64 {
        self.allocated.get(node).copied().unwrap_or(0)
    }

    pub fn ensure(&mut self, node: &str) -> i64 {
        *self.allocated.entry(node.to_owned()).or_insert(0)
    }
}
