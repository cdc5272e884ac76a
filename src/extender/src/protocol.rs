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

//! The scheduler-extender wire protocol. Envelope fields use the scheduler's
//! Go field spelling; the pod and node payloads are plain Kubernetes objects.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Node, Pod};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeList {
    #[serde(rename = "Items", default)]
    pub items: Vec<Node>,
}

/// Request envelope shared by `/filter` and `/prioritize`. `NodeNames` is
/// only populated by schedulers running with a node-name cache; capacity
/// always comes from the `Nodes` objects.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtenderArgs {
    #[serde(rename = "Pod")]
    pub pod: Pod,
    #[serde(rename = "Nodes", default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<NodeList>,
    #[serde(rename = "NodeNames", default, skip_serializing_if = "Option::is_none")]
    pub node_names: Option<Vec<String>>,
}

impl ExtenderArgs {
    pub fn candidate_nodes(&self) -> &[Node] {
        self.nodes.as_ref().map(|list| list.items.as_slice()).unwrap_or(&[])
    }

    pub fn pod_uid(&self) -> &str {
        self.pod.metadata.uid.as_deref().unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExtenderFilterResult {
    #[serde(rename = "Nodes", default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<NodeList>,
    #[serde(rename = "NodeNames", default, skip_serializing_if = "Option::is_none")]
    pub node_names: Option<Vec<String>>,
    #[serde(rename = "FailedNodes", default)]
    pub failed_nodes: BTreeMap<String, String>,
    #[serde(rename = "Error", default)]
    pub error: String,
}

impl ExtenderFilterResult {
    /// Response for a pod the extender has no opinion about: the candidate
    /// set passes through unmodified.
    pub fn unmodified(args: &ExtenderArgs) -> Self {
        Self {
            nodes: args.nodes.clone(),
            node_names: args.node_names.clone(),
            failed_nodes: BTreeMap::new(),
            error: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPriority {
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Score")]
    pub score: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_filter_args() {
        let body = r#"{
            "Pod": {
                "metadata": {
                    "uid": "pod-1",
                    "annotations": {"networks": "sriov"}
                }
            },
            "Nodes": {
                "Items": [
                    {
                        "metadata": {"name": "node1"},
                        "status": {"allocatable": {"totalvfs": "3"}}
                    }
                ]
            },
            "NodeNames": ["node1"]
        }"#;
        let args: ExtenderArgs = serde_json::from_str(body).unwrap();
        assert_eq!(args.pod_uid(), "pod-1");
        assert_eq!(args.candidate_nodes().len(), 1);
        assert_eq!(
            args.candidate_nodes()[0].metadata.name.as_deref(),
            Some("node1")
        );
        assert_eq!(args.node_names.as_deref(), Some(&["node1".to_owned()][..]));
    }

    #[test]
    fn test_encode_filter_result_field_names() {
        let result = ExtenderFilterResult {
            nodes: Some(NodeList { items: vec![] }),
            node_names: None,
            failed_nodes: BTreeMap::from([("node2".to_owned(), "full".to_owned())]),
            error: "No nodes have available VFs.".to_owned(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("Nodes").is_some());
        assert_eq!(value["Nodes"]["Items"], serde_json::json!([]));
        assert_eq!(value["FailedNodes"]["node2"], "full");
        assert_eq!(value["Error"], "No nodes have available VFs.");
        // NodeNames was absent from the request, stays absent here.
        assert!(value.get("NodeNames").is_none());
    }

    #[test]
    fn test_encode_host_priority() {
        let priority = HostPriority {
            host: "node1".to_owned(),
            score: 10,
        };
        assert_eq!(
            serde_json::to_string(&priority).unwrap(),
            r#"{"Host":"node1","Score":10}"#
        );
    }
}
