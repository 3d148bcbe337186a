use serde::{Deserialize, Serialize};

/// A coarse architecture node inferred from infrastructure manifests
/// (compose/kubernetes/etc.) merged with code-level HTTP/RPC usages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceNode {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A directed edge between two service nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConnection {
    pub from: String,
    pub to: String,
    pub kind: String,
}

/// The full service graph returned by the `service_map` verb.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceGraph {
    pub nodes: Vec<ServiceNode>,
    pub connections: Vec<ServiceConnection>,
}
