use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::NodeId;

/// A timestamped register value.
///
/// The default `("", 0)` stands for a key never written anywhere in the
/// known history; it is distinguishable from real values only by its zero
/// timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub data: String,
    pub ts: u64,
}

impl Value {
    pub fn new(data: impl Into<String>, ts: u64) -> Self {
        Value {
            data: data.into(),
            ts,
        }
    }

    /// The `(ts, id)` order used everywhere conflicts are resolved: the
    /// higher timestamp wins, ties go to the higher node id. Each value is
    /// compared together with the id of the node it was observed from.
    pub fn is_newer_than(&self, self_id: NodeId, other: &Value, other_id: NodeId) -> bool {
        self.ts > other.ts || (self.ts == other.ts && self_id > other_id)
    }
}

/// The per-node register map.
#[derive(Debug)]
pub struct Store {
    node_id: NodeId,
    inner: RwLock<HashMap<String, Value>>,
}

impl Store {
    pub fn new(node_id: NodeId) -> Self {
        Store {
            node_id,
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let map = self.inner.read().await;
        map.get(key).cloned()
    }

    // only applied if the incoming value is newer; stored timestamps never
    // go backwards. Timestamp ties are broken between the write's origin
    // and this node's own id, since the store does not retain who wrote
    // what it currently holds.
    pub async fn apply(&self, key: &str, incoming: Value, origin: NodeId) -> bool {
        let mut map = self.inner.write().await;
        let newer = match map.get(key) {
            Some(current) => incoming.is_newer_than(origin, current, self.node_id),
            None => true,
        };
        if newer {
            map.insert(key.to_owned(), incoming);
        }
        newer
    }
}
