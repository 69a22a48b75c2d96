//! Consistent-hash ring mapping keys to owning nodes.
//!
//! Each physical node contributes a configurable number of virtual nodes so
//! that keys spread evenly and a peer-set change only remaps the keys that
//! hashed to the departed node. The ring is immutable once built; the router
//! replaces it wholesale on every peer-set change.

use std::collections::HashMap;
use std::sync::Arc;

/// Hash function used to place virtual nodes and keys on the ring.
pub type RingHashFn = Arc<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// Virtual nodes per physical node.
pub const DEFAULT_VIRTUAL_NODES: usize = 50;

/// Sorted sequence of (hash, node) entries with binary-search lookup.
pub struct HashRing {
    replicas: usize,
    hash: RingHashFn,
    keys: Vec<u32>,
    nodes: HashMap<u32, String>,
}

impl HashRing {
    /// Create an empty ring. `hash` defaults to CRC32.
    pub fn new(replicas: usize, hash: Option<RingHashFn>) -> Self {
        Self {
            replicas: replicas.max(1),
            hash: hash.unwrap_or_else(|| Arc::new(|data| crc32fast::hash(data))),
            keys: Vec::new(),
            nodes: HashMap::new(),
        }
    }

    /// Add physical nodes, placing `replicas` virtual nodes for each.
    pub fn add<S: AsRef<str>>(&mut self, nodes: &[S]) {
        for node in nodes {
            let node = node.as_ref();
            for i in 0..self.replicas {
                let label = format!("{i}{node}");
                let hash = (self.hash)(label.as_bytes());
                self.keys.push(hash);
                self.nodes.insert(hash, node.to_string());
            }
        }
        self.keys.sort_unstable();
        self.keys.dedup();
    }

    /// Owning node for a key: the first virtual node at or after the key's
    /// hash, wrapping around to the start of the ring.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let hash = (self.hash)(key.as_bytes());
        let idx = self.keys.partition_point(|&k| k < hash);
        let idx = if idx == self.keys.len() { 0 } else { idx };
        self.nodes.get(&self.keys[idx]).map(String::as_str)
    }

    /// Whether the ring has any virtual nodes.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of virtual nodes on the ring.
    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
