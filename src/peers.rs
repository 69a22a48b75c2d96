//! Peer routing and transport contracts.
//!
//! The cache group depends on two small capability sets: a [`PeerRouter`]
//! that locates the peers responsible for a key, and a [`PeerClient`] that
//! speaks the wire protocol to one of them. The HTTP pool implements both
//! sides; tests substitute in-process fakes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Locates the peer (or peers) that should serve a key.
pub trait PeerRouter: Send + Sync {
    /// The owning peer for the key, or `None` when this node is the owner
    /// (or no peers are configured) and the caller should load locally.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>>;

    /// Up to `count` peers for hot-key fan-out: the owning peer plus
    /// randomly chosen companions. `None` when the primary is this node or
    /// the ring is empty.
    fn pick_peers(&self, key: &str, count: usize) -> Option<Vec<Arc<dyn PeerClient>>>;
}

/// Client half of the peer wire protocol.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Address this handle points at, for logging and dedup.
    fn addr(&self) -> &str;

    /// Fetch the value for a key from the remote group.
    async fn lookup(&self, group: &str, key: &str) -> Result<Vec<u8>>;

    /// Push a replica of a hot key's value into the remote group's local
    /// cache.
    async fn push(&self, group: &str, key: &str, value: &[u8]) -> Result<()>;
}
