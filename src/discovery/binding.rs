//! Binding between a discovery snapshot source and an HTTP peer pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::{Discovery, DEFAULT_REFRESH_INTERVAL, DEFAULT_SERVICE_PREFIX};
use crate::http::HttpPool;

/// Keeps an [`HttpPool`]'s peer set synchronized with service discovery by
/// re-polling the snapshot on a fixed interval. Replacement is idempotent,
/// so an unchanged fleet leaves routing untouched.
pub struct DiscoveryPool {
    pool: Arc<HttpPool>,
    discovery: Arc<dyn Discovery>,
    service_prefix: String,
    refresh_interval: Duration,
    stop: watch::Sender<bool>,
}

impl DiscoveryPool {
    /// Fetch an initial snapshot, apply it, and start the refresh loop.
    pub async fn new(
        pool: Arc<HttpPool>,
        discovery: Arc<dyn Discovery>,
        service_prefix: impl Into<String>,
    ) -> Arc<Self> {
        Self::with_refresh_interval(pool, discovery, service_prefix, DEFAULT_REFRESH_INTERVAL)
            .await
    }

    /// Same as [`DiscoveryPool::new`] with an explicit poll interval.
    pub async fn with_refresh_interval(
        pool: Arc<HttpPool>,
        discovery: Arc<dyn Discovery>,
        service_prefix: impl Into<String>,
        refresh_interval: Duration,
    ) -> Arc<Self> {
        let mut service_prefix = service_prefix.into();
        if service_prefix.is_empty() {
            service_prefix = DEFAULT_SERVICE_PREFIX.to_string();
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let binding = Arc::new(Self {
            pool,
            discovery,
            service_prefix,
            refresh_interval,
            stop: stop_tx,
        });
        binding.refresh_peers().await;

        let refresher = Arc::clone(&binding);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresher.refresh_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => refresher.refresh_peers().await,
                }
            }
            debug!("discovery refresh loop stopped");
        });

        binding
    }

    /// The pool this binding feeds.
    pub fn pool(&self) -> &Arc<HttpPool> {
        &self.pool
    }

    /// Stop the refresh loop. The pool keeps its last peer set.
    pub fn close(&self) {
        let _ = self.stop.send(true);
    }

    async fn refresh_peers(&self) {
        match self.discovery.services_by_prefix(&self.service_prefix).await {
            Ok(services) if services.is_empty() => {
                warn!(prefix = %self.service_prefix, "no services found");
            }
            Ok(services) => {
                let peers: Vec<String> =
                    services.values().map(|info| info.addr.clone()).collect();
                debug!(?peers, "refreshed peers from discovery");
                self.pool.set_peers(&peers);
            }
            Err(err) => {
                warn!(prefix = %self.service_prefix, error = %err, "discovery snapshot failed");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{register_service, MemoryRegistry, ServiceRegistry};
    use crate::group::GroupRegistry;
    use crate::peers::PeerRouter;
    use std::collections::HashMap;

    const PREFIX: &str = "/services/test/";

    async fn register(registry: &MemoryRegistry, addr: &str) {
        register_service(registry, addr, PREFIX, HashMap::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_initial_snapshot_populates_the_ring() {
        let fleet = MemoryRegistry::new(Duration::from_secs(10));
        register(&fleet.handle(), "http://127.0.0.1:9001").await;
        register(&fleet.handle(), "http://127.0.0.1:9002").await;

        let pool = Arc::new(HttpPool::new(
            "http://127.0.0.1:9001",
            Arc::new(GroupRegistry::new()),
        ));
        let binding = DiscoveryPool::new(Arc::clone(&pool), Arc::new(fleet), PREFIX).await;

        // Some key must now route to the other node.
        let routed = (0..100)
            .map(|i| format!("key-{i}"))
            .any(|key| pool.pick_peer(&key).is_some());
        assert!(routed);
        binding.close();
    }

    #[tokio::test]
    async fn test_refresh_follows_fleet_changes() {
        let fleet = MemoryRegistry::new(Duration::from_secs(10));
        let node_a = fleet.handle();
        let node_b = fleet.handle();
        register(&node_a, "http://127.0.0.1:9001").await;
        register(&node_b, "http://127.0.0.1:9002").await;

        let pool = Arc::new(HttpPool::new(
            "http://127.0.0.1:9001",
            Arc::new(GroupRegistry::new()),
        ));
        let binding = DiscoveryPool::with_refresh_interval(
            Arc::clone(&pool),
            Arc::new(fleet.handle()),
            PREFIX,
            Duration::from_millis(50),
        )
        .await;

        let routed_somewhere = (0..100)
            .map(|i| format!("key-{i}"))
            .any(|key| pool.pick_peer(&key).is_some());
        assert!(routed_somewhere);

        // The only remote node deregisters; once the snapshot shrinks to
        // just this node, every key routes locally.
        node_b.deregister().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let routed_remotely = (0..100)
            .map(|i| format!("key-{i}"))
            .any(|key| pool.pick_peer(&key).is_some());
        assert!(!routed_remotely);

        binding.close();
    }

    #[tokio::test]
    async fn test_close_stops_refreshing() {
        let fleet = MemoryRegistry::new(Duration::from_secs(10));
        let node_b = fleet.handle();
        register(&node_b, "http://127.0.0.1:9002").await;

        let pool = Arc::new(HttpPool::new(
            "http://127.0.0.1:9001",
            Arc::new(GroupRegistry::new()),
        ));
        let binding = DiscoveryPool::with_refresh_interval(
            Arc::clone(&pool),
            Arc::new(fleet.handle()),
            PREFIX,
            Duration::from_millis(50),
        )
        .await;
        binding.close();

        // A node joining after close is never routed to.
        let node_c = fleet.handle();
        register(&node_c, "http://127.0.0.1:9003").await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        let sees_new_node = (0..100)
            .map(|i| format!("key-{i}"))
            .filter_map(|key| pool.pick_peer(&key))
            .any(|peer| peer.addr().contains("9003"));
        assert!(!sees_new_node);
        drop(node_b);
    }
}
