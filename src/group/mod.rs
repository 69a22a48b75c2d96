//! Cache groups: named read-through namespaces.
//!
//! A [`Group`] owns the full read pipeline for one data domain:
//!
//! ```text
//! Get(key)
//!   ├─ local cache hit ──────────────────────────────▶ ByteView
//!   └─ miss ─▶ single-flight ─▶ classify (hot/cold)
//!                ├─ hot:  race backup peers ─────────▶ first success
//!                ├─ cold: lookup owning peer ────────▶ value
//!                └─ fall-through: source loader
//!                      ├─ populate local cache
//!                      └─ hot? async push to backups
//! ```
//!
//! Groups are created through a [`GroupRegistry`], the process-wide
//! directory the node server uses to dispatch inbound peer requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::byteview::ByteView;
use crate::cache::LocalCache;
use crate::error::{Error, Result};
use crate::metrics::MetricsSink;
use crate::peers::{PeerClient, PeerRouter};
use crate::singleflight::FlightGroup;

mod hotspot;

pub use hotspot::{HotSpotTracker, KeyHeat, DEFAULT_BACKUP_COUNT, DEFAULT_HOT_SPOT_THRESHOLD};

/// Budget for one multi-peer race before falling through to the loader.
pub const DEFAULT_MULTI_PEER_DEADLINE: Duration = Duration::from_millis(500);

// =============================================================================
// Loader Contract
// =============================================================================

/// Source of truth behind a group: called on cache miss, at most once
/// concurrently per key thanks to the coalescer.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, key: &str) -> Result<Vec<u8>>;
}

/// Adapter implementing [`Loader`] with a plain closure.
pub struct FnLoader<F>(pub F);

#[async_trait]
impl<F> Loader for FnLoader<F>
where
    F: Fn(&str) -> Result<Vec<u8>> + Send + Sync,
{
    async fn load(&self, key: &str) -> Result<Vec<u8>> {
        (self.0)(key)
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Point-in-time statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Stats {
    /// Local-cache hits served
    pub hits: u64,
    /// Lookups that went through the load pipeline
    pub misses: u64,
    /// Current local-cache size in bytes
    pub bytes: u64,
}

// =============================================================================
// Group
// =============================================================================

/// A named cache namespace with its own loader, peers, and hot-key state.
pub struct Group {
    name: String,
    loader: Arc<dyn Loader>,
    main_cache: LocalCache,
    peers: OnceLock<Arc<dyn PeerRouter>>,
    flight: FlightGroup<ByteView>,
    hot_spot: HotSpotTracker,
    hits: AtomicU64,
    misses: AtomicU64,
    multi_peer_deadline_ms: AtomicU64,
    metrics: OnceLock<Arc<dyn MetricsSink>>,
}

impl Group {
    fn new(name: &str, cache_bytes: u64, loader: Arc<dyn Loader>) -> Self {
        Self {
            name: name.to_string(),
            loader,
            main_cache: LocalCache::new(cache_bytes),
            peers: OnceLock::new(),
            flight: FlightGroup::new(),
            hot_spot: HotSpotTracker::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            multi_peer_deadline_ms: AtomicU64::new(DEFAULT_MULTI_PEER_DEADLINE.as_millis() as u64),
            metrics: OnceLock::new(),
        }
    }

    /// Name of the group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach the peer router.
    ///
    /// # Panics
    ///
    /// Panics when called a second time; wiring peers twice is a
    /// programming error.
    pub fn register_peers(&self, peers: Arc<dyn PeerRouter>) {
        if self.peers.set(peers).is_err() {
            panic!("register_peers called more than once for group {}", self.name);
        }
    }

    /// Attach an optional metrics sink. Later calls are ignored.
    pub fn set_metrics(&self, sink: Arc<dyn MetricsSink>) {
        let _ = self.metrics.set(sink);
    }

    /// Look up a value, serving from the local cache when possible and
    /// otherwise driving the coalesced load pipeline.
    pub async fn get(&self, key: &str) -> Result<ByteView> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("key is required".to_string()));
        }

        if let Some(view) = self.main_cache.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.metric_inc("cache_hits_total", "Lookups served from the local cache");
            self.observe_access(key);
            debug!(group = %self.name, key, "cache hit");
            return Ok(view);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.metric_inc("cache_misses_total", "Lookups that missed the local cache");
        self.load(key).await
    }

    /// Install a replica pushed by a peer directly into the local cache.
    /// No loader call and no further propagation.
    pub fn populate_local(&self, key: &str, value: ByteView) {
        self.main_cache.add(key, value);
        self.metric_cache_size();
    }

    /// Snapshot of hit/miss/size counters.
    pub fn stats(&self) -> Stats {
        Stats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bytes: self.main_cache.bytes(),
        }
    }

    /// Whether the key is currently classified hot.
    pub fn is_hot_spot(&self, key: &str) -> bool {
        self.hot_spot.is_hot(key)
    }

    /// Access count at which keys are promoted to hot.
    pub fn set_hot_spot_threshold(&self, threshold: usize) {
        self.hot_spot.set_threshold(threshold);
    }

    /// Number of replica peers hot keys fan out to.
    pub fn set_backup_count(&self, count: usize) {
        self.hot_spot.set_backup_count(count);
    }

    pub fn backup_count(&self) -> usize {
        self.hot_spot.backup_count()
    }

    /// Budget for one multi-peer race.
    pub fn set_multi_peer_deadline(&self, deadline: Duration) {
        self.multi_peer_deadline_ms
            .store(deadline.as_millis() as u64, Ordering::Relaxed);
    }

    /// Run the hot-spot decay pass immediately.
    pub fn clean_expired_hot_spot(&self) {
        self.hot_spot.clean_expired();
    }

    // =========================================================================
    // Load Pipeline
    // =========================================================================

    async fn load(&self, key: &str) -> Result<ByteView> {
        self.flight.work(key, self.load_once(key)).await
    }

    /// The single coalesced load for a key.
    async fn load_once(&self, key: &str) -> Result<ByteView> {
        let heat = self.observe_access(key);
        // With no replicas configured, hot keys follow the cold path.
        let fan_out = heat.is_hot() && self.hot_spot.backup_count() > 0;

        if let Some(peers) = self.peers.get() {
            if fan_out {
                if let Some(candidates) = peers.pick_peers(key, self.hot_spot.backup_count()) {
                    if !candidates.is_empty() {
                        match self.race_peers(candidates, key).await {
                            Ok(view) => return Ok(view),
                            Err(err) => {
                                self.metric_inc(
                                    "peer_failures_total",
                                    "Peer lookups that failed or timed out",
                                );
                                warn!(group = %self.name, key, error = %err,
                                    "hot-key peer race failed, falling back to loader");
                            }
                        }
                    }
                }
            } else if let Some(peer) = peers.pick_peer(key) {
                match self.fetch_from_peer(peer.as_ref(), key).await {
                    Ok(view) => return Ok(view),
                    Err(err) => {
                        self.metric_inc(
                            "peer_failures_total",
                            "Peer lookups that failed or timed out",
                        );
                        warn!(group = %self.name, key, peer = peer.addr(), error = %err,
                            "peer lookup failed, falling back to loader");
                    }
                }
            }
        }

        let view = self.load_from_source(key).await?;
        if fan_out {
            self.spawn_backup_sync(key, view.clone());
        }
        Ok(view)
    }

    async fn fetch_from_peer(&self, peer: &dyn PeerClient, key: &str) -> Result<ByteView> {
        let bytes = peer.lookup(&self.name, key).await?;
        Ok(ByteView::from(bytes))
    }

    /// Race several peers for a hot key; first success wins, losers are
    /// aborted, and the whole race is bounded by the configured deadline.
    async fn race_peers(&self, peers: Vec<Arc<dyn PeerClient>>, key: &str) -> Result<ByteView> {
        let deadline =
            Duration::from_millis(self.multi_peer_deadline_ms.load(Ordering::Relaxed));
        debug!(group = %self.name, key, peers = peers.len(), "racing peers for hot key");

        let mut in_flight = JoinSet::new();
        for peer in peers {
            let group = self.name.clone();
            let key = key.to_string();
            in_flight.spawn(async move { peer.lookup(&group, &key).await });
        }

        let raced = tokio::time::timeout(deadline, async {
            let mut last_err = Error::Unavailable(format!("no peers answered for key {key}"));
            while let Some(joined) = in_flight.join_next().await {
                match joined {
                    Ok(Ok(bytes)) => return Ok(ByteView::from(bytes)),
                    Ok(Err(err)) => last_err = err,
                    Err(err) => {
                        last_err = Error::Internal(format!("peer lookup task failed: {err}"))
                    }
                }
            }
            Err(last_err)
        })
        .await;

        match raced {
            Ok(result) => result,
            Err(_) => Err(Error::Unavailable(format!(
                "timed out racing peers for key {key} after {deadline:?}"
            ))),
        }
        // Dropping the JoinSet aborts whatever is still in flight.
    }

    async fn load_from_source(&self, key: &str) -> Result<ByteView> {
        let bytes = self.loader.load(key).await?;
        let view = ByteView::from(bytes);
        self.main_cache.add(key, view.clone());
        self.metric_cache_size();
        Ok(view)
    }

    /// Best-effort replica push to the backup peers. Failures are logged,
    /// never surfaced.
    fn spawn_backup_sync(&self, key: &str, value: ByteView) {
        let Some(peers) = self.peers.get() else {
            return;
        };
        let Some(targets) = peers.pick_peers(key, self.hot_spot.backup_count()) else {
            return;
        };
        if targets.is_empty() {
            return;
        }

        info!(group = %self.name, key, peers = targets.len(),
            "syncing hot key to backup peers");
        let group = self.name.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let mut pushes = JoinSet::new();
            for peer in targets {
                let group = group.clone();
                let key = key.clone();
                let value = value.clone();
                pushes.spawn(async move {
                    if let Err(err) = peer.push(&group, &key, value.as_slice()).await {
                        warn!(peer = peer.addr(), group = %group, key = %key, error = %err,
                            "failed to sync hot key to backup peer");
                    }
                });
            }
            while pushes.join_next().await.is_some() {}
        });
    }

    fn observe_access(&self, key: &str) -> KeyHeat {
        let heat = self.hot_spot.record_access(key);
        if heat == KeyHeat::Promoted {
            self.metric_inc(
                "hot_keys_promoted_total",
                "Keys promoted past the hot-spot threshold",
            );
        }
        heat
    }

    fn metric_inc(&self, name: &str, help: &str) {
        if let Some(sink) = self.metrics.get() {
            sink.inc_counter(name, help);
        }
    }

    fn metric_cache_size(&self) {
        if let Some(sink) = self.metrics.get() {
            sink.set_gauge(
                "cache_size_bytes",
                "Current local-cache size in bytes",
                self.main_cache.bytes() as f64,
            );
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Process-wide directory of cache groups.
///
/// Owned by the binary's entry point and shared with the node server, which
/// resolves inbound peer requests by group name. Groups live for the
/// lifetime of the process.
#[derive(Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a group and index it by name, replacing any previous group
    /// with the same name.
    pub fn new_group(&self, name: &str, cache_bytes: u64, loader: Arc<dyn Loader>) -> Arc<Group> {
        let group = Arc::new(Group::new(name, cache_bytes, loader));
        self.groups.write().insert(name.to_string(), group.clone());
        info!(group = name, cache_bytes, "cache group created");
        group
    }

    /// Look up a group by name.
    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Names of all registered groups.
    pub fn names(&self) -> Vec<String> {
        self.groups.read().keys().cloned().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn sample_loader() -> (Arc<dyn Loader>, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let loader = Arc::new(FnLoader(move |key: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            match key {
                "Tom" => Ok(b"630".to_vec()),
                "Jack" => Ok(b"589".to_vec()),
                "Sam" => Ok(b"567".to_vec()),
                _ => Err(Error::NotFound(key.to_string())),
            }
        }));
        (loader, loads)
    }

    #[tokio::test]
    async fn test_local_hit_after_first_load() {
        let registry = GroupRegistry::new();
        let (loader, loads) = sample_loader();
        let group = registry.new_group("scores", 2 << 10, loader);

        assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
        // Second lookup is served from the cache; the loader stays idle.
        assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let stats = group.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.bytes, 6);
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected() {
        let registry = GroupRegistry::new();
        let (loader, _) = sample_loader();
        let group = registry.new_group("scores", 2 << 10, loader);

        let err = group.get("").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!group.is_hot_spot(""));
    }

    #[tokio::test]
    async fn test_loader_error_is_surfaced() {
        let registry = GroupRegistry::new();
        let (loader, _) = sample_loader();
        let group = registry.new_group("scores", 2 << 10, loader);

        let err = group.get("kkk").await.unwrap_err();
        assert_eq!(err, Error::NotFound("kkk".to_string()));
    }

    #[tokio::test]
    async fn test_zero_length_value_hits_cache_on_reread() {
        let registry = GroupRegistry::new();
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let group = registry.new_group(
            "empty",
            1 << 10,
            Arc::new(FnLoader(move |_: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })),
        );

        assert!(group.get("k").await.unwrap().is_empty());
        assert!(group.get("k").await.unwrap().is_empty());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(group.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_concurrent_gets_coalesce_to_one_load() {
        struct SlowLoader {
            loads: AtomicUsize,
        }

        #[async_trait]
        impl Loader for SlowLoader {
            async fn load(&self, _key: &str) -> Result<Vec<u8>> {
                self.loads.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(b"X".to_vec())
            }
        }

        let loader = Arc::new(SlowLoader {
            loads: AtomicUsize::new(0),
        });
        let registry = GroupRegistry::new();
        let group = registry.new_group("flight", 1 << 10, loader.clone());

        let mut handles = Vec::new();
        for _ in 0..100 {
            let group = group.clone();
            handles.push(tokio::spawn(async move { group.get("k").await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().as_slice(), b"X");
        }
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hot_promotion_after_threshold_gets() {
        let registry = GroupRegistry::new();
        let (loader, _) = sample_loader();
        let group = registry.new_group("scores", 2 << 10, loader);
        group.set_hot_spot_threshold(5);

        for _ in 0..4 {
            group.get("Tom").await.unwrap();
        }
        assert!(!group.is_hot_spot("Tom"));

        group.get("Tom").await.unwrap();
        assert!(group.is_hot_spot("Tom"));
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = GroupRegistry::new();
        let (loader, _) = sample_loader();
        registry.new_group("scores", 2 << 10, loader);

        assert!(registry.get("scores").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.names(), vec!["scores".to_string()]);
    }

    #[tokio::test]
    #[should_panic(expected = "register_peers called more than once")]
    async fn test_double_peer_registration_panics() {
        struct NoPeers;
        impl PeerRouter for NoPeers {
            fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerClient>> {
                None
            }
            fn pick_peers(&self, _key: &str, _count: usize) -> Option<Vec<Arc<dyn PeerClient>>> {
                None
            }
        }

        let registry = GroupRegistry::new();
        let (loader, _) = sample_loader();
        let group = registry.new_group("scores", 2 << 10, loader);
        group.register_peers(Arc::new(NoPeers));
        group.register_peers(Arc::new(NoPeers));
    }

    // =========================================================================
    // Peer-routing behavior with in-process fakes
    // =========================================================================

    struct FakePeer {
        addr: String,
        value: Option<Vec<u8>>,
        lookups: AtomicUsize,
        pushes: parking_lot::Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl FakePeer {
        fn new(addr: &str, value: Option<&[u8]>) -> Arc<Self> {
            Arc::new(Self {
                addr: addr.to_string(),
                value: value.map(|v| v.to_vec()),
                lookups: AtomicUsize::new(0),
                pushes: parking_lot::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PeerClient for FakePeer {
        fn addr(&self) -> &str {
            &self.addr
        }

        async fn lookup(&self, _group: &str, key: &str) -> Result<Vec<u8>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.value.clone().ok_or_else(|| Error::Transport {
                peer: self.addr.clone(),
                reason: format!("no value for {key}"),
            })
        }

        async fn push(&self, _group: &str, key: &str, value: &[u8]) -> Result<()> {
            self.pushes.lock().push((key.to_string(), value.to_vec()));
            Ok(())
        }
    }

    struct FakeRouter {
        owner: Option<Arc<FakePeer>>,
        backups: Vec<Arc<FakePeer>>,
    }

    impl PeerRouter for FakeRouter {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerClient>> {
            self.owner
                .as_ref()
                .map(|p| Arc::clone(p) as Arc<dyn PeerClient>)
        }

        fn pick_peers(&self, _key: &str, count: usize) -> Option<Vec<Arc<dyn PeerClient>>> {
            if self.backups.is_empty() {
                return None;
            }
            Some(
                self.backups
                    .iter()
                    .take(count)
                    .map(|p| Arc::clone(p) as Arc<dyn PeerClient>)
                    .collect(),
            )
        }
    }

    #[tokio::test]
    async fn test_cold_key_fetched_from_owning_peer() {
        let registry = GroupRegistry::new();
        let (loader, loads) = sample_loader();
        let group = registry.new_group("scores", 2 << 10, loader);

        let owner = FakePeer::new("http://peer-b", Some(b"remote"));
        group.register_peers(Arc::new(FakeRouter {
            owner: Some(Arc::clone(&owner)),
            backups: vec![],
        }));

        assert_eq!(group.get("k").await.unwrap().as_slice(), b"remote");
        assert_eq!(owner.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_peer_failure_falls_through_to_loader() {
        let registry = GroupRegistry::new();
        let (loader, loads) = sample_loader();
        let group = registry.new_group("scores", 2 << 10, loader);

        let owner = FakePeer::new("http://peer-b", None);
        group.register_peers(Arc::new(FakeRouter {
            owner: Some(owner),
            backups: vec![],
        }));

        assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hot_key_races_backups_and_first_success_wins() {
        let registry = GroupRegistry::new();
        let (loader, loads) = sample_loader();
        let group = registry.new_group("scores", 2 << 10, loader);
        group.set_hot_spot_threshold(0);

        let good = FakePeer::new("http://peer-b", Some(b"hot-value"));
        let bad = FakePeer::new("http://peer-c", None);
        group.register_peers(Arc::new(FakeRouter {
            owner: None,
            backups: vec![good, bad],
        }));

        assert_eq!(group.get("k").await.unwrap().as_slice(), b"hot-value");
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hot_key_loaded_locally_is_pushed_to_backups() {
        let registry = GroupRegistry::new();
        let (loader, _) = sample_loader();
        let group = registry.new_group("scores", 2 << 10, loader);
        group.set_hot_spot_threshold(0);
        group.set_backup_count(2);

        let b = FakePeer::new("http://peer-b", None);
        let c = FakePeer::new("http://peer-c", None);
        group.register_peers(Arc::new(FakeRouter {
            owner: None,
            backups: vec![Arc::clone(&b), Arc::clone(&c)],
        }));

        assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");

        // The push is spawn-and-forget; give it a moment.
        for _ in 0..50 {
            if !b.pushes.lock().is_empty() && !c.pushes.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(b.pushes.lock()[0], ("Tom".to_string(), b"630".to_vec()));
        assert_eq!(c.pushes.lock()[0], ("Tom".to_string(), b"630".to_vec()));
    }

    #[tokio::test]
    async fn test_backup_count_zero_disables_fan_out() {
        let registry = GroupRegistry::new();
        let (loader, _) = sample_loader();
        let group = registry.new_group("scores", 2 << 10, loader);
        group.set_hot_spot_threshold(0);
        group.set_backup_count(0);

        let owner = FakePeer::new("http://peer-b", Some(b"owned"));
        let backup = FakePeer::new("http://peer-c", Some(b"backup"));
        group.register_peers(Arc::new(FakeRouter {
            owner: Some(Arc::clone(&owner)),
            backups: vec![Arc::clone(&backup)],
        }));

        // Hot key with no replicas behaves like a cold key: single owner
        // lookup, no race, no push.
        assert_eq!(group.get("k").await.unwrap().as_slice(), b"owned");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backup.lookups.load(Ordering::SeqCst), 0);
        assert!(backup.pushes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_populate_local_bypasses_loader() {
        let registry = GroupRegistry::new();
        let (loader, loads) = sample_loader();
        let group = registry.new_group("scores", 2 << 10, loader);

        group.populate_local("pushed", ByteView::from("replica"));
        assert_eq!(group.get("pushed").await.unwrap().as_slice(), b"replica");
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(group.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_race_deadline_maps_to_unavailable_then_loader() {
        struct StallingPeer;

        #[async_trait]
        impl PeerClient for StallingPeer {
            fn addr(&self) -> &str {
                "http://peer-stalled"
            }
            async fn lookup(&self, _group: &str, _key: &str) -> Result<Vec<u8>> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            }
            async fn push(&self, _group: &str, _key: &str, _value: &[u8]) -> Result<()> {
                Ok(())
            }
        }

        struct StallingRouter;
        impl PeerRouter for StallingRouter {
            fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerClient>> {
                None
            }
            fn pick_peers(&self, _key: &str, _count: usize) -> Option<Vec<Arc<dyn PeerClient>>> {
                Some(vec![Arc::new(StallingPeer)])
            }
        }

        let registry = GroupRegistry::new();
        let (loader, loads) = sample_loader();
        let group = registry.new_group("scores", 2 << 10, loader);
        group.set_hot_spot_threshold(0);
        group.set_multi_peer_deadline(Duration::from_millis(50));
        group.register_peers(Arc::new(StallingRouter));

        let started = std::time::Instant::now();
        assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
