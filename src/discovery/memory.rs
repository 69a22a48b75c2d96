//! In-process registry with TTL leases.
//!
//! Implements both halves of the discovery contract against a shared map,
//! which is what tests and single-process clusters need. Leases are renewed
//! by a background task at half the TTL and swept on every snapshot, so a
//! node that stops renewing disappears from subsequent snapshots.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use super::{Discovery, ServiceInfo, ServiceRegistry, DEFAULT_SERVICE_TTL};
use crate::error::{Error, Result};

struct Lease {
    /// JSON-encoded [`ServiceInfo`], matching what a networked registry
    /// would store.
    value: String,
    expires_at: Instant,
}

struct Registration {
    service_key: String,
    stop_renewal: watch::Sender<bool>,
}

/// A shared, lease-aware service registry.
pub struct MemoryRegistry {
    services: Arc<DashMap<String, Lease>>,
    ttl: Duration,
    registration: Mutex<Option<Registration>>,
}

impl MemoryRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            services: Arc::new(DashMap::new()),
            ttl,
            registration: Mutex::new(None),
        }
    }

    /// Another handle onto the same service map, for a second node in the
    /// same process.
    pub fn handle(&self) -> Self {
        Self {
            services: Arc::clone(&self.services),
            ttl: self.ttl,
            registration: Mutex::new(None),
        }
    }

    fn sweep(&self) {
        let now = Instant::now();
        self.services.retain(|_, lease| lease.expires_at > now);
    }

    fn decode(key: &str, lease: &Lease) -> Option<(String, ServiceInfo)> {
        match serde_json::from_str(&lease.value) {
            Ok(info) => Some((key.to_string(), info)),
            Err(err) => {
                debug!(key, error = %err, "dropping undecodable service entry");
                None
            }
        }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_TTL)
    }
}

#[async_trait]
impl ServiceRegistry for MemoryRegistry {
    async fn register(&self, service_key: &str, info: ServiceInfo) -> Result<()> {
        let mut registration = self.registration.lock();
        if registration.is_some() {
            return Err(Error::Registry("service already registered".to_string()));
        }

        let value = serde_json::to_string(&info)
            .map_err(|err| Error::Registry(format!("marshal service info: {err}")))?;
        self.services.insert(
            service_key.to_string(),
            Lease {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );

        // Renew at half the TTL until deregistration; if the key vanishes
        // underneath us, the lease is gone and renewal stops.
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let services = Arc::clone(&self.services);
        let key = service_key.to_string();
        let ttl = self.ttl;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ttl / 2);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        match services.get_mut(&key) {
                            Some(mut lease) => lease.expires_at = Instant::now() + ttl,
                            None => break,
                        }
                    }
                }
            }
        });

        *registration = Some(Registration {
            service_key: service_key.to_string(),
            stop_renewal: stop_tx,
        });
        info!(key = service_key, addr = %info.addr, "service registered");
        Ok(())
    }

    async fn deregister(&self) -> Result<()> {
        let Some(registration) = self.registration.lock().take() else {
            return Ok(());
        };
        let _ = registration.stop_renewal.send(true);
        self.services.remove(&registration.service_key);
        info!(key = %registration.service_key, "service deregistered");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.deregister().await
    }
}

#[async_trait]
impl Discovery for MemoryRegistry {
    async fn services(&self) -> Result<HashMap<String, ServiceInfo>> {
        self.sweep();
        Ok(self
            .services
            .iter()
            .filter_map(|entry| Self::decode(entry.key(), entry.value()))
            .collect())
    }

    async fn service(&self, service_key: &str) -> Result<Option<ServiceInfo>> {
        self.sweep();
        Ok(self
            .services
            .get(service_key)
            .and_then(|lease| Self::decode(service_key, lease.value()))
            .map(|(_, info)| info))
    }

    async fn services_by_prefix(&self, prefix: &str) -> Result<HashMap<String, ServiceInfo>> {
        self.sweep();
        Ok(self
            .services
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .filter_map(|entry| Self::decode(entry.key(), entry.value()))
            .collect())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::register_service;

    #[tokio::test]
    async fn test_register_then_snapshot() {
        let registry = MemoryRegistry::new(Duration::from_secs(10));
        register_service(
            &registry,
            "http://127.0.0.1:8001",
            "/services/test/",
            HashMap::new(),
        )
        .await
        .unwrap();

        let services = registry.services_by_prefix("/services/test/").await.unwrap();
        assert_eq!(services.len(), 1);
        let info = &services["/services/test/http://127.0.0.1:8001"];
        assert_eq!(info.addr, "http://127.0.0.1:8001");
    }

    #[tokio::test]
    async fn test_double_registration_is_rejected() {
        let registry = MemoryRegistry::new(Duration::from_secs(10));
        let info = ServiceInfo::new("http://127.0.0.1:8001");
        registry.register("/services/a", info.clone()).await.unwrap();
        let err = registry.register("/services/a", info).await.unwrap_err();
        assert!(matches!(err, Error::Registry(_)));
    }

    #[tokio::test]
    async fn test_deregister_removes_from_snapshots() {
        let registry = MemoryRegistry::new(Duration::from_secs(10));
        registry
            .register("/services/a", ServiceInfo::new("http://127.0.0.1:8001"))
            .await
            .unwrap();
        assert_eq!(registry.services().await.unwrap().len(), 1);

        registry.deregister().await.unwrap();
        assert!(registry.services().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_lease_is_swept_without_renewal() {
        let registry = MemoryRegistry::new(Duration::from_millis(50));
        // Insert a lease directly, with no renewal task behind it.
        registry.services.insert(
            "/services/ghost".to_string(),
            Lease {
                value: serde_json::to_string(&ServiceInfo::new("http://ghost")).unwrap(),
                expires_at: Instant::now() + Duration::from_millis(50),
            },
        );
        assert_eq!(registry.services().await.unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(registry.services().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lease_renewal_keeps_service_visible() {
        let registry = MemoryRegistry::new(Duration::from_millis(100));
        registry
            .register("/services/a", ServiceInfo::new("http://127.0.0.1:8001"))
            .await
            .unwrap();

        // Well past the original TTL, the renewal task keeps it alive.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(registry.services().await.unwrap().len(), 1);

        crate::discovery::ServiceRegistry::close(&registry).await.unwrap();
        assert!(registry.services().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shared_handle_sees_the_same_fleet() {
        let a = MemoryRegistry::new(Duration::from_secs(10));
        let b = a.handle();
        a.register("/services/a", ServiceInfo::new("http://a"))
            .await
            .unwrap();
        b.register("/services/b", ServiceInfo::new("http://b"))
            .await
            .unwrap();

        assert_eq!(a.services().await.unwrap().len(), 2);
        assert_eq!(b.services().await.unwrap().len(), 2);
    }
}
