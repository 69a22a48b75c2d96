//! Service discovery contracts and the peer-set binding.
//!
//! The cache core treats discovery abstractly: something that can hand out
//! a consistent snapshot of registered nodes under a key prefix, and
//! something nodes can register themselves with under a TTL-bound lease.
//! [`DiscoveryPool`] binds a snapshot source to an [`HttpPool`], re-polling
//! on a fixed interval so the ring follows the fleet.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

mod binding;
mod memory;

pub use binding::DiscoveryPool;
pub use memory::MemoryRegistry;

/// Conventional key prefix cache nodes register under.
pub const DEFAULT_SERVICE_PREFIX: &str = "/services/embercache/";

/// How often the binding re-polls the discovery snapshot.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Lease lifetime for a registered node.
pub const DEFAULT_SERVICE_TTL: Duration = Duration::from_secs(10);

/// A registered cache node as seen by the discovery service.
///
/// Stored values are JSON objects with these two fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Advertised base URL of the node, e.g. `http://10.0.0.2:8008`.
    pub addr: String,
    /// Free-form node metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceInfo {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Read half of the discovery contract: consistent snapshots of the
/// registered fleet.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// All registered services.
    async fn services(&self) -> Result<HashMap<String, ServiceInfo>>;

    /// One service by its full key.
    async fn service(&self, service_key: &str) -> Result<Option<ServiceInfo>>;

    /// All services whose key starts with `prefix`.
    async fn services_by_prefix(&self, prefix: &str) -> Result<HashMap<String, ServiceInfo>>;

    /// Release the discovery client.
    async fn close(&self) -> Result<()>;
}

/// Write half of the discovery contract: lease-bound registration.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Register a service under a TTL lease that is renewed until
    /// deregistration. Registering twice without deregistering is an error.
    async fn register(&self, service_key: &str, info: ServiceInfo) -> Result<()>;

    /// Remove this client's registration and stop renewing its lease.
    async fn deregister(&self) -> Result<()>;

    /// Deregister if needed and release the client.
    async fn close(&self) -> Result<()>;
}

/// Register a node under the conventional `<prefix><addr>` key.
pub async fn register_service(
    registry: &dyn ServiceRegistry,
    addr: &str,
    service_prefix: &str,
    metadata: HashMap<String, String>,
) -> Result<()> {
    let prefix = if service_prefix.is_empty() {
        DEFAULT_SERVICE_PREFIX
    } else {
        service_prefix
    };
    let service_key = format!("{prefix}{addr}");
    registry
        .register(
            &service_key,
            ServiceInfo {
                addr: addr.to_string(),
                metadata,
            },
        )
        .await
}
