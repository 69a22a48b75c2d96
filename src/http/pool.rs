//! HTTP peer pool: consistent-hash routing plus server-side dispatch.
//!
//! One [`HttpPool`] per node plays both halves of the peer protocol. As a
//! [`PeerRouter`] it owns the consistent-hash ring and a client handle per
//! peer; as the node server it dispatches inbound peer requests to the
//! named group through the process-wide registry.
//!
//! URL layout: `<base>/<group>/<key>`, both segments percent-escaped.
//! GET serves a lookup through the full read pipeline; PUT installs a
//! pushed replica directly into the local cache.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::byteview::ByteView;
use crate::error::Result;
use crate::group::GroupRegistry;
use crate::http::client::{build_http_client, unescape_segment, HttpPeer, DEFAULT_PEER_TIMEOUT};
use crate::http::wire::{self, PeerResponse, OCTET_STREAM};
use crate::peers::{PeerClient, PeerRouter};
use crate::ring::{HashRing, RingHashFn, DEFAULT_VIRTUAL_NODES};

/// Path prefix every peer endpoint serves under.
pub const DEFAULT_BASE_PATH: &str = "/_geecache/";

/// Tunables for an [`HttpPool`].
pub struct PoolConfig {
    /// Path prefix for the peer endpoint.
    pub base_path: String,
    /// Virtual nodes per peer on the ring.
    pub virtual_nodes: usize,
    /// Ring hash function; CRC32 when absent.
    pub hash: Option<RingHashFn>,
    /// CA bundle for TLS peer verification.
    pub ca_file: Option<std::path::PathBuf>,
    /// Per-call deadline for outbound peer RPCs.
    pub peer_timeout: std::time::Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
            hash: None,
            ca_file: None,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
        }
    }
}

struct PoolState {
    ring: HashRing,
    clients: HashMap<String, Arc<HttpPeer>>,
}

/// A pool of HTTP peers for one node.
pub struct HttpPool {
    self_addr: String,
    base_path: String,
    virtual_nodes: usize,
    hash: Option<RingHashFn>,
    registry: Arc<GroupRegistry>,
    client: reqwest::Client,
    state: Mutex<PoolState>,
}

impl HttpPool {
    /// Create a pool with default configuration. `self_addr` is this node's
    /// advertised base URL, e.g. `http://10.0.0.1:8008`.
    pub fn new(self_addr: impl Into<String>, registry: Arc<GroupRegistry>) -> Self {
        Self::with_config(self_addr, registry, PoolConfig::default())
            .expect("default pool config is infallible")
    }

    /// Create a pool with explicit configuration.
    pub fn with_config(
        self_addr: impl Into<String>,
        registry: Arc<GroupRegistry>,
        config: PoolConfig,
    ) -> Result<Self> {
        let client = build_http_client(config.ca_file.as_deref(), config.peer_timeout)?;
        Ok(Self {
            self_addr: self_addr.into(),
            base_path: config.base_path,
            virtual_nodes: config.virtual_nodes,
            hash: config.hash,
            registry,
            client,
            state: Mutex::new(PoolState {
                ring: HashRing::new(DEFAULT_VIRTUAL_NODES, None),
                clients: HashMap::new(),
            }),
        })
    }

    /// This node's advertised address.
    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    /// Replace the peer set: rebuild the ring wholesale, retain client
    /// handles for peers that stayed, drop handles for peers that left.
    pub fn set_peers<S: AsRef<str>>(&self, peers: &[S]) {
        let mut state = self.state.lock();

        let mut ring = HashRing::new(self.virtual_nodes, self.hash.clone());
        ring.add(peers);

        let mut clients = HashMap::with_capacity(peers.len());
        for peer in peers {
            let addr = peer.as_ref().to_string();
            let handle = state.clients.get(&addr).cloned().unwrap_or_else(|| {
                Arc::new(HttpPeer::new(
                    format!("{addr}{}", self.base_path),
                    self.client.clone(),
                ))
            });
            clients.insert(addr, handle);
        }

        debug!(self_addr = %self.self_addr, peers = clients.len(), "peer set replaced");
        state.ring = ring;
        state.clients = clients;
    }

    // =========================================================================
    // Server-Side Dispatch
    // =========================================================================

    /// Serve the peer endpoint on the given listener until the process
    /// exits.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(addr = %self.self_addr, base_path = %self.base_path, "peer endpoint listening");
        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let pool = Arc::clone(&self);
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let pool = Arc::clone(&pool);
                    async move { Ok::<_, Infallible>(pool.handle(req).await) }
                });
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(error = %err, "peer connection error");
                }
            });
        }
    }

    /// Dispatch one inbound peer request.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: hyper::body::Body + Send,
        B::Data: Send,
        B::Error: std::fmt::Display,
    {
        let path = req.uri().path().to_string();
        if !path.starts_with(&self.base_path) {
            return text_response(StatusCode::BAD_REQUEST, "bad request");
        }
        info!(server = %self.self_addr, method = %req.method(), %path, "peer request");

        // <base>/<group>/<key> required; the key may contain escaped
        // slashes, so only the first separator splits.
        let mut parts = path[self.base_path.len()..].splitn(2, '/');
        let (group_part, key_part) = match (parts.next(), parts.next()) {
            (Some(group), Some(key)) if !group.is_empty() && !key.is_empty() => (group, key),
            _ => return text_response(StatusCode::BAD_REQUEST, "bad request"),
        };
        let (group_name, key) = match (unescape_segment(group_part), unescape_segment(key_part)) {
            (Ok(group), Ok(key)) => (group, key),
            _ => return text_response(StatusCode::BAD_REQUEST, "bad request"),
        };

        let Some(group) = self.registry.get(&group_name) else {
            return text_response(
                StatusCode::NOT_FOUND,
                &format!("no such group: {group_name}"),
            );
        };

        let method = req.method().clone();
        if method == Method::GET {
            match group.get(&key).await {
                Ok(view) => match wire::encode_response(&PeerResponse::new(view.to_vec())) {
                    Ok(body) => Response::builder()
                        .status(StatusCode::OK)
                        .header("Content-Type", OCTET_STREAM)
                        .body(Full::new(Bytes::from(body)))
                        .unwrap(),
                    Err(err) => {
                        text_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
                    }
                },
                Err(err) => text_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
            }
        } else if method == Method::PUT {
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(err) => {
                    return text_response(
                        StatusCode::BAD_REQUEST,
                        &format!("reading request body: {err}"),
                    )
                }
            };
            match wire::decode_response(&body) {
                Ok(msg) => {
                    group.populate_local(&key, ByteView::from(msg.value));
                    debug!(group = %group_name, key = %key, "stored pushed replica");
                    text_response(StatusCode::OK, "")
                }
                Err(err) => text_response(
                    StatusCode::BAD_REQUEST,
                    &format!("decoding request body: {err}"),
                ),
            }
        } else {
            Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header("Allow", "GET, PUT")
                .body(Full::new(Bytes::from("method not allowed")))
                .unwrap()
        }
    }
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

// =============================================================================
// Router Implementation
// =============================================================================

impl PeerRouter for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>> {
        let state = self.state.lock();
        let owner = state.ring.get(key)?;
        if owner == self.self_addr {
            debug!(self_addr = %self.self_addr, key, "key owned locally");
            return None;
        }
        debug!(self_addr = %self.self_addr, key, peer = owner, "picked peer");
        let handle: Arc<dyn PeerClient> = state.clients.get(owner)?.clone();
        Some(handle)
    }

    fn pick_peers(&self, key: &str, count: usize) -> Option<Vec<Arc<dyn PeerClient>>> {
        let state = self.state.lock();
        let primary = state.ring.get(key)?.to_string();
        if primary == self.self_addr {
            return None;
        }
        if count == 0 {
            return Some(Vec::new());
        }

        let available: Vec<&String> = state
            .clients
            .keys()
            .filter(|addr| **addr != self.self_addr)
            .collect();

        if available.len() <= count {
            let handles = available
                .iter()
                .map(|addr| {
                    let handle: Arc<dyn PeerClient> = state.clients[*addr].clone();
                    handle
                })
                .collect::<Vec<_>>();
            debug!(key, peers = handles.len(), "picked all available peers");
            return Some(handles);
        }

        // Deterministic primary, randomized companions.
        let mut handles: Vec<Arc<dyn PeerClient>> = vec![state.clients[&primary].clone()];
        let mut companions: Vec<&String> = available
            .into_iter()
            .filter(|addr| **addr != primary)
            .collect();
        companions.shuffle(&mut rand::thread_rng());
        for addr in companions.into_iter().take(count - 1) {
            let handle: Arc<dyn PeerClient> = state.clients[addr].clone();
            handles.push(handle);
        }
        debug!(key, peers = handles.len(), "picked peers for hot key");
        Some(handles)
    }
}

// =============================================================================
// Tests
// =============================================================================
