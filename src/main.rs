//! embercache node binary.
//!
//! Runs one cache node: the peer endpoint, an optional user-facing API,
//! and health and Prometheus metrics servers. The demo source of truth is
//! an in-memory storage engine seeded from a JSON file or a built-in
//! sample dataset.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use embercache::compression::{CompressionAlgorithm, CompressionConfig};
use embercache::error::Error;
use embercache::group::{Group, GroupRegistry};
use embercache::http::{HttpPool, PoolConfig, DEFAULT_PEER_TIMEOUT};
use embercache::metrics::PrometheusSink;
use embercache::peers::PeerRouter;
use embercache::storage::{MemoryStorage, Storage, StorageLoader, StorageOptions};
use embercache::Result;

// =============================================================================
// CLI Arguments
// =============================================================================

/// embercache - distributed read-through in-memory cache node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Advertised base URL of this node
    #[arg(long, env = "EMBERCACHE_ADDR", default_value = "http://127.0.0.1:8001")]
    addr: String,

    /// Advertised URLs of all fleet nodes, including this one
    #[arg(long, env = "EMBERCACHE_PEERS", value_delimiter = ',')]
    peers: Vec<String>,

    /// Group name served by this node
    #[arg(long, env = "EMBERCACHE_GROUP", default_value = "scores")]
    group: String,

    /// Local-cache budget in bytes
    #[arg(long, env = "EMBERCACHE_CACHE_BYTES", default_value = "2048")]
    cache_bytes: u64,

    /// Access count at which a key turns hot
    #[arg(long, env = "EMBERCACHE_HOT_SPOT_THRESHOLD", default_value = "100")]
    hot_spot_threshold: usize,

    /// Number of replica peers for hot keys
    #[arg(long, env = "EMBERCACHE_BACKUP_COUNT", default_value = "2")]
    backup_count: usize,

    /// Virtual nodes per peer on the hash ring
    #[arg(long, env = "EMBERCACHE_VIRTUAL_NODES", default_value = "50")]
    virtual_nodes: usize,

    /// Path prefix of the peer endpoint
    #[arg(long, env = "EMBERCACHE_BASE_PATH", default_value = "/_geecache/")]
    base_path: String,

    /// Budget for one hot-key peer race, in milliseconds
    #[arg(long, env = "EMBERCACHE_MULTI_PEER_DEADLINE_MS", default_value = "500")]
    multi_peer_deadline_ms: u64,

    /// CA bundle for TLS peer verification
    #[arg(long, env = "EMBERCACHE_TLS_CA")]
    tls_ca: Option<std::path::PathBuf>,

    /// Start the user-facing API server?
    #[arg(long, env = "EMBERCACHE_API")]
    api: bool,

    /// API server bind address
    #[arg(long, env = "EMBERCACHE_API_ADDR", default_value = "127.0.0.1:9999")]
    api_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "EMBERCACHE_METRICS_ADDR", default_value = "127.0.0.1:9100")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "EMBERCACHE_HEALTH_ADDR", default_value = "127.0.0.1:9101")]
    health_addr: String,

    /// JSON object of key -> value pairs seeding the demo source store
    #[arg(long, env = "EMBERCACHE_SEED_FILE")]
    seed_file: Option<std::path::PathBuf>,

    /// Compression for the source store (none, lz4)
    #[arg(long, env = "EMBERCACHE_COMPRESSION", default_value = "none")]
    compression: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!("Starting embercache node");
    info!("  Advertised address: {}", args.addr);
    info!("  Group: {}", args.group);
    info!("  Cache budget: {} bytes", args.cache_bytes);
    info!("  Hot-spot threshold: {}", args.hot_spot_threshold);
    info!("  Backup count: {}", args.backup_count);

    // Demo source of truth: in-memory storage, optionally compressed.
    let compression: CompressionAlgorithm = args.compression.parse()?;
    let storage = Arc::new(MemoryStorage::new(StorageOptions {
        max_bytes: 0,
        compression: match compression {
            CompressionAlgorithm::None => None,
            algorithm => Some(CompressionConfig {
                algorithm,
                ..CompressionConfig::default()
            }),
        },
    }));
    seed_storage(storage.as_ref(), args.seed_file.as_deref()).await?;

    let registry = Arc::new(GroupRegistry::new());
    let group = registry.new_group(
        &args.group,
        args.cache_bytes,
        Arc::new(StorageLoader::new(storage)),
    );
    group.set_hot_spot_threshold(args.hot_spot_threshold);
    group.set_backup_count(args.backup_count);
    group.set_multi_peer_deadline(Duration::from_millis(args.multi_peer_deadline_ms));

    let sink = Arc::new(PrometheusSink::new());
    group.set_metrics(sink.clone());

    // Peer pool: router plus server-side dispatch.
    let pool = Arc::new(HttpPool::with_config(
        args.addr.clone(),
        Arc::clone(&registry),
        PoolConfig {
            base_path: args.base_path.clone(),
            virtual_nodes: args.virtual_nodes,
            hash: None,
            ca_file: args.tls_ca.clone(),
            peer_timeout: DEFAULT_PEER_TIMEOUT,
        },
    )?);
    let peer_addrs = if args.peers.is_empty() {
        vec![args.addr.clone()]
    } else {
        args.peers.clone()
    };
    pool.set_peers(&peer_addrs);
    group.register_peers(Arc::clone(&pool) as Arc<dyn PeerRouter>);
    info!("  Peers: {:?}", peer_addrs);

    // Peer endpoint.
    let listener = TcpListener::bind(listen_addr(&args.addr)?).await?;
    let peer_server = Arc::clone(&pool);
    tokio::spawn(async move {
        if let Err(err) = peer_server.serve(listener).await {
            error!("Peer server error: {}", err);
        }
    });

    // Health endpoint.
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(err) = run_health_server(&health_addr).await {
            error!("Health server error: {}", err);
        }
    });

    // Prometheus metrics endpoint.
    let metrics_addr = args.metrics_addr.clone();
    let metrics_sink = Arc::clone(&sink);
    tokio::spawn(async move {
        if let Err(err) = run_metrics_server(&metrics_addr, metrics_sink).await {
            error!("Metrics server error: {}", err);
        }
    });

    // User-facing API.
    if args.api {
        let api_addr = args.api_addr.clone();
        let api_group = Arc::clone(&group);
        tokio::spawn(async move {
            if let Err(err) = run_api_server(&api_addr, api_group).await {
                error!("API server error: {}", err);
            }
        });
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| Error::Internal(format!("waiting for shutdown signal: {err}")))?;
    info!("Shutting down");
    Ok(())
}

/// Bind address for an advertised URL, e.g. `http://127.0.0.1:8001` ->
/// `127.0.0.1:8001`.
fn listen_addr(addr: &str) -> Result<&str> {
    addr.strip_prefix("http://")
        .or_else(|| addr.strip_prefix("https://"))
        .ok_or_else(|| {
            Error::InvalidArgument(format!("address must start with http:// or https://: {addr}"))
        })
}

async fn seed_storage(storage: &dyn Storage, seed_file: Option<&std::path::Path>) -> Result<()> {
    let entries: HashMap<String, String> = match seed_file {
        Some(path) => {
            let raw = std::fs::read(path)?;
            serde_json::from_slice(&raw)
                .map_err(|err| Error::InvalidArgument(format!("parsing seed file: {err}")))?
        }
        None => [("Tom", "630"), ("Jack", "589"), ("Sam", "567")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    };
    let count = entries.len();
    for (key, value) in entries {
        storage.set(&key, value.as_bytes()).await?;
    }
    info!("Seeded source store with {} entries", count);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("reqwest=warn".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str) -> Result<()> {
    async fn health_handler(
        req: Request<Incoming>,
    ) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
        let response = match req.uri().path() {
            "/healthz" | "/livez" | "/readyz" => Response::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::from("ok")))
                .unwrap(),
            _ => Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Full::new(Bytes::from("not found")))
                .unwrap(),
        };
        Ok(response)
    }

    let listener = TcpListener::bind(addr).await?;
    info!("Health server listening on {}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .serve_connection(io, service_fn(health_handler))
                .await
            {
                tracing::warn!("Health server connection error: {}", err);
            }
        });
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, sink: Arc<PrometheusSink>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let sink = Arc::clone(&sink);
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let sink = Arc::clone(&sink);
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match sink.gather_text() {
                            Ok(text) => Response::builder()
                                .status(StatusCode::OK)
                                .header("Content-Type", "text/plain; version=0.0.4")
                                .body(Full::new(Bytes::from(text)))
                                .unwrap(),
                            Err(err) => Response::builder()
                                .status(StatusCode::INTERNAL_SERVER_ERROR)
                                .body(Full::new(Bytes::from(err.to_string())))
                                .unwrap(),
                        },
                        _ => Response::builder()
                            .status(StatusCode::NOT_FOUND)
                            .body(Full::new(Bytes::from("not found")))
                            .unwrap(),
                    };
                    Ok::<_, Infallible>(response)
                }
            });
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::warn!("Metrics server connection error: {}", err);
            }
        });
    }
}

// =============================================================================
// API Server
// =============================================================================

async fn run_api_server(addr: &str, group: Arc<Group>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let group = Arc::clone(&group);
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let group = Arc::clone(&group);
                async move { Ok::<_, Infallible>(api_handler(req, group).await) }
            });
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::warn!("API server connection error: {}", err);
            }
        });
    }
}

async fn api_handler(req: Request<Incoming>, group: Arc<Group>) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/api" => {
            let key = query_param(req.uri().query(), "key").unwrap_or_default();
            match group.get(&key).await {
                Ok(view) => Response::builder()
                    .status(StatusCode::OK)
                    .header("Content-Type", "application/octet-stream")
                    .body(Full::new(Bytes::from(view.to_vec())))
                    .unwrap(),
                Err(err) => Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Full::new(Bytes::from(err.to_string())))
                    .unwrap(),
            }
        }
        "/stats" => {
            let body = serde_json::to_string(&group.stats()).unwrap_or_default();
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "application/json")
                .body(Full::new(Bytes::from(body)))
                .unwrap()
        }
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap(),
    }
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    for pair in query?.split('&') {
        let mut parts = pair.splitn(2, '=');
        if parts.next() == Some(name) {
            let raw = parts.next().unwrap_or("");
            return percent_encoding::percent_decode_str(raw)
                .decode_utf8()
                .ok()
                .map(|s| s.into_owned());
        }
    }
    None
}
