//! HTTP peer transport: wire codec, client handles, and the node's
//! server-side dispatch.

mod client;
mod pool;
pub mod wire;

pub use client::{build_http_client, escape_segment, unescape_segment, HttpPeer, DEFAULT_PEER_TIMEOUT};
pub use pool::{HttpPool, PoolConfig, DEFAULT_BASE_PATH};
pub use wire::{PeerRequest, PeerResponse};
