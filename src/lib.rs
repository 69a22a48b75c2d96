//! embercache - Distributed Read-Through In-Memory Cache
//!
//! A cooperating fleet of cache nodes collectively serves lookups for a
//! named data domain, partitioning keys across nodes by consistent hashing,
//! coalescing concurrent duplicate requests, and adaptively replicating hot
//! keys onto backup nodes to absorb load spikes.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                            Cache Node                             │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌──────────────┐   ┌───────────────────────┐     │
//! │  │  Group    │──▶│ Single-Flight│──▶│ Consistent-Hash Router│     │
//! │  │ (pipeline)│   │  Coalescer   │   │  + HTTP Peer Clients  │     │
//! │  └─────┬─────┘   └──────────────┘   └───────────┬───────────┘     │
//! │        │                                        │                 │
//! │  ┌─────▼─────┐   ┌──────────────┐   ┌───────────▼───────────┐     │
//! │  │ LRU Local │   │  Hot-Spot    │   │  Peer HTTP Endpoint   │     │
//! │  │   Cache   │   │  Tracker     │   │  (GET lookup / PUT    │     │
//! │  │           │   │              │   │   replica push)       │     │
//! │  └───────────┘   └──────────────┘   └───────────────────────┘     │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`group`] - Read-through cache groups, registry, hot-spot tracking
//! - [`cache`] - Byte-budget bounded LRU local store
//! - [`singleflight`] - Per-key request coalescing
//! - [`ring`] - Consistent-hash ring
//! - [`peers`] - Router and transport contracts
//! - [`http`] - HTTP peer transport and node server dispatch
//! - [`discovery`] - Service discovery contracts and peer-set binding
//! - [`storage`] - Pluggable storage engines usable as cache sources
//! - [`compression`] - Value compression codecs
//! - [`metrics`] - Metrics sinks
//! - [`error`] - Error types

pub mod byteview;
pub mod cache;
pub mod compression;
pub mod discovery;
pub mod error;
pub mod group;
pub mod http;
pub mod metrics;
pub mod peers;
pub mod ring;
pub mod singleflight;
pub mod storage;

pub use byteview::ByteView;
pub use error::{Error, Result};
pub use group::{FnLoader, Group, GroupRegistry, Loader, Stats};
pub use http::{HttpPool, PoolConfig, DEFAULT_BASE_PATH};
pub use peers::{PeerClient, PeerRouter};
