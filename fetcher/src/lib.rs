//! A request-collapsing, read-through cache fetcher.
//!
//! Put a slow value producer (a database query, a remote call) behind any
//! cache backend, and let concurrent callers for the same key share one
//! backend lookup and at most one producer call.
//!
//! # Features
//! - **Deterministic Keys**: Builds cache keys from ordered prefixes and
//!   structured values, optionally SHA-256 hashed.
//! - **Request Collapsing**: Concurrent reads of one key within a [`Group`]
//!   trigger a single lookup, a single producer call and a single cache write.
//! - **Sync & Async**: Blocking threads and async tasks can share one group.
//! - **Bounded Waits**: Every caller has its own timeout; timing out never
//!   cancels the shared computation.
//! - **Pluggable Backends**: Anything implementing [`CacheBackend`] or
//!   [`AsyncCacheBackend`]; an in-process [`MemoryBackend`] is included.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use fibre_fetcher::{key_elements, CacheFetcher, MemoryBackend};
//!
//! let mut fetcher = CacheFetcher::new(Arc::new(MemoryBackend::new()));
//! fetcher.set_key(&["user", "name"], &key_elements![42u64]).unwrap();
//!
//! let name: String = fetcher
//!   .fetch(Duration::from_secs(60), || Ok::<_, std::io::Error>("alice".to_string()))
//!   .unwrap();
//! assert_eq!(name, "alice");
//! assert!(!fetcher.is_cached());
//!
//! let again: String = fetcher.fetch(Duration::from_secs(60), || -> Result<String, std::io::Error> {
//!   unreachable!("served from the cache")
//! }).unwrap();
//! assert_eq!(again, "alice");
//! assert!(fetcher.is_cached());
//! ```

// Public modules that form the API
pub mod backend;
pub mod builder;
pub mod error;
pub mod group;
pub mod handles;
pub mod key;
pub mod memory;
pub mod metrics;

// Internal, crate-only modules
mod flight;

// Re-export the primary user-facing types for convenience
pub use backend::{AsyncCacheBackend, CacheBackend};
pub use builder::{FetcherBuilder, DEFAULT_GROUP_TIMEOUT};
pub use error::FetchError;
pub use group::Group;
pub use handles::CacheFetcher;
pub use key::{build_key, KeyElement};
pub use memory::{MemoryBackend, MemoryBackendError};
pub use metrics::GroupMetricsSnapshot;

#[cfg(feature = "tokio")]
pub use handles::AsyncCacheFetcher;
