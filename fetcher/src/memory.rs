use crate::backend::{AsyncCacheBackend, CacheBackend};

use std::fmt;
use std::time::{Duration, Instant};

use ahash::HashMap;
use futures_util::future::{self, BoxFuture};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors reported by [`MemoryBackend`].
#[derive(Debug, thiserror::Error)]
pub enum MemoryBackendError {
  /// The key is absent or its entry has expired.
  #[error("memory backend: key not found")]
  Miss,
  /// The value could not be encoded or decoded.
  #[error("memory backend: codec error: {0}")]
  Codec(#[from] serde_json::Error),
}

/// A stored value with its optional expiration time.
struct StoredValue {
  bytes: Vec<u8>,
  expires_at: Option<Instant>,
}

impl StoredValue {
  #[inline]
  fn is_expired(&self, now: Instant) -> bool {
    self.expires_at.is_some_and(|at| now >= at)
  }
}

/// An in-process cache backend.
///
/// Values are stored JSON-encoded, so reads hand out fresh copies and the
/// backend behaves like a remote store would. Each entry honours the TTL given
/// on `set`; expired entries read as a miss and are dropped on access.
#[derive(Default)]
pub struct MemoryBackend {
  entries: RwLock<HashMap<String, StoredValue>>,
}

impl fmt::Debug for MemoryBackend {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryBackend")
      .field("entries", &self.entries.read().len())
      .finish()
  }
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the number of live (non-expired) entries.
  pub fn len(&self) -> usize {
    let now = Instant::now();
    self.entries.read().values().filter(|v| !v.is_expired(now)).count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns `true` if a live entry exists for `key`.
  pub fn contains_key(&self, key: &str) -> bool {
    let now = Instant::now();
    self.entries.read().get(key).is_some_and(|v| !v.is_expired(now))
  }

  /// Removes every entry.
  pub fn clear(&self) {
    self.entries.write().clear();
  }

  fn load_bytes(&self, key: &str) -> Result<Vec<u8>, MemoryBackendError> {
    let now = Instant::now();
    {
      let guard = self.entries.read();
      match guard.get(key) {
        None => return Err(MemoryBackendError::Miss),
        Some(stored) if !stored.is_expired(now) => return Ok(stored.bytes.clone()),
        Some(_) => {}
      }
    } // Read lock is dropped here.

    // Expired: remove it unless it was replaced in the meantime.
    let mut guard = self.entries.write();
    if guard.get(key).is_some_and(|stored| stored.is_expired(now)) {
      guard.remove(key);
    }
    Err(MemoryBackendError::Miss)
  }
}

impl CacheBackend for MemoryBackend {
  type Error = MemoryBackendError;

  fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), Self::Error>
  where
    T: Serialize + ?Sized,
  {
    let bytes = serde_json::to_vec(value)?;
    let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
    self
      .entries
      .write()
      .insert(key.to_owned(), StoredValue { bytes, expires_at });
    Ok(())
  }

  fn get<T>(&self, key: &str) -> Result<T, Self::Error>
  where
    T: DeserializeOwned,
  {
    let bytes = self.load_bytes(key)?;
    Ok(serde_json::from_slice(&bytes)?)
  }

  fn del(&self, key: &str) -> Result<(), Self::Error> {
    let now = Instant::now();
    match self.entries.write().remove(key) {
      Some(stored) if !stored.is_expired(now) => Ok(()),
      _ => Err(MemoryBackendError::Miss),
    }
  }

  fn is_miss(&self, err: &Self::Error) -> bool {
    matches!(err, MemoryBackendError::Miss)
  }
}

impl AsyncCacheBackend for MemoryBackend {
  type Error = MemoryBackendError;

  fn set<'a, T>(&'a self, key: &'a str, value: &'a T, ttl: Duration) -> BoxFuture<'a, Result<(), Self::Error>>
  where
    T: Serialize + Sync + ?Sized,
  {
    Box::pin(future::ready(CacheBackend::set(self, key, value, ttl)))
  }

  fn get<'a, T>(&'a self, key: &'a str) -> BoxFuture<'a, Result<T, Self::Error>>
  where
    T: DeserializeOwned + Send + 'a,
  {
    Box::pin(future::ready(CacheBackend::get(self, key)))
  }

  fn del<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), Self::Error>> {
    Box::pin(future::ready(CacheBackend::del(self, key)))
  }

  fn is_miss(&self, err: &Self::Error) -> bool {
    matches!(err, MemoryBackendError::Miss)
  }
}
