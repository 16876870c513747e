use crate::backend::CacheBackend;
use crate::builder::FetcherBuilder;
use crate::error::FetchError;
use crate::flight::Shared;
use crate::group::Group;
use crate::handles::FetcherState;
use crate::key::KeyElement;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A blocking, request-collapsing cache fetcher.
///
/// A fetcher holds a current key, set with [`set_key`](Self::set_key) or
/// [`set_hash_key`](Self::set_hash_key), and every operation acts on that key.
/// Reads ([`fetch`](Self::fetch), [`get`](Self::get)) are deduplicated across
/// all fetchers sharing the same [`Group`]: concurrent reads of one key cause a
/// single backend lookup and at most one producer call, and every caller
/// receives the same result. Writes and deletes go straight to the backend.
pub struct CacheFetcher<B: CacheBackend> {
  pub(crate) backend: Arc<B>,
  pub(crate) state: FetcherState,
}

impl<B: CacheBackend> fmt::Debug for CacheFetcher<B> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheFetcher")
      .field("key", &self.state.key)
      .field("cached", &self.state.cached)
      .field("group_timeout", &self.state.group_timeout)
      .finish_non_exhaustive()
  }
}

/// Wraps a backend error, keeping its miss classification.
fn backend_error<B: CacheBackend>(backend: &B, err: B::Error) -> FetchError {
  let is_miss = backend.is_miss(&err);
  FetchError::backend(err, is_miss)
}

impl<B: CacheBackend> CacheFetcher<B> {
  /// Creates a fetcher with default options over `backend`.
  pub fn new(backend: Arc<B>) -> Self {
    FetcherBuilder::new().build(backend)
  }

  /// Returns the backend this fetcher reads and writes through.
  pub fn backend(&self) -> &Arc<B> {
    &self.backend
  }

  /// Returns the coordination group reads are deduplicated through.
  pub fn group(&self) -> &Group {
    &self.state.group
  }

  /// Returns how long each read waits for the in-flight computation.
  pub fn group_timeout(&self) -> Duration {
    self.state.group_timeout
  }

  /// Returns the current key.
  pub fn key(&self) -> &str {
    &self.state.key
  }

  /// Returns whether the most recent operation's result came from the cache
  /// backend rather than from the producer.
  pub fn is_cached(&self) -> bool {
    self.state.cached
  }

  /// Builds the key from `prefixes` and `elements` and makes it current.
  ///
  /// See [`build_key`](crate::build_key) for the format. On error the
  /// current key is left unchanged.
  pub fn build_key<P>(&mut self, prefixes: &[P], elements: &[KeyElement], hashed: bool) -> Result<&str, FetchError>
  where
    P: AsRef<str>,
  {
    self.state.build_key(prefixes, elements, hashed)
  }

  /// Sets the current key from plain rendered elements.
  pub fn set_key<P>(&mut self, prefixes: &[P], elements: &[KeyElement]) -> Result<&str, FetchError>
  where
    P: AsRef<str>,
  {
    self.build_key(prefixes, elements, false)
  }

  /// Sets the current key with the elements replaced by their SHA-256 digest.
  pub fn set_hash_key<P>(&mut self, prefixes: &[P], elements: &[KeyElement]) -> Result<&str, FetchError>
  where
    P: AsRef<str>,
  {
    self.build_key(prefixes, elements, true)
  }

  /// Reads the current key through the cache.
  ///
  /// On a cache hit the cached value is returned. On a miss `producer` is
  /// called and its value is stored with `expiration` before being returned.
  /// Concurrent calls for the same key within the group share one lookup and
  /// one producer call.
  ///
  /// # Errors
  ///
  /// - [`FetchError::Timeout`] if the shared result is not ready within the
  ///   group timeout. The computation keeps running for other callers.
  /// - [`FetchError::Backend`] for any backend failure other than a miss;
  ///   the producer is not called in that case.
  /// - [`FetchError::Producer`] if the producer fails. Nothing is cached.
  pub fn fetch<T, F, E>(&mut self, expiration: Duration, producer: F) -> Result<T, FetchError>
  where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
  {
    let backend = Arc::clone(&self.backend);
    let key = self.state.key.clone();

    let result = self.state.group.work_blocking(&self.state.key, self.state.group_timeout, move || {
      match backend.get::<T>(&key) {
        Ok(value) => return Ok(Shared::new(value, true)),
        Err(err) if !backend.is_miss(&err) => return Err(FetchError::backend(err, false)),
        Err(_) => {}
      }

      let value = producer().map_err(FetchError::producer)?;
      backend
        .set(&key, &value, expiration)
        .map_err(|err| backend_error(&*backend, err))?;
      Ok(Shared::new(value, false))
    });

    self.state.resolve(result, "fetch")
  }

  /// Like [`fetch`](Self::fetch), additionally overwriting `dst` with the
  /// value on success. `dst` is left untouched on error.
  pub fn fetch_into<T, F, E>(&mut self, expiration: Duration, dst: &mut T, producer: F) -> Result<T, FetchError>
  where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
  {
    let value = self.fetch(expiration, producer)?;
    *dst = value.clone();
    Ok(value)
  }

  /// Reads the current key from the backend without a producer fallback.
  ///
  /// A missing key is reported as [`FetchError::Miss`].
  pub fn get<T>(&mut self) -> Result<T, FetchError>
  where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
  {
    self.get_op("get")
  }

  /// Like [`get`](Self::get), additionally overwriting `dst` on success.
  pub fn get_into<T>(&mut self, dst: &mut T) -> Result<T, FetchError>
  where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
  {
    let value = self.get_op::<T>("get")?;
    *dst = value.clone();
    Ok(value)
  }

  /// Reads the current key as a string.
  pub fn get_string(&mut self) -> Result<String, FetchError> {
    self.get_op("get_string")
  }

  fn get_op<T>(&mut self, op: &'static str) -> Result<T, FetchError>
  where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
  {
    let backend = Arc::clone(&self.backend);
    let key = self.state.key.clone();

    let result = self.state.group.work_blocking(&self.state.key, self.state.group_timeout, move || {
      backend
        .get::<T>(&key)
        .map(|value| Shared::new(value, true))
        .map_err(|err| backend_error(&*backend, err))
    });

    self.state.resolve(result, op)
  }

  /// Writes `value` under the current key. Writes are not deduplicated.
  pub fn set<T>(&mut self, value: &T, expiration: Duration) -> Result<(), FetchError>
  where
    T: Serialize + ?Sized,
  {
    self.state.cached = false;
    if let Err(err) = self.backend.set(&self.state.key, value, expiration) {
      return Err(backend_error(&*self.backend, err));
    }
    self.state.cached = true;
    self.state.debug_print("set");
    Ok(())
  }

  /// Deletes the current key.
  ///
  /// Afterwards [`is_cached`](Self::is_cached) reports whether the key was
  /// present. Deleting an absent key returns the backend's miss as
  /// [`FetchError::Miss`].
  pub fn del(&mut self) -> Result<(), FetchError> {
    let result = self.backend.del(&self.state.key);
    self.state.cached = true;
    if let Err(err) = result {
      let is_miss = self.backend.is_miss(&err);
      if is_miss {
        self.state.cached = false;
      }
      return Err(FetchError::backend(err, is_miss));
    }
    self.state.debug_print("del");
    Ok(())
  }
}
