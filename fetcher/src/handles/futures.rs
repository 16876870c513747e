use crate::backend::AsyncCacheBackend;
use crate::builder::FetcherBuilder;
use crate::error::FetchError;
use crate::flight::Shared;
use crate::group::Group;
use crate::handles::FetcherState;
use crate::key::KeyElement;

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

// --- AsyncCacheFetcher Implementation ---

/// An asynchronous, request-collapsing cache fetcher.
///
/// The async counterpart of [`CacheFetcher`](crate::CacheFetcher). Both kinds
/// can share one [`Group`]: a blocking thread and an async task reading the
/// same key join the same flight.
pub struct AsyncCacheFetcher<B: AsyncCacheBackend> {
  pub(crate) backend: Arc<B>,
  pub(crate) state: FetcherState,
}

impl<B: AsyncCacheBackend> fmt::Debug for AsyncCacheFetcher<B> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AsyncCacheFetcher")
      .field("key", &self.state.key)
      .field("cached", &self.state.cached)
      .field("group_timeout", &self.state.group_timeout)
      .finish_non_exhaustive()
  }
}

fn backend_error<B: AsyncCacheBackend>(backend: &B, err: B::Error) -> FetchError {
  let is_miss = backend.is_miss(&err);
  FetchError::backend(err, is_miss)
}

impl<B: AsyncCacheBackend> AsyncCacheFetcher<B> {
  /// Creates a fetcher with default options over `backend`.
  pub fn new(backend: Arc<B>) -> Self {
    FetcherBuilder::new().build_async(backend)
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

  /// Reads the current key through the cache, calling `producer` on a miss.
  ///
  /// The lookup, the producer and the cache write run in a spawned task, so
  /// dropping this future or timing out does not cancel them.
  pub async fn fetch<T, F, Fut, E>(&mut self, expiration: Duration, producer: F) -> Result<T, FetchError>
  where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
  {
    let backend = Arc::clone(&self.backend);
    let key = self.state.key.clone();

    let work = move || async move {
      match backend.get::<T>(&key).await {
        Ok(value) => return Ok(Shared::new(value, true)),
        Err(err) if !backend.is_miss(&err) => return Err(FetchError::backend(err, false)),
        Err(_) => {}
      }

      let value = producer().await.map_err(FetchError::producer)?;
      if let Err(err) = backend.set(&key, &value, expiration).await {
        return Err(backend_error(&*backend, err));
      }
      Ok(Shared::new(value, false))
    };

    let result = self
      .state
      .group
      .work_async(&self.state.key, self.state.group_timeout, work)
      .await;
    self.state.resolve(result, "fetch")
  }

  /// Like [`fetch`](Self::fetch), additionally overwriting `dst` on success.
  pub async fn fetch_into<T, F, Fut, E>(&mut self, expiration: Duration, dst: &mut T, producer: F) -> Result<T, FetchError>
  where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
  {
    let value = self.fetch(expiration, producer).await?;
    *dst = value.clone();
    Ok(value)
  }

  /// Reads the current key from the backend without a producer fallback.
  ///
  /// A missing key is reported as [`FetchError::Miss`].
  pub async fn get<T>(&mut self) -> Result<T, FetchError>
  where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
  {
    self.get_op("get").await
  }

  /// Like [`get`](Self::get), additionally overwriting `dst` on success.
  pub async fn get_into<T>(&mut self, dst: &mut T) -> Result<T, FetchError>
  where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
  {
    let value = self.get_op::<T>("get").await?;
    *dst = value.clone();
    Ok(value)
  }

  /// Reads the current key as a string.
  pub async fn get_string(&mut self) -> Result<String, FetchError> {
    self.get_op("get_string").await
  }

  async fn get_op<T>(&mut self, op: &'static str) -> Result<T, FetchError>
  where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
  {
    let backend = Arc::clone(&self.backend);
    let key = self.state.key.clone();

    let work = move || async move {
      match backend.get::<T>(&key).await {
        Ok(value) => Ok(Shared::new(value, true)),
        Err(err) => Err(backend_error(&*backend, err)),
      }
    };

    let result = self
      .state
      .group
      .work_async(&self.state.key, self.state.group_timeout, work)
      .await;
    self.state.resolve(result, op)
  }

  /// Writes `value` under the current key. Writes are not deduplicated.
  pub async fn set<T>(&mut self, value: &T, expiration: Duration) -> Result<(), FetchError>
  where
    T: Serialize + Sync + ?Sized,
  {
    self.state.cached = false;
    if let Err(err) = self.backend.set(&self.state.key, value, expiration).await {
      return Err(backend_error(&*self.backend, err));
    }
    self.state.cached = true;
    self.state.debug_print("set");
    Ok(())
  }

  /// Deletes the current key. See [`CacheFetcher::del`](crate::CacheFetcher::del).
  pub async fn del(&mut self) -> Result<(), FetchError> {
    let result = self.backend.del(&self.state.key).await;
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
