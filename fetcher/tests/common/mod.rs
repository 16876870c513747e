#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fibre_fetcher::{
  AsyncCacheBackend, AsyncCacheFetcher, CacheBackend, CacheFetcher, FetcherBuilder, Group, MemoryBackend,
  MemoryBackendError,
};
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum TestBackendError {
  #[error(transparent)]
  Memory(#[from] MemoryBackendError),
  #[error("backend unavailable")]
  Unavailable,
}

// A MemoryBackend wrapper that counts every call and can simulate an outage.
#[derive(Default)]
pub struct CountingBackend {
  pub inner: MemoryBackend,
  pub gets: AtomicUsize,
  pub sets: AtomicUsize,
  pub dels: AtomicUsize,
  pub unavailable: AtomicBool,
}

impl CountingBackend {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn gets(&self) -> usize {
    self.gets.load(Ordering::SeqCst)
  }

  pub fn sets(&self) -> usize {
    self.sets.load(Ordering::SeqCst)
  }

  pub fn set_unavailable(&self, unavailable: bool) {
    self.unavailable.store(unavailable, Ordering::SeqCst);
  }

  fn check(&self) -> Result<(), TestBackendError> {
    if self.unavailable.load(Ordering::SeqCst) {
      Err(TestBackendError::Unavailable)
    } else {
      Ok(())
    }
  }
}

impl CacheBackend for CountingBackend {
  type Error = TestBackendError;

  fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), Self::Error>
  where
    T: Serialize + ?Sized,
  {
    self.sets.fetch_add(1, Ordering::SeqCst);
    self.check()?;
    Ok(CacheBackend::set(&self.inner, key, value, ttl)?)
  }

  fn get<T>(&self, key: &str) -> Result<T, Self::Error>
  where
    T: DeserializeOwned,
  {
    self.gets.fetch_add(1, Ordering::SeqCst);
    self.check()?;
    Ok(CacheBackend::get(&self.inner, key)?)
  }

  fn del(&self, key: &str) -> Result<(), Self::Error> {
    self.dels.fetch_add(1, Ordering::SeqCst);
    self.check()?;
    Ok(CacheBackend::del(&self.inner, key)?)
  }

  fn is_miss(&self, err: &Self::Error) -> bool {
    matches!(err, TestBackendError::Memory(MemoryBackendError::Miss))
  }
}

impl AsyncCacheBackend for CountingBackend {
  type Error = TestBackendError;

  fn set<'a, T>(&'a self, key: &'a str, value: &'a T, ttl: Duration) -> BoxFuture<'a, Result<(), Self::Error>>
  where
    T: Serialize + Sync + ?Sized,
  {
    Box::pin(futures_util::future::ready(CacheBackend::set(self, key, value, ttl)))
  }

  fn get<'a, T>(&'a self, key: &'a str) -> BoxFuture<'a, Result<T, Self::Error>>
  where
    T: DeserializeOwned + Send + 'a,
  {
    Box::pin(futures_util::future::ready(CacheBackend::get(self, key)))
  }

  fn del<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), Self::Error>> {
    Box::pin(futures_util::future::ready(CacheBackend::del(self, key)))
  }

  fn is_miss(&self, err: &Self::Error) -> bool {
    CacheBackend::is_miss(self, err)
  }
}

pub fn build_test_fetcher(backend: &Arc<CountingBackend>, group: &Group) -> CacheFetcher<CountingBackend> {
  FetcherBuilder::new()
    .group(group.clone())
    .build(backend.clone())
}

pub fn build_test_async_fetcher(backend: &Arc<CountingBackend>, group: &Group) -> AsyncCacheFetcher<CountingBackend> {
  FetcherBuilder::new()
    .group(group.clone())
    .build_async(backend.clone())
}
