//! The contracts a cache backend has to fulfil.
//!
//! A backend stores serializable values under string keys. The fetcher never
//! looks at backend internals: it only reads, writes and deletes keys, and
//! asks the backend whether an error means "the key is absent".

use std::error::Error as StdError;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A blocking cache backend, e.g. a synchronous Redis or Memcached client.
pub trait CacheBackend: Send + Sync + 'static {
  type Error: StdError + Send + Sync + 'static;

  /// Stores `value` under `key`. A zero `ttl` means the backend's default,
  /// which is usually "never expires".
  fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), Self::Error>
  where
    T: Serialize + ?Sized;

  /// Loads the value stored under `key`.
  fn get<T>(&self, key: &str) -> Result<T, Self::Error>
  where
    T: DeserializeOwned;

  /// Removes `key`.
  fn del(&self, key: &str) -> Result<(), Self::Error>;

  /// Returns `true` if `err` reports a missing key.
  fn is_miss(&self, err: &Self::Error) -> bool;
}

/// An asynchronous cache backend.
///
/// Same contract as [`CacheBackend`], with every operation returning a boxed
/// future.
pub trait AsyncCacheBackend: Send + Sync + 'static {
  type Error: StdError + Send + Sync + 'static;

  fn set<'a, T>(&'a self, key: &'a str, value: &'a T, ttl: Duration) -> BoxFuture<'a, Result<(), Self::Error>>
  where
    T: Serialize + Sync + ?Sized;

  fn get<'a, T>(&'a self, key: &'a str) -> BoxFuture<'a, Result<T, Self::Error>>
  where
    T: DeserializeOwned + Send + 'a;

  fn del<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), Self::Error>>;

  fn is_miss(&self, err: &Self::Error) -> bool;
}
