pub mod sync;

#[cfg(feature = "tokio")]
pub mod futures;

use crate::error::FetchError;
use crate::flight::FlightResult;
use crate::group::Group;
use crate::key::{build_key, KeyElement};

use std::any::Any;
use std::time::Duration;

pub use self::sync::CacheFetcher;

#[cfg(feature = "tokio")]
pub use self::futures::AsyncCacheFetcher;

/// The per-instance state shared by the sync and async fetchers.
#[derive(Debug)]
pub(crate) struct FetcherState {
  pub(crate) group: Group,
  pub(crate) group_timeout: Duration,
  pub(crate) debug_print: bool,
  /// The key every operation acts on.
  pub(crate) key: String,
  /// Whether the last operation's result came from the cache backend.
  pub(crate) cached: bool,
}

impl FetcherState {
  /// Replaces the current key. On error the current key is kept.
  pub(crate) fn build_key<P>(
    &mut self,
    prefixes: &[P],
    elements: &[KeyElement],
    hashed: bool,
  ) -> Result<&str, FetchError>
  where
    P: AsRef<str>,
  {
    self.key = build_key(prefixes, elements, hashed)?;
    Ok(&self.key)
  }

  /// Turns the outcome of a collapsed call into this caller's value, updating
  /// the cached flag from the result's provenance.
  pub(crate) fn resolve<T>(&mut self, result: FlightResult, op: &'static str) -> Result<T, FetchError>
  where
    T: Any + Clone,
  {
    self.cached = false;
    let shared = result?;
    let value = shared.downcast::<T>()?;
    self.cached = shared.cached;
    self.debug_print(op);
    Ok(value)
  }

  pub(crate) fn debug_print(&self, op: &'static str) {
    if self.debug_print {
      tracing::debug!(op, key = %self.key, cached = self.cached, "fetcher operation succeeded");
    }
  }
}
