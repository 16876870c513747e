use crate::backend::CacheBackend;
use crate::group::Group;
use crate::handles::{CacheFetcher, FetcherState};

#[cfg(feature = "tokio")]
use crate::backend::AsyncCacheBackend;
#[cfg(feature = "tokio")]
use crate::handles::AsyncCacheFetcher;

use std::sync::Arc;
use std::time::Duration;

/// How long a caller waits for an in-flight computation by default.
pub const DEFAULT_GROUP_TIMEOUT: Duration = Duration::from_secs(30);

/// A builder for creating `CacheFetcher` and `AsyncCacheFetcher` instances.
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use fibre_fetcher::{FetcherBuilder, Group, MemoryBackend};
///
/// let group = Group::new();
/// let fetcher = FetcherBuilder::new()
///   .group(group.clone())
///   .group_timeout(Duration::from_secs(5))
///   .debug_print(true)
///   .build(Arc::new(MemoryBackend::new()));
/// assert!(fetcher.group().same_group(&group));
/// ```
#[derive(Debug, Clone)]
pub struct FetcherBuilder {
  group: Option<Group>,
  group_timeout: Duration,
  debug_print: bool,
}

impl Default for FetcherBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl FetcherBuilder {
  /// Creates a new `FetcherBuilder` with default settings: the process-wide
  /// group, a 30 second group timeout and debug printing disabled.
  pub fn new() -> Self {
    Self {
      group: None,
      group_timeout: DEFAULT_GROUP_TIMEOUT,
      debug_print: false,
    }
  }

  /// Sets the coordination group the fetcher deduplicates through.
  ///
  /// Fetchers only collapse calls with fetchers sharing the same group.
  pub fn group(mut self, group: Group) -> Self {
    self.group = Some(group);
    self
  }

  /// Sets how long each call waits for the in-flight computation.
  ///
  /// A zero duration selects [`DEFAULT_GROUP_TIMEOUT`].
  pub fn group_timeout(mut self, timeout: Duration) -> Self {
    self.group_timeout = if timeout.is_zero() {
      DEFAULT_GROUP_TIMEOUT
    } else {
      timeout
    };
    self
  }

  /// Emits a `debug` event with the key and cache provenance after every
  /// successful operation.
  pub fn debug_print(mut self, enabled: bool) -> Self {
    self.debug_print = enabled;
    self
  }

  fn into_state(self) -> FetcherState {
    FetcherState {
      group: self.group.unwrap_or_else(Group::global),
      group_timeout: self.group_timeout,
      debug_print: self.debug_print,
      key: String::new(),
      cached: false,
    }
  }

  /// Builds a blocking fetcher over `backend`.
  pub fn build<B: CacheBackend>(self, backend: Arc<B>) -> CacheFetcher<B> {
    CacheFetcher {
      backend,
      state: self.into_state(),
    }
  }

  /// Builds an asynchronous fetcher over `backend`.
  ///
  /// Its operations must be awaited within a Tokio runtime.
  #[cfg(feature = "tokio")]
  pub fn build_async<B: AsyncCacheBackend>(self, backend: Arc<B>) -> AsyncCacheFetcher<B> {
    AsyncCacheFetcher {
      backend,
      state: self.into_state(),
    }
  }
}
