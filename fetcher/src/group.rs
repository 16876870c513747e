//! The coordination group: a registry of in-flight computations by key.
//!
//! The first caller for a key becomes the leader and starts a flight on a
//! detached worker; later callers for the same key join that flight instead
//! of starting their own. Every caller waits for the published result or for
//! its own deadline. A caller that times out leaves the flight running, so the
//! work for a key is never executed twice within one epoch.

use crate::error::FetchError;
use crate::flight::{CompletionGuard, Flight, FlightResult, Shared};
use crate::metrics::{GroupMetricsSnapshot, Metrics};

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ahash::HashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// The default number of registry shards.
pub const DEFAULT_SHARDS: usize = 16;

static GLOBAL_GROUP: Lazy<Group> = Lazy::new(Group::new);

/// A shareable handle to a coordination group.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone)]
pub struct Group {
  shared: Arc<GroupShared>,
}

struct GroupShared {
  pending: Box<[Mutex<HashMap<String, Arc<Flight>>>]>,
  hasher: ahash::RandomState,
  metrics: Metrics,
}

impl fmt::Debug for Group {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Group")
      .field("shards", &self.shared.pending.len())
      .field("metrics", &self.metrics())
      .finish_non_exhaustive()
  }
}

impl Default for Group {
  fn default() -> Self {
    Self::new()
  }
}

impl Group {
  /// Creates a new, empty group with [`DEFAULT_SHARDS`] shards.
  pub fn new() -> Self {
    Self::with_shards(DEFAULT_SHARDS)
  }

  /// Creates a new, empty group with the given number of shards.
  ///
  /// The count is rounded up to a power of two, with a minimum of one.
  pub fn with_shards(shards: usize) -> Self {
    let shards = shards.max(1).next_power_of_two();
    Self {
      shared: Arc::new(GroupShared {
        pending: (0..shards).map(|_| Mutex::new(HashMap::default())).collect(),
        hasher: ahash::RandomState::new(),
        metrics: Metrics::new(),
      }),
    }
  }

  /// Returns a handle to the process-wide group.
  pub fn global() -> Group {
    GLOBAL_GROUP.clone()
  }

  /// Returns `true` if both handles refer to the same registry.
  pub fn same_group(&self, other: &Group) -> bool {
    Arc::ptr_eq(&self.shared, &other.shared)
  }

  /// Returns `true` if a flight is currently registered for `key`.
  pub fn is_in_flight(&self, key: &str) -> bool {
    self.shard(key).lock().contains_key(key)
  }

  /// Returns the number of flights currently registered.
  pub fn in_flight(&self) -> usize {
    self.shared.pending.iter().map(|shard| shard.lock().len()).sum()
  }

  pub fn metrics(&self) -> GroupMetricsSnapshot {
    self.shared.metrics.snapshot(self.in_flight() as u64)
  }

  fn shard(&self, key: &str) -> &Mutex<HashMap<String, Arc<Flight>>> {
    let hash = self.shared.hasher.hash_one(key);
    let index = hash as usize & (self.shared.pending.len() - 1);
    &self.shared.pending[index]
  }

  /// Returns the flight registered for `key`, registering a new one if none
  /// exists. The boolean is `true` when the caller became the leader.
  fn join_or_lead(&self, key: &str) -> (Arc<Flight>, bool) {
    let mut pending = self.shard(key).lock();

    if let Some(existing) = pending.get(key) {
      self.shared.metrics.joins.fetch_add(1, Ordering::Relaxed);
      tracing::trace!(key, "joining in-flight computation");
      return (existing.clone(), false);
    }

    self.shared.metrics.leaders.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(key, "starting new flight");
    let flight = Arc::new(Flight::new());
    pending.insert(key.to_owned(), flight.clone());
    (flight, true)
  } // `pending` is dropped here.

  /// Publishes `result` to every waiter of `flight` and removes it from the
  /// registry, ending its epoch. Both happen under the shard lock, so a new
  /// caller either joins before publication or starts a fresh flight.
  fn finish(&self, key: &str, flight: &Arc<Flight>, result: FlightResult) {
    let abandoned = matches!(result, Err(FetchError::Abandoned));
    let mut pending = self.shard(key).lock();
    flight.complete(result);
    if pending.get(key).is_some_and(|current| Arc::ptr_eq(current, flight)) {
      pending.remove(key);
    }
    drop(pending);

    if abandoned {
      self.shared.metrics.abandoned.fetch_add(1, Ordering::Relaxed);
      tracing::warn!(key, "in-flight computation ended without a result");
    } else {
      self.shared.metrics.completed.fetch_add(1, Ordering::Relaxed);
      tracing::trace!(key, "flight completed");
    }
  }

  /// Returns a guard that publishes to `flight` and ends its epoch. Dropping
  /// the guard unpublished reports [`FetchError::Abandoned`].
  fn completion_guard(&self, key: &str, flight: &Arc<Flight>) -> CompletionGuard<impl FnOnce(FlightResult) + Send + 'static> {
    let group = self.clone();
    let key = key.to_owned();
    let flight = flight.clone();
    CompletionGuard::new(move |result: FlightResult| group.finish(&key, &flight, result))
  }

  fn timed_out(&self, key: &str, timeout: Duration) -> FetchError {
    self.shared.metrics.timeouts.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(key, ?timeout, "gave up waiting for flight");
    FetchError::Timeout(timeout)
  }

  /// Runs `work` at most once per epoch of `key` and blocks until its result
  /// is available or `timeout` elapses.
  ///
  /// The leader's work runs on a dedicated thread, so the leader can time out
  /// like any follower without cancelling it.
  pub(crate) fn work_blocking<W>(&self, key: &str, timeout: Duration, work: W) -> FlightResult
  where
    W: FnOnce() -> Result<Shared, FetchError> + Send + 'static,
  {
    let deadline = Instant::now() + timeout;
    let (flight, is_leader) = self.join_or_lead(key);

    if is_leader {
      // A worker that never runs drops the guard, which abandons the flight.
      let guard = self.completion_guard(key, &flight);
      let spawned = thread::Builder::new()
        .name("fibre-fetcher-flight".into())
        .spawn(move || guard.complete(work().map(Arc::new)));
      if let Err(e) = spawned {
        tracing::error!(key, error = %e, "failed to spawn flight worker");
      }
    }

    match flight.wait_until(deadline) {
      Some(result) => result,
      None => Err(self.timed_out(key, timeout)),
    }
  }

  /// The asynchronous counterpart of [`Group::work_blocking`]. The leader's
  /// work is spawned as a Tokio task.
  #[cfg(feature = "tokio")]
  pub(crate) async fn work_async<W, Fut>(&self, key: &str, timeout: Duration, work: W) -> FlightResult
  where
    W: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<Shared, FetchError>> + Send + 'static,
  {
    let (flight, is_leader) = self.join_or_lead(key);

    if is_leader {
      // The guard lives in the task, so a task dropped before its first poll
      // still ends the epoch.
      let guard = self.completion_guard(key, &flight);
      tokio::spawn(async move { guard.complete(work().await.map(Arc::new)) });
    }

    match tokio::time::timeout(timeout, &*flight).await {
      Ok(result) => result,
      Err(_) => Err(self.timed_out(key, timeout)),
    }
  }
}
