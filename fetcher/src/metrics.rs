use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for a coordination group.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Flights ---
  pub(crate) leaders: CachePadded<AtomicU64>,
  pub(crate) joins: CachePadded<AtomicU64>,
  pub(crate) completed: CachePadded<AtomicU64>,
  pub(crate) abandoned: CachePadded<AtomicU64>,

  // --- Callers ---
  pub(crate) timeouts: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      leaders: CachePadded::new(AtomicU64::new(0)),
      joins: CachePadded::new(AtomicU64::new(0)),
      completed: CachePadded::new(AtomicU64::new(0)),
      abandoned: CachePadded::new(AtomicU64::new(0)),
      timeouts: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self, in_flight: u64) -> GroupMetricsSnapshot {
    let leaders = self.leaders.load(Ordering::Relaxed);
    let joins = self.joins.load(Ordering::Relaxed);
    let total_calls = leaders + joins;

    GroupMetricsSnapshot {
      leaders,
      joins,
      collapse_ratio: if total_calls == 0 {
        0.0
      } else {
        joins as f64 / total_calls as f64
      },
      completed: self.completed.load(Ordering::Relaxed),
      abandoned: self.abandoned.load(Ordering::Relaxed),
      timeouts: self.timeouts.load(Ordering::Relaxed),
      in_flight,
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of a group's metrics.
#[derive(Clone)]
pub struct GroupMetricsSnapshot {
  /// The number of calls that started a new flight.
  pub leaders: u64,
  /// The number of calls that joined a flight already in progress.
  pub joins: u64,
  /// The share of calls served by joining (joins / (leaders + joins)).
  pub collapse_ratio: f64,
  /// The number of flights that published a result.
  pub completed: u64,
  /// The number of flights whose worker died without a result.
  pub abandoned: u64,
  /// The number of callers that stopped waiting because of their timeout.
  pub timeouts: u64,
  /// The number of flights registered at the time of the snapshot.
  pub in_flight: u64,
  /// The number of seconds the group has existed.
  pub uptime_secs: u64,
}

impl fmt::Debug for GroupMetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("GroupMetricsSnapshot")
      .field("leaders", &self.leaders)
      .field("joins", &self.joins)
      .field("collapse_ratio", &format!("{:.2}%", self.collapse_ratio * 100.0))
      .field("completed", &self.completed)
      .field("abandoned", &self.abandoned)
      .field("timeouts", &self.timeouts)
      .field("in_flight", &self.in_flight)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
