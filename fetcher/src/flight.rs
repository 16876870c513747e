use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};
use std::time::Instant;

use crate::error::FetchError;

/// A value produced by one flight, shared by every caller that joined it.
pub(crate) struct Shared {
  pub(crate) value: Arc<dyn Any + Send + Sync>,
  /// Whether the value came from the cache backend rather than the producer.
  pub(crate) cached: bool,
}

impl Shared {
  pub(crate) fn new<T: Any + Send + Sync>(value: T, cached: bool) -> Self {
    Self {
      value: Arc::new(value),
      cached,
    }
  }

  /// Clones the shared value out as `T`.
  pub(crate) fn downcast<T: Any + Clone>(&self) -> Result<T, FetchError> {
    self
      .value
      .downcast_ref::<T>()
      .cloned()
      .ok_or(FetchError::NoDestination)
  }
}

pub(crate) type FlightResult = Result<Arc<Shared>, FetchError>;

/// Represents a waiter in the queue for a `Flight`.
pub(crate) enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }
}

/// The internal state of a flight.
pub(crate) enum State {
  Running,
  Complete(FlightResult),
}

/// The internal, mutex-protected core of the Flight.
pub(crate) struct Inner {
  pub(crate) state: State,
  pub(crate) waiters: VecDeque<Waiter>,
}

/// One in-flight computation for a key.
/// It can be awaited by multiple sync threads and async tasks simultaneously.
pub(crate) struct Flight {
  pub(crate) inner: Mutex<Inner>,
}

impl Flight {
  /// Creates a new `Flight` in the "Running" state.
  pub fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Running,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Completes the flight with a result, waking all waiters.
  ///
  /// Only the first completion is kept.
  pub fn complete(&self, result: FlightResult) {
    let mut inner = self.inner.lock();
    if let State::Complete(_) = inner.state {
      return;
    }
    inner.state = State::Complete(result);
    for waiter in inner.waiters.drain(..) {
      waiter.wake();
    }
  }

  #[cfg(test)]
  pub fn is_complete(&self) -> bool {
    matches!(self.inner.lock().state, State::Complete(_))
  }

  /// Blocks the current thread until the flight completes or `deadline` passes.
  ///
  /// Returns `None` on timeout.
  pub fn wait_until(&self, deadline: Instant) -> Option<FlightResult> {
    let mut inner = self.inner.lock();
    loop {
      match &inner.state {
        State::Complete(result) => return Some(result.clone()),
        State::Running => {
          let now = Instant::now();
          if now >= deadline {
            return None;
          }
          inner.waiters.push_back(Waiter::Sync(thread::current()));
          drop(inner); // Unlock before parking.
          thread::park_timeout(deadline - now);
          inner = self.inner.lock();
        }
      }
    }
  }
}

impl Future for &Flight {
  type Output = FlightResult;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut inner = self.inner.lock();
    match &inner.state {
      State::Complete(result) => Poll::Ready(result.clone()),
      State::Running => {
        if !inner.waiters.iter().any(|w| matches!(w, Waiter::Async(waker) if waker.will_wake(cx.waker()))) {
          inner.waiters.push_back(Waiter::Async(cx.waker().clone()));
        }
        Poll::Pending
      }
    }
  }
}

/// Publishes [`FetchError::Abandoned`] if dropped before the worker published
/// its result, e.g. when the producer panics.
pub(crate) struct CompletionGuard<F: FnOnce(FlightResult)> {
  publish: Option<F>,
}

impl<F: FnOnce(FlightResult)> CompletionGuard<F> {
  pub(crate) fn new(publish: F) -> Self {
    Self {
      publish: Some(publish),
    }
  }

  /// Publishes `result`; the guard no longer fires on drop.
  pub(crate) fn complete(mut self, result: FlightResult) {
    if let Some(publish) = self.publish.take() {
      publish(result);
    }
  }
}

impl<F: FnOnce(FlightResult)> Drop for CompletionGuard<F> {
  fn drop(&mut self) {
    if let Some(publish) = self.publish.take() {
      publish(Err(FetchError::Abandoned));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[test]
  fn wait_times_out_while_running() {
    let flight = Flight::new();
    let start = Instant::now();
    assert!(flight
      .wait_until(start + Duration::from_millis(30))
      .is_none());
    assert!(start.elapsed() >= Duration::from_millis(30));
    assert!(!flight.is_complete());
  }

  #[test]
  fn complete_wakes_parked_threads() {
    let flight = Arc::new(Flight::new());
    let waiter = {
      let flight = flight.clone();
      thread::spawn(move || flight.wait_until(Instant::now() + Duration::from_secs(5)))
    };
    thread::sleep(Duration::from_millis(20));
    flight.complete(Ok(Arc::new(Shared::new(7u32, false))));

    let result = waiter.join().unwrap().expect("flight should complete");
    let shared = result.unwrap();
    assert_eq!(shared.downcast::<u32>().unwrap(), 7);
    assert!(matches!(shared.downcast::<String>(), Err(FetchError::NoDestination)));
  }

  #[test]
  fn first_completion_wins() {
    let flight = Flight::new();
    flight.complete(Err(FetchError::Invalid));
    flight.complete(Ok(Arc::new(Shared::new(1u8, true))));
    let result = flight.wait_until(Instant::now()).unwrap();
    assert!(matches!(result, Err(FetchError::Invalid)));
  }

  #[test]
  fn dropped_guard_abandons_flight() {
    let flight = Arc::new(Flight::new());
    {
      let flight = flight.clone();
      let _guard = CompletionGuard::new(move |result: FlightResult| flight.complete(result));
    }
    let result = flight.wait_until(Instant::now()).unwrap();
    assert!(matches!(result, Err(FetchError::Abandoned)));
  }

  #[test]
  fn completed_guard_does_not_fire_again() {
    let flight = Arc::new(Flight::new());
    let publisher = flight.clone();
    let guard = CompletionGuard::new(move |result: FlightResult| publisher.complete(result));
    guard.complete(Ok(Arc::new(Shared::new(3i64, true))));

    let shared = flight.wait_until(Instant::now()).unwrap().unwrap();
    assert!(shared.cached);
    assert_eq!(shared.downcast::<i64>().unwrap(), 3);
  }
}
