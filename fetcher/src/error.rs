use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

/// A type-erased error shared between every caller of one flight.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors returned by key construction and by fetcher operations.
///
/// The error is cheap to clone: every caller that joined the same in-flight
/// computation receives a clone of the identical error value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
  /// A key element has no canonical textual form, or is absent.
  #[error("fetcher: element is invalid")]
  Invalid,
  /// The caller gave up waiting for the in-flight computation.
  #[error("fetcher: timeout after {0:?}")]
  Timeout(Duration),
  /// The shared result could not be written into the caller's destination,
  /// i.e. another fetcher resolved the same key with a different value type.
  #[error("fetcher: destination cannot hold a value of the shared result")]
  NoDestination,
  /// The backend reported that the key is absent.
  #[error("fetcher: cache miss: {0}")]
  Miss(#[source] SharedError),
  /// Any other backend error, passed through unchanged.
  #[error("fetcher: backend error: {0}")]
  Backend(#[source] SharedError),
  /// The producer failed on a cache miss.
  #[error("fetcher: producer error: {0}")]
  Producer(#[source] SharedError),
  /// The in-flight computation ended without publishing a result,
  /// usually because the producer panicked.
  #[error("fetcher: in-flight computation was abandoned")]
  Abandoned,
}

impl FetchError {
  pub(crate) fn backend<E>(err: E, is_miss: bool) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    if is_miss {
      FetchError::Miss(Arc::new(err))
    } else {
      FetchError::Backend(Arc::new(err))
    }
  }

  pub(crate) fn producer<E>(err: E) -> Self
  where
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
  {
    FetchError::Producer(Arc::from(err.into()))
  }

  /// Returns `true` if this error is the backend's miss indication.
  pub fn is_miss(&self) -> bool {
    matches!(self, FetchError::Miss(_))
  }

  /// Returns `true` if the caller's wait timed out.
  pub fn is_timeout(&self) -> bool {
    matches!(self, FetchError::Timeout(_))
  }

  /// Returns the error reported by the backend, if this error came from it.
  ///
  /// Use `downcast_ref` on the result to recover the backend's concrete error.
  pub fn backend_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
    match self {
      FetchError::Miss(err) | FetchError::Backend(err) => Some(err.as_ref()),
      _ => None,
    }
  }
}
