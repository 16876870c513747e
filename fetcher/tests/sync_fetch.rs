mod common;

use common::{build_test_fetcher, CountingBackend, TestBackendError};
use fibre_fetcher::{key_elements, FetchError, Group};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(10);

#[test]
fn test_fetch_reads_through_then_hits_cache() {
  let backend = CountingBackend::new();
  let mut fetcher = build_test_fetcher(&backend, &Group::new());
  fetcher
    .set_key(&["prefix", "key"], &key_elements!["hoge", "fuga"])
    .unwrap();

  let calls = Arc::new(AtomicUsize::new(0));
  let producer = {
    let calls = calls.clone();
    move || {
      calls.fetch_add(1, Ordering::SeqCst);
      Ok::<_, io::Error>("piyo".to_string())
    }
  };

  // 1. First fetch comes from the producer.
  let mut dst = String::new();
  let value = fetcher.fetch_into(TTL, &mut dst, producer.clone()).unwrap();
  assert_eq!(value, "piyo");
  assert_eq!(dst, "piyo");
  assert!(!fetcher.is_cached());
  assert_eq!(backend.sets(), 1);

  // 2. Second fetch is served by the cache.
  let mut dst = String::new();
  let value = fetcher.fetch_into(TTL, &mut dst, producer).unwrap();
  assert_eq!(value, "piyo");
  assert_eq!(dst, "piyo");
  assert!(fetcher.is_cached());
  assert_eq!(calls.load(Ordering::SeqCst), 1, "Producer should NOT be called again");
  assert_eq!(backend.sets(), 1);
}

#[test]
fn test_set_then_get() {
  let backend = CountingBackend::new();
  let mut fetcher = build_test_fetcher(&backend, &Group::new());
  fetcher
    .set_hash_key(&["prefix", "key"], &key_elements!["hoge", "fuga"])
    .unwrap();

  fetcher.set("value", TTL).unwrap();
  assert!(fetcher.is_cached());

  let mut dst = String::new();
  let value: String = fetcher.get_into(&mut dst).unwrap();
  assert_eq!(value, "value");
  assert_eq!(dst, "value");
  assert!(fetcher.is_cached());

  assert_eq!(fetcher.get_string().unwrap(), "value");
  assert!(fetcher.is_cached());
}

#[test]
fn test_get_of_absent_key_is_a_miss() {
  let backend = CountingBackend::new();
  let mut fetcher = build_test_fetcher(&backend, &Group::new());
  fetcher.set_key(&["absent"], &key_elements![1u8]).unwrap();

  let mut dst = String::from("untouched");
  let err = fetcher.get_into(&mut dst).unwrap_err();
  assert!(err.is_miss());
  assert_eq!(dst, "untouched");
  assert!(!fetcher.is_cached());
}

#[test]
fn test_del_semantics() {
  let backend = CountingBackend::new();
  let mut fetcher = build_test_fetcher(&backend, &Group::new());
  fetcher
    .set_key(&["prefix", "key"], &key_elements!["hoge", "fuga"])
    .unwrap();
  fetcher.set("value", TTL).unwrap();

  // Deleting an existing key.
  fetcher.del().unwrap();
  assert!(fetcher.is_cached());

  // The key is gone afterwards.
  let err = fetcher.get::<String>().unwrap_err();
  assert!(err.is_miss());
  assert!(!fetcher.is_cached());

  // Deleting it again reports the miss.
  let err = fetcher.del().unwrap_err();
  assert!(err.is_miss());
  assert!(!fetcher.is_cached());
}

#[test]
fn test_backend_failure_skips_producer() {
  let backend = CountingBackend::new();
  let mut fetcher = build_test_fetcher(&backend, &Group::new());
  fetcher.set_key(&["outage"], &key_elements!["k"]).unwrap();
  backend.set_unavailable(true);

  let calls = Arc::new(AtomicUsize::new(0));
  let err = fetcher
    .fetch(TTL, {
      let calls = calls.clone();
      move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, io::Error>(1u32)
      }
    })
    .unwrap_err();

  assert!(matches!(err, FetchError::Backend(_)));
  let source = err.backend_error().unwrap();
  assert!(matches!(
    source.downcast_ref::<TestBackendError>(),
    Some(TestBackendError::Unavailable)
  ));
  assert_eq!(calls.load(Ordering::SeqCst), 0);

  // Writes and deletes surface the same error.
  assert!(matches!(fetcher.set(&1u32, TTL), Err(FetchError::Backend(_))));
  assert!(!fetcher.is_cached());
  assert!(matches!(fetcher.del(), Err(FetchError::Backend(_))));
  assert!(fetcher.is_cached());
}

#[test]
fn test_producer_error_is_not_cached() {
  let backend = CountingBackend::new();
  let group = Group::new();
  let mut fetcher = build_test_fetcher(&backend, &group);
  fetcher.set_key(&["flaky"], &key_elements!["k"]).unwrap();

  let err = fetcher
    .fetch(TTL, || Err::<String, _>(io::Error::new(io::ErrorKind::Other, "db down")))
    .unwrap_err();
  assert!(matches!(err, FetchError::Producer(_)));
  assert_eq!(err.to_string(), "fetcher: producer error: db down");
  assert_eq!(backend.sets(), 0);

  // The failed epoch is over; the next call starts fresh.
  let value = fetcher
    .fetch(TTL, || Ok::<_, io::Error>("recovered".to_string()))
    .unwrap();
  assert_eq!(value, "recovered");
  assert!(!fetcher.is_cached());
  assert_eq!(group.metrics().leaders, 2);
}

#[test]
fn test_fetch_structured_values() {
  #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
  struct Profile {
    id: u64,
    tags: Vec<String>,
  }

  let backend = CountingBackend::new();
  let mut fetcher = build_test_fetcher(&backend, &Group::new());
  fetcher
    .set_key(&["profile"], &key_elements![7u64, vec!["a", "b"]])
    .unwrap();
  assert_eq!(fetcher.key(), "profile_7_a_b");

  let expected = Profile {
    id: 7,
    tags: vec!["a".into(), "b".into()],
  };
  let produced = expected.clone();
  let value = fetcher.fetch(TTL, move || Ok::<_, io::Error>(produced)).unwrap();
  assert_eq!(value, expected);

  let cached: Profile = fetcher.get().unwrap();
  assert_eq!(cached, expected);
  assert!(fetcher.is_cached());
}
