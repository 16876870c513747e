use fibre_fetcher::{key_elements, FetcherBuilder, MemoryBackend};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter("fibre_fetcher=debug")
    .init();

  let backend = Arc::new(MemoryBackend::new());
  let mut fetcher = FetcherBuilder::new()
    .group_timeout(Duration::from_secs(2))
    .debug_print(true)
    .build(backend.clone());

  fetcher
    .set_key(&["user", "profile"], &key_elements![42u64, "en"])
    .expect("Failed to build key");
  println!("Current key: {}", fetcher.key());

  // The first fetch misses and calls the producer.
  let name: String = fetcher
    .fetch(Duration::from_secs(5), || {
      println!("Producer: querying the database...");
      thread::sleep(Duration::from_millis(200));
      Ok::<_, std::io::Error>("Alice".to_string())
    })
    .expect("fetch failed");
  println!("Fetched {:?} (cached: {})", name, fetcher.is_cached());

  // The second fetch is served by the backend.
  let name: String = fetcher
    .fetch(Duration::from_secs(5), || Ok::<_, std::io::Error>("unused".to_string()))
    .expect("fetch failed");
  println!("Fetched {:?} (cached: {})", name, fetcher.is_cached());

  println!("\nWaiting for 6 seconds for the entry to expire...");
  thread::sleep(Duration::from_secs(6));

  match fetcher.get::<String>() {
    Ok(value) => println!("Still cached: {}", value),
    Err(e) => println!("Entry gone (as expected after expiration): {}", e),
  }

  println!("\nGroup metrics: {:#?}", fetcher.group().metrics());
}
