use fibre_fetcher::{key_elements, AsyncCacheFetcher, FetcherBuilder, Group, MemoryBackend};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter("fibre_fetcher=trace")
    .init();

  let backend = Arc::new(MemoryBackend::new());
  let group = Group::new();
  let producer_calls = Arc::new(AtomicUsize::new(0));

  println!("Spawning 10 tasks that all read the same key...");
  let mut handles = Vec::new();
  for i in 0..10 {
    let mut fetcher: AsyncCacheFetcher<MemoryBackend> = FetcherBuilder::new()
      .group(group.clone())
      .build_async(backend.clone());
    let producer_calls = producer_calls.clone();

    handles.push(tokio::spawn(async move {
      fetcher
        .set_hash_key(&["report"], &key_elements!["2024", vec!["eu", "us"]])
        .expect("Failed to build key");
      let report: Vec<u32> = fetcher
        .fetch(Duration::from_secs(60), move || async move {
          producer_calls.fetch_add(1, Ordering::SeqCst);
          // Simulate an expensive aggregation.
          sleep(Duration::from_millis(300)).await;
          Ok::<_, std::io::Error>(vec![120, 340, 560])
        })
        .await
        .expect("fetch failed");
      println!("Task {} got {:?} (cached: {})", i, report, fetcher.is_cached());
    }));
  }

  for handle in handles {
    handle.await.expect("task panicked");
  }

  println!("\nProducer was called {} time(s).", producer_calls.load(Ordering::SeqCst));
  println!("Group metrics: {:#?}", group.metrics());
}
