use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fibre_fetcher::{build_key, key_elements, CacheFetcher, FetcherBuilder, Group, MemoryBackend};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

const TTL: Duration = Duration::from_secs(600);

fn bench_build_key(c: &mut Criterion) {
  let mut group = c.benchmark_group("BuildKey");
  let elements = key_elements![42u64, "tenant", vec![1i32, 2, 3], Some(true)];

  for (name, hashed) in [("plain", false), ("hashed", true)] {
    group.bench_with_input(BenchmarkId::from_parameter(name), &hashed, |b, &hashed| {
      b.iter(|| build_key(black_box(&["bench", "key"]), black_box(&elements), hashed))
    });
  }
  group.finish();
}

fn warm_fetcher(group: &Group, backend: &Arc<MemoryBackend>, id: u64) -> CacheFetcher<MemoryBackend> {
  let mut fetcher = FetcherBuilder::new().group(group.clone()).build(backend.clone());
  fetcher.set_key(&["bench"], &key_elements![id]).expect("valid key");
  fetcher
    .fetch(TTL, move || Ok::<_, std::io::Error>(id))
    .expect("warm-up fetch");
  fetcher
}

fn bench_fetch_hit(c: &mut Criterion) {
  let mut bench_group = c.benchmark_group("FetchHit");

  for concurrency in [1usize, 4, 8] {
    bench_group.throughput(Throughput::Elements(concurrency as u64));
    bench_group.bench_with_input(BenchmarkId::from_parameter(concurrency), &concurrency, |b, &concurrency| {
      let group = Group::new();
      let backend = Arc::new(MemoryBackend::new());

      b.iter_custom(|iters| {
        let barrier = Arc::new(Barrier::new(concurrency + 1));
        let handles: Vec<_> = (0..concurrency)
          .map(|t| {
            let mut fetcher = warm_fetcher(&group, &backend, t as u64);
            let barrier = barrier.clone();
            thread::spawn(move || {
              barrier.wait();
              for _ in 0..iters {
                let value: u64 = fetcher
                  .fetch(TTL, || Ok::<_, std::io::Error>(0u64))
                  .expect("cached fetch");
                black_box(value);
              }
            })
          })
          .collect();

        barrier.wait();
        let start = Instant::now();
        for handle in handles {
          handle.join().expect("bench thread panicked");
        }
        start.elapsed()
      });
    });
  }
  bench_group.finish();
}

criterion_group!(benches, bench_build_key, bench_fetch_hit);
criterion_main!(benches);
