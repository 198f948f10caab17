use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

// `mask::apply` is private to the crate; the bench exercises it through the
// same `#[path]` trick the XOR loop itself would use if it were public.
#[path = "../src/mask.rs"]
mod mask;

fn bench_mask(c: &mut Criterion) {
  let mut group = c.benchmark_group("mask::apply");
  let mask_key = [0x12, 0x34, 0x56, 0x78];

  for size in [0usize, 125, 4096, 65536] {
    group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
      b.iter_batched(
        || vec![0xABu8; size],
        |mut payload| mask::apply(black_box(&mut payload), mask_key),
        criterion::BatchSize::SmallInput,
      )
    });
  }

  group.finish();
}

criterion_group!(benches, bench_mask);
criterion_main!(benches);
