//! Benchmark for the contour decoder.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wormtrack_ingest::decode_outline;

/// A plausible closed-ish contour: alternating step patterns across the
/// whole 6-bit alphabet.
fn synthetic_outline(n_chars: usize) -> String {
    (0..n_chars)
        .map(|i| char::from_u32('0' as u32 + (i % 64) as u32).unwrap())
        .collect()
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_outline");
    for &n_chars in &[32usize, 128, 512] {
        let encoded = synthetic_outline(n_chars);
        let n_points = (n_chars * 3) as i32;
        group.bench_function(format!("{n_chars}_chars"), |b| {
            b.iter(|| {
                decode_outline(black_box((250, 250)), black_box(n_points), black_box(&encoded))
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
