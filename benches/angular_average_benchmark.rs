use criterion::BenchmarkId;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;

use ued_reduce::angular::angular_average;
use ued_reduce::{BeamBlock, Center};

fn ring_image(side: usize, radius: f64) -> Array2<f64> {
    let center = side as f64 / 2.0;
    Array2::from_shape_fn((side, side), |(row, col)| {
        let dr = row as f64 - center;
        let dc = col as f64 - center;
        let rho = (dr * dr + dc * dc).sqrt();
        1000.0 * (-(rho - radius).powi(2) / 50.0).exp()
    })
}

fn criterion_benchmark_angular_average(c: &mut Criterion) {
    let mut group = c.benchmark_group("angular_average");

    for &side in &[256usize, 512, 1024] {
        let image = ring_image(side, side as f64 / 4.0);
        let center = Center::new(side as f64 / 2.0, side as f64 / 2.0);

        group.bench_with_input(BenchmarkId::new("side", side), &side, |bench, _| {
            bench.iter(|| black_box(angular_average(image.view(), center, BeamBlock::NONE)))
        });
    }

    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = criterion_benchmark_angular_average,
);
criterion_main!(benches);
