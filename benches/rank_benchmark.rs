use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::distr::{Distribution, Uniform};
use rand::{rngs::StdRng, SeedableRng};
use single_multivariate::rank::{reduce, ErrorModel, RankModel};
use std::time::Duration;

#[derive(Clone)]
pub struct RankBenchConfig {
    seed: u64,
    matrix_sizes: Vec<(usize, usize)>,
    measurement_time: u64,
    sample_size: usize,
}

impl Default for RankBenchConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            matrix_sizes: vec![(10, 10), (50, 50), (100, 200), (300, 300)],
            measurement_time: 10,
            sample_size: 10,
        }
    }
}

fn create_values(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Uniform::try_from(-10.0..10.0).unwrap();
    Array2::from_shape_fn((rows, cols), |_| dist.sample(&mut rng))
}

pub fn bench_rank_reduction(c: &mut Criterion) {
    let config = RankBenchConfig::default();
    let mut group = c.benchmark_group("Rank_Reduction");
    group.measurement_time(Duration::from_secs(config.measurement_time));
    group.sample_size(config.sample_size);

    for &(rows, cols) in config.matrix_sizes.iter() {
        let values = create_values(rows, cols, config.seed + (rows * cols) as u64);
        let variances = Array2::from_elem((rows, cols), 0.01);

        group.bench_with_input(
            BenchmarkId::new("reduce", format!("{}x{}", rows, cols)),
            &(rows, cols),
            |b, _| {
                b.iter(|| reduce(values.view(), variances.view()).unwrap());
            },
        );

        group.bench_with_input(
            BenchmarkId::new("model_rounding_errors", format!("{}x{}", rows, cols)),
            &(rows, cols),
            |b, _| {
                b.iter(|| {
                    let model =
                        RankModel::new(values.clone(), ErrorModel::RoundingEstimate).unwrap();
                    model.reduced_ratios_diagonal().unwrap().sum()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(rank_benches, bench_rank_reduction);
criterion_main!(rank_benches);
