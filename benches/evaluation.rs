use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use shiptraj_rs::evaluate::{rmse, ErrorMatrix, Evaluator};
use shiptraj_rs::geo::{haversine_distance, CoordinateBounds, GeoPoint};
use shiptraj_rs::trajectory::TrajectoryRecord;
use shiptraj_rs::window::{SequenceWindower, WindowPool};

fn synthetic_tracks(count: usize, len: usize) -> Vec<TrajectoryRecord> {
    (0..count)
        .map(|i| {
            let points: Vec<[f32; 4]> = (0..len)
                .map(|t| {
                    let t = t as f32;
                    [0.2 + 0.001 * i as f32 + 0.002 * t, 0.4 + 0.001 * t, 0.5, 0.25]
                })
                .collect();
            TrajectoryRecord::from_points(None, &points).unwrap()
        })
        .collect()
}

fn bench_haversine(c: &mut Criterion) {
    let a = GeoPoint::new(56.0, 12.0);
    let b = GeoPoint::new(56.1, 12.1);
    c.bench_function("haversine_distance", |bench| {
        bench.iter(|| haversine_distance(black_box(a), black_box(b)))
    });
}

fn bench_windowing(c: &mut Criterion) {
    let windower = SequenceWindower::new(18, 24, 2);
    let mut group = c.benchmark_group("window_pool");
    for count in [10, 100, 1000] {
        let tracks = synthetic_tracks(count, 120);
        group.bench_with_input(BenchmarkId::from_parameter(count), &tracks, |bench, tracks| {
            bench.iter(|| WindowPool::from_records(black_box(tracks), windower, "bench").unwrap())
        });
    }
    group.finish();
}

fn bench_scoring(c: &mut Criterion) {
    let evaluator = Evaluator::new(CoordinateBounds::default(), 256);
    let truth: Vec<f32> = (0..48).map(|i| 0.3 + 0.001 * i as f32).collect();
    let pred: Vec<f32> = truth.iter().map(|v| v + 0.002).collect();

    c.bench_function("score_window_24", |bench| {
        bench.iter(|| evaluator.score_window(black_box(&truth), black_box(&pred), 2).unwrap())
    });

    c.bench_function("aggregate_10k_windows", |bench| {
        let score = evaluator.score_window(&truth, &pred, 2).unwrap();
        let mut matrix = ErrorMatrix::new(24);
        for _ in 0..10_000 {
            matrix.push(&score).unwrap();
        }
        bench.iter(|| black_box(&matrix).summary().unwrap())
    });

    let a: Vec<f64> = (0..48).map(f64::from).collect();
    let b: Vec<f64> = a.iter().map(|v| v + 0.5).collect();
    c.bench_function("rmse_48", |bench| bench.iter(|| rmse(black_box(&a), black_box(&b))));
}

criterion_group!(benches, bench_haversine, bench_windowing, bench_scoring);
criterion_main!(benches);
