use burn_depth_video::{
    blend::Stitcher,
    inference::{FrameOutput, WindowResult},
    window::{WindowConfig, WindowPlan},
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

criterion_group! {
    name = windowing_benchmarks;
    config = Criterion::default().sample_size(20);
    targets = planning_benchmark, stitching_benchmark,
}
criterion_main!(windowing_benchmarks);

const WIDTH: usize = 64;
const HEIGHT: usize = 64;

fn window_results(plan: &WindowPlan) -> Vec<WindowResult> {
    let hw = WIDTH * HEIGHT;
    plan.iter()
        .map(|window| WindowResult {
            window,
            width: WIDTH,
            height: HEIGHT,
            frames: (window.start..window.end)
                .map(|index| {
                    let value = index as f32 / plan.total() as f32;
                    FrameOutput {
                        image: vec![value; 3 * hw],
                        disparity: vec![value; hw],
                        colored: vec![value; 3 * hw],
                    }
                })
                .collect(),
        })
        .collect()
}

fn planning_benchmark(c: &mut Criterion) {
    let config = WindowConfig::default();

    let mut group = c.benchmark_group("window_planning");
    for total in [32usize, 1_000, 100_000] {
        group.throughput(Throughput::Elements(total as u64));
        group.bench_with_input(BenchmarkId::from_parameter(total), &total, |b, &total| {
            b.iter(|| {
                let plan = config.plan(black_box(total)).unwrap();
                black_box(plan.iter().map(|window| window.padded_len()).sum::<usize>());
            });
        });
    }
    group.finish();
}

fn stitching_benchmark(c: &mut Criterion) {
    let config = WindowConfig::new(4, 6, 3);

    let mut group = c.benchmark_group("window_stitching");
    for total in [64usize, 256] {
        let plan = config.plan(total).unwrap();
        let results = window_results(&plan);

        group.throughput(Throughput::Elements(total as u64));
        group.bench_with_input(BenchmarkId::from_parameter(total), &results, |b, results| {
            b.iter(|| {
                let mut stitcher = Stitcher::new(plan);
                for result in results.iter().cloned() {
                    stitcher.push(result).unwrap();
                }
                black_box(stitcher.finish().unwrap());
            });
        });
    }
    group.finish();
}
