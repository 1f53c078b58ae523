//! Benchmarks for the recognition pipeline stages

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cv_pose::core::{rigid_from_axis_angle, PointCloud};
use cv_pose::features::{BoardEstimator, ShotEstimator};
use cv_pose::point_cloud::synthetic::{merge, sample_box, sample_plane};
use cv_pose::point_cloud::{voxel_down_sample, with_estimated_normals};
use cv_pose::recognition::PreprocessConfig;
use cv_pose::{EstimatorConfig, PoseEstimator};
use nalgebra::{Point3, Vector3};
use std::time::Duration;

fn object_model(spacing: f32) -> PointCloud {
    let body = sample_box(Point3::new(0.0, 0.0, 0.8), Vector3::new(0.063, 0.045, 0.081), spacing);
    let knob = sample_box(Point3::new(0.05175, 0.009, 0.782), Vector3::new(0.0225, 0.0225, 0.0315), spacing);
    merge(&[&body, &knob])
}

fn benchmark_voxel_down_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("voxel_down_sample");
    for spacing in [0.004f32, 0.002, 0.001] {
        let cloud = sample_plane(Point3::new(0.0, 0.0, 1.0), 0.5, 0.5, spacing);
        group.bench_with_input(BenchmarkId::new("points", cloud.len()), &cloud, |b, cloud| {
            b.iter(|| voxel_down_sample(black_box(cloud), 0.005));
        });
    }
    group.finish();
}

fn benchmark_features(c: &mut Criterion) {
    let mut group = c.benchmark_group("features");
    group.sample_size(20);

    let cloud = object_model(0.0045);
    let origin = Point3::origin();
    group.bench_function("normals_k10", |b| {
        b.iter(|| with_estimated_normals(black_box(&cloud), 10, Some(&origin)));
    });

    let with_normals = with_estimated_normals(&cloud, 10, Some(&origin));
    group.bench_function("board_frames", |b| {
        let board = BoardEstimator::new(0.015);
        b.iter(|| board.compute(black_box(&with_normals)));
    });
    group.bench_function("shot352", |b| {
        let shot = ShotEstimator::new(0.02);
        b.iter(|| shot.compute(black_box(&with_normals), &with_normals));
    });
    group.finish();
}

fn benchmark_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.measurement_time(Duration::from_secs(20));
    group.sample_size(10);

    let object = object_model(0.0045);
    let motion = rigid_from_axis_angle(&Vector3::z(), std::f32::consts::FRAC_PI_4, &Vector3::new(0.0, 0.0, 0.4));
    let wall = sample_plane(Point3::new(0.0, 0.0, 1.6), 0.5, 0.5, 0.005);
    let scene = merge(&[&object.transformed(&motion), &wall]);

    let estimator =
        PoseEstimator::new(EstimatorConfig::default().with_preprocess(PreprocessConfig::default().with_leaf_size(0.002)));
    group.bench_function("estimate", |b| {
        b.iter(|| estimator.estimate(black_box(&object), black_box(&scene)));
    });
    group.finish();
}

criterion_group!(benches, benchmark_voxel_down_sample, benchmark_features, benchmark_pipeline);
criterion_main!(benches);
