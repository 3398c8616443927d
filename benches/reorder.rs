//! Benchmarks for the reordering pipeline.

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::{Point3, Vector3};
use triorder::prelude::*;

fn create_grid(n: usize) -> (Vec<Point3<f32>>, Vec<[u32; 3]>) {
    let mut positions = Vec::with_capacity((n + 1) * (n + 1));
    let mut triangles = Vec::with_capacity(n * n * 2);

    for j in 0..=n {
        for i in 0..=n {
            positions.push(Point3::new(i as f32, j as f32, 0.0));
        }
    }

    for j in 0..n {
        for i in 0..n {
            let v00 = (j * (n + 1) + i) as u32;
            let v10 = v00 + 1;
            let v01 = v00 + (n + 1) as u32;
            let v11 = v01 + 1;

            triangles.push([v00, v10, v11]);
            triangles.push([v00, v11, v01]);
        }
    }

    (positions, triangles)
}

fn bench_vertex_cache(c: &mut Criterion) {
    let (positions, triangles) = create_grid(64);

    c.bench_function("vcache_grid_64", |b| {
        b.iter(|| {
            optimize_vertex_cache(&triangles, positions.len(), 24, CacheStrategy::Tipsy).unwrap()
        });
    });

    c.bench_function("acmr_grid_64", |b| {
        b.iter(|| measure_cache_efficiency(&triangles, 24).unwrap());
    });
}

fn bench_clustering(c: &mut Criterion) {
    let (positions, triangles) = create_grid(64);

    c.bench_function("cluster_grid_64", |b| {
        b.iter(|| cluster_mesh(&positions, &triangles, 16).unwrap());
    });
}

fn bench_fast_optimize(c: &mut Criterion) {
    let (positions, triangles) = create_grid(64);
    let options = OptimizeOptions::default();

    c.bench_function("fast_optimize_grid_64", |b| {
        b.iter(|| fast_optimize(&positions, &triangles, 1.05, &options).unwrap());
    });
}

fn bench_measure_overdraw(c: &mut Criterion) {
    let (positions, triangles) = create_grid(32);
    let options = OptimizeOptions::default()
        .with_resolution(64)
        .with_viewpoints(vec![
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 1.0, 1.0).normalize(),
        ]);

    c.bench_function("measure_overdraw_grid_32", |b| {
        b.iter(|| measure_overdraw(&positions, &triangles, &options).unwrap());
    });
}

criterion_group!(
    benches,
    bench_vertex_cache,
    bench_clustering,
    bench_fast_optimize,
    bench_measure_overdraw
);
criterion_main!(benches);
