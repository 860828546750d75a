//! Benchmarks for deformation operations.

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::Point3;
use sculpt::algo::curvature::{compute_curvature, CurvatureKinds};
use sculpt::prelude::*;

fn create_wavy_grid(n: usize) -> SurfaceMesh {
    let mut points = Vec::with_capacity((n + 1) * (n + 1));
    let mut faces = Vec::with_capacity(n * n * 2);

    // Height field with curvature of both signs
    for j in 0..=n {
        for i in 0..=n {
            let (x, y) = (i as f64 * 0.2, j as f64 * 0.2);
            points.push(Point3::new(x, y, 0.3 * x.sin() * y.cos()));
        }
    }

    for j in 0..n {
        for i in 0..n {
            let v00 = j * (n + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + (n + 1);
            let v11 = v01 + 1;

            faces.push([v00, v10, v11]);
            faces.push([v00, v11, v01]);
        }
    }

    SurfaceMesh::from_triangles(points, faces).unwrap()
}

fn bench_curvature(c: &mut Criterion) {
    let mesh = create_wavy_grid(50);

    c.bench_function("curvature_gauss_mean_50x50", |b| {
        b.iter(|| compute_curvature(&mesh, CurvatureKinds::ALL));
    });
}

fn bench_gauss_curvature_gradient(c: &mut Criterion) {
    let mut mesh = create_wavy_grid(50);
    mesh.update_normals();
    let mut term = GaussCurvatureConstraint::new("curvature", 1.0);
    term.initialize(&mut mesh).unwrap();
    term.update(&mut mesh, false);
    let mut gradient = vec![0.0; 3 * mesh.num_points()];

    c.bench_function("gauss_curvature_gradient_50x50", |b| {
        b.iter(|| {
            gradient.iter_mut().for_each(|g| *g = 0.0);
            term.evaluate_gradient(&mesh, &mut gradient, 1.0, 1.0);
        });
    });
}

fn bench_euler_run(c: &mut Criterion) {
    let mesh = create_wavy_grid(30);

    c.bench_function("euler_10_iterations_30x30", |b| {
        b.iter(|| {
            let mut model = DeformableSurfaceModel::new(mesh.clone())
                .with_term(GaussCurvatureConstraint::new("curvature", 1.0));
            let options = EulerOptions::with_step_length(0.01).with_max_iterations(10);
            EulerMethod::new(options).run(&mut model).unwrap()
        });
    });
}

fn bench_remesh(c: &mut Criterion) {
    let mesh = create_wavy_grid(30);
    let options = RemeshOptions::with_edge_lengths(0.1, 0.25);

    c.bench_function("remesh_split_collapse_30x30", |b| {
        b.iter(|| {
            let mut mesh = mesh.clone();
            sculpt::algo::remesh::remesh(&mut mesh, &options).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_curvature,
    bench_gauss_curvature_gradient,
    bench_euler_run,
    bench_remesh
);
criterion_main!(benches);
