//! Test meshes shared by unit tests.

use std::collections::HashMap;

use nalgebra::Point3;

use super::SurfaceMesh;

/// Flat `n × n` quad grid in the z = 0 plane, split into `(n + 1)²` points.
pub(crate) fn flat_grid(n: usize) -> SurfaceMesh {
    let mut points = Vec::new();
    let mut faces = Vec::new();

    for j in 0..=n {
        for i in 0..=n {
            points.push(Point3::new(i as f64, j as f64, 0.0));
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

/// Subdivided icosahedron of the given radius, outward-oriented.
pub(crate) fn icosphere(subdivisions: usize, radius: f64) -> SurfaceMesh {
    let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;

    let mut points: Vec<Point3<f64>> = [
        [-1.0, phi, 0.0],
        [1.0, phi, 0.0],
        [-1.0, -phi, 0.0],
        [1.0, -phi, 0.0],
        [0.0, -1.0, phi],
        [0.0, 1.0, phi],
        [0.0, -1.0, -phi],
        [0.0, 1.0, -phi],
        [phi, 0.0, -1.0],
        [phi, 0.0, 1.0],
        [-phi, 0.0, -1.0],
        [-phi, 0.0, 1.0],
    ]
    .iter()
    .map(|&[x, y, z]| Point3::from(Point3::new(x, y, z).coords.normalize()))
    .collect();

    let mut faces = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut next = Vec::with_capacity(faces.len() * 4);
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();

        for face in &faces {
            let mut mids = [0usize; 3];
            for i in 0..3 {
                let a = face[i];
                let b = face[(i + 1) % 3];
                let key = if a < b { (a, b) } else { (b, a) };
                mids[i] = *midpoints.entry(key).or_insert_with(|| {
                    let mid = (points[a].coords + points[b].coords).normalize();
                    points.push(Point3::from(mid));
                    points.len() - 1
                });
            }
            next.push([face[0], mids[0], mids[2]]);
            next.push([face[1], mids[1], mids[0]]);
            next.push([face[2], mids[2], mids[1]]);
            next.push([mids[0], mids[1], mids[2]]);
        }
        faces = next;
    }

    let points = points.into_iter().map(|p| p * radius).collect();
    SurfaceMesh::from_triangles(points, faces).unwrap()
}
