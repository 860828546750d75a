//! Discrete curvature estimation on surface meshes.
//!
//! - **Gauss curvature K**: angle defect over the mixed Voronoi area
//! - **Mean curvature H**: cotangent Laplacian projected on the vertex normal
//!
//! Signs follow the outward-normal convention: a convex surface with
//! counter-clockwise (outward) faces has `H > 0`, a saddle has `K < 0`.
//! Boundary points have no well-defined curvature and are assigned zero.
//!
//! # Example
//!
//! ```
//! use sculpt::algo::curvature::{compute_curvature, CurvatureKinds};
//! use sculpt::mesh::SurfaceMesh;
//! use nalgebra::Point3;
//!
//! let points = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let mesh = SurfaceMesh::from_triangles(points, vec![[0, 1, 2]]).unwrap();
//!
//! let result = compute_curvature(&mesh, CurvatureKinds::GAUSS);
//! assert_eq!(result.gauss.unwrap(), vec![0.0; 3]);
//! assert!(result.mean.is_none());
//! ```
//!
//! # References
//!
//! - Meyer, M., et al. (2003). "Discrete Differential-Geometry Operators for
//!   Triangulated 2-Manifolds." Visualization and Mathematics III.

use std::f64::consts::PI;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::mesh::SurfaceMesh;

/// Point-data name of the Gauss curvature field.
pub const GAUSS_CURVATURE: &str = "Gauss_Curvature";

/// Point-data name of the mean curvature field.
pub const MEAN_CURVATURE: &str = "Mean_Curvature";

/// Angle defects below this magnitude are treated as flat.
const FLAT_DEFECT: f64 = 1e-10;

/// Which curvature fields to compute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CurvatureKinds {
    /// Compute Gauss curvature.
    pub gauss: bool,
    /// Compute mean curvature.
    pub mean: bool,
}

impl CurvatureKinds {
    /// Gauss curvature only.
    pub const GAUSS: Self = Self {
        gauss: true,
        mean: false,
    };
    /// Mean curvature only.
    pub const MEAN: Self = Self {
        gauss: false,
        mean: true,
    };
    /// Both fields.
    pub const ALL: Self = Self {
        gauss: true,
        mean: true,
    };

    /// Whether nothing is requested.
    pub fn is_empty(self) -> bool {
        !self.gauss && !self.mean
    }
}

impl std::ops::BitOr for CurvatureKinds {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            gauss: self.gauss || rhs.gauss,
            mean: self.mean || rhs.mean,
        }
    }
}

/// Per-point curvature fields, present for the requested kinds only.
#[derive(Debug, Clone, Default)]
pub struct Curvatures {
    /// Gauss curvature per point.
    pub gauss: Option<Vec<f64>>,
    /// Signed mean curvature per point.
    pub mean: Option<Vec<f64>>,
}

/// Compute the angle at vertex `a` in triangle (a, b, c).
fn triangle_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ab = (b - a).normalize();
    let ac = (c - a).normalize();
    ab.dot(&ac).clamp(-1.0, 1.0).acos()
}

/// Compute the cotangent of the angle at vertex `a` in triangle (a, b, c).
fn cotangent_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let cross_norm = ab.cross(&ac).norm();
    if cross_norm < 1e-10 {
        0.0
    } else {
        ab.dot(&ac) / cross_norm
    }
}

/// One triangle seen from one of its corners.
struct Corner {
    p: Point3<f64>,
    next: Point3<f64>,
    prev: Point3<f64>,
}

impl Corner {
    fn of(mesh: &SurfaceMesh, f: usize, i: usize) -> Self {
        let face = mesh.faces()[f];
        let local = face.iter().position(|&v| v == i).unwrap_or(0);
        Self {
            p: *mesh.position(face[local]),
            next: *mesh.position(face[(local + 1) % 3]),
            prev: *mesh.position(face[(local + 2) % 3]),
        }
    }

    fn angle(&self) -> f64 {
        triangle_angle(&self.p, &self.next, &self.prev)
    }

    fn area(&self) -> f64 {
        0.5 * (self.next - self.p).cross(&(self.prev - self.p)).norm()
    }

    /// Share of the triangle in the mixed Voronoi cell of this corner.
    fn mixed_area(&self) -> f64 {
        let half_pi = PI / 2.0;
        let at_p = self.angle();
        let at_next = triangle_angle(&self.next, &self.prev, &self.p);
        let at_prev = triangle_angle(&self.prev, &self.p, &self.next);

        if at_p > half_pi {
            self.area() / 2.0
        } else if at_next > half_pi || at_prev > half_pi {
            self.area() / 4.0
        } else {
            // (1/8) * (|p prev|² cot(next) + |p next|² cot(prev))
            let cot_next = cotangent_angle(&self.next, &self.p, &self.prev);
            let cot_prev = cotangent_angle(&self.prev, &self.p, &self.next);
            0.125
                * ((self.prev - self.p).norm_squared() * cot_next
                    + (self.next - self.p).norm_squared() * cot_prev)
        }
    }

    /// Contribution to `2 A Δx` (cotangent Laplacian, unnormalized).
    fn laplacian(&self) -> Vector3<f64> {
        let cot_next = cotangent_angle(&self.next, &self.p, &self.prev);
        let cot_prev = cotangent_angle(&self.prev, &self.p, &self.next);
        cot_next * (self.prev - self.p) + cot_prev * (self.next - self.p)
    }

    fn normal(&self) -> Vector3<f64> {
        (self.next - self.p).cross(&(self.prev - self.p))
    }
}

fn point_curvature(mesh: &SurfaceMesh, i: usize, kinds: CurvatureKinds) -> (f64, f64) {
    if mesh.is_boundary_point(i) || mesh.point_faces(i).is_empty() {
        return (0.0, 0.0);
    }

    let corners: Vec<Corner> = mesh
        .point_faces(i)
        .iter()
        .map(|&f| Corner::of(mesh, f, i))
        .collect();

    let mut area: f64 = corners.iter().map(Corner::mixed_area).sum();
    if area < 1e-10 {
        area = corners.iter().map(|c| c.area() / 3.0).sum();
    }
    if area < 1e-10 {
        return (0.0, 0.0);
    }

    let gauss = if kinds.gauss {
        let defect = 2.0 * PI - corners.iter().map(Corner::angle).sum::<f64>();
        if defect.abs() < FLAT_DEFECT {
            0.0
        } else {
            defect / area
        }
    } else {
        0.0
    };

    let mean = if kinds.mean {
        let normal = corners
            .iter()
            .map(Corner::normal)
            .sum::<Vector3<f64>>()
            .try_normalize(0.0)
            .unwrap_or_else(Vector3::zeros);
        let laplacian = corners.iter().map(Corner::laplacian).sum::<Vector3<f64>>() / (2.0 * area);
        // Δx = -2 H n
        -0.5 * laplacian.dot(&normal)
    } else {
        0.0
    };

    (gauss, mean)
}

/// Compute the requested curvature fields for all points.
///
/// Runs in parallel over points.
pub fn compute_curvature(mesh: &SurfaceMesh, kinds: CurvatureKinds) -> Curvatures {
    if kinds.is_empty() {
        return Curvatures::default();
    }

    let values: Vec<(f64, f64)> = (0..mesh.num_points())
        .into_par_iter()
        .map(|i| point_curvature(mesh, i, kinds))
        .collect();

    Curvatures {
        gauss: kinds
            .gauss
            .then(|| values.iter().map(|&(k, _)| k).collect()),
        mean: kinds.mean.then(|| values.iter().map(|&(_, h)| h).collect()),
    }
}

/// Gauss curvature of all points.
pub fn gauss_curvature(mesh: &SurfaceMesh) -> Vec<f64> {
    compute_curvature(mesh, CurvatureKinds::GAUSS)
        .gauss
        .unwrap_or_default()
}

/// Mean curvature of all points.
pub fn mean_curvature(mesh: &SurfaceMesh) -> Vec<f64> {
    compute_curvature(mesh, CurvatureKinds::MEAN)
        .mean
        .unwrap_or_default()
}

/// Mixed Voronoi area of point `i`.
pub fn mixed_area(mesh: &SurfaceMesh, i: usize) -> f64 {
    mesh.point_faces(i)
        .iter()
        .map(|&f| Corner::of(mesh, f, i).mixed_area())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::{flat_grid, icosphere};

    #[test]
    fn test_flat_grid_is_exactly_flat() {
        let mesh = flat_grid(4);
        let result = compute_curvature(&mesh, CurvatureKinds::ALL);

        let gauss = result.gauss.unwrap();
        let mean = result.mean.unwrap();
        assert_eq!(gauss.len(), mesh.num_points());
        for i in 0..mesh.num_points() {
            assert_eq!(gauss[i], 0.0, "K at point {} should be zero", i);
            assert!(mean[i].abs() < 1e-12, "H at point {} should be zero", i);
        }
    }

    #[test]
    fn test_sphere_signs() {
        let radius = 2.0;
        let mesh = icosphere(2, radius);
        let gauss = gauss_curvature(&mesh);
        let mean = mean_curvature(&mesh);

        for i in 0..mesh.num_points() {
            assert!(
                (gauss[i] * radius * radius - 1.0).abs() < 0.3,
                "K at {} = {}",
                i,
                gauss[i]
            );
            assert!(
                (mean[i] * radius - 1.0).abs() < 0.2,
                "H at {} = {}",
                i,
                mean[i]
            );
        }
    }

    #[test]
    fn test_gauss_bonnet() {
        let mesh = icosphere(2, 1.0);
        let gauss = gauss_curvature(&mesh);

        let total: f64 = (0..mesh.num_points())
            .map(|i| gauss[i] * mixed_area(&mesh, i))
            .sum();

        let expected = 4.0 * PI;
        assert!(
            (total - expected).abs() < 0.5,
            "Gauss-Bonnet violated: got {}, expected {}",
            total,
            expected
        );
    }

    #[test]
    fn test_only_requested_kinds() {
        let mesh = icosphere(0, 1.0);
        let result = compute_curvature(&mesh, CurvatureKinds::MEAN);
        assert!(result.gauss.is_none());
        assert_eq!(result.mean.unwrap().len(), 12);

        let none = compute_curvature(&mesh, CurvatureKinds::default());
        assert!(none.gauss.is_none() && none.mean.is_none());

        assert_eq!(
            CurvatureKinds::GAUSS | CurvatureKinds::MEAN,
            CurvatureKinds::ALL
        );
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = SurfaceMesh::new();
        let result = compute_curvature(&mesh, CurvatureKinds::ALL);
        assert!(result.gauss.unwrap().is_empty());
    }
}
