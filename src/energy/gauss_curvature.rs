//! Curvature regularization of a deformable surface.
//!
//! [`GaussCurvatureConstraint`] penalizes the mean absolute Gauss curvature
//! and pulls points with large curvature towards their neighbors. The force
//! on a point is a unit spring direction scaled by a membership weight:
//!
//! ```text
//! m = smf(|K|, 0, 0.2) × { 1 − smf(−H, 0, 0.5)   if H < 0
//!                         { smf(H, 0, 1)          otherwise
//! ```
//!
//! so the force vanishes where the surface is flat and reaches full strength
//! once `|K| ≥ 0.2`. For saddle points (`K < 0`) only neighbors on the
//! outward side of the tangent plane pull.
//!
//! The Gauss and mean curvature arrays are shared: any number of instances
//! reuse the same arrays, and they are only recomputed (then smoothed twice)
//! when older than the mesh geometry.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use super::{add_weighted_gradient, is_stale, store_field, EnergyTerm};
use crate::algo::curvature::{compute_curvature, CurvatureKinds, GAUSS_CURVATURE, MEAN_CURVATURE};
use crate::algo::smooth::smooth_scalars;
use crate::error::{Result, SculptError};
use crate::mesh::{FieldSpec, SurfaceMesh};

/// Smoothing passes applied to freshly computed curvature.
const SMOOTHING_ITERATIONS: usize = 2;

/// S-shaped membership function.
///
/// `0` for `x ≤ a`, `1` for `x ≥ b`, a quadratic ease-in up to the midpoint
/// `(a + b) / 2` and a quadratic ease-out after it.
///
/// # Example
///
/// ```
/// use sculpt::energy::s_shaped_membership;
///
/// assert_eq!(s_shaped_membership(-1.0, 0.0, 1.0), 0.0);
/// assert_eq!(s_shaped_membership(0.5, 0.0, 1.0), 0.5);
/// assert_eq!(s_shaped_membership(2.0, 0.0, 1.0), 1.0);
/// ```
pub fn s_shaped_membership(x: f64, a: f64, b: f64) -> f64 {
    if x <= a {
        0.0
    } else if x >= b {
        1.0
    } else if x <= 0.5 * (a + b) {
        let t = (x - a) / (b - a);
        2.0 * t * t
    } else {
        let t = (x - b) / (b - a);
        1.0 - 2.0 * t * t
    }
}

/// Force magnitude for a point with Gauss curvature `gauss` and mean
/// curvature `mean`.
pub fn curvature_membership(gauss: f64, mean: f64) -> f64 {
    let m = s_shaped_membership(gauss.abs(), 0.0, 0.2);
    if mean < 0.0 {
        m * (1.0 - s_shaped_membership(-mean, 0.0, 0.5))
    } else {
        m * s_shaped_membership(mean, 0.0, 1.0)
    }
}

/// Unit spring direction from `center` towards its neighbors.
///
/// With negative Gauss curvature only offsets with a positive component
/// along `normal` are summed. The sum is divided by the total neighbor count
/// before normalization; a zero sum yields the zero vector.
pub fn spring_direction<'a, I>(
    center: &Point3<f64>,
    normal: &Vector3<f64>,
    gauss: f64,
    neighbors: I,
) -> Vector3<f64>
where
    I: ExactSizeIterator<Item = &'a Point3<f64>>,
{
    let count = neighbors.len();
    if count == 0 {
        return Vector3::zeros();
    }
    let sum: Vector3<f64> = neighbors
        .map(|p| p - center)
        .filter(|d| gauss >= 0.0 || d.dot(normal) > 0.0)
        .sum();
    (sum / count as f64)
        .try_normalize(0.0)
        .unwrap_or_else(Vector3::zeros)
}

/// Gauss curvature regularization term.
///
/// # Example
///
/// ```
/// use sculpt::energy::{EnergyTerm, GaussCurvatureConstraint};
/// use sculpt::mesh::SurfaceMesh;
/// use nalgebra::Point3;
///
/// let points = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let mut mesh = SurfaceMesh::from_triangles(points, vec![[0, 1, 2]]).unwrap();
///
/// let mut term = GaussCurvatureConstraint::new("curvature", 1.0);
/// term.initialize(&mut mesh).unwrap();
/// term.update(&mut mesh, true);
/// assert_eq!(term.evaluate(&mesh), 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct GaussCurvatureConstraint {
    name: String,
    weight: f64,
    gauss: FieldSpec,
    mean: FieldSpec,
    forces: Vec<Vector3<f64>>,
}

impl GaussCurvatureConstraint {
    /// Create a term with the given instance name and weight.
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
            gauss: FieldSpec::shared(GAUSS_CURVATURE),
            mean: FieldSpec::shared(MEAN_CURVATURE),
            forces: Vec::new(),
        }
    }

    /// Per-point contribution of the last gradient evaluation, before scaling.
    pub fn forces(&self) -> &[Vector3<f64>] {
        &self.forces
    }

    fn stale_kinds(&self, mesh: &SurfaceMesh) -> CurvatureKinds {
        CurvatureKinds {
            gauss: is_stale(mesh, &self.name, &self.gauss),
            mean: is_stale(mesh, &self.name, &self.mean),
        }
    }

    fn refresh(&self, mesh: &mut SurfaceMesh, kinds: CurvatureKinds) -> Result<()> {
        let curvatures = compute_curvature(mesh, kinds);
        if let Some(gauss) = curvatures.gauss {
            let smoothed = smooth_scalars(mesh.edges(), &gauss, SMOOTHING_ITERATIONS);
            store_field(mesh, &self.name, &self.gauss, smoothed)?;
        }
        if let Some(mean) = curvatures.mean {
            let smoothed = smooth_scalars(mesh.edges(), &mean, SMOOTHING_ITERATIONS);
            store_field(mesh, &self.name, &self.mean, smoothed)?;
        }
        Ok(())
    }
}

impl EnergyTerm for GaussCurvatureConstraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    fn initialize(&mut self, mesh: &mut SurfaceMesh) -> Result<()> {
        let n = mesh.num_points();
        if n > 0 && mesh.num_faces() == 0 {
            return Err(SculptError::IncompatibleModel {
                term: self.name.clone(),
                reason: "curvature requires a triangulated surface",
            });
        }
        mesh.point_data_mut().declare(&self.name, &self.gauss, n)?;
        mesh.point_data_mut().declare(&self.name, &self.mean, n)?;
        self.forces.clear();
        self.forces.resize(n, Vector3::zeros());
        Ok(())
    }

    fn update(&mut self, mesh: &mut SurfaceMesh, _gradient: bool) {
        if mesh.num_points() == 0 {
            return;
        }
        let kinds = self.stale_kinds(mesh);
        if kinds.is_empty() {
            return;
        }
        log::debug!(
            "{}: recomputing curvature (gauss: {}, mean: {})",
            self.name,
            kinds.gauss,
            kinds.mean
        );
        if let Err(err) = self.refresh(mesh, kinds) {
            log::warn!("{}: failed to store curvature: {}", self.name, err);
        }
    }

    fn evaluate(&self, mesh: &SurfaceMesh) -> f64 {
        let n = mesh.num_points();
        if n == 0 {
            return 0.0;
        }
        let Some(gauss) = mesh.point_data().values(&self.gauss.key(&self.name)) else {
            return 0.0;
        };
        gauss.par_iter().map(|k| k.abs()).sum::<f64>() / n as f64
    }

    fn evaluate_gradient(&mut self, mesh: &SurfaceMesh, gradient: &mut [f64], step: f64, weight: f64) {
        let n = mesh.num_points();
        if n == 0 {
            return;
        }
        self.forces.clear();
        self.forces.resize(n, Vector3::zeros());

        let data = mesh.point_data();
        let (Some(gauss), Some(mean)) = (
            data.values(&self.gauss.key(&self.name)),
            data.values(&self.mean.key(&self.name)),
        ) else {
            log::warn!("{}: curvature not available, no force", self.name);
            return;
        };
        if gauss.len() != n || mean.len() != n {
            log::warn!("{}: curvature out of date, no force", self.name);
            return;
        }
        if !mesh.has_current_normals() {
            log::warn!("{}: surface normals not computed, no force", self.name);
            return;
        }

        let normals = mesh.normals();
        let status = mesh.status();
        self.forces.par_iter_mut().enumerate().for_each(|(i, force)| {
            if status.is_some_and(|s| s[i] == 0.0) {
                return;
            }
            let adjacent = mesh.neighbors(i);
            if adjacent.is_empty() {
                return;
            }
            let m = curvature_membership(gauss[i], mean[i]);
            let direction = spring_direction(
                mesh.position(i),
                &normals[i],
                gauss[i],
                adjacent.iter().map(|&j| mesh.position(j)),
            );
            *force = -m * direction;
        });

        add_weighted_gradient(gradient, &self.forces, step * weight / n as f64);
    }
}
