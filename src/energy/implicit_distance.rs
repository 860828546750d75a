//! Attraction towards an implicit surface.
//!
//! [`ImplicitSurfaceDistance`] pulls every point along its normal towards the
//! zero level set of a signed distance function (negative inside, positive
//! outside). Points further away move faster; a point on the surface feels
//! no force until another term displaces it again.

use std::fmt;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use super::{add_weighted_gradient, is_stale, store_field, EnergyTerm};
use crate::error::Result;
use crate::mesh::{FieldSpec, SurfaceMesh};

/// Point-data name of the sampled distances, prefixed by the term name.
pub const DISTANCE: &str = "Distance";

/// A signed distance function, negative inside and positive outside.
pub trait DistanceField: Send + Sync {
    /// Signed distance of `p` to the surface.
    fn distance(&self, p: &Point3<f64>) -> f64;
}

impl<F> DistanceField for F
where
    F: Fn(&Point3<f64>) -> f64 + Send + Sync,
{
    fn distance(&self, p: &Point3<f64>) -> f64 {
        self(p)
    }
}

/// Signed distance to a sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Center of the sphere.
    pub center: Point3<f64>,
    /// Radius of the sphere.
    pub radius: f64,
}

impl Sphere {
    /// Create a sphere.
    pub fn new(center: Point3<f64>, radius: f64) -> Self {
        Self { center, radius }
    }
}

impl DistanceField for Sphere {
    fn distance(&self, p: &Point3<f64>) -> f64 {
        (p - self.center).norm() - self.radius
    }
}

/// Force attracting the surface towards the zero level set of a distance field.
///
/// # Example
///
/// ```
/// use sculpt::energy::{EnergyTerm, ImplicitSurfaceDistance};
/// use sculpt::energy::implicit_distance::Sphere;
/// use sculpt::mesh::SurfaceMesh;
/// use nalgebra::Point3;
///
/// let points = vec![
///     Point3::new(2.0, 0.0, 0.0),
///     Point3::new(0.0, 2.0, 0.0),
///     Point3::new(0.0, 0.0, 2.0),
/// ];
/// let mut mesh = SurfaceMesh::from_triangles(points, vec![[0, 1, 2]]).unwrap();
///
/// let mut term = ImplicitSurfaceDistance::new("target", 1.0, Sphere::new(Point3::origin(), 1.0));
/// term.initialize(&mut mesh).unwrap();
/// term.update(&mut mesh, false);
/// assert!((term.evaluate(&mesh) - 1.0).abs() < 1e-12);
/// ```
pub struct ImplicitSurfaceDistance {
    name: String,
    weight: f64,
    field: Box<dyn DistanceField>,
    max_distance: f64,
    distance: FieldSpec,
    forces: Vec<Vector3<f64>>,
}

impl ImplicitSurfaceDistance {
    /// Create a term attracting towards the zero level set of `field`.
    pub fn new(name: impl Into<String>, weight: f64, field: impl DistanceField + 'static) -> Self {
        Self {
            name: name.into(),
            weight,
            field: Box::new(field),
            max_distance: 0.0,
            distance: FieldSpec::private(DISTANCE),
            forces: Vec::new(),
        }
    }

    /// Limit the force magnitude to `max_distance` (no limit when ≤ 0).
    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = max_distance;
        self
    }

    /// Force magnitude limit; zero or less means unlimited.
    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    /// Point-data key of the sampled distances.
    pub fn distance_key(&self) -> String {
        self.distance.key(&self.name)
    }

    fn clamp(&self, d: f64) -> f64 {
        if self.max_distance > 0.0 {
            d.clamp(-self.max_distance, self.max_distance)
        } else {
            d
        }
    }
}

impl fmt::Debug for ImplicitSurfaceDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImplicitSurfaceDistance")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("max_distance", &self.max_distance)
            .finish_non_exhaustive()
    }
}

impl EnergyTerm for ImplicitSurfaceDistance {
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
        mesh.point_data_mut().declare(&self.name, &self.distance, n)?;
        self.forces.clear();
        self.forces.resize(n, Vector3::zeros());
        Ok(())
    }

    fn update(&mut self, mesh: &mut SurfaceMesh, _gradient: bool) {
        if mesh.num_points() == 0 || !is_stale(mesh, &self.name, &self.distance) {
            return;
        }
        let field = &self.field;
        let distances: Vec<f64> = mesh.points().par_iter().map(|p| field.distance(p)).collect();
        log::debug!("{}: sampled distance at {} points", self.name, distances.len());
        if let Err(err) = store_field(mesh, &self.name, &self.distance, distances) {
            log::warn!("{}: failed to store distances: {}", self.name, err);
        }
    }

    fn evaluate(&self, mesh: &SurfaceMesh) -> f64 {
        let n = mesh.num_points();
        if n == 0 {
            return 0.0;
        }
        let Some(distances) = mesh.point_data().values(&self.distance_key()) else {
            return 0.0;
        };
        distances.par_iter().map(|d| d.abs()).sum::<f64>() / n as f64
    }

    fn evaluate_gradient(&mut self, mesh: &SurfaceMesh, gradient: &mut [f64], step: f64, weight: f64) {
        let n = mesh.num_points();
        if n == 0 {
            return;
        }
        self.forces.clear();
        self.forces.resize(n, Vector3::zeros());

        let key = self.distance_key();
        let Some(distances) = mesh.point_data().values(&key).filter(|d| d.len() == n) else {
            log::warn!("{}: distances not available, no force", self.name);
            return;
        };
        if !mesh.has_current_normals() {
            log::warn!("{}: surface normals not computed, no force", self.name);
            return;
        }

        let normals = mesh.normals();
        let status = mesh.status();
        let this = &*self;
        let forces: Vec<Vector3<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                if status.is_some_and(|s| s[i] == 0.0) {
                    Vector3::zeros()
                } else {
                    this.clamp(distances[i]) * normals[i]
                }
            })
            .collect();
        self.forces = forces;

        add_weighted_gradient(gradient, &self.forces, step * weight / n as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::icosphere;

    fn unit_sphere() -> Sphere {
        Sphere::new(Point3::origin(), 1.0)
    }

    #[test]
    fn test_closure_field() {
        let plane = |p: &Point3<f64>| p.z;
        assert_eq!(plane.distance(&Point3::new(1.0, 2.0, 3.0)), 3.0);
    }

    #[test]
    fn test_private_field_key() {
        let mut mesh = icosphere(0, 2.0);
        let mut term = ImplicitSurfaceDistance::new("outer", 1.0, unit_sphere());
        term.initialize(&mut mesh).unwrap();
        assert_eq!(term.distance_key(), "outer/Distance");
        assert!(mesh.point_data().contains("outer/Distance"));
    }

    #[test]
    fn test_evaluate_mean_distance() {
        let mut mesh = icosphere(1, 3.0);
        let mut term = ImplicitSurfaceDistance::new("d", 1.0, unit_sphere());
        term.initialize(&mut mesh).unwrap();
        term.update(&mut mesh, true);
        assert!((term.evaluate(&mesh) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_gradient_points_away_from_target() {
        let mut mesh = icosphere(1, 2.0);
        mesh.update_normals();
        let mut term = ImplicitSurfaceDistance::new("d", 1.0, unit_sphere());
        term.initialize(&mut mesh).unwrap();
        term.update(&mut mesh, true);

        let mut gradient = vec![0.0; 3 * mesh.num_points()];
        term.evaluate_gradient(&mesh, &mut gradient, 1.0, 1.0);
        for i in 0..mesh.num_points() {
            let g = Vector3::new(gradient[3 * i], gradient[3 * i + 1], gradient[3 * i + 2]);
            assert!(g.dot(&mesh.position(i).coords) > 0.0);
        }
    }

    #[test]
    fn test_max_distance_limits_force() {
        let mut mesh = icosphere(0, 5.0);
        mesh.update_normals();
        let mut term =
            ImplicitSurfaceDistance::new("d", 1.0, unit_sphere()).with_max_distance(0.5);
        term.initialize(&mut mesh).unwrap();
        term.update(&mut mesh, true);

        let mut gradient = vec![0.0; 3 * mesh.num_points()];
        term.evaluate_gradient(&mesh, &mut gradient, 1.0, 1.0);
        for f in term.forces.iter() {
            assert!((f.norm() - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_distances_resampled_after_move() {
        let mut mesh = icosphere(0, 2.0);
        let mut term = ImplicitSurfaceDistance::new("d", 1.0, unit_sphere());
        term.initialize(&mut mesh).unwrap();
        term.update(&mut mesh, true);
        let before = term.evaluate(&mesh);

        let inward = -mesh.position(0).coords * 0.5;
        mesh.displace(0, &inward);
        term.update(&mut mesh, true);
        assert!(term.evaluate(&mesh) < before);
    }
}
