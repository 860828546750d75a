//! Deformable surface models.
//!
//! A [`DeformableModel`] is what the integrators in [`crate::optim`] drive:
//! it owns the surface, aggregates the gradient of its energy terms into a
//! flat degrees-of-freedom buffer, applies displacements and remeshes.
//!
//! [`DeformableSurfaceModel`] is the stock implementation, a surface with a
//! weighted sum of [`EnergyTerm`]s.
//!
//! # Example
//!
//! ```
//! use sculpt::energy::GaussCurvatureConstraint;
//! use sculpt::model::{DeformableModel, DeformableSurfaceModel};
//! use sculpt::mesh::SurfaceMesh;
//! use nalgebra::Point3;
//!
//! let points = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let mesh = SurfaceMesh::from_triangles(points, vec![[0, 1, 2]]).unwrap();
//! let mut model = DeformableSurfaceModel::new(mesh)
//!     .with_term(GaussCurvatureConstraint::new("curvature", 1.0));
//!
//! model.initialize().unwrap();
//! model.update(true);
//! assert_eq!(model.num_dofs(), 9);
//! assert_eq!(model.value(), 0.0);
//! ```

use nalgebra::Vector3;
use rayon::prelude::*;

use crate::algo::remesh::{remesh, RemeshOptions};
use crate::energy::EnergyTerm;
use crate::error::Result;
use crate::mesh::{ModifiedTime, SurfaceMesh};

/// A surface deformed by explicit point displacements.
pub trait DeformableModel {
    /// The deformed surface.
    fn mesh(&self) -> &SurfaceMesh;

    /// The deformed surface, mutable.
    fn mesh_mut(&mut self) -> &mut SurfaceMesh;

    /// Number of surface points.
    fn num_points(&self) -> usize {
        self.mesh().num_points()
    }

    /// Number of degrees of freedom, three per point.
    fn num_dofs(&self) -> usize {
        3 * self.num_points()
    }

    /// Whether the model deforms through a parametric transformation
    /// instead of moving points directly.
    fn is_parametric(&self) -> bool {
        false
    }

    /// Prepare the model for a run.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Bring derived state up to date with the current geometry.
    fn update(&mut self, gradient: bool);

    /// Current total energy.
    fn value(&self) -> f64;

    /// Write the total energy gradient into `gradient[..num_dofs()]`.
    fn gradient(&mut self, gradient: &mut [f64]);

    /// Euclidean norm of a gradient vector.
    fn gradient_norm(&self, gradient: &[f64]) -> f64 {
        let dofs = self.num_dofs().min(gradient.len());
        gradient[..dofs].par_iter().map(|g| g * g).sum::<f64>().sqrt()
    }

    /// Displace points by `displacement` and return the largest displacement
    /// magnitude actually applied.
    fn step(&mut self, displacement: &[f64]) -> f64;

    /// Adapt the triangulation. Returns whether the topology changed.
    fn remesh(&mut self) -> bool {
        false
    }
}

/// A triangle surface deformed under a weighted sum of energy terms.
pub struct DeformableSurfaceModel {
    mesh: SurfaceMesh,
    terms: Vec<Box<dyn EnergyTerm>>,
    remeshing: Option<RemeshOptions>,
    remesh_requests: usize,
    initialized_topology: Option<ModifiedTime>,
}

impl DeformableSurfaceModel {
    /// Create a model without energy terms.
    pub fn new(mesh: SurfaceMesh) -> Self {
        Self {
            mesh,
            terms: Vec::new(),
            remeshing: None,
            remesh_requests: 0,
            initialized_topology: None,
        }
    }

    /// Add an energy term.
    pub fn with_term(mut self, term: impl EnergyTerm + 'static) -> Self {
        self.terms.push(Box::new(term));
        self
    }

    /// Enable adaptive remeshing.
    pub fn with_remeshing(mut self, options: RemeshOptions) -> Self {
        self.remeshing = Some(options);
        self
    }

    /// Add an energy term, e.g. one created by an [`EnergyFactory`](crate::energy::EnergyFactory).
    pub fn add_term(&mut self, term: Box<dyn EnergyTerm>) {
        self.terms.push(term);
        self.initialized_topology = None;
    }

    /// The energy terms.
    pub fn terms(&self) -> &[Box<dyn EnergyTerm>] {
        &self.terms
    }

    /// Look up a term by instance name.
    pub fn term_mut(&mut self, name: &str) -> Option<&mut (dyn EnergyTerm + 'static)> {
        self.terms
            .iter_mut()
            .find(|t| t.name() == name)
            .map(|t| t.as_mut())
    }

    /// Remeshing options, if remeshing is enabled.
    pub fn remeshing(&self) -> Option<&RemeshOptions> {
        self.remeshing.as_ref()
    }

    /// Take the deformed surface out of the model.
    pub fn into_mesh(self) -> SurfaceMesh {
        self.mesh
    }

    fn initialize_terms(&mut self) -> Result<()> {
        for term in &mut self.terms {
            term.initialize(&mut self.mesh)?;
        }
        self.initialized_topology = Some(self.mesh.topology_time());
        Ok(())
    }
}

impl std::fmt::Debug for DeformableSurfaceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.terms.iter().map(|t| t.name()).collect();
        f.debug_struct("DeformableSurfaceModel")
            .field("num_points", &self.mesh.num_points())
            .field("terms", &names)
            .field("remeshing", &self.remeshing)
            .finish_non_exhaustive()
    }
}

impl DeformableModel for DeformableSurfaceModel {
    fn mesh(&self) -> &SurfaceMesh {
        &self.mesh
    }

    fn mesh_mut(&mut self) -> &mut SurfaceMesh {
        &mut self.mesh
    }

    fn initialize(&mut self) -> Result<()> {
        self.initialize_terms()
    }

    fn update(&mut self, gradient: bool) {
        self.mesh.update_normals();

        if self.initialized_topology != Some(self.mesh.topology_time()) {
            if let Err(err) = self.initialize_terms() {
                log::warn!("failed to re-initialize energy terms: {}", err);
            }
        }

        for term in self.terms.iter_mut().filter(|t| t.weight() != 0.0) {
            term.update(&mut self.mesh, gradient);
        }
    }

    fn value(&self) -> f64 {
        self.terms
            .iter()
            .filter(|t| t.weight() != 0.0)
            .map(|t| t.weight() * t.evaluate(&self.mesh))
            .sum()
    }

    fn gradient(&mut self, gradient: &mut [f64]) {
        let dofs = self.num_dofs();
        let gradient = &mut gradient[..dofs];
        gradient.par_iter_mut().for_each(|g| *g = 0.0);

        for term in self.terms.iter_mut() {
            let weight = term.weight();
            if weight != 0.0 {
                term.evaluate_gradient(&self.mesh, gradient, 1.0, weight);
            }
        }

        if let Some(status) = self.mesh.status() {
            gradient
                .par_chunks_mut(3)
                .zip(status.par_iter())
                .filter(|(_, s)| **s == 0.0)
                .for_each(|(g, _)| g.fill(0.0));
        }
    }

    fn step(&mut self, displacement: &[f64]) -> f64 {
        let mesh = &self.mesh;
        let status = mesh.status();
        let moves: Vec<Option<Vector3<f64>>> = displacement[..self.num_dofs()]
            .par_chunks(3)
            .enumerate()
            .map(|(i, d)| {
                let d = Vector3::new(d[0], d[1], d[2]);
                let active = status.map_or(true, |s| s[i] != 0.0);
                (active && d != Vector3::zeros()).then_some(d)
            })
            .collect();

        let delta = moves
            .par_iter()
            .flatten()
            .map(|d| d.norm())
            .reduce(|| 0.0, f64::max);

        self.mesh.displace_all(&moves);
        delta
    }

    fn remesh(&mut self) -> bool {
        let Some(options) = &self.remeshing else {
            return false;
        };
        self.remesh_requests += 1;
        if self.remesh_requests % options.interval.max(1) != 0 {
            return false;
        }
        match remesh(&mut self.mesh, options) {
            Ok(changed) => changed,
            Err(err) => {
                log::warn!("remeshing failed, keeping previous surface: {}", err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::curvature::GAUSS_CURVATURE;
    use crate::energy::implicit_distance::Sphere;
    use crate::energy::{GaussCurvatureConstraint, ImplicitSurfaceDistance};
    use crate::mesh::fixtures::{flat_grid, icosphere};
    use nalgebra::Point3;

    fn sphere_model(weight: f64) -> DeformableSurfaceModel {
        let mut model = DeformableSurfaceModel::new(icosphere(1, 2.0)).with_term(
            ImplicitSurfaceDistance::new("target", weight, Sphere::new(Point3::origin(), 1.0)),
        );
        model.initialize().unwrap();
        model.update(true);
        model
    }

    #[test]
    fn test_value_is_weighted_sum() {
        let mut model = DeformableSurfaceModel::new(icosphere(1, 2.0))
            .with_term(ImplicitSurfaceDistance::new(
                "a",
                1.0,
                Sphere::new(Point3::origin(), 1.0),
            ))
            .with_term(ImplicitSurfaceDistance::new(
                "b",
                0.5,
                Sphere::new(Point3::origin(), 1.5),
            ));
        model.initialize().unwrap();
        model.update(true);
        // 1.0 × 1.0 + 0.5 × 0.5
        assert!((model.value() - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_zero_weight_term_is_ignored() {
        let mut model = sphere_model(0.0);
        let mut gradient = vec![1.0; model.num_dofs()];
        model.gradient(&mut gradient);
        assert!(gradient.iter().all(|&g| g == 0.0));
        assert_eq!(model.value(), 0.0);
    }

    #[test]
    fn test_passive_points_have_zero_gradient() {
        let mut model = sphere_model(1.0);
        model.mesh_mut().set_active(3, false);
        let mut gradient = vec![0.0; model.num_dofs()];
        model.gradient(&mut gradient);
        assert_eq!(&gradient[9..12], &[0.0, 0.0, 0.0]);
        assert!(gradient[..9].iter().any(|&g| g != 0.0));
    }

    #[test]
    fn test_gradient_uses_dof_prefix() {
        let mut model = sphere_model(1.0);
        let dofs = model.num_dofs();
        let mut gradient = vec![7.0; dofs + 6];
        model.gradient(&mut gradient);
        assert_eq!(&gradient[dofs..], &[7.0; 6]);
    }

    #[test]
    fn test_step_moves_active_points_only() {
        let mut model = sphere_model(1.0);
        model.mesh_mut().set_active(1, false);
        let before = model.mesh().points().to_vec();

        let mut dx = vec![0.0; model.num_dofs()];
        dx[0] = 0.3;
        dx[3] = 0.5;
        dx[7] = -0.4;
        let delta = model.step(&dx);

        assert!((delta - 0.4).abs() < 1e-15);
        let after = model.mesh().points();
        assert_eq!(after[0].x, before[0].x + 0.3);
        assert_eq!(after[1], before[1]);
        assert_eq!(after[2].y, before[2].y - 0.4);
    }

    #[test]
    fn test_zero_step_keeps_geometry_time() {
        let mut model = sphere_model(1.0);
        let time = model.mesh().geometry_time();
        let delta = model.step(&vec![0.0; model.num_dofs()]);
        assert_eq!(delta, 0.0);
        assert_eq!(model.mesh().geometry_time(), time);
    }

    #[test]
    fn test_gradient_norm() {
        let model = sphere_model(1.0);
        let mut gradient = vec![0.0; model.num_dofs()];
        gradient[0] = 3.0;
        gradient[4] = 4.0;
        assert_eq!(model.gradient_norm(&gradient), 5.0);
    }

    #[test]
    fn test_remesh_interval_and_term_reinitialization() {
        let mut model = DeformableSurfaceModel::new(flat_grid(3))
            .with_term(GaussCurvatureConstraint::new("k", 1.0))
            .with_remeshing(RemeshOptions::with_edge_lengths(0.0, 1.2).with_interval(2));
        model.initialize().unwrap();
        model.update(true);
        assert_eq!(model.num_points(), 16);

        assert!(!model.remesh());
        assert!(model.remesh());
        // every diagonal is split
        assert_eq!(model.num_points(), 25);

        model.update(true);
        let gauss = model.mesh().point_data().get(GAUSS_CURVATURE).unwrap();
        assert_eq!(gauss.num_tuples(), 25);
        assert!(!gauss.is_older_than(model.mesh().geometry_time()));
        assert_eq!(model.value(), 0.0);
    }

    #[test]
    fn test_no_remeshing_by_default() {
        let mut model = sphere_model(1.0);
        assert!(!model.remesh());
        assert!(model.remeshing().is_none());
    }
}
