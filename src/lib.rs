//! # Sculpt
//!
//! Explicit time integration of deformable surface meshes.
//!
//! A deformable surface moves under a weighted sum of energy terms. Each
//! iteration the integrator collects the energy gradient, turns it into a
//! bounded displacement per point and moves the surface, optionally
//! remeshing in between, until the surface comes to rest.
//!
//! ## Features
//!
//! - **Triangle surfaces** with cached normals and named per-point arrays
//!   that know when they are out of date
//! - **Energy terms** behind one trait: Gauss curvature regularization and
//!   attraction towards an implicit surface, created by name from a factory
//! - **Explicit Euler integration** with step length normalization,
//!   displacement clamping, stopping criteria and progress observers
//! - **Adaptive remeshing** that carries point data across topology changes
//! - **Data-parallel kernels** built on rayon
//!
//! ## Quick Start
//!
//! ```
//! use sculpt::prelude::*;
//! use nalgebra::Point3;
//!
//! // A triangle hovering above the plane z = 1
//! let points = vec![
//!     Point3::new(0.0, 0.0, 3.0),
//!     Point3::new(1.0, 0.0, 3.0),
//!     Point3::new(0.0, 1.0, 3.0),
//! ];
//! let mesh = SurfaceMesh::from_triangles(points, vec![[0, 1, 2]]).unwrap();
//! let plane = |p: &Point3<f64>| p.z - 1.0;
//!
//! let mut model = DeformableSurfaceModel::new(mesh)
//!     .with_term(ImplicitSurfaceDistance::new("target", 1.0, plane))
//!     .with_term(GaussCurvatureConstraint::new("curvature", 0.1));
//!
//! let options = EulerOptions::with_step_length(0.5)
//!     .with_normalize(false)
//!     .with_max_iterations(50);
//! let mut optimizer = EulerMethod::new(options).with_stopping_criterion(ValueChange::new(1e-6));
//!
//! let summary = optimizer.run(&mut model).unwrap();
//! assert_eq!(summary.termination, Termination::Converged);
//! assert!((model.mesh().position(0).z - 1.0).abs() < 1e-3);
//! ```
//!
//! ## Configuration by name
//!
//! Integrator options can also be set from key/value pairs:
//!
//! ```
//! use sculpt::optim::EulerMethod;
//!
//! let mut optimizer = EulerMethod::default();
//! optimizer.set("Maximum node displacement", "0.1").unwrap();
//! optimizer.set("Maximum no. of iterations", "20").unwrap();
//! assert!(optimizer.set("Unknown", "1").is_err());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod energy;
pub mod error;
pub mod mesh;
pub mod model;
pub mod optim;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use sculpt::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::remesh::RemeshOptions;
    pub use crate::energy::{
        EnergyFactory, EnergyTerm, GaussCurvatureConstraint, ImplicitSurfaceDistance,
    };
    pub use crate::error::{Result, SculptError};
    pub use crate::mesh::{FieldSpec, SurfaceMesh};
    pub use crate::model::{DeformableModel, DeformableSurfaceModel};
    pub use crate::optim::{
        EulerMethod, EulerOptions, Observer, StoppingCriterion, Termination, ValueChange,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use crate::mesh::fixtures::icosphere;

    #[test]
    fn test_factory_terms_drive_a_model() {
        let factory = EnergyFactory::with_defaults();
        let mut model = DeformableSurfaceModel::new(icosphere(1, 1.0));
        model.add_term(factory.create("GaussCurvature", "curvature", 1.0).unwrap());

        let mut optimizer = EulerMethod::new(EulerOptions::with_step_length(0.01).with_max_iterations(2));
        let summary = optimizer.run(&mut model).unwrap();

        assert_eq!(summary.iterations, 2);
        assert_eq!(summary.termination, Termination::MaxIterationsReached);
        assert!(summary.value > 0.0);
        assert_eq!(model.terms().len(), 1);
    }
}
