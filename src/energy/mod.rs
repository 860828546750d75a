//! Energy terms acting on a deformable surface.
//!
//! An [`EnergyTerm`] contributes a scalar penalty and a per-point gradient
//! (negated force) to a deformable model. Its lifecycle is:
//!
//! 1. [`initialize`](EnergyTerm::initialize): declare the cached point-data
//!    arrays the term depends on. Called again after every remeshing, so
//!    re-declaring an existing array is a no-op.
//! 2. [`update`](EnergyTerm::update): recompute cached arrays that are older
//!    than the mesh geometry. Fresh arrays are never recomputed.
//! 3. [`evaluate`](EnergyTerm::evaluate) and
//!    [`evaluate_gradient`](EnergyTerm::evaluate_gradient), in any order.
//!
//! All term updates of an iteration complete before any term is evaluated,
//! so cached arrays are read-shared without locking.
//!
//! Terms are created by name through an [`EnergyFactory`]:
//!
//! ```
//! use sculpt::energy::EnergyFactory;
//!
//! let factory = EnergyFactory::with_defaults();
//! let term = factory.create("Gaussian curvature", "curvature", 0.5).unwrap();
//! assert_eq!(term.name(), "curvature");
//! assert_eq!(term.weight(), 0.5);
//! assert!(factory.create("Balloon", "b", 1.0).is_err());
//! ```

pub mod gauss_curvature;
pub mod implicit_distance;

use std::collections::HashMap;
use std::fmt;

use nalgebra::Vector3;
use rayon::prelude::*;

use crate::error::{Result, SculptError};
use crate::mesh::{FieldSpec, SurfaceMesh};

pub use gauss_curvature::{s_shaped_membership, GaussCurvatureConstraint};
pub use implicit_distance::{DistanceField, ImplicitSurfaceDistance};

/// A weighted energy term of a deformable surface model.
pub trait EnergyTerm: Send + Sync {
    /// Instance name, also used to prefix private point-data arrays.
    fn name(&self) -> &str;

    /// Weight of the term in the total energy.
    fn weight(&self) -> f64;

    /// Change the weight. A weight of zero disables the term.
    fn set_weight(&mut self, weight: f64);

    /// Declare the cached point-data arrays of this term.
    ///
    /// Fails only if the term cannot operate on `mesh` at all.
    fn initialize(&mut self, mesh: &mut SurfaceMesh) -> Result<()>;

    /// Recompute cached arrays that are stale with respect to the geometry.
    ///
    /// `gradient` tells whether a gradient evaluation will follow.
    fn update(&mut self, mesh: &mut SurfaceMesh, gradient: bool);

    /// Current penalty value. Must not modify anything.
    fn evaluate(&self, mesh: &SurfaceMesh) -> f64;

    /// Add `weight × step × contribution` of every affected point to
    /// `gradient`, a flat buffer of `3 × num_points` values.
    ///
    /// Entries of points the term does not affect are left untouched.
    fn evaluate_gradient(&mut self, mesh: &SurfaceMesh, gradient: &mut [f64], step: f64, weight: f64);
}

/// Add `scale × contribution[i]` to the `i`-th 3-vector of `gradient`.
///
/// This is the additive accumulation step shared by all terms. Runs in
/// parallel over points.
///
/// # Example
///
/// ```
/// use sculpt::energy::add_weighted_gradient;
/// use nalgebra::Vector3;
///
/// let mut gradient = vec![1.0; 6];
/// let forces = [Vector3::new(1.0, 0.0, 0.0), Vector3::zeros()];
/// add_weighted_gradient(&mut gradient, &forces, 0.5);
/// assert_eq!(gradient, vec![1.5, 1.0, 1.0, 1.0, 1.0, 1.0]);
/// ```
pub fn add_weighted_gradient(gradient: &mut [f64], contribution: &[Vector3<f64>], scale: f64) {
    gradient
        .par_chunks_mut(3)
        .zip(contribution.par_iter())
        .for_each(|(g, c)| {
            g[0] += scale * c.x;
            g[1] += scale * c.y;
            g[2] += scale * c.z;
        });
}

/// Whether the array declared by `spec` for `owner` needs recomputing.
pub(crate) fn is_stale(mesh: &SurfaceMesh, owner: &str, spec: &FieldSpec) -> bool {
    mesh.point_data()
        .get(&spec.key(owner))
        .map_or(true, |array| {
            array.is_older_than(mesh.geometry_time()) || array.num_tuples() != mesh.num_points()
        })
}

/// Store freshly computed values of a declared array, declaring it if needed.
pub(crate) fn store_field(
    mesh: &mut SurfaceMesh,
    owner: &str,
    spec: &FieldSpec,
    values: Vec<f64>,
) -> Result<()> {
    let n = mesh.num_points();
    let key = spec.key(owner);
    mesh.point_data_mut().declare(owner, spec, n)?;
    mesh.point_data_mut().replace(&key, values)
}

/// Constructor of a registered energy term kind, taking instance name and weight.
pub type TermConstructor = Box<dyn Fn(&str, f64) -> Box<dyn EnergyTerm> + Send + Sync>;

/// Name-keyed registry of energy term constructors.
#[derive(Default)]
pub struct EnergyFactory {
    constructors: HashMap<String, TermConstructor>,
}

impl EnergyFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory with all built-in terms that need no extra input.
    pub fn with_defaults() -> Self {
        let mut factory = Self::new();
        for kind in ["GaussCurvature", "Gauss curvature", "Gaussian curvature"] {
            factory.register(kind, |name, weight| {
                Box::new(GaussCurvatureConstraint::new(name, weight))
            });
        }
        factory
    }

    /// Register a constructor, replacing any previous one of the same kind.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&str, f64) -> Box<dyn EnergyTerm> + Send + Sync + 'static,
    {
        self.constructors.insert(kind.into(), Box::new(constructor));
    }

    /// Whether a kind is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered kinds in sorted order.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Create a term of the given kind.
    pub fn create(&self, kind: &str, name: &str, weight: f64) -> Result<Box<dyn EnergyTerm>> {
        self.constructors
            .get(kind)
            .map(|constructor| constructor(name, weight))
            .ok_or_else(|| SculptError::UnknownEnergyTerm(kind.to_string()))
    }
}

impl fmt::Debug for EnergyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnergyFactory")
            .field("kinds", &self.kinds())
            .finish()
    }
}
