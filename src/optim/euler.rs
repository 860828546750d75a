//! Explicit (forward) Euler integration of a deformable surface.
//!
//! Every iteration turns the energy gradient into a displacement of length
//! `step_length` (or, without normalization, into the raw force scaled by
//! the step length), clamps it per point and moves the surface:
//!
//! ```text
//! for i in 1..=max_iterations:
//!     remesh (i > 1)
//!     g  = ∇E
//!     dx = -step_length / |g| × g, clamped to the maximum displacement
//!     δ  = step(dx)              stop (degenerate) if δ ≤ epsilon
//!     update, test stopping criteria
//! ```

use rayon::prelude::*;

use super::observer::{EventKind, Observer, OptimizerEvent};
use super::stopping::StoppingCriterion;
use crate::error::{Result, SculptError};
use crate::mesh::FieldSpec;
use crate::model::DeformableModel;

/// Options for [`EulerMethod`].
#[derive(Debug, Clone, PartialEq)]
pub struct EulerOptions {
    /// Length of integration steps (default: 1.0).
    pub step_length: f64,

    /// Scale displacements by the inverse gradient norm (default: true).
    pub normalize_step_length: bool,

    /// Maximum displacement of a point per step; 0 derives it from the
    /// step length (default: 0.0).
    pub maximum_displacement: f64,

    /// Realized displacements at or below this end the run (default: 1e-9).
    pub epsilon: f64,

    /// Maximum number of iterations (default: 100).
    pub max_iterations: usize,

    /// Name of a point-data array accumulating the displacement along the
    /// surface normal (default: none).
    pub normal_displacement: Option<String>,
}

impl Default for EulerOptions {
    fn default() -> Self {
        Self {
            step_length: 1.0,
            normalize_step_length: true,
            maximum_displacement: 0.0,
            epsilon: 1e-9,
            max_iterations: 100,
            normal_displacement: None,
        }
    }
}

fn parse_number(name: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| SculptError::invalid_param(name, value, "expected a number"))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SculptError::invalid_param(name, value, "expected a boolean")),
    }
}

fn yes_no(flag: bool) -> String {
    let text = if flag { "Yes" } else { "No" };
    text.to_string()
}

impl EulerOptions {
    /// Create options with the given step length.
    pub fn with_step_length(step_length: f64) -> Self {
        Self {
            step_length,
            ..Default::default()
        }
    }

    /// Enable or disable step length normalization.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize_step_length = normalize;
        self
    }

    /// Set the maximum point displacement per step.
    pub fn with_maximum_displacement(mut self, max: f64) -> Self {
        self.maximum_displacement = max;
        self
    }

    /// Set the degenerate step threshold.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Track the displacement along the normal in the named point-data array.
    pub fn with_normal_displacement(mut self, name: impl Into<String>) -> Self {
        self.normal_displacement = Some(name.into());
        self
    }

    /// Set an option by its parameter name.
    ///
    /// # Example
    ///
    /// ```
    /// use sculpt::optim::EulerOptions;
    ///
    /// let mut options = EulerOptions::default();
    /// options.set("Length of steps", "0.25").unwrap();
    /// options.set("Normalise length of steps", "No").unwrap();
    /// assert_eq!(options.step_length, 0.25);
    /// assert!(!options.normalize_step_length);
    /// assert!(options.set("Length of steps", "-1").is_err());
    /// ```
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "Deformable surface step length" | "Length of steps" | "Maximum length of steps" => {
                let step = parse_number(name, value)?;
                if !(step > 0.0 && step.is_finite()) {
                    return Err(SculptError::invalid_param(name, value, "must be positive"));
                }
                self.step_length = step;
            }
            "Normalize length of steps"
            | "Normalise length of steps"
            | "Normalize maximum length of steps"
            | "Normalise maximum length of steps"
            | "Normalize deformable surface step length"
            | "Normalise deformable surface step length" => {
                self.normalize_step_length = parse_bool(name, value)?;
            }
            "Maximum deformable surface displacement" | "Maximum node displacement" => {
                let max = parse_number(name, value)?;
                if !(max >= 0.0 && max.is_finite()) {
                    return Err(SculptError::invalid_param(name, value, "must not be negative"));
                }
                self.maximum_displacement = max;
            }
            _ => self.set_base(name, value)?,
        }
        Ok(())
    }

    /// Options shared by all local optimizers.
    fn set_base(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "Maximum no. of iterations" | "Maximum number of iterations" | "No. of iterations" => {
                self.max_iterations = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| SculptError::invalid_param(name, value, "expected a count"))?;
            }
            "Epsilon" => {
                let epsilon = parse_number(name, value)?;
                if !(epsilon >= 0.0) {
                    return Err(SculptError::invalid_param(name, value, "must not be negative"));
                }
                self.epsilon = epsilon;
            }
            _ => return Err(SculptError::UnknownParameter(name.to_string())),
        }
        Ok(())
    }

    /// Current values under their parameter names.
    pub fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Maximum no. of iterations", self.max_iterations.to_string()),
            ("Epsilon", self.epsilon.to_string()),
            ("Length of steps", self.step_length.to_string()),
            ("Normalize length of steps", yes_no(self.normalize_step_length)),
            ("Maximum node displacement", self.maximum_displacement.to_string()),
        ]
    }
}

/// Lifecycle state of an [`EulerMethod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerState {
    /// Not bound to a model yet.
    Uninitialized,
    /// Buffers allocated, ready to run.
    Initialized,
    /// Inside the iteration loop.
    Running,
    /// A stopping criterion was fulfilled.
    Converged,
    /// The iteration limit was reached.
    MaxIterationsReached,
    /// A step moved no point further than epsilon.
    DegenerateStep,
    /// The run is over.
    Finalized,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A stopping criterion was fulfilled.
    Converged,
    /// The iteration limit was reached.
    MaxIterationsReached,
    /// A step moved no point further than epsilon.
    DegenerateStep,
}

impl From<Termination> for OptimizerState {
    fn from(termination: Termination) -> Self {
        match termination {
            Termination::Converged => OptimizerState::Converged,
            Termination::MaxIterationsReached => OptimizerState::MaxIterationsReached,
            Termination::DegenerateStep => OptimizerState::DegenerateStep,
        }
    }
}

/// Outcome of [`EulerMethod::run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Why the run ended.
    pub termination: Termination,
    /// Number of started iterations.
    pub iterations: usize,
    /// Last computed energy value.
    pub value: f64,
    /// Realized maximum displacement of the last step.
    pub last_delta: f64,
}

/// Clamp the magnitude of every 3-vector in `dx` to `max`.
///
/// Vectors within the bound are left untouched; longer ones are scaled down,
/// keeping their direction. Vectors exceeding the bound by a few ulps count
/// as within it, so clamping twice gives the same result as clamping once.
///
/// # Example
///
/// ```
/// use sculpt::optim::clamp_displacements;
///
/// let mut dx = vec![3.0, 4.0, 0.0, 0.1, 0.0, 0.0];
/// clamp_displacements(&mut dx, 1.0);
/// let expected = [0.6, 0.8, 0.0, 0.1, 0.0, 0.0];
/// assert!(dx.iter().zip(expected).all(|(a, b)| (a - b).abs() < 1e-12));
/// ```
pub fn clamp_displacements(dx: &mut [f64], max: f64) {
    let max_sq = max * max;
    let limit_sq = max_sq * (1.0 + 4.0 * f64::EPSILON);
    dx.par_chunks_mut(3).for_each(|d| {
        let norm_sq: f64 = d.iter().map(|x| x * x).sum();
        if norm_sq > limit_sq {
            let scale = (max_sq / norm_sq).sqrt();
            d.iter_mut().for_each(|x| *x *= scale);
        }
    });
}

/// Explicit Euler integrator for deformable surface models.
///
/// # Example
///
/// ```
/// use sculpt::energy::ImplicitSurfaceDistance;
/// use sculpt::energy::implicit_distance::Sphere;
/// use sculpt::model::DeformableSurfaceModel;
/// use sculpt::optim::{EulerMethod, EulerOptions, Termination};
/// use sculpt::mesh::SurfaceMesh;
/// use nalgebra::Point3;
///
/// let points = vec![
///     Point3::new(2.0, 0.0, 0.0),
///     Point3::new(0.0, 2.0, 0.0),
///     Point3::new(0.0, 0.0, 2.0),
/// ];
/// let mesh = SurfaceMesh::from_triangles(points, vec![[0, 1, 2]]).unwrap();
/// let target = Sphere::new(Point3::origin(), 1.0);
/// let mut model = DeformableSurfaceModel::new(mesh)
///     .with_term(ImplicitSurfaceDistance::new("target", 1.0, target));
///
/// let options = EulerOptions::with_step_length(0.1).with_max_iterations(5);
/// let mut optimizer = EulerMethod::new(options);
/// let summary = optimizer.run(&mut model).unwrap();
///
/// assert_eq!(summary.termination, Termination::MaxIterationsReached);
/// assert_eq!(summary.iterations, 5);
/// ```
pub struct EulerMethod {
    options: EulerOptions,
    state: OptimizerState,
    gradient: Vec<f64>,
    displacement: Vec<f64>,
    observers: Vec<Observer>,
    criteria: Vec<Box<dyn StoppingCriterion>>,
    last_delta: f64,
}

impl Default for EulerMethod {
    fn default() -> Self {
        Self::new(EulerOptions::default())
    }
}

impl std::fmt::Debug for EulerMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EulerMethod")
            .field("options", &self.options)
            .field("state", &self.state)
            .field("num_dofs", &self.gradient.len())
            .field("observers", &self.observers.len())
            .field("criteria", &self.criteria.len())
            .finish()
    }
}

impl EulerMethod {
    /// Create an integrator.
    pub fn new(options: EulerOptions) -> Self {
        Self {
            options,
            state: OptimizerState::Uninitialized,
            gradient: Vec::new(),
            displacement: Vec::new(),
            observers: Vec::new(),
            criteria: Vec::new(),
            last_delta: 0.0,
        }
    }

    /// Register an observer.
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observers.push(observer);
        self
    }

    /// Register a stopping criterion.
    pub fn with_stopping_criterion(mut self, criterion: impl StoppingCriterion + 'static) -> Self {
        self.criteria.push(Box::new(criterion));
        self
    }

    /// Register an observer.
    pub fn add_observer(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    /// Register a stopping criterion.
    pub fn add_stopping_criterion(&mut self, criterion: Box<dyn StoppingCriterion>) {
        self.criteria.push(criterion);
    }

    /// The options.
    pub fn options(&self) -> &EulerOptions {
        &self.options
    }

    /// The options, mutable.
    pub fn options_mut(&mut self) -> &mut EulerOptions {
        &mut self.options
    }

    /// Set an option by its parameter name, see [`EulerOptions::set`].
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        self.options.set(name, value)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> OptimizerState {
        self.state
    }

    /// Gradient buffer of the last iteration.
    pub fn gradient(&self) -> &[f64] {
        &self.gradient
    }

    /// Displacement buffer of the last iteration.
    pub fn displacement(&self) -> &[f64] {
        &self.displacement
    }

    /// Realized maximum displacement of the last step.
    pub fn last_delta(&self) -> f64 {
        self.last_delta
    }

    /// Bind to `model`: allocate buffers and add the status mask.
    ///
    /// Fails with [`SculptError::ParametricModel`] for parametric models and
    /// propagates initialization errors of the model's energy terms.
    pub fn initialize<M: DeformableModel + ?Sized>(&mut self, model: &mut M) -> Result<()> {
        if model.is_parametric() {
            return Err(SculptError::ParametricModel);
        }
        model.initialize()?;
        self.allocate(model.num_dofs());

        let mesh = model.mesh_mut();
        mesh.ensure_status()?;
        if let Some(name) = &self.options.normal_displacement {
            let n = mesh.num_points();
            mesh.point_data_mut()
                .declare("", &FieldSpec::shared(name.clone()), n)?;
        }

        self.state = OptimizerState::Initialized;
        Ok(())
    }

    /// Integrate until convergence, a degenerate step or the iteration limit.
    pub fn run<M: DeformableModel + ?Sized>(&mut self, model: &mut M) -> Result<RunSummary> {
        self.initialize(model)?;

        self.remesh_model(model);
        model.update(true);

        self.state = OptimizerState::Running;
        let mut value = model.value();
        self.notify(EventKind::Start, 0, value);
        log::info!(
            "euler: {} points, step length {}, initial value {:.6e}",
            model.num_points(),
            self.options.step_length,
            value
        );

        let mut termination = Termination::MaxIterationsReached;
        let mut iterations = 0;
        self.last_delta = 0.0;

        for iteration in 1..=self.options.max_iterations {
            iterations = iteration;
            self.notify(EventKind::IterationStart, iteration, value);

            if iteration > 1 {
                self.remesh_model(model);
            }

            let dofs = model.num_dofs();
            model.gradient(&mut self.gradient[..dofs]);
            self.update_displacement(model);

            self.last_delta = model.step(&self.displacement[..dofs]);
            if self.last_delta <= self.options.epsilon {
                log::debug!(
                    "iteration {}: realized displacement {:.3e} at or below epsilon",
                    iteration,
                    self.last_delta
                );
                termination = Termination::DegenerateStep;
                self.notify(EventKind::IterationEnd, iteration, value);
                break;
            }
            model.update(true);

            self.update_normal_displacement(model);

            let previous = value;
            if previous.is_finite() {
                value = model.value();
            }
            log::debug!(
                "iteration {}: value {:.6e}, max displacement {:.3e}",
                iteration,
                value,
                self.last_delta
            );

            let converged = self.converged(iteration, previous, value, dofs);
            self.notify(EventKind::IterationEnd, iteration, value);
            if converged {
                termination = Termination::Converged;
                break;
            }
        }

        self.state = termination.into();
        self.notify(EventKind::End, iterations, value);
        log::info!(
            "euler: {:?} after {} iteration(s), value {:.6e}",
            termination,
            iterations,
            value
        );
        self.state = OptimizerState::Finalized;

        Ok(RunSummary {
            termination,
            iterations,
            value,
            last_delta: self.last_delta,
        })
    }

    /// Norm used to scale the gradient into a displacement.
    ///
    /// With normalization this is the Euclidean gradient norm, or 1 if that
    /// is zero. Without it, `1 / num_points` undoes the per-point averaging
    /// applied by the energy terms.
    pub fn gradient_norm<M: DeformableModel + ?Sized>(&self, model: &M) -> f64 {
        if self.options.normalize_step_length {
            let dofs = model.num_dofs().min(self.gradient.len());
            let norm = model.gradient_norm(&self.gradient[..dofs]);
            if norm > 0.0 {
                norm
            } else {
                1.0
            }
        } else {
            1.0 / model.num_points() as f64
        }
    }

    /// Grow the buffers to `dofs` values. They never shrink.
    fn allocate(&mut self, dofs: usize) {
        if dofs > self.gradient.len() {
            log::debug!("euler: growing buffers to {} DOFs", dofs);
            self.gradient.resize(dofs, 0.0);
            self.displacement.resize(dofs, 0.0);
        }
    }

    fn remesh_model<M: DeformableModel + ?Sized>(&mut self, model: &mut M) {
        if model.remesh() {
            model.update(true);
            self.allocate(model.num_dofs());
        }
    }

    fn update_displacement<M: DeformableModel + ?Sized>(&mut self, model: &M) {
        let dofs = model.num_dofs();
        let scale = -self.options.step_length / self.gradient_norm(model);
        self.displacement[..dofs]
            .par_iter_mut()
            .zip(self.gradient[..dofs].par_iter())
            .for_each(|(d, g)| *d = scale * g);
        self.truncate_displacement(dofs, false);
    }

    fn truncate_displacement(&mut self, dofs: usize, force: bool) {
        let normalize = self.options.normalize_step_length;
        let step = self.options.step_length;
        let mut max = self.options.maximum_displacement;
        if max <= 0.0 {
            max = if normalize { step } else { 1.0 };
        }
        if force || !normalize || max < step {
            clamp_displacements(&mut self.displacement[..dofs], max);
        }
    }

    fn update_normal_displacement<M: DeformableModel + ?Sized>(&mut self, model: &mut M) {
        let Some(name) = &self.options.normal_displacement else {
            return;
        };
        let mesh = model.mesh_mut();
        if !mesh.has_current_normals() {
            log::warn!("euler: normals not available, '{}' not updated", name);
            return;
        }

        let n = mesh.num_points();
        let dx = &self.displacement[..3 * n];
        let previous = mesh.point_data().values(name).filter(|v| v.len() == n);
        let normals = mesh.normals();
        let values: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|i| {
                let d = &dx[3 * i..3 * i + 3];
                let normal = &normals[i];
                previous.map_or(0.0, |v| v[i]) + d[0] * normal.x + d[1] * normal.y + d[2] * normal.z
            })
            .collect();

        let spec = FieldSpec::shared(name.clone());
        let stored = mesh
            .point_data_mut()
            .declare("", &spec, n)
            .and_then(|_| mesh.point_data_mut().replace(name, values));
        if let Err(err) = stored {
            log::warn!("euler: failed to update '{}': {}", name, err);
        }
    }

    fn converged(&mut self, iteration: usize, previous: f64, current: f64, dofs: usize) -> bool {
        let displacement = &self.displacement[..dofs];
        self.criteria
            .iter_mut()
            .any(|c| c.fulfilled(iteration, previous, current, displacement))
    }

    fn notify(&self, kind: EventKind, iteration: usize, value: f64) {
        let event = OptimizerEvent {
            kind,
            iteration,
            value,
        };
        for observer in &self.observers {
            observer.notify(&event);
        }
    }
}
