//! Time integration of deformable models.
//!
//! [`EulerMethod`] advances a [`DeformableModel`](crate::model::DeformableModel)
//! with explicit Euler steps until a [`StoppingCriterion`] is fulfilled, a
//! step no longer moves the surface, or the iteration limit is reached.
//! Progress is reported to [`Observer`]s.

mod euler;
mod observer;
mod stopping;

pub use euler::{
    clamp_displacements, EulerMethod, EulerOptions, OptimizerState, RunSummary, Termination,
};
pub use observer::{EventKind, Observer, OptimizerEvent};
pub use stopping::{MaxDisplacement, StoppingCriterion, ValueChange};
