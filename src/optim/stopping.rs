//! Stopping criteria tested after every successful integration step.

use rayon::prelude::*;

/// Decides whether an optimization has converged.
///
/// Called with the iteration index, the energy before and after the step,
/// and the displacement buffer (three values per point) of the step.
/// Closures with the same signature are criteria too.
pub trait StoppingCriterion: Send {
    /// Whether the run should stop.
    fn fulfilled(&mut self, iteration: usize, previous: f64, current: f64, displacement: &[f64]) -> bool;
}

impl<F> StoppingCriterion for F
where
    F: FnMut(usize, f64, f64, &[f64]) -> bool + Send,
{
    fn fulfilled(&mut self, iteration: usize, previous: f64, current: f64, displacement: &[f64]) -> bool {
        self(iteration, previous, current, displacement)
    }
}

/// Stop once the energy changes by at most `tolerance` in one step.
///
/// Never fulfilled while either value is infinite or NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueChange {
    /// Largest energy change considered converged.
    pub tolerance: f64,
}

impl ValueChange {
    /// Create the criterion.
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

impl StoppingCriterion for ValueChange {
    fn fulfilled(&mut self, _iteration: usize, previous: f64, current: f64, _displacement: &[f64]) -> bool {
        previous.is_finite() && current.is_finite() && (previous - current).abs() <= self.tolerance
    }
}

/// Stop once no point moved further than `tolerance` in one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxDisplacement {
    /// Largest point displacement considered converged.
    pub tolerance: f64,
}

impl MaxDisplacement {
    /// Create the criterion.
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

impl StoppingCriterion for MaxDisplacement {
    fn fulfilled(&mut self, _iteration: usize, _previous: f64, _current: f64, displacement: &[f64]) -> bool {
        let max_sq = displacement
            .par_chunks(3)
            .map(|d| d.iter().map(|x| x * x).sum::<f64>())
            .reduce(|| 0.0, f64::max);
        max_sq <= self.tolerance * self.tolerance
    }
}
