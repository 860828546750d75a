//! Error types for sculpt.
//!
//! Only configuration problems surface as errors. Numeric degeneracy (zero
//! gradients, isolated points, stalled steps) is handled where it occurs.

use thiserror::Error;

/// Result type alias using [`SculptError`].
pub type Result<T> = std::result::Result<T, SculptError>;

/// Errors that can occur while building meshes or configuring a deformation.
#[derive(Error, Debug)]
pub enum SculptError {
    /// A face references an invalid point index.
    #[error("face {face} references invalid point index {point}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid point index.
        point: usize,
    },

    /// A face has duplicate point indices (degenerate triangle).
    #[error("face {face} is degenerate (has duplicate points)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// An edge has more than two incident faces.
    #[error("edge ({p0}, {p1}) has more than two incident faces")]
    NonManifoldEdge {
        /// First point of the edge.
        p0: usize,
        /// Second point of the edge.
        p1: usize,
    },

    /// An energy term cannot operate on the given model.
    #[error("energy term '{term}' is incompatible with this model: {reason}")]
    IncompatibleModel {
        /// Name of the term.
        term: String,
        /// Why the model was rejected.
        reason: &'static str,
    },

    /// The model deforms through a parametric transformation.
    #[error("explicit integration only supports non-parametric deformable models")]
    ParametricModel,

    /// A point-data array was re-declared with a different shape.
    #[error("point data '{name}' exists with {existing} component(s), requested {requested}")]
    FieldShapeMismatch {
        /// Array name.
        name: String,
        /// Components of the existing array.
        existing: usize,
        /// Components requested by the new declaration.
        requested: usize,
    },

    /// A point-data array has the wrong number of values.
    #[error("point data '{name}' expects {expected} values, got {actual}")]
    FieldLength {
        /// Array name.
        name: String,
        /// Expected number of values.
        expected: usize,
        /// Provided number of values.
        actual: usize,
    },

    /// A required point-data array does not exist.
    #[error("missing point data '{0}'")]
    MissingPointData(String),

    /// No energy term is registered under this kind name.
    #[error("unknown energy term kind: {0}")]
    UnknownEnergyTerm(String),

    /// A configuration key is not recognized.
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl SculptError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: impl Into<String>,
        value: T,
        reason: &'static str,
    ) -> Self {
        SculptError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason,
        }
    }
}
