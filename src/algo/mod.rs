//! Geometry processing collaborators of the deformation engine.
//!
//! - **Curvature**: discrete Gauss and mean curvature estimation
//! - **Smoothing**: neighbor-average smoothing of per-point fields
//! - **Remeshing**: adaptive edge split / collapse between integration steps

pub mod curvature;
pub mod remesh;
pub mod smooth;
