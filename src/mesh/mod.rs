//! Surface mesh representation.
//!
//! [`SurfaceMesh`] stores point positions and triangles together with the
//! derived state a deformation needs on every iteration:
//!
//! - [`EdgeTable`]: sorted point adjacency for neighborhood queries
//! - vertex normals, cached against the geometry modification time
//! - [`PointDataStore`]: named per-point arrays (status mask, curvature, ...)
//!
//! # Modification times
//!
//! Every geometry or topology change and every write to a point-data array
//! draws a new [`ModifiedTime`]. A derived array is stale exactly when it is
//! older than the geometry it was computed from:
//!
//! ```
//! use sculpt::mesh::{FieldSpec, SurfaceMesh};
//! use nalgebra::{Point3, Vector3};
//!
//! let points = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let mut mesh = SurfaceMesh::from_triangles(points, vec![[0, 1, 2]]).unwrap();
//!
//! mesh.point_data_mut().declare("", &FieldSpec::shared("Height"), 3).unwrap();
//! let heights = mesh.points().iter().map(|p| p.z).collect();
//! mesh.point_data_mut().replace("Height", heights).unwrap();
//! assert!(!mesh.point_data().get("Height").unwrap().is_older_than(mesh.geometry_time()));
//!
//! mesh.displace(2, &Vector3::new(0.0, 0.0, 1.0));
//! assert!(mesh.point_data().get("Height").unwrap().is_older_than(mesh.geometry_time()));
//! ```

mod edges;
mod point_data;
mod surface;

#[cfg(test)]
pub(crate) mod fixtures;

pub use edges::EdgeTable;
pub use point_data::{ArrayKind, FieldSpec, ModifiedTime, PointDataArray, PointDataStore};
pub use surface::{SurfaceMesh, STATUS};
