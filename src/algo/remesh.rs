//! Local adaptive remeshing of a deforming surface.
//!
//! While a surface deforms, some edges stretch and others shrink. This
//! module keeps edge lengths within `[min_edge_length, max_edge_length]`:
//!
//! 1. **Collapse** interior edges shorter than the minimum into their
//!    midpoint, when the link condition holds and no incident face flips
//! 2. **Split** edges longer than the maximum at their midpoint, refining
//!    each triangle into 2, 3 or 4 triangles depending on how many of its
//!    edges were split
//!
//! Point data follows the points: float arrays are interpolated, flag
//! arrays such as the status mask take the minimum of their sources, so a
//! point created next to a frozen point is frozen as well.
//!
//! # Example
//!
//! ```
//! use sculpt::algo::remesh::{remesh, RemeshOptions};
//! use sculpt::mesh::SurfaceMesh;
//! use nalgebra::Point3;
//!
//! let points = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(2.0, 0.0, 0.0),
//!     Point3::new(0.0, 2.0, 0.0),
//! ];
//! let mut mesh = SurfaceMesh::from_triangles(points, vec![[0, 1, 2]]).unwrap();
//!
//! let options = RemeshOptions::with_edge_lengths(0.0, 1.5);
//! assert!(remesh(&mut mesh, &options).unwrap());
//! assert_eq!(mesh.num_faces(), 4);
//! ```

use std::collections::HashMap;

use nalgebra::Point3;

use crate::error::Result;
use crate::mesh::SurfaceMesh;

/// Options for adaptive remeshing.
#[derive(Debug, Clone)]
pub struct RemeshOptions {
    /// Edges shorter than this are collapsed (0 disables collapsing).
    pub min_edge_length: f64,

    /// Edges longer than this are split (infinite disables splitting).
    pub max_edge_length: f64,

    /// Remesh on every n-th request from the deformable model.
    pub interval: usize,
}

impl Default for RemeshOptions {
    fn default() -> Self {
        Self {
            min_edge_length: 0.0,
            max_edge_length: f64::INFINITY,
            interval: 1,
        }
    }
}

impl RemeshOptions {
    /// Create options with the given edge length range.
    pub fn with_edge_lengths(min_edge_length: f64, max_edge_length: f64) -> Self {
        Self {
            min_edge_length,
            max_edge_length,
            ..Self::default()
        }
    }

    /// Derive the range from an average edge length: `[0.5, 2.0] × average`.
    pub fn around_length(average: f64) -> Self {
        Self::with_edge_lengths(0.5 * average, 2.0 * average)
    }

    /// Remesh only on every n-th request.
    pub fn with_interval(mut self, interval: usize) -> Self {
        self.interval = interval.max(1);
        self
    }

    fn collapses(&self) -> bool {
        self.min_edge_length > 0.0
    }

    fn splits(&self) -> bool {
        self.max_edge_length > 0.0 && self.max_edge_length.is_finite()
    }
}

#[inline]
fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[inline]
fn midpoint(a: &Point3<f64>, b: &Point3<f64>) -> Point3<f64> {
    Point3::from((a.coords + b.coords) * 0.5)
}

/// Remesh `mesh` in place. Returns whether the topology changed.
///
/// Passive points (status 0) are never collapsed, but edges between them
/// may still be split.
pub fn remesh(mesh: &mut SurfaceMesh, options: &RemeshOptions) -> Result<bool> {
    let n = mesh.num_points();
    let mut points = mesh.points().to_vec();
    let mut faces = mesh.faces().to_vec();
    let mut sources: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    let collapsed = if options.collapses() {
        collapse_short_edges(mesh, options.min_edge_length, &mut points, &mut faces, &mut sources)
    } else {
        0
    };
    if collapsed > 0 {
        compact(&mut points, &mut faces, &mut sources);
    }

    let split = if options.splits() {
        split_long_edges(options.max_edge_length, &mut points, &mut faces, &mut sources)
    } else {
        0
    };

    if collapsed == 0 && split == 0 {
        return Ok(false);
    }

    log::debug!(
        "remesh: collapsed {} edge(s), split {} edge(s), {} -> {} points",
        collapsed,
        split,
        n,
        points.len()
    );
    mesh.replace_topology(points, faces, &sources)?;
    Ok(true)
}

/// Number of points adjacent to both `a` and `b`.
fn common_neighbors(mesh: &SurfaceMesh, a: usize, b: usize) -> Vec<usize> {
    let nb = mesh.neighbors(b);
    mesh.neighbors(a)
        .iter()
        .copied()
        .filter(|v| nb.binary_search(v).is_ok())
        .collect()
}

/// Whether moving `a` and `b` to `m` would flip or degenerate a surviving face.
fn flips_face(
    mesh: &SurfaceMesh,
    points: &[Point3<f64>],
    faces: &[[usize; 3]],
    a: usize,
    b: usize,
    m: &Point3<f64>,
) -> bool {
    for &f in mesh.point_faces(a).iter().chain(mesh.point_faces(b)) {
        let face = faces[f];
        if face.contains(&a) && face.contains(&b) {
            continue;
        }
        let p = face.map(|v| points[v]);
        let q = face.map(|v| if v == a || v == b { *m } else { points[v] });
        let before = (p[1] - p[0]).cross(&(p[2] - p[0]));
        let after = (q[1] - q[0]).cross(&(q[2] - q[0]));
        if after.norm_squared() < 1e-24 || before.dot(&after) <= 0.0 {
            return true;
        }
    }
    false
}

fn collapse_short_edges(
    mesh: &SurfaceMesh,
    min_length: f64,
    points: &mut [Point3<f64>],
    faces: &mut Vec<[usize; 3]>,
    sources: &mut [Vec<usize>],
) -> usize {
    let min_sq = min_length * min_length;
    let mut candidates: Vec<(f64, usize, usize)> = mesh
        .edges()
        .edges()
        .map(|(a, b)| ((points[b] - points[a]).norm_squared(), a, b))
        .filter(|&(len_sq, _, _)| len_sq < min_sq)
        .collect();
    candidates.sort_by(|x, y| x.0.total_cmp(&y.0));

    let mut locked = vec![false; points.len()];
    let mut removed = vec![false; faces.len()];
    let mut count = 0;

    for (_, a, b) in candidates {
        if locked[a] || locked[b] {
            continue;
        }
        if mesh.is_boundary_point(a) || mesh.is_boundary_point(b) {
            continue;
        }
        if !mesh.is_active(a) || !mesh.is_active(b) {
            continue;
        }
        let opposite = common_neighbors(mesh, a, b);
        if opposite.len() != 2 || opposite.iter().any(|&c| mesh.edges().degree(c) <= 3) {
            continue;
        }
        let m = midpoint(&points[a], &points[b]);
        if flips_face(mesh, points, faces, a, b, &m) {
            continue;
        }

        points[a] = m;
        for &f in mesh.point_faces(b) {
            let face = &mut faces[f];
            if face.contains(&a) {
                removed[f] = true;
            } else {
                for v in face.iter_mut().filter(|v| **v == b) {
                    *v = a;
                }
            }
        }
        let merged = std::mem::take(&mut sources[b]);
        sources[a].extend(merged);

        locked[a] = true;
        locked[b] = true;
        for &j in mesh.neighbors(a).iter().chain(mesh.neighbors(b)) {
            locked[j] = true;
        }
        count += 1;
    }

    if count > 0 {
        let mut f = 0;
        faces.retain(|_| {
            let keep = !removed[f];
            f += 1;
            keep
        });
    }
    count
}

/// Drop points that were merged away and renumber faces.
fn compact(points: &mut Vec<Point3<f64>>, faces: &mut [[usize; 3]], sources: &mut Vec<Vec<usize>>) {
    let mut remap = vec![usize::MAX; points.len()];
    let mut next = 0;
    for (i, s) in sources.iter().enumerate() {
        if !s.is_empty() {
            remap[i] = next;
            next += 1;
        }
    }

    let mut i = 0;
    points.retain(|_| {
        let keep = remap[i] != usize::MAX;
        i += 1;
        keep
    });
    sources.retain(|s| !s.is_empty());
    for face in faces.iter_mut() {
        for v in face.iter_mut() {
            *v = remap[*v];
        }
    }
}

fn split_long_edges(
    max_length: f64,
    points: &mut Vec<Point3<f64>>,
    faces: &mut Vec<[usize; 3]>,
    sources: &mut Vec<Vec<usize>>,
) -> usize {
    let max_sq = max_length * max_length;
    let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();

    for face in faces.iter() {
        for i in 0..3 {
            let a = face[i];
            let b = face[(i + 1) % 3];
            let key = edge_key(a, b);
            if midpoints.contains_key(&key) || (points[b] - points[a]).norm_squared() <= max_sq {
                continue;
            }
            points.push(midpoint(&points[a], &points[b]));
            let mut merged = sources[a].clone();
            merged.extend_from_slice(&sources[b]);
            sources.push(merged);
            midpoints.insert(key, points.len() - 1);
        }
    }

    if midpoints.is_empty() {
        return 0;
    }

    let rotate = |face: &[usize; 3], k: usize| [face[k], face[(k + 1) % 3], face[(k + 2) % 3]];
    let mut refined = Vec::with_capacity(faces.len() * 2);

    for face in faces.iter() {
        let mids: [Option<usize>; 3] =
            std::array::from_fn(|i| midpoints.get(&edge_key(face[i], face[(i + 1) % 3])).copied());

        match mids.iter().filter(|m| m.is_some()).count() {
            0 => refined.push(*face),
            1 => {
                let k = mids.iter().position(Option::is_some).unwrap_or(0);
                let v = rotate(face, k);
                let m = mids[k].unwrap_or(v[0]);
                refined.push([v[0], m, v[2]]);
                refined.push([m, v[1], v[2]]);
            }
            2 => {
                // Rotate so that the unsplit edge is the last one.
                let k = (mids.iter().position(Option::is_none).unwrap_or(0) + 1) % 3;
                let v = rotate(face, k);
                let m0 = mids[k].unwrap_or(v[0]);
                let m1 = mids[(k + 1) % 3].unwrap_or(v[1]);
                refined.push([m0, v[1], m1]);
                refined.push([v[0], m0, m1]);
                refined.push([v[0], m1, v[2]]);
            }
            _ => {
                let [m0, m1, m2] = mids.map(|m| m.unwrap_or(0));
                refined.push([face[0], m0, m2]);
                refined.push([face[1], m1, m0]);
                refined.push([face[2], m2, m1]);
                refined.push([m0, m1, m2]);
            }
        }
    }

    *faces = refined;
    midpoints.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::flat_grid;
    use crate::mesh::{ArrayKind, FieldSpec, STATUS};

    fn triangle() -> SurfaceMesh {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
        ];
        SurfaceMesh::from_triangles(points, vec![[0, 1, 2]]).unwrap()
    }

    #[test]
    fn test_noop_within_range() {
        let mut mesh = flat_grid(3);
        let before = mesh.topology_time();
        let options = RemeshOptions::with_edge_lengths(0.5, 2.0);
        assert!(!remesh(&mut mesh, &options).unwrap());
        assert_eq!(mesh.num_points(), 16);
        assert_eq!(mesh.topology_time(), before);
    }

    #[test]
    fn test_split_all_edges() {
        let mut mesh = triangle();
        let options = RemeshOptions::with_edge_lengths(0.0, 0.6);
        assert!(remesh(&mut mesh, &options).unwrap());
        assert_eq!(mesh.num_points(), 6);
        assert_eq!(mesh.num_faces(), 4);
        assert!((mesh.surface_area() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_split_one_edge() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(1.5, 1.0, 0.0),
        ];
        let mut mesh = SurfaceMesh::from_triangles(points, vec![[0, 1, 2]]).unwrap();
        let options = RemeshOptions::with_edge_lengths(0.0, 2.0);
        assert!(remesh(&mut mesh, &options).unwrap());
        assert_eq!(mesh.num_points(), 4);
        assert_eq!(mesh.num_faces(), 2);
        assert_eq!(*mesh.position(3), Point3::new(1.5, 0.0, 0.0));
        for f in 0..mesh.num_faces() {
            assert!(mesh.face_normal(f).z > 0.0, "face {} flipped", f);
        }
    }

    #[test]
    fn test_split_two_edges_keeps_orientation() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(4.0, 1.0, 0.0),
        ];
        let mut mesh = SurfaceMesh::from_triangles(points, vec![[0, 1, 2]]).unwrap();
        // only 0-1 (4.0) and 2-0 (~4.12) exceed the limit
        let options = RemeshOptions::with_edge_lengths(0.0, 3.0);
        assert!(remesh(&mut mesh, &options).unwrap());
        assert_eq!(mesh.num_points(), 5);
        assert_eq!(mesh.num_faces(), 3);
        assert!((mesh.surface_area() - 2.0).abs() < 1e-12);
        for f in 0..mesh.num_faces() {
            assert!(mesh.face_normal(f).z > 0.0, "face {} flipped", f);
        }
    }

    #[test]
    fn test_split_carries_point_data() {
        let mut mesh = triangle();
        mesh.ensure_status().unwrap();
        mesh.set_active(1, false);
        mesh.point_data_mut()
            .declare("", &FieldSpec::shared("Value"), 3)
            .unwrap();
        mesh.point_data_mut()
            .replace("Value", vec![0.0, 2.0, 4.0])
            .unwrap();

        let options = RemeshOptions::with_edge_lengths(0.0, 0.6);
        remesh(&mut mesh, &options).unwrap();

        let values = mesh.point_data().values("Value").unwrap();
        let status = mesh.point_data().get(STATUS).unwrap();
        assert_eq!(status.kind(), ArrayKind::Flag);
        assert_eq!(values.len(), 6);
        // midpoints are appended in face edge order: (0,1), (1,2), (2,0)
        assert_eq!(&values[3..], &[1.0, 3.0, 2.0]);
        assert_eq!(&status.values()[3..], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_collapse_short_interior_edge() {
        let mut mesh = flat_grid(4);
        mesh.set_position(12, Point3::new(2.9, 2.0, 0.0));

        let options = RemeshOptions::with_edge_lengths(0.3, f64::INFINITY);
        assert!(remesh(&mut mesh, &options).unwrap());
        assert_eq!(mesh.num_points(), 24);
        assert_eq!(mesh.num_faces(), 30);
        assert!((mesh.surface_area() - 16.0).abs() < 1e-9);
        for f in 0..mesh.num_faces() {
            assert!(mesh.face_normal(f).z > 0.0, "face {} flipped", f);
        }
    }

    #[test]
    fn test_passive_points_are_not_collapsed() {
        let mut mesh = flat_grid(4);
        mesh.set_position(12, Point3::new(2.9, 2.0, 0.0));
        mesh.set_active(12, false);

        let options = RemeshOptions::with_edge_lengths(0.3, f64::INFINITY);
        assert!(!remesh(&mut mesh, &options).unwrap());
        assert_eq!(mesh.num_points(), 25);
    }
}
