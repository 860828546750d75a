//! Triangle surface mesh with cached normals and point data.

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use super::edges::EdgeTable;
use super::point_data::{ArrayKind, ModifiedTime, PointDataArray, PointDataStore};
use crate::error::{Result, SculptError};

/// Name of the point-data array marking points as active (1) or passive (0).
pub const STATUS: &str = "Status";

/// A triangle surface mesh.
///
/// Besides positions and faces the mesh keeps the derived state that
/// deformation needs on every iteration: point adjacency, boundary flags,
/// vertex normals and a store of named per-point arrays. Geometry and
/// topology edits draw a new [`ModifiedTime`], which is how cached arrays
/// decide whether they are stale.
#[derive(Debug, Clone)]
pub struct SurfaceMesh {
    points: Vec<Point3<f64>>,
    faces: Vec<[usize; 3]>,
    edges: EdgeTable,
    point_faces: Vec<Vec<usize>>,
    boundary: Vec<bool>,
    normals: Vec<Vector3<f64>>,
    normals_mtime: ModifiedTime,
    point_data: PointDataStore,
    geometry_mtime: ModifiedTime,
    topology_mtime: ModifiedTime,
}

impl Default for SurfaceMesh {
    fn default() -> Self {
        Self::new()
    }
}

struct Connectivity {
    edges: EdgeTable,
    point_faces: Vec<Vec<usize>>,
    boundary: Vec<bool>,
}

fn build_connectivity(num_points: usize, faces: &[[usize; 3]]) -> Result<Connectivity> {
    for (fi, face) in faces.iter().enumerate() {
        for &vi in face {
            if vi >= num_points {
                return Err(SculptError::InvalidVertexIndex {
                    face: fi,
                    point: vi,
                });
            }
        }
        if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
            return Err(SculptError::DegenerateFace { face: fi });
        }
    }

    let mut edge_faces: HashMap<(usize, usize), usize> = HashMap::new();
    let mut point_faces = vec![Vec::new(); num_points];
    for (fi, face) in faces.iter().enumerate() {
        for i in 0..3 {
            let a = face[i];
            let b = face[(i + 1) % 3];
            let key = if a < b { (a, b) } else { (b, a) };
            let count = edge_faces.entry(key).or_insert(0);
            *count += 1;
            if *count > 2 {
                return Err(SculptError::NonManifoldEdge {
                    p0: key.0,
                    p1: key.1,
                });
            }
            point_faces[a].push(fi);
        }
    }

    let mut boundary = vec![false; num_points];
    for (&(a, b), &count) in &edge_faces {
        if count == 1 {
            boundary[a] = true;
            boundary[b] = true;
        }
    }

    Ok(Connectivity {
        edges: EdgeTable::from_faces(faces, num_points),
        point_faces,
        boundary,
    })
}

impl SurfaceMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        let now = ModifiedTime::now();
        Self {
            points: Vec::new(),
            faces: Vec::new(),
            edges: EdgeTable::default(),
            point_faces: Vec::new(),
            boundary: Vec::new(),
            normals: Vec::new(),
            normals_mtime: ModifiedTime::default(),
            point_data: PointDataStore::new(),
            geometry_mtime: now,
            topology_mtime: now,
        }
    }

    /// Build a mesh from points and counter-clockwise triangles.
    ///
    /// # Example
    /// ```
    /// use sculpt::mesh::SurfaceMesh;
    /// use nalgebra::Point3;
    ///
    /// let points = vec![
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(1.0, 0.0, 0.0),
    ///     Point3::new(0.5, 1.0, 0.0),
    /// ];
    /// let mesh = SurfaceMesh::from_triangles(points, vec![[0, 1, 2]]).unwrap();
    /// assert_eq!(mesh.num_points(), 3);
    /// assert_eq!(mesh.num_edges(), 3);
    /// ```
    pub fn from_triangles(points: Vec<Point3<f64>>, faces: Vec<[usize; 3]>) -> Result<Self> {
        let conn = build_connectivity(points.len(), &faces)?;
        let now = ModifiedTime::now();
        Ok(Self {
            points,
            faces,
            edges: conn.edges,
            point_faces: conn.point_faces,
            boundary: conn.boundary,
            normals: Vec::new(),
            normals_mtime: ModifiedTime::default(),
            point_data: PointDataStore::new(),
            geometry_mtime: now,
            topology_mtime: now,
        })
    }

    /// Swap in a new point set and triangulation.
    ///
    /// `sources[i]` lists the old points new point `i` was derived from and
    /// is used to carry every point-data array over.
    pub(crate) fn replace_topology(
        &mut self,
        points: Vec<Point3<f64>>,
        faces: Vec<[usize; 3]>,
        sources: &[Vec<usize>],
    ) -> Result<()> {
        debug_assert_eq!(points.len(), sources.len());
        let conn = build_connectivity(points.len(), &faces)?;
        self.points = points;
        self.faces = faces;
        self.edges = conn.edges;
        self.point_faces = conn.point_faces;
        self.boundary = conn.boundary;
        self.normals.clear();
        self.point_data.remap(sources);
        let now = ModifiedTime::now();
        self.geometry_mtime = now;
        self.topology_mtime = now;
        Ok(())
    }

    // ==================== Counts ====================

    /// Number of points.
    #[inline]
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Number of undirected edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edges.num_edges()
    }

    // ==================== Geometry ====================

    /// Position of point `i`.
    #[inline]
    pub fn position(&self, i: usize) -> &Point3<f64> {
        &self.points[i]
    }

    /// All point positions.
    #[inline]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Move point `i` to `p`.
    pub fn set_position(&mut self, i: usize, p: Point3<f64>) {
        self.points[i] = p;
        self.modified();
    }

    /// Translate point `i` by `d`.
    pub fn displace(&mut self, i: usize, d: &Vector3<f64>) {
        self.points[i] += d;
        self.modified();
    }

    /// Translate many points at once; `dx` holds one 3-vector per point.
    ///
    /// Points whose entry is `None` stay put. The geometry is stamped once.
    pub(crate) fn displace_all(&mut self, dx: &[Option<Vector3<f64>>]) {
        let mut moved = false;
        for (p, d) in self.points.iter_mut().zip(dx) {
            if let Some(d) = d {
                *p += d;
                moved = true;
            }
        }
        if moved {
            self.modified();
        }
    }

    /// Mark the geometry as modified.
    pub fn modified(&mut self) {
        self.geometry_mtime = ModifiedTime::now();
    }

    /// Time of the last geometry change.
    #[inline]
    pub fn geometry_time(&self) -> ModifiedTime {
        self.geometry_mtime
    }

    /// Time of the last topology change.
    #[inline]
    pub fn topology_time(&self) -> ModifiedTime {
        self.topology_mtime
    }

    // ==================== Topology ====================

    /// All triangles.
    #[inline]
    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    /// Point adjacency.
    #[inline]
    pub fn edges(&self) -> &EdgeTable {
        &self.edges
    }

    /// Neighbor ids of point `i`.
    #[inline]
    pub fn neighbors(&self, i: usize) -> &[usize] {
        self.edges.adjacent_points(i)
    }

    /// Ids of the triangles incident to point `i`.
    #[inline]
    pub fn point_faces(&self, i: usize) -> &[usize] {
        &self.point_faces[i]
    }

    /// Whether point `i` lies on a boundary edge.
    #[inline]
    pub fn is_boundary_point(&self, i: usize) -> bool {
        self.boundary[i]
    }

    /// Positions of the corners of triangle `f`.
    #[inline]
    pub fn face_positions(&self, f: usize) -> [Point3<f64>; 3] {
        let [a, b, c] = self.faces[f];
        [self.points[a], self.points[b], self.points[c]]
    }

    /// Unit normal of triangle `f` (zero for a degenerate triangle).
    pub fn face_normal(&self, f: usize) -> Vector3<f64> {
        let [p0, p1, p2] = self.face_positions(f);
        (p1 - p0)
            .cross(&(p2 - p0))
            .try_normalize(0.0)
            .unwrap_or_else(Vector3::zeros)
    }

    /// Area of triangle `f`.
    pub fn face_area(&self, f: usize) -> f64 {
        let [p0, p1, p2] = self.face_positions(f);
        0.5 * (p1 - p0).cross(&(p2 - p0)).norm()
    }

    /// Total surface area.
    pub fn surface_area(&self) -> f64 {
        (0..self.faces.len()).map(|f| self.face_area(f)).sum()
    }

    /// Mean length of all edges, or zero for a mesh without edges.
    pub fn average_edge_length(&self) -> f64 {
        let n = self.edges.num_edges();
        if n == 0 {
            return 0.0;
        }
        let total: f64 = self
            .edges
            .edges()
            .map(|(a, b)| (self.points[b] - self.points[a]).norm())
            .sum();
        total / n as f64
    }

    // ==================== Normals ====================

    /// Cached vertex normals; empty until [`update_normals`](Self::update_normals) ran.
    #[inline]
    pub fn normals(&self) -> &[Vector3<f64>] {
        &self.normals
    }

    /// Whether the cached normals match the current geometry.
    pub fn has_current_normals(&self) -> bool {
        self.normals.len() == self.points.len() && self.normals_mtime >= self.geometry_mtime
    }

    /// Recompute area-weighted vertex normals if the geometry changed since
    /// they were last computed. Returns whether they were recomputed.
    pub fn update_normals(&mut self) -> bool {
        if self.has_current_normals() {
            return false;
        }
        let normals: Vec<Vector3<f64>> = (0..self.points.len())
            .into_par_iter()
            .map(|i| {
                let mut n = Vector3::zeros();
                for &f in &self.point_faces[i] {
                    let [p0, p1, p2] = self.face_positions(f);
                    n += (p1 - p0).cross(&(p2 - p0));
                }
                n.try_normalize(0.0).unwrap_or_else(Vector3::zeros)
            })
            .collect();
        self.normals = normals;
        self.normals_mtime = ModifiedTime::now();
        true
    }

    // ==================== Point data ====================

    /// Named per-point arrays.
    #[inline]
    pub fn point_data(&self) -> &PointDataStore {
        &self.point_data
    }

    /// Named per-point arrays, mutable.
    #[inline]
    pub fn point_data_mut(&mut self) -> &mut PointDataStore {
        &mut self.point_data
    }

    /// The status mask, if present with one value per point.
    pub fn status(&self) -> Option<&[f64]> {
        self.point_data
            .values(STATUS)
            .filter(|s| s.len() == self.points.len())
    }

    /// Add an all-active status mask unless one exists.
    ///
    /// Fails with [`SculptError::FieldLength`] if an existing mask does not
    /// hold one value per point.
    pub fn ensure_status(&mut self) -> Result<()> {
        let n = self.points.len();
        match self.point_data.get(STATUS) {
            Some(status) if status.values().len() != n => Err(SculptError::FieldLength {
                name: STATUS.to_string(),
                expected: n,
                actual: status.values().len(),
            }),
            Some(_) => Ok(()),
            None => self
                .point_data
                .add(PointDataArray::new(STATUS, 1, ArrayKind::Flag, n, 1.0), n),
        }
    }

    /// Whether point `i` may move. Points are active without a status mask.
    #[inline]
    pub fn is_active(&self, i: usize) -> bool {
        self.status().map_or(true, |s| s[i] != 0.0)
    }

    /// Set the status of point `i`, creating the mask if needed.
    ///
    /// Does nothing if an existing mask has the wrong length.
    pub fn set_active(&mut self, i: usize, active: bool) {
        if self.ensure_status().is_err() {
            log::warn!("status mask does not match {} points, ignored", self.points.len());
            return;
        }
        if let Some(v) = self
            .point_data
            .get_mut(STATUS)
            .and_then(|s| s.values_mut().get_mut(i))
        {
            *v = if active { 1.0 } else { 0.0 };
        }
    }

    /// Number of active points.
    pub fn num_active_points(&self) -> usize {
        match self.status() {
            Some(s) => s.iter().filter(|&&v| v != 0.0).count(),
            None => self.points.len(),
        }
    }
}
