//! Point adjacency derived from a triangle list.

/// Compressed point adjacency of a triangle mesh.
///
/// Neighbors of each point are stored sorted and without duplicates in one
/// contiguous buffer, so a lookup is a slice borrow.
#[derive(Debug, Clone, Default)]
pub struct EdgeTable {
    offsets: Vec<usize>,
    neighbors: Vec<usize>,
}

impl EdgeTable {
    /// Build the table for `num_points` points from triangle faces.
    ///
    /// Face indices must be in range.
    pub fn from_faces(faces: &[[usize; 3]], num_points: usize) -> Self {
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); num_points];
        for face in faces {
            for i in 0..3 {
                let a = face[i];
                let b = face[(i + 1) % 3];
                adjacency[a].push(b);
                adjacency[b].push(a);
            }
        }
        Self::from_adjacency(adjacency)
    }

    /// Build the table from explicit undirected edges.
    pub fn from_edges(edges: &[(usize, usize)], num_points: usize) -> Self {
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); num_points];
        for &(a, b) in edges {
            if a != b {
                adjacency[a].push(b);
                adjacency[b].push(a);
            }
        }
        Self::from_adjacency(adjacency)
    }

    fn from_adjacency(mut adjacency: Vec<Vec<usize>>) -> Self {
        let mut offsets = Vec::with_capacity(adjacency.len() + 1);
        let mut neighbors = Vec::new();
        offsets.push(0);
        for list in &mut adjacency {
            list.sort_unstable();
            list.dedup();
            neighbors.extend_from_slice(list);
            offsets.push(neighbors.len());
        }
        Self { offsets, neighbors }
    }

    /// Number of points covered by the table.
    #[inline]
    pub fn num_points(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Number of undirected edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.neighbors.len() / 2
    }

    /// Sorted neighbor ids of point `i`.
    #[inline]
    pub fn adjacent_points(&self, i: usize) -> &[usize] {
        &self.neighbors[self.offsets[i]..self.offsets[i + 1]]
    }

    /// Number of neighbors of point `i`.
    #[inline]
    pub fn degree(&self, i: usize) -> usize {
        self.offsets[i + 1] - self.offsets[i]
    }

    /// Whether `a` and `b` are connected.
    pub fn is_edge(&self, a: usize, b: usize) -> bool {
        self.adjacent_points(a).binary_search(&b).is_ok()
    }

    /// Iterate over undirected edges `(a, b)` with `a < b`.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.num_points()).flat_map(move |a| {
            self.adjacent_points(a)
                .iter()
                .filter(move |&&b| b > a)
                .map(move |&b| (a, b))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_triangles() {
        let faces = vec![[0, 1, 2], [0, 2, 3]];
        let table = EdgeTable::from_faces(&faces, 4);

        assert_eq!(table.num_points(), 4);
        assert_eq!(table.num_edges(), 5);
        assert_eq!(table.adjacent_points(0), &[1, 2, 3]);
        assert_eq!(table.adjacent_points(1), &[0, 2]);
        assert_eq!(table.degree(2), 3);
        assert!(table.is_edge(0, 2));
        assert!(!table.is_edge(1, 3));

        let edges: Vec<_> = table.edges().collect();
        assert_eq!(edges, vec![(0, 1), (0, 2), (0, 3), (1, 2), (2, 3)]);
    }

    #[test]
    fn test_isolated_point() {
        let table = EdgeTable::from_edges(&[(0, 1)], 3);
        assert_eq!(table.adjacent_points(2), &[] as &[usize]);
        assert_eq!(table.num_edges(), 1);
    }

    #[test]
    fn test_empty() {
        let table = EdgeTable::from_faces(&[], 0);
        assert_eq!(table.num_points(), 0);
        assert_eq!(table.edges().count(), 0);
    }
}
