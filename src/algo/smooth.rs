//! Neighbor-average smoothing of per-point fields.
//!
//! Curvature estimates on a triangle mesh are noisy; a couple of passes of
//! umbrella averaging over the one-ring make them usable as force weights.
//!
//! # Example
//!
//! ```
//! use sculpt::algo::smooth::smooth_scalars;
//! use sculpt::mesh::EdgeTable;
//!
//! // A path 0 - 1 - 2 with a spike in the middle
//! let edges = EdgeTable::from_edges(&[(0, 1), (1, 2)], 3);
//! let smoothed = smooth_scalars(&edges, &[0.0, 3.0, 0.0], 1);
//! assert_eq!(smoothed, vec![3.0, 0.0, 3.0]);
//! ```

use rayon::prelude::*;

use crate::mesh::EdgeTable;

/// Replace every value by the mean of its neighbors' values, `iterations` times.
///
/// Points without neighbors keep their value. Runs in parallel over points.
pub fn smooth_scalars(edges: &EdgeTable, values: &[f64], iterations: usize) -> Vec<f64> {
    smooth_array(edges, values, 1, iterations)
}

/// Neighbor-average smoothing of an array with `components` values per point.
pub fn smooth_array(
    edges: &EdgeTable,
    values: &[f64],
    components: usize,
    iterations: usize,
) -> Vec<f64> {
    debug_assert_eq!(values.len(), edges.num_points() * components);

    let mut current = values.to_vec();
    if components == 0 {
        return current;
    }

    for _ in 0..iterations {
        let mut next = vec![0.0; current.len()];
        next.par_chunks_mut(components)
            .enumerate()
            .for_each(|(i, out)| {
                let adjacent = edges.adjacent_points(i);
                if adjacent.is_empty() {
                    out.copy_from_slice(&current[i * components..(i + 1) * components]);
                    return;
                }
                for &j in adjacent {
                    for (k, o) in out.iter_mut().enumerate() {
                        *o += current[j * components + k];
                    }
                }
                let inv = 1.0 / adjacent.len() as f64;
                for o in out.iter_mut() {
                    *o *= inv;
                }
            });
        current = next;
    }

    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::flat_grid;

    #[test]
    fn test_zero_iterations_is_identity() {
        let edges = EdgeTable::from_edges(&[(0, 1)], 2);
        assert_eq!(smooth_scalars(&edges, &[1.0, 2.0], 0), vec![1.0, 2.0]);
    }

    #[test]
    fn test_constant_field_is_preserved() {
        let mesh = flat_grid(3);
        let values = vec![0.7; mesh.num_points()];
        let smoothed = smooth_scalars(mesh.edges(), &values, 2);
        for v in smoothed {
            assert!((v - 0.7).abs() < 1e-12);
        }
    }

    #[test]
    fn test_isolated_point_keeps_value() {
        let edges = EdgeTable::from_edges(&[(0, 1)], 3);
        let smoothed = smooth_scalars(&edges, &[1.0, 3.0, 5.0], 2);
        assert_eq!(smoothed[2], 5.0);
        assert_eq!(smoothed[0], 1.0);
        assert_eq!(smoothed[1], 3.0);
    }

    #[test]
    fn test_spike_spreads() {
        let mesh = flat_grid(4);
        let mut values = vec![0.0; mesh.num_points()];
        values[12] = 1.0; // center of the 5x5 grid
        let smoothed = smooth_scalars(mesh.edges(), &values, 1);

        assert_eq!(smoothed[12], 0.0);
        for &j in mesh.neighbors(12) {
            assert!(smoothed[j] > 0.0);
        }
    }

    #[test]
    fn test_vector_components() {
        let edges = EdgeTable::from_edges(&[(0, 1)], 2);
        let smoothed = smooth_array(&edges, &[1.0, 2.0, 3.0, 4.0], 2, 1);
        assert_eq!(smoothed, vec![3.0, 4.0, 1.0, 2.0]);
    }
}
