//! Pairwise distances between segment points in scaled (coverage, MAF) space
//!

use itertools::{Itertools, MinMaxResult};

/// Map the indices of two different points to the offset of their distance in the packed lower
/// triangle of the distance matrix
///
/// All indices are 0-based. The argument order does not matter.
///
pub fn distance_index(point_count: usize, i: usize, j: usize) -> usize {
    assert_ne!(i, j, "Distance index requested for a point paired with itself");
    let (i, j) = if i > j { (j, i) } else { (i, j) };
    assert!(j < point_count);
    point_count * i + j - (i + 2) * (i + 1) / 2
}

/// A point projected into the clustering plane, with coverage already scaled to be commensurable
/// with MAF
///
#[derive(Clone, Copy, Debug)]
pub struct PlanePoint {
    pub scaled_coverage: f64,
    pub maf: Option<f64>,
}

fn get_euclidean_distance(p1: &PlanePoint, p2: &PlanePoint) -> Option<f64> {
    let maf_diff = p1.maf? - p2.maf?;
    let coverage_diff = p1.scaled_coverage - p2.scaled_coverage;
    Some((coverage_diff * coverage_diff + maf_diff * maf_diff).sqrt())
}

/// Strict lower triangle of the pairwise distance matrix, packed into a vector
///
/// Distances involving a point with unknown MAF are stored as None.
///
#[derive(Clone, Debug, Default)]
pub struct DistanceMatrix {
    point_count: usize,
    distances: Vec<Option<f64>>,
}

impl DistanceMatrix {
    /// Compute all pairwise distances
    ///
    /// An empty matrix is returned if fewer than 2 points have known MAF.
    ///
    pub fn build(points: &[PlanePoint]) -> Self {
        let known_maf_count = points.iter().filter(|x| x.maf.is_some()).count();
        if known_maf_count < 2 {
            return Self::default();
        }

        let point_count = points.len();
        let mut distances = Vec::with_capacity(point_count * (point_count - 1) / 2);
        for (i, p1) in points.iter().enumerate() {
            for p2 in points.iter().skip(i + 1) {
                distances.push(get_euclidean_distance(p1, p2));
            }
        }
        Self {
            point_count,
            distances,
        }
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    /// Distance between points i and j, or None if either point has unknown MAF
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.distances[distance_index(self.point_count, i, j)]
    }

    /// Iterate over all defined distances
    pub fn known_distances(&self) -> impl Iterator<Item = f64> + '_ {
        self.distances.iter().flatten().copied()
    }

    /// Return the (min, max) of all strictly positive distances
    pub fn positive_distance_range(&self) -> Option<(f64, f64)> {
        match self.known_distances().filter(|&x| x > 0.0).minmax_by(f64::total_cmp) {
            MinMaxResult::NoElements => None,
            MinMaxResult::OneElement(x) => Some((x, x)),
            MinMaxResult::MinMax(min, max) => Some((min, max)),
        }
    }

    /// Maximum defined distance between point i and any other point
    pub fn max_distance_from(&self, i: usize) -> Option<f64> {
        (0..self.point_count)
            .filter(|&j| j != i)
            .filter_map(|j| self.get(i, j))
            .max_by(f64::total_cmp)
    }
}
