use log::warn;
use serde::{Deserialize, Serialize};

use crate::distance_matrix::DistanceMatrix;

pub const DEFAULT_NEIGHBOR_RATE_LOW: f64 = 0.02;
pub const DEFAULT_NEIGHBOR_RATE_HIGH: f64 = 0.03;

/// Upper bound on bisection steps in the distance threshold search
///
/// Bisection over f64 stalls after at most about 1,100 steps, so in practice the search ends on the
/// target band or on a stall well before this bound.
///
pub const MAX_BANDWIDTH_SEARCH_ITERATIONS: usize = 100_000;

/// Result of the density kernel bandwidth search
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BandwidthEstimate {
    pub distance_threshold: f64,

    /// Number of bisection steps taken
    pub iterations: usize,

    /// False if the search stopped before the neighbor rate entered the target band, in which case
    /// the last threshold tested is reported
    pub converged: bool,
}

/// Average fraction of points found within `distance_threshold` of each point
///
/// The self-pair of each point is counted once the threshold is positive.
///
fn get_neighbor_rate(distances: &DistanceMatrix, distance_threshold: f64) -> f64 {
    let point_count = distances.point_count() as f64;
    let mut neighbor_count = distances
        .known_distances()
        .filter(|&x| x < distance_threshold)
        .count() as f64;
    if distance_threshold > 0.0 {
        neighbor_count += point_count;
    }
    (neighbor_count * 2.0 / point_count - 1.0) / point_count
}

/// Find the distance threshold used as the density kernel bandwidth
///
/// Bisection over the range of positive pairwise distances, until the neighbor rate falls within
/// `[neighbor_rate_low, neighbor_rate_high]`. The search also stops when the bisection can no
/// longer move the threshold, or after `MAX_BANDWIDTH_SEARCH_ITERATIONS` steps.
///
/// Returns None if the distance matrix is empty or contains no positive distances.
///
pub fn estimate_distance_threshold(
    distances: &DistanceMatrix,
    neighbor_rate_low: f64,
    neighbor_rate_high: f64,
) -> Option<BandwidthEstimate> {
    search_distance_threshold(
        distances,
        neighbor_rate_low,
        neighbor_rate_high,
        MAX_BANDWIDTH_SEARCH_ITERATIONS,
    )
}

fn search_distance_threshold(
    distances: &DistanceMatrix,
    neighbor_rate_low: f64,
    neighbor_rate_high: f64,
    max_iterations: usize,
) -> Option<BandwidthEstimate> {
    let (mut low, mut high) = distances.positive_distance_range()?;

    let mut distance_threshold = f64::NAN;
    for iteration in 0..max_iterations {
        let last_threshold = distance_threshold;
        distance_threshold = (low + high) / 2.0;

        let neighbor_rate = get_neighbor_rate(distances, distance_threshold);
        if neighbor_rate >= neighbor_rate_low && neighbor_rate <= neighbor_rate_high {
            return Some(BandwidthEstimate {
                distance_threshold,
                iterations: iteration + 1,
                converged: true,
            });
        }

        if distance_threshold == last_threshold {
            warn!(
                "Distance threshold search stalled at {distance_threshold} with neighbor rate {neighbor_rate:.4}, outside of target range [{neighbor_rate_low}, {neighbor_rate_high}]"
            );
            return Some(BandwidthEstimate {
                distance_threshold,
                iterations: iteration + 1,
                converged: false,
            });
        }

        if neighbor_rate < neighbor_rate_low {
            low = distance_threshold;
        } else {
            high = distance_threshold;
        }
    }

    warn!(
        "Distance threshold search did not converge after {max_iterations} iterations, using last threshold {distance_threshold}"
    );
    Some(BandwidthEstimate {
        distance_threshold,
        iterations: max_iterations,
        converged: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance_matrix::PlanePoint;

    fn get_grid_distances(side: usize) -> DistanceMatrix {
        let mut points = Vec::new();
        for x in 0..side {
            for y in 0..side {
                points.push(PlanePoint {
                    scaled_coverage: x as f64 * 0.01,
                    maf: Some(y as f64 * 0.01),
                });
            }
        }
        DistanceMatrix::build(&points)
    }

    #[test]
    fn test_neighbor_rate() {
        let points = vec![
            PlanePoint {
                scaled_coverage: 0.0,
                maf: Some(0.1),
            };
            4
        ];
        let distances = DistanceMatrix::build(&points);

        // Every point is a neighbor of every point, including itself
        approx::assert_ulps_eq!(get_neighbor_rate(&distances, 1.0), 1.0, max_ulps = 4);

        // No neighbors and no self-count at a zero threshold
        approx::assert_ulps_eq!(get_neighbor_rate(&distances, 0.0), -0.25, max_ulps = 4);
    }

    #[test]
    fn test_estimate_converges_within_band() {
        let distances = get_grid_distances(15);
        let estimate = estimate_distance_threshold(
            &distances,
            DEFAULT_NEIGHBOR_RATE_LOW,
            DEFAULT_NEIGHBOR_RATE_HIGH,
        )
        .unwrap();
        assert!(estimate.converged);
        assert!(estimate.distance_threshold > 0.0);

        let neighbor_rate = get_neighbor_rate(&distances, estimate.distance_threshold);
        assert!(neighbor_rate >= DEFAULT_NEIGHBOR_RATE_LOW);
        assert!(neighbor_rate <= DEFAULT_NEIGHBOR_RATE_HIGH);
    }

    #[test]
    fn test_estimate_identical_points() {
        let points = vec![
            PlanePoint {
                scaled_coverage: 0.3,
                maf: Some(0.5),
            };
            10
        ];
        let distances = DistanceMatrix::build(&points);
        assert_eq!(
            estimate_distance_threshold(
                &distances,
                DEFAULT_NEIGHBOR_RATE_LOW,
                DEFAULT_NEIGHBOR_RATE_HIGH
            ),
            None
        );
    }

    #[test]
    fn test_estimate_unreachable_band_is_bounded() {
        // With three points, the neighbor rate can never reach the default band
        let points = vec![
            PlanePoint {
                scaled_coverage: 30.0,
                maf: Some(0.5),
            },
            PlanePoint {
                scaled_coverage: 30.0,
                maf: Some(0.5),
            },
            PlanePoint {
                scaled_coverage: 60.0,
                maf: Some(0.1),
            },
        ];
        let distances = DistanceMatrix::build(&points);
        let estimate = estimate_distance_threshold(
            &distances,
            DEFAULT_NEIGHBOR_RATE_LOW,
            DEFAULT_NEIGHBOR_RATE_HIGH,
        )
        .unwrap();
        assert!(!estimate.converged);
        assert!(estimate.iterations <= MAX_BANDWIDTH_SEARCH_ITERATIONS);
        approx::assert_ulps_eq!(
            estimate.distance_threshold,
            distances.get(0, 2).unwrap(),
            max_ulps = 4
        );
    }

    #[test]
    fn test_estimate_inverted_band_is_bounded() {
        let distances = get_grid_distances(6);
        let estimate = estimate_distance_threshold(&distances, 0.5, 0.1).unwrap();
        assert!(!estimate.converged);
        assert!(estimate.distance_threshold.is_finite());
    }

    #[test]
    fn test_search_stops_at_iteration_cap() {
        let distances = get_grid_distances(6);
        let (low, high) = distances.positive_distance_range().unwrap();

        // The band is unreachable, so bisection keeps raising the threshold until the cap
        let estimate = search_distance_threshold(&distances, 2.0, 3.0, 3).unwrap();
        assert!(!estimate.converged);
        assert_eq!(estimate.iterations, 3);
        assert!(estimate.distance_threshold > low);
        assert!(estimate.distance_threshold < high);
    }
}
