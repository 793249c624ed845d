//! Density-peak clustering of genome segments
//!
//! This implements the clustering method introduced in:
//!
//! Rodriguez, Alex, and Alessandro Laio. "Clustering by fast search and find of density peaks."
//! Science 344.6191 (2014): 1492-1496.
//!
//! Given pairwise distances `d[i,j]` and a distance threshold (kernel bandwidth), every point gets:
//! - `rho[i]` - the local density around point i
//! - `delta[i]` - the distance from point i to the closest point of higher density
//!
//! Points with both high `rho` and high `delta` are cluster centroids. All other points inherit the
//! cluster of their nearest higher density neighbor.
//!

mod bandwidth;

use log::{debug, info};
use serde::{Deserialize, Serialize};

pub use self::bandwidth::{
    BandwidthEstimate, DEFAULT_NEIGHBOR_RATE_HIGH, DEFAULT_NEIGHBOR_RATE_LOW,
};
use self::bandwidth::estimate_distance_threshold;
use crate::distance_matrix::{DistanceMatrix, PlanePoint};
use crate::log_utils::debug_msg;
use crate::segment_point::{ClusterId, SegmentPoint};

pub const DEFAULT_RHO_CUTOFF: f64 = 2.0;
pub const DEFAULT_CENTROID_CUTOFF: f64 = 0.03;

/// Kernel used to accumulate local density from pairwise distances
///
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, clap::ValueEnum, strum::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum DensityKernel {
    /// Sum of exp(-(d/dc)^2) over all other points
    #[default]
    Gaussian,

    /// Count of other points with d < dc
    Cutoff,
}

/// All tunable parameters of the density-peak clustering step
///
#[derive(Clone, Debug)]
pub struct DensityClusteringParams {
    /// Coverage is multiplied by this factor so that coverage and MAF differences are commensurable
    pub coverage_weighting_factor: f64,

    /// Target band of the neighbor rate used to find the kernel bandwidth
    pub neighbor_rate_low: f64,
    pub neighbor_rate_high: f64,

    /// Minimum local density of a centroid
    pub rho_cutoff: f64,

    /// Minimum distance from a centroid to any point of higher density
    pub centroid_cutoff: f64,

    /// Points with a nearest-neighbour distance above this value are marked as outliers
    pub knn_cutoff: f64,

    pub density_kernel: DensityKernel,
}

impl Default for DensityClusteringParams {
    fn default() -> Self {
        Self {
            coverage_weighting_factor: 1.0,
            neighbor_rate_low: DEFAULT_NEIGHBOR_RATE_LOW,
            neighbor_rate_high: DEFAULT_NEIGHBOR_RATE_HIGH,
            rho_cutoff: DEFAULT_RHO_CUTOFF,
            centroid_cutoff: DEFAULT_CENTROID_CUTOFF,
            knn_cutoff: f64::INFINITY,
            density_kernel: DensityKernel::Gaussian,
        }
    }
}

/// Location of one cluster centroid, with coverage in input units
///
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct ClusterCentroid {
    pub maf: f64,
    pub coverage: f64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DensityClusteringResult {
    pub cluster_count: usize,

    /// Cluster centroids, the centroid of `ClusterId::Cluster(n)` is found at index n-1
    pub centroids: Vec<ClusterCentroid>,

    /// None if there were too few informative points, or no spread among them, to estimate a
    /// kernel bandwidth
    pub bandwidth: Option<BandwidthEstimate>,
}

/// Local density of each point
///
fn get_local_density(
    distances: &DistanceMatrix,
    distance_threshold: f64,
    kernel: DensityKernel,
) -> Vec<f64> {
    let point_count = distances.point_count();
    let mut rho = vec![0.0; point_count];
    for i in 0..point_count {
        for j in (i + 1)..point_count {
            let distance = match distances.get(i, j) {
                Some(x) => x,
                None => continue,
            };
            let contribution = match kernel {
                DensityKernel::Gaussian => {
                    let scaled = distance / distance_threshold;
                    (-(scaled * scaled)).exp()
                }
                DensityKernel::Cutoff => {
                    if distance < distance_threshold {
                        1.0
                    } else {
                        0.0
                    }
                }
            };
            rho[i] += contribution;
            rho[j] += contribution;
        }
    }
    rho
}

/// Index of the first point with maximum density
fn get_max_density_index(rho: &[f64]) -> usize {
    let mut max_index = 0;
    for (index, &value) in rho.iter().enumerate().skip(1) {
        if value > rho[max_index] {
            max_index = index;
        }
    }
    max_index
}

/// Distance from each point to its nearest point of higher density
///
/// Among points of equal density, the point with the higher index is treated as the lower density
/// point, so that ties resolve deterministically toward lower indices.
///
/// The highest density point is assigned its maximum distance to any other point.
///
/// Returns a 2-tuple of (delta, nearest_higher_density_index) for every point. The nearest higher
/// density index is None only for the highest density point.
///
fn get_delta(distances: &DistanceMatrix, rho: &[f64]) -> (Vec<f64>, Vec<Option<usize>>) {
    let point_count = distances.point_count();
    let mut delta = vec![f64::MAX; point_count];
    let mut nearest_higher_rho = vec![None; point_count];

    let max_density_index = get_max_density_index(rho);
    delta[max_density_index] = distances
        .max_distance_from(max_density_index)
        .unwrap_or(0.0);

    for i in 0..point_count {
        for j in (i + 1)..point_count {
            let distance = match distances.get(i, j) {
                Some(x) => x,
                None => continue,
            };
            let (lower_rho_index, higher_rho_index) = if rho[i] < rho[j] { (i, j) } else { (j, i) };
            if distance >= delta[lower_rho_index] {
                continue;
            }
            delta[lower_rho_index] = distance;
            nearest_higher_rho[lower_rho_index] = Some(higher_rho_index);
        }
    }
    (delta, nearest_higher_rho)
}

/// Point indices sorted by descending density, ties kept in index order
fn get_descending_density_order(rho: &[f64]) -> Vec<usize> {
    let mut order = (0..rho.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| rho[b].total_cmp(&rho[a]));
    order
}

/// Select centroids and propagate cluster ids to all points
///
/// Returns a 2-tuple of (cluster ids, centroid point indices ordered by cluster id)
///
fn find_clusters(
    rho: &[f64],
    delta: &[f64],
    nearest_higher_rho: &[Option<usize>],
    exceeds_knn_cutoff: &[bool],
    rho_cutoff: f64,
    centroid_cutoff: f64,
) -> (Vec<ClusterId>, Vec<usize>) {
    let point_count = rho.len();
    let is_centroid = (0..point_count)
        .map(|i| rho[i] > rho_cutoff && delta[i] > centroid_cutoff)
        .collect::<Vec<_>>();

    let mut cluster_ids = vec![ClusterId::Outlier; point_count];
    let mut centroid_indices = Vec::new();
    if !is_centroid.iter().any(|&x| x) {
        return (cluster_ids, centroid_indices);
    }

    // Points are visited in descending density order, so the nearest higher density point of each
    // point always has its final cluster id already.
    for index in get_descending_density_order(rho) {
        cluster_ids[index] = if is_centroid[index] {
            centroid_indices.push(index);
            ClusterId::Cluster(centroid_indices.len())
        } else if exceeds_knn_cutoff[index] {
            ClusterId::Outlier
        } else {
            match nearest_higher_rho[index] {
                Some(neighbor_index) => cluster_ids[neighbor_index],
                None => ClusterId::Outlier,
            }
        };
    }
    (cluster_ids, centroid_indices)
}

/// Assign every point to a cluster when all informative points share the same location
///
fn get_single_location_clusters(
    points: &mut [SegmentPoint],
    informative_indices: &[usize],
    knn_cutoff: f64,
) -> Vec<ClusterCentroid> {
    let first_point = &points[informative_indices[0]];
    let centroid = ClusterCentroid {
        maf: first_point.maf.unwrap_or_default(),
        coverage: first_point.coverage,
    };
    for &index in informative_indices {
        let point = &mut points[index];
        if !point.exceeds_knn_cutoff(knn_cutoff) {
            point.cluster_id = ClusterId::Cluster(1);
        }
    }
    points[informative_indices[0]].cluster_id = ClusterId::Cluster(1);
    vec![centroid]
}

/// Run density-peak clustering over all segment points
///
/// Every point's `cluster_id` is overwritten. Points with unknown MAF are excluded from the
/// clustering population and always end up as `ClusterId::Outlier`.
///
/// Fewer than two informative points, or no point passing the centroid criteria, results in zero
/// clusters with every point marked as an outlier.
///
pub fn run_density_clustering(
    points: &mut [SegmentPoint],
    params: &DensityClusteringParams,
) -> DensityClusteringResult {
    let debug = false;

    for point in points.iter_mut() {
        point.cluster_id = ClusterId::Outlier;
    }

    let informative_indices = points
        .iter()
        .enumerate()
        .filter(|(_, x)| x.has_maf())
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    let plane_points = informative_indices
        .iter()
        .map(|&i| PlanePoint {
            scaled_coverage: points[i].coverage * params.coverage_weighting_factor,
            maf: points[i].maf,
        })
        .collect::<Vec<_>>();

    let distances = DistanceMatrix::build(&plane_points);
    if distances.is_empty() {
        info!(
            "Only {} segments with known MAF, skipping density clustering",
            informative_indices.len()
        );
        return DensityClusteringResult::default();
    }

    let bandwidth = match estimate_distance_threshold(
        &distances,
        params.neighbor_rate_low,
        params.neighbor_rate_high,
    ) {
        Some(x) => x,
        None => {
            info!(
                "All {} segments with known MAF share one location, assigning a single cluster",
                informative_indices.len()
            );
            let centroids =
                get_single_location_clusters(points, &informative_indices, params.knn_cutoff);
            return DensityClusteringResult {
                cluster_count: 1,
                centroids,
                bandwidth: None,
            };
        }
    };

    debug!(
        "Density clustering distance threshold: {} after {} iterations",
        bandwidth.distance_threshold, bandwidth.iterations
    );

    let rho = get_local_density(
        &distances,
        bandwidth.distance_threshold,
        params.density_kernel,
    );
    let (delta, nearest_higher_rho) = get_delta(&distances, &rho);

    for (i, &index) in informative_indices.iter().enumerate() {
        debug_msg!(
            debug,
            "segment: {index} rho: {:.4} delta: {:.4} nearest: {:?}",
            rho[i],
            delta[i],
            nearest_higher_rho[i]
        );
    }

    let exceeds_knn_cutoff = informative_indices
        .iter()
        .map(|&i| points[i].exceeds_knn_cutoff(params.knn_cutoff))
        .collect::<Vec<_>>();

    let (cluster_ids, centroid_indices) = find_clusters(
        &rho,
        &delta,
        &nearest_higher_rho,
        &exceeds_knn_cutoff,
        params.rho_cutoff,
        params.centroid_cutoff,
    );

    for (&index, cluster_id) in informative_indices.iter().zip(cluster_ids) {
        points[index].cluster_id = cluster_id;
    }

    let centroids = centroid_indices
        .iter()
        .map(|&i| {
            let point = &points[informative_indices[i]];
            ClusterCentroid {
                maf: point.maf.unwrap_or_default(),
                coverage: point.coverage,
            }
        })
        .collect::<Vec<_>>();

    DensityClusteringResult {
        cluster_count: centroids.len(),
        centroids,
        bandwidth: Some(bandwidth),
    }
}

/// Number of points assigned to each cluster
///
pub fn get_cluster_sizes(points: &[SegmentPoint], cluster_count: usize) -> Vec<usize> {
    let mut sizes = vec![0; cluster_count];
    for point in points {
        match point.cluster_id.component_index() {
            Some(index) if index < cluster_count => sizes[index] += 1,
            _ => {}
        }
    }
    sizes
}

/// Mean distance in scaled (coverage, MAF) space from each cluster's points to its centroid
///
/// Returns None for any cluster without assigned points.
///
pub fn get_mean_centroid_distances(
    points: &[SegmentPoint],
    centroids: &[ClusterCentroid],
    coverage_weighting_factor: f64,
) -> Vec<Option<f64>> {
    let mut sums = vec![(0.0, 0usize); centroids.len()];
    for point in points {
        let (index, maf) = match (point.cluster_id.component_index(), point.maf) {
            (Some(index), Some(maf)) if index < centroids.len() => (index, maf),
            _ => continue,
        };
        let centroid = &centroids[index];
        let coverage_diff = (point.coverage - centroid.coverage) * coverage_weighting_factor;
        let maf_diff = maf - centroid.maf;
        let (sum, count) = &mut sums[index];
        *sum += (coverage_diff * coverage_diff + maf_diff * maf_diff).sqrt();
        *count += 1;
    }
    sums.into_iter()
        .map(|(sum, count)| (count > 0).then(|| sum / count as f64))
        .collect()
}
