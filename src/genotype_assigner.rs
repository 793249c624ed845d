//! Assign segments of one sample to genotype clusters
//!
//! Density-peak clustering finds the candidate copy number states, which then seed a Gaussian mixture
//! fit to obtain per-segment posterior probabilities.
//!

use log::info;
use serde::{Deserialize, Serialize};
use thousands::Separable;

use crate::density_clustering::{
    ClusterCentroid, DensityClusteringParams, DensityClusteringResult, get_cluster_sizes,
    get_mean_centroid_distances, run_density_clustering,
};
use crate::gaussian_mixture::{MixtureFit, MixtureFitParams, fit_gaussian_mixture};
use crate::segment_point::SegmentPoint;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterSummary {
    /// 1-based cluster id
    pub cluster_id: usize,

    /// Number of segments assigned to the cluster
    pub size: usize,

    pub centroid: ClusterCentroid,

    /// Mean distance from the cluster's segments to its centroid, in the scaled clustering space
    pub mean_centroid_distance: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GenotypeClusteringResult {
    pub clustering: DensityClusteringResult,
    pub cluster_summaries: Vec<ClusterSummary>,

    /// None if no clusters were found to seed the mixture model
    pub mixture: Option<MixtureFit>,
}

fn get_cluster_summaries(
    points: &[SegmentPoint],
    clustering: &DensityClusteringResult,
    coverage_weighting_factor: f64,
) -> Vec<ClusterSummary> {
    let sizes = get_cluster_sizes(points, clustering.cluster_count);
    let mean_distances =
        get_mean_centroid_distances(points, &clustering.centroids, coverage_weighting_factor);
    clustering
        .centroids
        .iter()
        .zip(sizes)
        .zip(mean_distances)
        .enumerate()
        .map(
            |(index, ((centroid, size), mean_centroid_distance))| ClusterSummary {
                cluster_id: index + 1,
                size,
                centroid: *centroid,
                mean_centroid_distance,
            },
        )
        .collect()
}

/// Cluster the segments of one sample and fit the mixture model seeded from the clusters
///
/// Every segment's cluster id, mixture assignment and posterior probabilities are overwritten.
///
pub fn assign_genotype_clusters(
    points: &mut [SegmentPoint],
    density_params: &DensityClusteringParams,
    mixture_params: &MixtureFitParams,
) -> GenotypeClusteringResult {
    for point in points.iter_mut() {
        point.mixture_assignment = None;
        point.posterior_probs.clear();
    }

    let clustering = run_density_clustering(points, density_params);
    info!(
        "Found {} density clusters from {} segments",
        clustering.cluster_count,
        points.len().separate_with_commas()
    );

    let cluster_summaries =
        get_cluster_summaries(points, &clustering, density_params.coverage_weighting_factor);

    let mixture = if clustering.cluster_count > 0 {
        Some(fit_gaussian_mixture(
            points,
            &clustering.centroids,
            mixture_params,
        ))
    } else {
        None
    };

    GenotypeClusteringResult {
        clustering,
        cluster_summaries,
        mixture,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment_point::MixtureAssignment;
    use crate::test_utils::get_two_blob_points;

    const COVERAGE_WEIGHTING_FACTOR: f64 = 0.01;

    fn get_params(two_pass_mean_freeze: bool) -> (DensityClusteringParams, MixtureFitParams) {
        let density_params = DensityClusteringParams {
            coverage_weighting_factor: COVERAGE_WEIGHTING_FACTOR,
            ..Default::default()
        };
        let mixture_params = MixtureFitParams {
            coverage_weighting_factor: COVERAGE_WEIGHTING_FACTOR,
            two_pass_mean_freeze,
            ..Default::default()
        };
        (density_params, mixture_params)
    }

    fn check_two_blob_result(points: &[SegmentPoint], result: &GenotypeClusteringResult) {
        let blob_size = points.len() / 2;
        assert_eq!(result.clustering.cluster_count, 2);
        assert_eq!(result.cluster_summaries.len(), 2);
        assert_eq!(
            result.cluster_summaries.iter().map(|x| x.size).sum::<usize>(),
            points.len()
        );

        let fit = result.mixture.as_ref().unwrap().fitted().unwrap();
        assert_eq!(fit.components.len(), 2);

        // Mixture assignments agree with the density clusters
        for point in points {
            let expected = point.cluster_id.component_index().unwrap();
            assert_eq!(
                point.mixture_assignment,
                Some(MixtureAssignment::Component(expected))
            );
            assert!(point.assignment_qual().unwrap() > 10);
        }
        assert_ne!(points[0].cluster_id, points[blob_size].cluster_id);
    }

    #[test]
    fn test_two_blobs_direct() {
        let mut points = get_two_blob_points(100, 41);
        let (density_params, mixture_params) = get_params(false);
        let result = assign_genotype_clusters(&mut points, &density_params, &mixture_params);
        check_two_blob_result(&points, &result);
    }

    #[test]
    fn test_two_blobs_two_pass() {
        let mut points = get_two_blob_points(100, 43);
        let (density_params, mixture_params) = get_params(true);
        let result = assign_genotype_clusters(&mut points, &density_params, &mixture_params);
        check_two_blob_result(&points, &result);
    }

    #[test]
    fn test_empty_input() {
        let (density_params, mixture_params) = get_params(false);
        let result = assign_genotype_clusters(&mut [], &density_params, &mixture_params);
        assert_eq!(result.clustering.cluster_count, 0);
        assert!(result.cluster_summaries.is_empty());
        assert!(result.mixture.is_none());
    }

    #[test]
    fn test_all_unknown_maf() {
        let mut points = (0..20)
            .map(|x| SegmentPoint::new(30.0 + x as f64, None, 1.0))
            .collect::<Vec<_>>();
        let (density_params, mixture_params) = get_params(false);
        let result = assign_genotype_clusters(&mut points, &density_params, &mixture_params);
        assert_eq!(result.clustering.cluster_count, 0);
        assert!(result.mixture.is_none());
        assert!(points.iter().all(|x| x.cluster_id.is_outlier()));
        assert!(points.iter().all(|x| x.mixture_assignment.is_none()));
    }
}
