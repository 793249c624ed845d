//! Track stats for the whole segcluster run
//!

use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use unwrap::unwrap;

use crate::filenames::RUN_STATS_FILENAME;
use crate::gaussian_mixture::MixtureFit;
use crate::genotype_assigner::GenotypeClusteringResult;
use crate::segment_point::SegmentPoint;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum MixtureFitStatus {
    /// No density clusters were found to seed the mixture model
    #[default]
    NotRun,
    Fitted,
    Failed,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SampleClusterStats {
    pub sample_name: String,
    pub segment_count: usize,

    /// Segments with unknown MAF
    pub unknown_maf_segment_count: usize,

    pub cluster_count: usize,
    pub outlier_segment_count: usize,

    pub bandwidth_search_iterations: Option<usize>,
    pub bandwidth_search_converged: Option<bool>,

    pub mixture_fit_status: MixtureFitStatus,
    pub em_iterations: Option<usize>,
    pub log_likelihood: Option<f64>,
    pub bic: Option<f64>,

    pub clustering_time_secs: f64,
}

impl SampleClusterStats {
    pub fn new(
        sample_name: &str,
        points: &[SegmentPoint],
        result: &GenotypeClusteringResult,
        clustering_time_secs: f64,
    ) -> Self {
        let bandwidth = result.clustering.bandwidth.as_ref();
        let mut stats = Self {
            sample_name: sample_name.to_string(),
            segment_count: points.len(),
            unknown_maf_segment_count: points.iter().filter(|x| !x.has_maf()).count(),
            cluster_count: result.clustering.cluster_count,
            outlier_segment_count: points.iter().filter(|x| x.cluster_id.is_outlier()).count(),
            bandwidth_search_iterations: bandwidth.map(|x| x.iterations),
            bandwidth_search_converged: bandwidth.map(|x| x.converged),
            clustering_time_secs,
            ..Default::default()
        };

        match &result.mixture {
            Some(MixtureFit::Fitted(fit)) => {
                stats.mixture_fit_status = MixtureFitStatus::Fitted;
                stats.em_iterations = Some(fit.iterations);
                stats.log_likelihood = Some(fit.log_likelihood);
                stats.bic = Some(fit.bic);
            }
            Some(MixtureFit::Failed { log_likelihood, .. }) => {
                stats.mixture_fit_status = MixtureFitStatus::Failed;
                stats.log_likelihood = *log_likelihood;
            }
            None => {}
        }
        stats
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ClusterRunStats {
    pub samples: Vec<SampleClusterStats>,
    pub total_run_time_secs: f64,
}

/// Write run_stats structure out in json format
pub fn write_cluster_run_stats(output_dir: &Utf8Path, run_stats: &ClusterRunStats) {
    let filename = output_dir.join(RUN_STATS_FILENAME);

    info!("Writing run statistics to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create run statistics json file: '{filename}'"
    );

    unwrap!(
        serde_json::to_writer_pretty(&f, &run_stats),
        "Unable to write run statistics json file: '{filename}'"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density_clustering::DensityClusteringResult;

    #[test]
    fn test_sample_cluster_stats() {
        let points = vec![
            SegmentPoint::new(30.0, Some(0.5), 1.0),
            SegmentPoint::new(30.0, None, 1.0),
        ];
        let result = GenotypeClusteringResult {
            clustering: DensityClusteringResult::default(),
            cluster_summaries: Vec::new(),
            mixture: Some(MixtureFit::Failed {
                log_likelihood: Some(-2.0),
                message: "test".to_string(),
            }),
        };
        let stats = SampleClusterStats::new("sample1", &points, &result, 0.5);
        assert_eq!(stats.segment_count, 2);
        assert_eq!(stats.unknown_maf_segment_count, 1);
        assert_eq!(stats.outlier_segment_count, 2);
        assert_eq!(stats.bandwidth_search_iterations, None);
        assert_eq!(stats.mixture_fit_status, MixtureFitStatus::Failed);
        assert_eq!(stats.log_likelihood, Some(-2.0));
        assert_eq!(stats.em_iterations, None);
    }
}
