use std::sync::mpsc::channel;
use std::time::Instant;

use hhmmss::Hhmmss;
use log::info;

use crate::cli::{
    ClusterSettings, SharedSettings, validate_cluster_settings_data, write_cluster_settings,
};
use crate::cluster_output::{
    SampleClusterOutput, get_sample_output_dir, write_sample_cluster_output,
};
use crate::genotype_assigner::assign_genotype_clusters;
use crate::os_utils::create_dir_all;
use crate::run_stats::{ClusterRunStats, SampleClusterStats, write_cluster_run_stats};
use crate::segment_input::{SampleSegments, get_coverage_weighting_factor, read_segment_input};

/// Cluster one sample's segments and write all of its output files
///
fn cluster_sample(
    settings: &ClusterSettings,
    sample_index: usize,
    sample: &SampleSegments,
) -> SampleClusterStats {
    let start = Instant::now();
    info!(
        "Clustering segments for sample '{}'",
        sample.sample_name
    );

    let mut points = sample.get_segment_points();
    let coverage_weighting_factor = settings
        .coverage_weighting_factor
        .unwrap_or_else(|| get_coverage_weighting_factor(settings.coverage_weighting, &points));
    info!(
        "Coverage weighting factor for sample '{}': {coverage_weighting_factor}",
        sample.sample_name
    );

    let density_params = settings.get_density_clustering_params(coverage_weighting_factor);
    let mixture_params = settings.get_mixture_fit_params(coverage_weighting_factor);
    let result = assign_genotype_clusters(&mut points, &density_params, &mixture_params);

    let clustering_time = start.elapsed();
    let stats = SampleClusterStats::new(
        &sample.sample_name,
        &points,
        &result,
        clustering_time.as_secs_f64(),
    );

    let output = SampleClusterOutput::new(sample, &points, result);
    let sample_dir = get_sample_output_dir(&settings.output_dir, sample_index, &sample.sample_name);
    create_dir_all(&sample_dir, "sample output");
    write_sample_cluster_output(&sample_dir, &output);

    info!(
        "Finished clustering sample '{}'. Clustering time: {}",
        sample.sample_name,
        clustering_time.hhmmssxxx()
    );
    stats
}

/// Cluster all samples in parallel, returning stats for each sample in input order
///
fn cluster_all_samples(
    shared_settings: &SharedSettings,
    settings: &ClusterSettings,
    samples: &[SampleSegments],
) -> Vec<SampleClusterStats> {
    let worker_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(shared_settings.thread_count)
        .build()
        .unwrap();

    let (tx, rx) = channel();

    worker_pool.scope(move |scope| {
        for (sample_index, sample) in samples.iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let stats = cluster_sample(settings, sample_index, sample);
                tx.send((sample_index, stats)).unwrap();
            });
        }
    });

    let mut all_sample_stats = rx.into_iter().collect::<Vec<_>>();
    all_sample_stats.sort_by_key(|(sample_index, _)| *sample_index);
    all_sample_stats.into_iter().map(|(_, x)| x).collect()
}

pub fn run_cluster(shared_settings: &SharedSettings, settings: &ClusterSettings) {
    let start = Instant::now();

    validate_cluster_settings_data(settings);
    write_cluster_settings(&settings.output_dir, settings);

    let input = read_segment_input(&settings.segments_filename);

    let samples = cluster_all_samples(shared_settings, settings, &input.samples);

    let run_stats = ClusterRunStats {
        samples,
        total_run_time_secs: start.elapsed().as_secs_f64(),
    };
    write_cluster_run_stats(&settings.output_dir, &run_stats);
}
