use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use const_format::concatcp;
use log::warn;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

use super::utils::check_required_filename;
use crate::density_clustering::{
    DEFAULT_CENTROID_CUTOFF, DEFAULT_NEIGHBOR_RATE_HIGH, DEFAULT_NEIGHBOR_RATE_LOW,
    DEFAULT_RHO_CUTOFF, DensityClusteringParams, DensityKernel,
};
use crate::filenames::SETTINGS_FILENAME;
use crate::gaussian_mixture::MixtureFitParams;

pub const DEFAULT_COVERAGE_WEIGHTING: f64 = 0.4;

#[derive(Args, Deserialize, Serialize)]
pub struct ClusterSettings {
    /// Directory for all cluster command output (must not already exist)
    #[arg(long, value_name = "DIR", default_value = concatcp!(env!("CARGO_PKG_NAME"), "_output"))]
    pub output_dir: Utf8PathBuf,

    /// Segment summaries for one or more samples, in JSON format
    ///
    /// Each sample provides a list of segments with coverage, minor allele frequency (null or negative
    /// if unknown), and optionally a weight and nearest-neighbour distance.
    ///
    #[arg(long = "segments", value_name = "FILE")]
    pub segments_filename: Utf8PathBuf,

    /// Relative weight of coverage compared to minor allele frequency in the clustering space
    ///
    /// The coverage weighting factor of each sample is this value divided by the sample's median
    /// segment coverage.
    ///
    #[arg(long, default_value_t = DEFAULT_COVERAGE_WEIGHTING)]
    pub coverage_weighting: f64,

    /// Set the coverage weighting factor directly for all samples, instead of deriving it from
    /// --coverage-weighting
    ///
    #[arg(long)]
    pub coverage_weighting_factor: Option<f64>,

    /// Lower bound of the target neighbor rate used to find the density kernel bandwidth
    #[arg(hide = true, long, default_value_t = DEFAULT_NEIGHBOR_RATE_LOW)]
    pub neighbor_rate_low: f64,

    /// Upper bound of the target neighbor rate used to find the density kernel bandwidth
    #[arg(hide = true, long, default_value_t = DEFAULT_NEIGHBOR_RATE_HIGH)]
    pub neighbor_rate_high: f64,

    /// Minimum local density of a cluster centroid
    #[arg(hide = true, long, default_value_t = DEFAULT_RHO_CUTOFF)]
    pub rho_cutoff: f64,

    /// Minimum distance from a cluster centroid to any segment of higher local density
    #[arg(hide = true, long, default_value_t = DEFAULT_CENTROID_CUTOFF)]
    pub centroid_cutoff: f64,

    /// Segments with a nearest-neighbour distance above this value are treated as outliers. No
    /// segments are excluded by default.
    ///
    #[arg(long)]
    pub knn_cutoff: Option<f64>,

    /// Kernel used to estimate local segment density
    #[arg(hide = true, long, value_enum, default_value_t = DensityKernel::Gaussian)]
    pub density_kernel: DensityKernel,

    /// Allow correlation between minor allele frequency and coverage in the mixture model
    #[arg(long)]
    pub correlated_axes: bool,

    /// Fit the mixture model with component means frozen, first at the cluster centroids and then
    /// at the empirical means of the first fit
    ///
    #[arg(long)]
    pub two_pass_mean_freeze: bool,
}

impl ClusterSettings {
    fn get_knn_cutoff(&self) -> f64 {
        self.knn_cutoff.unwrap_or(f64::INFINITY)
    }

    pub fn get_density_clustering_params(
        &self,
        coverage_weighting_factor: f64,
    ) -> DensityClusteringParams {
        DensityClusteringParams {
            coverage_weighting_factor,
            neighbor_rate_low: self.neighbor_rate_low,
            neighbor_rate_high: self.neighbor_rate_high,
            rho_cutoff: self.rho_cutoff,
            centroid_cutoff: self.centroid_cutoff,
            knn_cutoff: self.get_knn_cutoff(),
            density_kernel: self.density_kernel,
        }
    }

    pub fn get_mixture_fit_params(&self, coverage_weighting_factor: f64) -> MixtureFitParams {
        MixtureFitParams {
            coverage_weighting_factor,
            knn_cutoff: self.get_knn_cutoff(),
            uncorrelated_axes: !self.correlated_axes,
            two_pass_mean_freeze: self.two_pass_mean_freeze,
        }
    }
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
/// Assumes that the logger is not setup
///
pub fn validate_and_fix_cluster_settings(settings: ClusterSettings) -> SimpleResult<ClusterSettings> {
    fn check_finite(value: f64, label: &str) -> SimpleResult<()> {
        if !value.is_finite() {
            bail!("--{label} argument must be a finite number");
        }
        Ok(())
    }

    check_required_filename(settings.segments_filename.as_str(), "segment input")?;

    check_finite(settings.coverage_weighting, "coverage-weighting")?;
    if settings.coverage_weighting <= 0.0 {
        bail!("--coverage-weighting argument must be greater than 0");
    }

    if let Some(coverage_weighting_factor) = settings.coverage_weighting_factor {
        check_finite(coverage_weighting_factor, "coverage-weighting-factor")?;
        if coverage_weighting_factor <= 0.0 {
            bail!("--coverage-weighting-factor argument must be greater than 0");
        }
    }

    check_finite(settings.neighbor_rate_low, "neighbor-rate-low")?;
    check_finite(settings.neighbor_rate_high, "neighbor-rate-high")?;
    check_finite(settings.rho_cutoff, "rho-cutoff")?;
    check_finite(settings.centroid_cutoff, "centroid-cutoff")?;

    if settings.knn_cutoff.is_some_and(|x| x.is_nan()) {
        bail!("--knn-cutoff argument must be a number");
    }

    Ok(settings)
}

/// Extended settings validation which requires a logger
///
/// Settings checked here can still be used for a run, so only warnings are given.
///
pub fn validate_cluster_settings_data(settings: &ClusterSettings) {
    if settings.neighbor_rate_low > settings.neighbor_rate_high {
        warn!(
            "Neighbor rate lower bound {} exceeds upper bound {}, density kernel bandwidth search will not converge",
            settings.neighbor_rate_low, settings.neighbor_rate_high
        );
    }
}

/// Write cluster settings out in json format
pub fn write_cluster_settings(output_dir: &Utf8Path, settings: &ClusterSettings) {
    use log::info;

    let filename = output_dir.join(SETTINGS_FILENAME);

    info!("Writing cluster settings to file: '{filename}'");

    let f = unwrap!(
        std::fs::File::create(&filename),
        "Unable to create cluster settings json file: '{filename}'"
    );

    unwrap!(
        serde_json::to_writer_pretty(&f, &settings),
        "Unable to write cluster settings json file: '{filename}'"
    );
}
