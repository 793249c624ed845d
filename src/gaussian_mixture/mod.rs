//! Gaussian mixture model of segments in (MAF, coverage) space, fit by expectation-maximization
//!
//! The model is seeded with one component per density cluster centroid. EM then refines component
//! weights and covariances (and optionally means), producing per-segment posterior probabilities.
//!

mod component;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};

pub use self::component::MixtureComponent;
use self::component::{
    COVARIANCE_FLOOR, Covariance, get_default_covariance, get_determinant, is_positive_definite,
    scale_covariance,
};
use crate::density_clustering::ClusterCentroid;
use crate::prob_utils::{ln_sum_exp, normalize_ln_distro};
use crate::segment_point::{MixtureAssignment, SegmentPoint};

/// Iteration cap for the single-pass fit with mean updates
pub const MAX_DIRECT_EM_ITERATIONS: usize = 30;

/// Iteration cap for each pass of the two-pass fit
pub const MAX_TWO_PASS_EM_ITERATIONS: usize = 20;

/// EM stops once the log-likelihood changes by less than this value
const LIKELIHOOD_CONVERGENCE_THRESHOLD: f64 = 2.5e-5;

/// Segments below this posterior probability don't contribute to a component's mean or covariance
const POSTERIOR_PROB_THRESHOLD: f64 = 0.01;

/// Component means are not updated below this mixture weight
const MEAN_UPDATE_WEIGHT_THRESHOLD: f64 = 0.01;

/// Pairwise covariance scaling is skipped when either determinant is at or below this value
const PAIRWISE_SCALING_DETERMINANT_THRESHOLD: f64 = 1e-7;

/// Pairwise covariance scaling is applied when the determinant ratio exceeds this value
const PAIRWISE_SCALING_DETERMINANT_RATIO: f64 = 4.0;

/// Components at or below this weight are not counted in the BIC
const BIC_WEIGHT_THRESHOLD: f64 = 1e-10;

#[derive(Clone, Debug)]
pub struct MixtureFitParams {
    /// Used to set the default coverage variance so that it is commensurable with MAF variance
    pub coverage_weighting_factor: f64,

    /// Segments with a nearest-neighbour distance above this value are excluded from the fit
    pub knn_cutoff: f64,

    /// If true, covariance updates keep the MAF/coverage covariance at zero
    pub uncorrelated_axes: bool,

    /// If true, fit twice with frozen means: first at the cluster centroids, then at the empirical
    /// means found by the first pass. Otherwise run a single fit with mean updates.
    pub two_pass_mean_freeze: bool,
}

impl Default for MixtureFitParams {
    fn default() -> Self {
        Self {
            coverage_weighting_factor: 1.0,
            knn_cutoff: f64::INFINITY,
            uncorrelated_axes: true,
            two_pass_mean_freeze: false,
        }
    }
}

/// Parameters of a successful mixture fit
///
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FittedMixture {
    pub components: Vec<MixtureComponent>,

    /// Weighted mean log-likelihood of all segments under the final model
    pub log_likelihood: f64,

    /// Total EM iterations over all passes
    pub iterations: usize,

    /// True if the final pass stopped on the likelihood change criteria rather than the iteration cap
    pub converged: bool,

    /// Log-likelihood after each EM iteration, over all passes
    pub likelihood_trace: Vec<f64>,

    pub bic: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum MixtureFit {
    Fitted(FittedMixture),

    /// The fit hit a numerical failure, no model parameters are available and any segment posterior
    /// probabilities written during the fit should not be used
    Failed {
        /// Log-likelihood from the last completed iteration, if any
        log_likelihood: Option<f64>,
        message: String,
    },
}

impl MixtureFit {
    pub fn fitted(&self) -> Option<&FittedMixture> {
        match self {
            MixtureFit::Fitted(x) => Some(x),
            MixtureFit::Failed { .. } => None,
        }
    }
}

struct EmPassSummary {
    iterations: usize,
    converged: bool,
}

pub struct GaussianMixtureModel {
    components: Vec<MixtureComponent>,
    default_covariance: Covariance,
    knn_cutoff: f64,
    uncorrelated_axes: bool,
}

impl GaussianMixtureModel {
    /// Create the initial model with one component per cluster centroid
    ///
    pub fn from_centroids(centroids: &[ClusterCentroid], params: &MixtureFitParams) -> Self {
        let covariance = get_default_covariance(params.coverage_weighting_factor);
        let weight = 1.0 / centroids.len() as f64;
        let components = centroids
            .iter()
            .map(|x| MixtureComponent {
                weight,
                mean: [x.maf, x.coverage],
                covariance,
            })
            .collect();
        Self::from_components(components, params)
    }

    /// Create a model from existing component parameters, such as those of a previous fit
    ///
    pub fn from_components(components: Vec<MixtureComponent>, params: &MixtureFitParams) -> Self {
        Self {
            components,
            default_covariance: get_default_covariance(params.coverage_weighting_factor),
            knn_cutoff: params.knn_cutoff,
            uncorrelated_axes: params.uncorrelated_axes,
        }
    }

    /// Reset all weights and covariances to their initial values, means are unchanged
    fn reset_parameters(&mut self) {
        let weight = 1.0 / self.components.len() as f64;
        for component in self.components.iter_mut() {
            component.weight = weight;
            component.covariance = self.default_covariance;
        }
    }

    fn get_ln_weighted_densities(&self, maf: Option<f64>, coverage: f64) -> SimpleResult<Vec<f64>> {
        self.components
            .iter()
            .map(|x| x.ln_weighted_density(maf, coverage))
            .collect()
    }

    /// Posterior probability of each component for a segment at the given location
    ///
    /// Returns a 2-tuple of (posterior probabilities indexed by component, index of the most
    /// probable component)
    ///
    pub fn posterior_probs(&self, maf: Option<f64>, coverage: f64) -> SimpleResult<(Vec<f64>, usize)> {
        let mut probs = self.get_ln_weighted_densities(maf, coverage)?;
        let best_index = match normalize_ln_distro(&mut probs) {
            Some(x) => x,
            None => bail!("No mixture component has non-zero density at maf: {maf:?} coverage: {coverage}"),
        };
        Ok((probs, best_index))
    }

    /// E-step: Update posterior probabilities and mixture assignment of every segment
    ///
    fn compute_posterior_probs(&self, points: &mut [SegmentPoint]) -> SimpleResult<()> {
        for point in points.iter_mut() {
            if point.exceeds_knn_cutoff(self.knn_cutoff) {
                point.mixture_assignment = Some(MixtureAssignment::Outlier);
                point.posterior_probs.clear();
                continue;
            }
            let (probs, best_index) = self.posterior_probs(point.maf, point.coverage)?;
            point.posterior_probs = probs;
            point.mixture_assignment = Some(MixtureAssignment::Component(best_index));
        }
        Ok(())
    }

    /// M-step: Update component weights
    ///
    fn update_weights(&mut self, points: &[SegmentPoint]) -> SimpleResult<()> {
        let knn_cutoff = self.knn_cutoff;
        let informative_points = || points.iter().filter(|x| x.is_mixture_informative(knn_cutoff));

        let total_weight = informative_points().map(|x| x.weight).sum::<f64>();
        if total_weight.is_nan() || total_weight <= 0.0 {
            bail!("No segment weight available to update mixture weights");
        }

        for (index, component) in self.components.iter_mut().enumerate() {
            component.weight = informative_points()
                .map(|x| x.posterior_probs[index] * x.weight)
                .sum::<f64>()
                / total_weight;
        }
        Ok(())
    }

    /// M-step: Update component means
    ///
    /// Components with low mixture weight, or without any supporting segments, keep their current mean.
    ///
    fn update_means(&mut self, points: &[SegmentPoint]) {
        for (index, component) in self.components.iter_mut().enumerate() {
            if component.weight < MEAN_UPDATE_WEIGHT_THRESHOLD {
                continue;
            }

            let mut sum = [0.0; 2];
            let mut sum_weights = 0.0;
            for point in points {
                let maf = match point.maf {
                    Some(x) if !point.exceeds_knn_cutoff(self.knn_cutoff) => x,
                    _ => continue,
                };
                let prob = point.posterior_probs[index];
                if prob < POSTERIOR_PROB_THRESHOLD {
                    continue;
                }
                let weight = prob * point.weight;
                sum_weights += weight;
                sum[0] += weight * maf;
                sum[1] += weight * point.coverage;
            }

            if sum_weights > 0.0 {
                component.mean = [sum[0] / sum_weights, sum[1] / sum_weights];
            }
        }
    }

    /// M-step: Update component covariances
    ///
    fn update_covariances(&mut self, points: &[SegmentPoint]) -> SimpleResult<()> {
        for (index, component) in self.components.iter_mut().enumerate() {
            let mut sum = [0.0; 3];
            let mut sum_weights = 0.0;
            for point in points {
                let maf = match point.maf {
                    Some(x) if !point.exceeds_knn_cutoff(self.knn_cutoff) => x,
                    _ => continue,
                };
                let prob = point.posterior_probs[index];
                if prob < POSTERIOR_PROB_THRESHOLD {
                    continue;
                }
                let weight = prob * point.weight;
                sum_weights += weight;

                let maf_diff = maf - component.mean[0];
                let coverage_diff = point.coverage - component.mean[1];
                sum[0] += weight * maf_diff * maf_diff;
                sum[1] += weight * maf_diff * coverage_diff;
                sum[2] += weight * coverage_diff * coverage_diff;
            }

            let cov = &mut component.covariance;
            if sum_weights > 0.0 {
                let off_diagonal = if self.uncorrelated_axes {
                    0.0
                } else {
                    sum[1] / sum_weights
                };
                *cov = [
                    [sum[0] / sum_weights, off_diagonal],
                    [off_diagonal, sum[2] / sum_weights],
                ];
            }

            cov[0][0] = cov[0][0].max(COVARIANCE_FLOOR);
            cov[1][1] = cov[1][1].max(COVARIANCE_FLOOR);

            if !is_positive_definite(cov) {
                *cov = self.default_covariance;
            }
        }

        self.scale_covariances_pairwise()
    }

    /// Keep broad components from absorbing the segments of nearby narrow components
    ///
    /// For each component, find the other component with the highest weighted density at its mean.
    /// If the covariance determinants of the two differ by a large ratio, shrink the broader
    /// covariance and expand the narrower one.
    ///
    fn scale_covariances_pairwise(&mut self) -> SimpleResult<()> {
        let component_count = self.components.len();
        for index1 in 0..component_count {
            let mean1 = self.components[index1].mean;
            let mut best: Option<(usize, f64)> = None;
            for index2 in 0..component_count {
                if index2 == index1 {
                    continue;
                }
                let ln_prob =
                    self.components[index2].ln_weighted_density(Some(mean1[0]), mean1[1])?;
                if ln_prob == f64::NEG_INFINITY {
                    continue;
                }
                if best.is_none_or(|(_, x)| ln_prob > x) {
                    best = Some((index2, ln_prob));
                }
            }

            let index2 = match best {
                Some((x, _)) => x,
                None => continue,
            };

            let det1 = get_determinant(&self.components[index1].covariance);
            let det2 = get_determinant(&self.components[index2].covariance);
            if det1 <= PAIRWISE_SCALING_DETERMINANT_THRESHOLD
                || det2 <= PAIRWISE_SCALING_DETERMINANT_THRESHOLD
            {
                continue;
            }

            let ratio = if det1 > det2 { det1 / det2 } else { det2 / det1 };
            if ratio <= PAIRWISE_SCALING_DETERMINANT_RATIO {
                continue;
            }

            let (broad_index, narrow_index) = if det1 > det2 {
                (index1, index2)
            } else {
                (index2, index1)
            };
            scale_covariance(&mut self.components[broad_index].covariance, 0.8);
            scale_covariance(&mut self.components[narrow_index].covariance, 1.1);
        }
        Ok(())
    }

    /// Weighted mean log-likelihood of the segments under the current model
    ///
    /// Segments excluded by the nearest-neighbour cutoff contribute nothing, and segments with
    /// unknown MAF only contribute the log of the total mixture weight. The denominator is the
    /// total weight of all segments.
    ///
    pub fn log_likelihood(&self, points: &[SegmentPoint]) -> SimpleResult<f64> {
        let total_weight = points.iter().map(|x| x.weight).sum::<f64>();
        let total_mixture_weight = self.components.iter().map(|x| x.weight).sum::<f64>();

        let mut likelihood = 0.0;
        for point in points {
            if point.exceeds_knn_cutoff(self.knn_cutoff) {
                continue;
            }
            let ln_likelihood = match point.maf {
                Some(_) => ln_sum_exp(&self.get_ln_weighted_densities(point.maf, point.coverage)?),
                None => total_mixture_weight.ln(),
            };
            likelihood += ln_likelihood * point.weight;
        }
        likelihood /= total_weight;

        if !likelihood.is_finite() {
            bail!("Mixture log-likelihood is not finite: {likelihood}");
        }
        Ok(likelihood)
    }

    /// Bayesian information criterion of the current model, normalized by the total segment weight
    ///
    /// Components at negligible weight are ignored. The number of free parameters for each remaining
    /// component is reduced for degenerate or uncorrelated covariances.
    ///
    pub fn bic(&self, points: &[SegmentPoint]) -> SimpleResult<f64> {
        let components = self
            .components
            .iter()
            .filter(|x| x.weight > BIC_WEIGHT_THRESHOLD)
            .collect::<Vec<_>>();

        let mut likelihood = 0.0;
        for point in points {
            if point.exceeds_knn_cutoff(self.knn_cutoff) {
                continue;
            }
            let ln_densities = components
                .iter()
                .map(|x| x.ln_weighted_density(point.maf, point.coverage))
                .collect::<SimpleResult<Vec<_>>>()?;
            likelihood += ln_sum_exp(&ln_densities) * point.weight;
        }

        let parameter_count = get_bic_parameter_count(&components) as f64;
        let n = points.iter().map(|x| x.weight).sum::<f64>();
        let bic = (-2.0 * likelihood
            + parameter_count * (n.ln() - (2.0 * std::f64::consts::PI).ln()))
            / n;
        if !bic.is_finite() {
            bail!("Mixture BIC is not finite: {bic}");
        }
        Ok(bic)
    }

    /// Run EM iterations until the likelihood change criteria is met or `max_iterations` is reached
    ///
    /// Each iteration's log-likelihood is appended to `likelihood_trace`.
    ///
    fn run_em_pass(
        &mut self,
        points: &mut [SegmentPoint],
        max_iterations: usize,
        update_means: bool,
        likelihood_trace: &mut Vec<f64>,
    ) -> SimpleResult<EmPassSummary> {
        let mut last_likelihood = -1.0;
        for iteration in 0..max_iterations {
            self.compute_posterior_probs(points)?;

            self.update_weights(points)?;
            if update_means {
                self.update_means(points);
            }
            self.update_covariances(points)?;

            let likelihood = self.log_likelihood(points)?;
            likelihood_trace.push(likelihood);
            debug!("EM iteration {iteration} log-likelihood: {likelihood}");

            if (likelihood - last_likelihood).abs() < LIKELIHOOD_CONVERGENCE_THRESHOLD
                && iteration > 1
            {
                return Ok(EmPassSummary {
                    iterations: iteration + 1,
                    converged: true,
                });
            }
            last_likelihood = likelihood;
        }
        Ok(EmPassSummary {
            iterations: max_iterations,
            converged: false,
        })
    }

    /// Run the complete fit in the mode selected by `two_pass_mean_freeze`
    ///
    fn fit(
        &mut self,
        points: &mut [SegmentPoint],
        two_pass_mean_freeze: bool,
        likelihood_trace: &mut Vec<f64>,
    ) -> SimpleResult<EmPassSummary> {
        let summary = if two_pass_mean_freeze {
            let first_pass =
                self.run_em_pass(points, MAX_TWO_PASS_EM_ITERATIONS, false, likelihood_trace)?;
            self.update_means(points);
            self.reset_parameters();
            let second_pass =
                self.run_em_pass(points, MAX_TWO_PASS_EM_ITERATIONS, false, likelihood_trace)?;
            EmPassSummary {
                iterations: first_pass.iterations + second_pass.iterations,
                converged: second_pass.converged,
            }
        } else {
            self.run_em_pass(points, MAX_DIRECT_EM_ITERATIONS, true, likelihood_trace)?
        };

        // Leave segment posteriors consistent with the final model parameters
        self.compute_posterior_probs(points)?;
        Ok(summary)
    }
}

/// Number of free model parameters counted for the BIC
fn get_bic_parameter_count(components: &[&MixtureComponent]) -> usize {
    components
        .iter()
        .map(|x| {
            let cov = &x.covariance;
            if cov[0][0] <= COVARIANCE_FLOOR || cov[1][1] <= COVARIANCE_FLOOR {
                3
            } else if cov[0][1].abs() <= COVARIANCE_FLOOR {
                5
            } else {
                6
            }
        })
        .sum()
}

/// Fit a Gaussian mixture model to the segments, seeded with one component per cluster centroid
///
/// Segment posterior probabilities and mixture assignments are updated in place. Numerical failure
/// at any point in the fit is reported as `MixtureFit::Failed`.
///
pub fn fit_gaussian_mixture(
    points: &mut [SegmentPoint],
    centroids: &[ClusterCentroid],
    params: &MixtureFitParams,
) -> MixtureFit {
    if centroids.is_empty() {
        return MixtureFit::Failed {
            log_likelihood: None,
            message: "No cluster centroids available to seed the mixture model".to_string(),
        };
    }

    let mut model = GaussianMixtureModel::from_centroids(centroids, params);
    let mut likelihood_trace = Vec::new();
    let result = model
        .fit(points, params.two_pass_mean_freeze, &mut likelihood_trace)
        .and_then(|summary| {
            let bic = model.bic(points)?;
            Ok((summary, bic))
        });

    match result {
        Ok((summary, bic)) => {
            let log_likelihood = likelihood_trace.last().copied().unwrap_or_default();
            debug!(
                "Mixture fit completed after {} iterations with log-likelihood {log_likelihood}",
                summary.iterations
            );
            MixtureFit::Fitted(FittedMixture {
                components: model.components,
                log_likelihood,
                iterations: summary.iterations,
                converged: summary.converged,
                likelihood_trace,
                bic,
            })
        }
        Err(e) => {
            warn!("Error fitting Gaussian mixture model: {e}");
            MixtureFit::Failed {
                log_likelihood: likelihood_trace.last().copied(),
                message: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaussian_mixture::component::is_positive_semidefinite;
    use crate::test_utils::{BLOB_A, BLOB_B, get_blob_points, get_two_blob_points};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    const COVERAGE_WEIGHTING_FACTOR: f64 = 0.01;

    fn get_params() -> MixtureFitParams {
        MixtureFitParams {
            coverage_weighting_factor: COVERAGE_WEIGHTING_FACTOR,
            ..Default::default()
        }
    }

    /// Seeds offset from the true blob centers
    fn get_perturbed_centroids() -> Vec<ClusterCentroid> {
        vec![
            ClusterCentroid {
                maf: BLOB_A.maf - 0.02,
                coverage: BLOB_A.coverage + 3.0,
            },
            ClusterCentroid {
                maf: BLOB_B.maf + 0.02,
                coverage: BLOB_B.coverage - 3.0,
            },
        ]
    }

    fn assert_within_fraction(value: f64, expected: f64, fraction: f64) {
        assert!(
            (value - expected).abs() <= expected.abs() * fraction,
            "value: {value} expected: {expected}"
        );
    }

    #[test]
    fn test_two_blob_direct_fit() {
        let mut points = get_two_blob_points(25, 11);
        let centroids = get_perturbed_centroids();
        let params = get_params();

        let initial_likelihood = GaussianMixtureModel::from_centroids(&centroids, &params)
            .log_likelihood(&points)
            .unwrap();

        let fit = fit_gaussian_mixture(&mut points, &centroids, &params);
        let fit = fit.fitted().unwrap();

        assert_eq!(fit.components.len(), 2);
        for (component, blob) in fit.components.iter().zip([&BLOB_A, &BLOB_B]) {
            assert_within_fraction(component.mean[0], blob.maf, 0.1);
            assert_within_fraction(component.mean[1], blob.coverage, 0.1);
            approx::assert_abs_diff_eq!(component.weight, 0.5, epsilon = 0.01);
        }
        assert!(fit.log_likelihood > initial_likelihood);
        assert!(fit.iterations <= MAX_DIRECT_EM_ITERATIONS);
        assert_eq!(fit.likelihood_trace.len(), fit.iterations);
        assert!(fit.bic.is_finite());

        // Every segment is assigned to the component of its own blob
        for (i, point) in points.iter().enumerate() {
            let expected_index = if i < 25 { 0 } else { 1 };
            assert_eq!(
                point.mixture_assignment,
                Some(MixtureAssignment::Component(expected_index))
            );
            assert_eq!(point.posterior_probs.len(), 2);
        }
    }

    #[test]
    fn test_likelihood_trace_is_nearly_monotonic() {
        let mut points = get_two_blob_points(25, 13);
        let fit = fit_gaussian_mixture(&mut points, &get_perturbed_centroids(), &get_params());
        let fit = fit.fitted().unwrap();
        for pair in fit.likelihood_trace.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-3, "trace: {:?}", fit.likelihood_trace);
        }
    }

    #[test]
    fn test_em_step_invariants() {
        let mut points = get_two_blob_points(25, 17);
        let mut model = GaussianMixtureModel::from_centroids(&get_perturbed_centroids(), &get_params());
        for _ in 0..5 {
            model.compute_posterior_probs(&mut points).unwrap();
            model.update_weights(&points).unwrap();
            let weight_sum = model.components.iter().map(|x| x.weight).sum::<f64>();
            approx::assert_abs_diff_eq!(weight_sum, 1.0, epsilon = 1e-6);

            model.update_means(&points);
            model.update_covariances(&points).unwrap();
            for component in model.components.iter() {
                assert!(is_positive_semidefinite(&component.covariance));
                assert!(component.covariance[0][0] >= COVARIANCE_FLOOR);
                assert!(component.covariance[1][1] >= COVARIANCE_FLOOR);
            }
        }
    }

    #[test]
    fn test_fit_posteriors_are_idempotent() {
        let mut points = get_two_blob_points(25, 19);
        let params = get_params();
        let fit = fit_gaussian_mixture(&mut points, &get_perturbed_centroids(), &params);
        let model =
            GaussianMixtureModel::from_components(fit.fitted().unwrap().components.clone(), &params);

        for point in points.iter() {
            let (probs, best_index) = model.posterior_probs(point.maf, point.coverage).unwrap();
            assert_eq!(
                point.mixture_assignment,
                Some(MixtureAssignment::Component(best_index))
            );
            assert_eq!(probs, point.posterior_probs);
        }
    }

    #[test]
    fn test_all_points_knn_excluded() {
        let mut points = get_two_blob_points(10, 23)
            .into_iter()
            .map(|x| x.with_knn_distance(5.0))
            .collect::<Vec<_>>();
        let params = MixtureFitParams {
            knn_cutoff: 1.0,
            ..get_params()
        };
        let fit = fit_gaussian_mixture(&mut points, &get_perturbed_centroids(), &params);
        match fit {
            MixtureFit::Failed { log_likelihood, .. } => assert_eq!(log_likelihood, None),
            MixtureFit::Fitted(_) => panic!("Fit should fail without informative segments"),
        }
        assert!(
            points
                .iter()
                .all(|x| x.mixture_assignment == Some(MixtureAssignment::Outlier))
        );
    }

    #[test]
    fn test_no_centroids() {
        let mut points = get_two_blob_points(10, 29);
        let fit = fit_gaussian_mixture(&mut points, &[], &get_params());
        assert!(fit.fitted().is_none());
    }

    #[test]
    fn test_unknown_maf_points_do_not_change_weights() {
        let params = get_params();
        let centroids = get_perturbed_centroids();

        let mut points = get_two_blob_points(25, 31);
        let mut model = GaussianMixtureModel::from_centroids(&centroids, &params);
        model.compute_posterior_probs(&mut points).unwrap();
        model.update_weights(&points).unwrap();

        let mut points_with_unknown = get_two_blob_points(25, 31);
        for coverage in [20.0, 40.0, 40.0, 40.0, 80.0] {
            points_with_unknown.push(SegmentPoint::new(coverage, None, 10.0));
        }
        let mut model_with_unknown = GaussianMixtureModel::from_centroids(&centroids, &params);
        model_with_unknown
            .compute_posterior_probs(&mut points_with_unknown)
            .unwrap();
        model_with_unknown.update_weights(&points_with_unknown).unwrap();

        assert_eq!(model.components, model_with_unknown.components);

        // Unknown MAF segments still get a coverage-based assignment
        let point = points_with_unknown.last().unwrap();
        assert!(matches!(
            point.mixture_assignment,
            Some(MixtureAssignment::Component(1))
        ));
    }

    #[test]
    fn test_unknown_maf_likelihood_contribution() {
        let params = get_params();
        let mut model = GaussianMixtureModel::from_centroids(&get_perturbed_centroids(), &params);
        for component in model.components.iter_mut() {
            component.weight = 0.25;
        }
        let points = vec![
            SegmentPoint::new(40.0, None, 1.0),
            SegmentPoint::new(40.0, None, 3.0),
        ];
        let likelihood = model.log_likelihood(&points).unwrap();
        approx::assert_abs_diff_eq!(likelihood, 0.5f64.ln(), epsilon = 1e-12);
    }

    /// Segments along a line of positive slope in (MAF, coverage), with alternating MAF jitter
    fn get_correlated_points() -> Vec<SegmentPoint> {
        (40..=60)
            .map(|coverage| {
                let coverage = coverage as f64;
                let jitter = if coverage as i32 % 2 == 0 { 0.005 } else { -0.005 };
                let maf = 0.3 + 0.001 * (coverage - 50.0) + jitter;
                SegmentPoint::new(coverage, Some(maf), 1.0)
            })
            .collect()
    }

    #[test]
    fn test_covariance_axes() {
        let centroids = vec![ClusterCentroid {
            maf: 0.3,
            coverage: 50.0,
        }];

        let mut points = get_correlated_points();
        let fit = fit_gaussian_mixture(&mut points, &centroids, &get_params());
        let component = &fit.fitted().unwrap().components[0];
        assert_eq!(component.covariance[0][1], 0.0);
        assert_eq!(component.covariance[1][0], 0.0);

        let params = MixtureFitParams {
            uncorrelated_axes: false,
            ..get_params()
        };
        let mut points = get_correlated_points();
        let fit = fit_gaussian_mixture(&mut points, &centroids, &params);
        let component = &fit.fitted().unwrap().components[0];
        assert!(component.covariance[0][1] > 0.0);
        assert_eq!(component.covariance[0][1], component.covariance[1][0]);
        assert!(is_positive_semidefinite(&component.covariance));
    }

    #[test]
    fn test_two_segment_component_with_correlated_axes() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(41);
        let mut points = get_blob_points(&BLOB_A, 25, &mut rng);
        points.push(SegmentPoint::new(60.0, Some(0.25), 1.0));
        points.push(SegmentPoint::new(62.0, Some(0.27), 1.0));

        let centroids = vec![
            ClusterCentroid {
                maf: 0.45,
                coverage: 40.0,
            },
            ClusterCentroid {
                maf: 0.26,
                coverage: 61.0,
            },
        ];
        let params = MixtureFitParams {
            uncorrelated_axes: false,
            ..get_params()
        };

        // The two-segment component has a singular covariance estimate, which is reset instead of
        // failing the fit
        let fit = fit_gaussian_mixture(&mut points, &centroids, &params);
        let fit = match fit {
            MixtureFit::Fitted(x) => x,
            MixtureFit::Failed { message, .. } => panic!("Unexpected fit failure: {message}"),
        };
        for component in fit.components.iter() {
            assert!(get_determinant(&component.covariance) > 0.0);
        }
        for point in points.iter().skip(25) {
            assert_eq!(
                point.mixture_assignment,
                Some(MixtureAssignment::Component(1))
            );
        }
    }

    fn get_pairwise_test_model(narrow_covariance: Covariance) -> GaussianMixtureModel {
        let components = vec![
            MixtureComponent {
                weight: 0.5,
                mean: [0.3, 50.0],
                covariance: [[1.0, 0.0], [0.0, 1.0]],
            },
            MixtureComponent {
                weight: 0.5,
                mean: [0.3, 51.0],
                covariance: narrow_covariance,
            },
        ];
        GaussianMixtureModel::from_components(components, &get_params())
    }

    #[test]
    fn test_scale_covariances_pairwise() {
        let mut model = get_pairwise_test_model([[0.1, 0.0], [0.0, 1.0]]);
        model.scale_covariances_pairwise().unwrap();

        // Both components select each other, so the scaling is applied twice
        let broad = &model.components[0].covariance;
        let narrow = &model.components[1].covariance;
        approx::assert_abs_diff_eq!(broad[0][0], 0.64, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(broad[1][1], 0.64, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(narrow[0][0], 0.121, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(narrow[1][1], 1.21, epsilon = 1e-12);
    }

    #[test]
    fn test_scale_covariances_pairwise_skipped() {
        // Determinant ratio too small
        let narrow_covariance = [[0.5, 0.0], [0.0, 1.0]];
        let mut model = get_pairwise_test_model(narrow_covariance);
        model.scale_covariances_pairwise().unwrap();
        assert_eq!(model.components[1].covariance, narrow_covariance);

        // Degenerate determinant
        let narrow_covariance = [[1e-8, 0.0], [0.0, 1.0]];
        let mut model = get_pairwise_test_model(narrow_covariance);
        model.scale_covariances_pairwise().unwrap();
        assert_eq!(model.components[1].covariance, narrow_covariance);
    }

    #[test]
    fn test_bic_parameter_count() {
        let component = |covariance| MixtureComponent {
            weight: 0.5,
            mean: [0.3, 50.0],
            covariance,
        };
        let full = component([[1.0, 0.5], [0.5, 1.0]]);
        let uncorrelated = component([[1.0, 0.0], [0.0, 1.0]]);
        let degenerate = component([[COVARIANCE_FLOOR, 0.0], [0.0, 1.0]]);
        assert_eq!(get_bic_parameter_count(&[&full]), 6);
        assert_eq!(get_bic_parameter_count(&[&uncorrelated]), 5);
        assert_eq!(get_bic_parameter_count(&[&degenerate]), 3);
        assert_eq!(
            get_bic_parameter_count(&[&full, &uncorrelated, &degenerate]),
            14
        );
    }

    #[test]
    fn test_two_pass_fit() {
        let mut points = get_two_blob_points(25, 37);
        let params = MixtureFitParams {
            two_pass_mean_freeze: true,
            ..get_params()
        };
        let fit = fit_gaussian_mixture(&mut points, &get_perturbed_centroids(), &params);
        let fit = fit.fitted().unwrap();

        assert!(fit.iterations <= 2 * MAX_TWO_PASS_EM_ITERATIONS);
        assert_eq!(fit.likelihood_trace.len(), fit.iterations);

        // The second pass runs at the empirical means of the first pass, which are close to the true
        // blob centers even though the seeds were offset
        for (component, blob) in fit.components.iter().zip([&BLOB_A, &BLOB_B]) {
            assert_within_fraction(component.mean[0], blob.maf, 0.1);
            assert_within_fraction(component.mean[1], blob.coverage, 0.1);
        }
    }

    #[test]
    fn test_posterior_probs() {
        let model = get_pairwise_test_model([[1.0, 0.0], [0.0, 1.0]]);
        let (probs, _) = model.posterior_probs(Some(0.3), 50.5).unwrap();
        approx::assert_ulps_eq!(probs[0], 0.5, max_ulps = 4);
        approx::assert_ulps_eq!(probs[1], 0.5, max_ulps = 4);

        let (probs, best_index) = model.posterior_probs(None, 45.0).unwrap();
        assert_eq!(best_index, 0);
        assert!(probs[0] > probs[1]);
        approx::assert_abs_diff_eq!(probs.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }
}
