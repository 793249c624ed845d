use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail, try_with};
use statrs::distribution::{Continuous, Normal};

/// 2x2 covariance matrix over (MAF, coverage)
pub type Covariance = [[f64; 2]; 2];

/// Lower bound applied to each covariance diagonal entry after an update
pub const COVARIANCE_FLOOR: f64 = 1e-7;

/// Covariance used to initialize a component, and to replace any covariance which is not positive
/// semi-definite
///
/// The coverage variance is scaled so that the two axes have the same variance once coverage is
/// weighted by `coverage_weighting_factor`.
///
pub fn get_default_covariance(coverage_weighting_factor: f64) -> Covariance {
    [
        [0.01, 0.0],
        [
            0.0,
            0.01 / (coverage_weighting_factor * coverage_weighting_factor),
        ],
    ]
}

pub fn get_determinant(cov: &Covariance) -> f64 {
    cov[0][0] * cov[1][1] - cov[0][1] * cov[1][0]
}

/// Eigenvalues of a symmetric 2x2 matrix, largest first
///
/// A negative discriminant can only come from rounding error, so it is treated as zero.
///
pub fn get_symmetric_eigenvalues(cov: &Covariance) -> [f64; 2] {
    let b = -(cov[0][0] + cov[1][1]);
    let c = cov[0][0] * cov[1][1] - cov[0][1] * cov[0][1];
    let d = (b * b - 4.0 * c).max(0.0).sqrt();
    [(-b + d) / 2.0, (-b - d) / 2.0]
}

pub fn is_positive_semidefinite(cov: &Covariance) -> bool {
    get_symmetric_eigenvalues(cov).iter().all(|&x| x >= 0.0)
}

/// True if the covariance can be inverted for a density evaluation
///
/// A rank-1 covariance, such as one estimated from two segments, is semi-definite but not definite.
///
pub fn is_positive_definite(cov: &Covariance) -> bool {
    get_symmetric_eigenvalues(cov)[1] > 0.0 && get_determinant(cov) > 0.0
}

pub fn scale_covariance(cov: &mut Covariance, scale: f64) {
    for row in cov.iter_mut() {
        for val in row.iter_mut() {
            *val *= scale;
        }
    }
}

/// ln of the bivariate normal density at `x`
///
fn get_bivariate_normal_ln_pdf(x: [f64; 2], mean: &[f64; 2], cov: &Covariance) -> SimpleResult<f64> {
    let det = get_determinant(cov);
    if det.is_nan() || det <= 0.0 || det.is_infinite() {
        bail!("Covariance matrix determinant is not positive: {det}");
    }

    let diff0 = x[0] - mean[0];
    let diff1 = x[1] - mean[1];
    let q = (cov[1][1] * diff0 * diff0 - (cov[0][1] + cov[1][0]) * diff0 * diff1
        + cov[0][0] * diff1 * diff1)
        / det;
    let ln_pdf = -(2.0 * PI).ln() - 0.5 * det.ln() - 0.5 * q;
    if ln_pdf.is_nan() {
        bail!("Bivariate normal density is undefined at ({}, {})", x[0], x[1]);
    }
    Ok(ln_pdf)
}

/// ln of the 1-D normal density of coverage only, used when MAF is unknown
///
fn get_coverage_ln_pdf(coverage: f64, mean: f64, variance: f64) -> SimpleResult<f64> {
    let distro = try_with!(
        Normal::new(mean, variance.sqrt()),
        "Invalid coverage distribution with mean {mean} and variance {variance}"
    );
    Ok(distro.ln_pdf(coverage))
}

/// One 2-D Gaussian component of the segment mixture model
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MixtureComponent {
    /// Mixture weight
    pub weight: f64,

    /// Mean as (MAF, coverage)
    pub mean: [f64; 2],

    pub covariance: Covariance,
}

impl MixtureComponent {
    /// ln of the component density (without mixture weight) at the given segment location
    ///
    /// With unknown MAF, only the coverage marginal is evaluated.
    ///
    pub fn ln_density(&self, maf: Option<f64>, coverage: f64) -> SimpleResult<f64> {
        match maf {
            Some(maf) => get_bivariate_normal_ln_pdf([maf, coverage], &self.mean, &self.covariance),
            None => get_coverage_ln_pdf(coverage, self.mean[1], self.covariance[1][1]),
        }
    }

    /// ln of the mixture weight times the component density
    pub fn ln_weighted_density(&self, maf: Option<f64>, coverage: f64) -> SimpleResult<f64> {
        Ok(self.weight.ln() + self.ln_density(maf, coverage)?)
    }
}
