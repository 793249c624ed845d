use std::iter::Sum;

use num::{Float, NumCast};

pub fn error_prob_to_phred(prob: f64) -> f64 {
    -10f64 * prob.log10().max(f64::MIN_10_EXP as f64)
}

pub fn error_prob_to_qphred(prob: f64) -> i32 {
    error_prob_to_phred(prob).round() as i32
}

/// Standardize ln-transformed unnormalized prob distro input
///
/// Returns the index of the most probable component, or None if the input is empty or no
/// component has non-zero probability.
///
pub fn normalize_ln_distro<F: Float>(x: &mut [F]) -> Option<usize> {
    let mut max_index = 0;
    let mut max_p = *x.first()?;
    for (index, p) in x.iter().skip(1).enumerate() {
        if *p > max_p {
            max_p = *p;
            max_index = index + 1;
        }
    }

    if max_p == F::neg_infinity() || max_p.is_nan() {
        return None;
    }

    let mut sum = NumCast::from(0).unwrap();
    for p in x.iter_mut() {
        *p = (*p - max_p).exp();
        sum = sum + *p;
    }

    for p in x.iter_mut() {
        *p = *p / sum;
    }

    Some(max_index)
}

/// Get ln(sum(exp(x))) without leaving log space
///
/// Returns -inf for empty input or when every term is -inf.
///
pub fn ln_sum_exp<F: Float>(x: &[F]) -> F {
    let max_p = x.iter().copied().fold(F::neg_infinity(), F::max);
    if max_p == F::neg_infinity() {
        return max_p;
    }
    let sum = x
        .iter()
        .fold(F::zero(), |sum, &p| sum + (p - max_p).exp());
    max_p + sum.ln()
}

/// Get the complement of pdf[index] from a normalized prob distro
///
/// As pdf[index] approaches 1, computing the complement as 1 - pdf[index] starts to significantly
/// degrade precision. Instead the value is found by summing the rest of the pdf.
///
pub fn get_complement_prob<F: Float + Sum<F>>(pdf: &[F], index: usize) -> F {
    pdf.iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, p)| *p)
        .sum()
}
