//! Genome segment summaries as points in (coverage, minor allele frequency) space
//!

use serde::{Deserialize, Serialize};

use crate::prob_utils::{error_prob_to_qphred, get_complement_prob};

/// Density-peak cluster label assigned to a segment
///
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum ClusterId {
    /// Not confidently assigned to any cluster
    #[default]
    Outlier,

    /// 1-based cluster id, numbered in centroid discovery order along the density ranking
    Cluster(usize),
}

impl ClusterId {
    /// Index of the mixture component seeded from this cluster
    pub fn component_index(&self) -> Option<usize> {
        match self {
            ClusterId::Outlier => None,
            ClusterId::Cluster(id) => Some(id - 1),
        }
    }

    pub fn is_outlier(&self) -> bool {
        *self == ClusterId::Outlier
    }
}

/// Best mixture component for a segment after the final E-step
///
/// This is a summary label only, the M-step works from the full posterior distribution.
///
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum MixtureAssignment {
    /// Excluded from the mixture fit by the nearest-neighbour distance cutoff
    Outlier,

    /// 0-based mixture component index
    Component(usize),
}

/// One genome segment summarized for clustering
///
/// Segments represent different numbers of underlying observations, which is reflected in `weight`.
///
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SegmentPoint {
    /// Mean coverage of the segment, in input units
    pub coverage: f64,

    /// Minor allele frequency in [0, 0.5], or None if no informative variants were found in the segment
    pub maf: Option<f64>,

    pub weight: f64,

    /// Nearest-neighbour distance supplied by the caller, if any
    pub knn_distance: Option<f64>,

    pub cluster_id: ClusterId,

    pub mixture_assignment: Option<MixtureAssignment>,

    /// Posterior probability of each mixture component, indexed by component
    pub posterior_probs: Vec<f64>,
}

impl SegmentPoint {
    pub fn new(coverage: f64, maf: Option<f64>, weight: f64) -> Self {
        Self {
            coverage,
            maf,
            weight,
            knn_distance: None,
            cluster_id: ClusterId::Outlier,
            mixture_assignment: None,
            posterior_probs: Vec::new(),
        }
    }

    pub fn with_knn_distance(mut self, knn_distance: f64) -> Self {
        self.knn_distance = Some(knn_distance);
        self
    }

    pub fn has_maf(&self) -> bool {
        self.maf.is_some()
    }

    /// True if the segment's nearest-neighbour distance is known and larger than `knn_cutoff`
    pub fn exceeds_knn_cutoff(&self, knn_cutoff: f64) -> bool {
        matches!(self.knn_distance, Some(x) if x > knn_cutoff)
    }

    /// True if the segment contributes to mixture model parameter updates
    pub fn is_mixture_informative(&self, knn_cutoff: f64) -> bool {
        self.has_maf() && !self.exceeds_knn_cutoff(knn_cutoff)
    }

    /// Phred-scaled probability that the best mixture component assignment is wrong
    ///
    /// Returns None if the segment has no mixture component assignment.
    ///
    pub fn assignment_qual(&self) -> Option<i32> {
        match self.mixture_assignment {
            Some(MixtureAssignment::Component(index)) if index < self.posterior_probs.len() => {
                let error_prob = get_complement_prob(&self.posterior_probs, index);
                Some(error_prob_to_qphred(error_prob))
            }
            _ => None,
        }
    }
}
