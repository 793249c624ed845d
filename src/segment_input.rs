//! Read segment summaries for one or more samples
//!

use std::fs::File;
use std::io::BufReader;

use camino::Utf8Path;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};
use thousands::Separable;
use unwrap::unwrap;

use crate::segment_point::SegmentPoint;

fn default_weight() -> f64 {
    1.0
}

/// One segment record from the input file
///
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SegmentRecord {
    #[serde(default)]
    pub chrom: Option<String>,

    #[serde(default)]
    pub begin: Option<i64>,

    #[serde(default)]
    pub end: Option<i64>,

    pub coverage: f64,

    /// Minor allele frequency, any negative value is treated as unknown
    pub maf: Option<f64>,

    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(default)]
    pub knn_distance: Option<f64>,
}

impl SegmentRecord {
    pub fn to_segment_point(&self) -> SegmentPoint {
        let maf = self.maf.filter(|&x| x >= 0.0);
        let point = SegmentPoint::new(self.coverage, maf, self.weight);
        match self.knn_distance {
            Some(x) => point.with_knn_distance(x),
            None => point,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SampleSegments {
    pub sample_name: String,
    pub segments: Vec<SegmentRecord>,
}

impl SampleSegments {
    pub fn get_segment_points(&self) -> Vec<SegmentPoint> {
        self.segments.iter().map(|x| x.to_segment_point()).collect()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SegmentInputFile {
    pub samples: Vec<SampleSegments>,
}

pub fn read_segment_input(filename: &Utf8Path) -> SegmentInputFile {
    info!("Reading segment input from file: '{filename}'");

    let file = unwrap!(
        File::open(filename),
        "Unable to open segment input json file: '{filename}'"
    );
    let reader = BufReader::new(file);
    let input: SegmentInputFile = unwrap!(
        serde_json::from_reader(reader),
        "Unable to parse segment input from json file: '{filename}'"
    );

    let segment_count = input.samples.iter().map(|x| x.segments.len()).sum::<usize>();
    info!(
        "Read {} segments from {} samples",
        segment_count.separate_with_commas(),
        input.samples.len()
    );
    input
}

/// Get the factor used to scale coverage so that coverage and MAF differences are commensurable
///
/// This is the coverage weighting divided by the median segment coverage. If the median coverage is
/// not positive, the weighting is used as the factor directly.
///
pub fn get_coverage_weighting_factor(coverage_weighting: f64, points: &[SegmentPoint]) -> f64 {
    let median_coverage = if points.is_empty() {
        0.0
    } else {
        Data::new(points.iter().map(|x| x.coverage).collect::<Vec<_>>()).median()
    };

    if median_coverage > 0.0 {
        coverage_weighting / median_coverage
    } else {
        warn!(
            "Median segment coverage is {median_coverage}, using coverage weighting {coverage_weighting} as the coverage weighting factor"
        );
        coverage_weighting
    }
}
