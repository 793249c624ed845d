//! Synthetic segment populations shared by unit tests
//!

use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_xoshiro::Xoshiro256StarStar;

use crate::segment_point::SegmentPoint;

/// Location and spread of one synthetic blob of segments
pub struct BlobSpec {
    pub maf: f64,
    pub maf_sd: f64,
    pub coverage: f64,
    pub coverage_sd: f64,
}

pub const BLOB_A: BlobSpec = BlobSpec {
    maf: 0.45,
    maf_sd: 0.01,
    coverage: 40.0,
    coverage_sd: 1.0,
};

pub const BLOB_B: BlobSpec = BlobSpec {
    maf: 0.25,
    maf_sd: 0.01,
    coverage: 60.0,
    coverage_sd: 1.0,
};

pub fn get_blob_points(
    blob: &BlobSpec,
    point_count: usize,
    rng: &mut Xoshiro256StarStar,
) -> Vec<SegmentPoint> {
    let maf_distro = Normal::new(blob.maf, blob.maf_sd).unwrap();
    let coverage_distro = Normal::new(blob.coverage, blob.coverage_sd).unwrap();
    (0..point_count)
        .map(|_| {
            let maf = maf_distro.sample(rng).clamp(0.0, 0.5);
            let coverage = coverage_distro.sample(rng);
            SegmentPoint::new(coverage, Some(maf), 1.0)
        })
        .collect()
}

/// `blob_size` points from `BLOB_A` followed by `blob_size` points from `BLOB_B`
pub fn get_two_blob_points(blob_size: usize, seed: u64) -> Vec<SegmentPoint> {
    let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
    let mut points = get_blob_points(&BLOB_A, blob_size, &mut rng);
    points.extend(get_blob_points(&BLOB_B, blob_size, &mut rng));
    points
}
