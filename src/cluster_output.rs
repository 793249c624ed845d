//! Write per-sample segment clustering results
//!

use std::fs::File;
use std::io::{BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use serde::{Deserialize, Serialize};
use unwrap::unwrap;

use crate::filenames::{
    CLUSTER_RESULT_FILENAME, CLUSTER_RESULT_MESSAGEPACK_FILENAME, MIXTURE_MODEL_FILENAME,
};
use crate::gaussian_mixture::MixtureComponent;
use crate::genotype_assigner::GenotypeClusteringResult;
use crate::segment_input::SampleSegments;
use crate::segment_point::{ClusterId, MixtureAssignment, SegmentPoint};

/// Clustering and mixture assignment details for one input segment
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SegmentCallOutput {
    pub chrom: Option<String>,
    pub begin: Option<i64>,
    pub end: Option<i64>,
    pub coverage: f64,
    pub maf: Option<f64>,
    pub weight: f64,
    pub cluster_id: ClusterId,
    pub mixture_assignment: Option<MixtureAssignment>,

    /// Posterior probability of each mixture component, empty if the mixture fit is not available
    pub posterior_probs: Vec<f64>,

    /// Phred-scaled error probability of the mixture assignment
    pub assignment_qual: Option<i32>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SampleClusterOutput {
    pub sample_name: String,
    pub result: GenotypeClusteringResult,
    pub segments: Vec<SegmentCallOutput>,
}

impl SampleClusterOutput {
    /// Combine the input segments with their final clustering state
    ///
    /// Mixture results are only reported for segments if the mixture fit succeeded.
    ///
    pub fn new(
        sample: &SampleSegments,
        points: &[SegmentPoint],
        result: GenotypeClusteringResult,
    ) -> Self {
        assert_eq!(sample.segments.len(), points.len());

        let is_mixture_fitted = matches!(&result.mixture, Some(x) if x.fitted().is_some());

        let segments = sample
            .segments
            .iter()
            .zip(points.iter())
            .map(|(segment, point)| {
                let (mixture_assignment, posterior_probs, assignment_qual) = if is_mixture_fitted {
                    (
                        point.mixture_assignment,
                        point.posterior_probs.clone(),
                        point.assignment_qual(),
                    )
                } else {
                    (None, Vec::new(), None)
                };
                SegmentCallOutput {
                    chrom: segment.chrom.clone(),
                    begin: segment.begin,
                    end: segment.end,
                    coverage: point.coverage,
                    maf: point.maf,
                    weight: point.weight,
                    cluster_id: point.cluster_id,
                    mixture_assignment,
                    posterior_probs,
                    assignment_qual,
                }
            })
            .collect();

        Self {
            sample_name: sample.sample_name.clone(),
            result,
            segments,
        }
    }

    fn fitted_components(&self) -> Option<&[MixtureComponent]> {
        self.result
            .mixture
            .as_ref()
            .and_then(|x| x.fitted())
            .map(|x| x.components.as_slice())
    }
}

pub fn get_sample_output_dir(
    output_dir: &Utf8Path,
    sample_index: usize,
    sample_name: &str,
) -> Utf8PathBuf {
    let sample_label = format!("sample{:04}_{}", sample_index + 1, sample_name);

    output_dir.join("samples").join(sample_label)
}

fn format_optional_value(x: Option<f64>) -> String {
    match x {
        Some(x) => x.to_string(),
        None => "NA".to_string(),
    }
}

/// Write mixture model components followed by the posterior probabilities of each segment
///
fn write_mixture_model_table<W: Write>(
    writer: &mut W,
    components: &[MixtureComponent],
    segments: &[SegmentCallOutput],
) -> std::io::Result<()> {
    writeln!(
        writer,
        "component\tweight\tmean_maf\tmean_coverage\tcov_maf_maf\tcov_maf_coverage\tcov_coverage_maf\tcov_coverage_coverage"
    )?;
    for (index, component) in components.iter().enumerate() {
        let cov = &component.covariance;
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            index + 1,
            component.weight,
            component.mean[0],
            component.mean[1],
            cov[0][0],
            cov[0][1],
            cov[1][0],
            cov[1][1]
        )?;
    }

    writeln!(writer)?;
    write!(writer, "maf\tcoverage")?;
    for index in 0..components.len() {
        write!(writer, "\tposterior_prob_{}", index + 1)?;
    }
    writeln!(writer)?;

    for segment in segments {
        write!(
            writer,
            "{}\t{}",
            format_optional_value(segment.maf),
            segment.coverage
        )?;
        if segment.posterior_probs.is_empty() {
            for _ in 0..components.len() {
                write!(writer, "\tNA")?;
            }
        } else {
            for prob in segment.posterior_probs.iter() {
                write!(writer, "\t{prob}")?;
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}

fn write_cluster_result_json(sample_dir: &Utf8Path, output: &SampleClusterOutput) {
    let filename = sample_dir.join(CLUSTER_RESULT_FILENAME);
    info!("Writing cluster result to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create cluster result json file: '{filename}'"
    );
    unwrap!(
        serde_json::to_writer_pretty(&f, output),
        "Unable to write cluster result json file: '{filename}'"
    );
}

fn write_mixture_model_tsv(
    sample_dir: &Utf8Path,
    components: &[MixtureComponent],
    segments: &[SegmentCallOutput],
) {
    let filename = sample_dir.join(MIXTURE_MODEL_FILENAME);
    info!("Writing mixture model to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create mixture model file: '{filename}'"
    );
    let mut writer = BufWriter::new(f);
    unwrap!(
        write_mixture_model_table(&mut writer, components, segments),
        "Unable to write mixture model file: '{filename}'"
    );
}

fn serialize_sample_cluster_output_to_buffer(output: &SampleClusterOutput) -> Vec<u8> {
    let mut buf = Vec::new();
    output
        .serialize(&mut rmp_serde::Serializer::new(&mut buf))
        .unwrap();
    buf
}

fn serialize_sample_cluster_output(sample_dir: &Utf8Path, output: &SampleClusterOutput) {
    let buf = serialize_sample_cluster_output_to_buffer(output);

    let filename = sample_dir.join(CLUSTER_RESULT_MESSAGEPACK_FILENAME);
    info!("Writing cluster result to binary file: '{filename}'");

    unwrap!(
        std::fs::write(&filename, buf.as_slice()),
        "Unable to open and write cluster result to binary file: '{filename}'"
    );
}

/// Write all output files for one sample into `sample_dir`
///
/// The mixture model table is only written when the mixture fit succeeded.
///
pub fn write_sample_cluster_output(sample_dir: &Utf8Path, output: &SampleClusterOutput) {
    write_cluster_result_json(sample_dir, output);
    if let Some(components) = output.fitted_components() {
        write_mixture_model_tsv(sample_dir, components, &output.segments);
    }
    serialize_sample_cluster_output(sample_dir, output);
}
