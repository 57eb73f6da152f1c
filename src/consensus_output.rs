//! Write consensus breakpoint records to VCF/BCF output
//!

use std::collections::HashMap;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use log::{debug, info};
use rust_htslib::bcf::{self, record::GenotypeAllele};
use simple_error::{SimpleError, SimpleResult};
use tempfile::NamedTempFile;

use crate::consensus::ConsensusRecord;
use crate::merge_context::MergeContext;
use crate::vcf_utils;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum OutputType {
    /// Uncompressed VCF
    #[default]
    #[value(name = "v")]
    Vcf,

    /// Bgzip compressed VCF
    #[value(name = "z")]
    CompressedVcf,

    /// Compressed BCF
    #[value(name = "b")]
    Bcf,

    /// Uncompressed BCF
    #[value(name = "u")]
    UncompressedBcf,
}

impl OutputType {
    /// Infer the output type from an output filename extension, defaulting to uncompressed VCF
    pub fn from_path_extension(path: &Utf8Path) -> Self {
        let path_lower = path.as_str().to_lowercase();
        match path_lower.as_str() {
            s if s.ends_with(".vcf.gz") || s.ends_with(".vcf.bgz") => Self::CompressedVcf,
            s if s.ends_with(".bcf") || s.ends_with(".bcf.gz") => Self::Bcf,
            _ => Self::Vcf,
        }
    }

    /// Return true for the output types which can be indexed
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::CompressedVcf | Self::Bcf)
    }

    fn htslib_format(&self) -> (bool, bcf::Format) {
        match self {
            Self::Vcf => (true, bcf::Format::Vcf),
            Self::CompressedVcf => (false, bcf::Format::Vcf),
            Self::Bcf => (false, bcf::Format::Bcf),
            Self::UncompressedBcf => (true, bcf::Format::Bcf),
        }
    }
}

fn get_consensus_vcf_header(context: &MergeContext, sample_names: &[&str]) -> bcf::Header {
    let mut header = vcf_utils::get_basic_vcf_header(&context.chrom_list, sample_names);

    let records: Vec<&[u8]> = vec![
        br#"##ALT=<ID=BND,Description="Clustered breakpoint">"#,
        br#"##FILTER=<ID=PASS,Description="All filters passed">"#,
        br#"##INFO=<ID=END,Number=1,Type=Integer,Description="End position of the breakpoint cluster">"#,
        br#"##INFO=<ID=AC,Number=A,Type=Integer,Description="Number of distinct samples supporting the breakpoint cluster">"#,
        br#"##INFO=<ID=AN,Number=1,Type=Integer,Description="Total number of alleles in called genotypes">"#,
        br#"##INFO=<ID=AF,Number=A,Type=Float,Description="Allele frequency, AC/AN">"#,
        br#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Genotype">"#,
    ];

    for record in records {
        header.push_record(record);
    }

    header
}

/// Writes consensus records to a VCF/BCF file or stdout
///
/// File output is written to a temporary file in the output directory, and only moved to the
/// requested output path by `finish`, so a failed run leaves no partial output file.
///
pub struct ConsensusVcfWriter {
    writer: bcf::Writer,

    /// Temporary output file and the final path it is moved to
    output_file: Option<(NamedTempFile, Utf8PathBuf)>,

    /// Output sample column of each sample name
    sample_name_to_column: HashMap<String, usize>,

    record_count: usize,
}

impl ConsensusVcfWriter {
    /// # Arguments
    /// * `output` - Output filename, or None to write to stdout
    ///
    pub fn new(
        output: Option<&Utf8Path>,
        output_type: OutputType,
        context: &MergeContext,
    ) -> SimpleResult<Self> {
        let samples = &context.samples;
        let mut sample_names = samples.names().iter().map(|x| x.as_str()).collect::<Vec<_>>();
        sample_names.sort();

        let sample_name_to_column = sample_names
            .iter()
            .enumerate()
            .map(|(column_index, &x)| (x.to_string(), column_index))
            .collect();
        let header = get_consensus_vcf_header(context, &sample_names);

        debug!("Output type: {output_type:?}");
        let (is_uncompressed, format) = output_type.htslib_format();
        let (writer, output_file) = match output {
            Some(output) => {
                let output_dir = match output.parent() {
                    Some(x) if !x.as_str().is_empty() => x,
                    _ => Utf8Path::new("."),
                };
                let tmp_prefix = format!(".{}.", output.file_name().unwrap_or("output"));
                let mut tmp_builder = tempfile::Builder::new();
                tmp_builder.prefix(&tmp_prefix).suffix(".tmp");

                // Created with the same mode as any new file, subject to the umask
                #[cfg(unix)]
                tmp_builder.permissions(std::fs::Permissions::from_mode(0o666));

                let tmp_file = tmp_builder
                    .tempfile_in(output_dir)
                    .map_err(|e| {
                        SimpleError::with(
                            &format!("Failed to create temporary output file in '{output_dir}'"),
                            e,
                        )
                    })?;
                let writer =
                    bcf::Writer::from_path(tmp_file.path(), &header, is_uncompressed, format)
                        .map_err(|e| {
                            SimpleError::with(
                                &format!("Failed to create output file for '{output}'"),
                                e,
                            )
                        })?;
                (writer, Some((tmp_file, output.to_path_buf())))
            }
            None => {
                let writer = bcf::Writer::from_stdout(&header, is_uncompressed, format)
                    .map_err(|e| SimpleError::with("Failed to create stdout writer", e))?;
                (writer, None)
            }
        };

        Ok(Self {
            writer,
            output_file,
            sample_name_to_column,
            record_count: 0,
        })
    }

    pub fn write(&mut self, consensus: &ConsensusRecord) -> SimpleResult<()> {
        let write_error = |e| SimpleError::with("Failed to write consensus record", e);

        let mut record = self.writer.empty_record();
        record.set_rid(Some(consensus.chrom_index));
        record.set_pos(consensus.start as i64 - 1);
        let alleles: [&[u8]; 2] = [b"N", b"<BND>"];
        record.set_alleles(&alleles).map_err(write_error)?;
        record.push_filter(b"PASS".as_slice()).map_err(write_error)?;

        if consensus.start != consensus.end {
            record
                .push_info_integer(b"END", &[consensus.end])
                .map_err(write_error)?;
        }
        record
            .push_info_integer(b"AC", &[consensus.supporting_sample_count as i32])
            .map_err(write_error)?;
        record
            .push_info_integer(b"AN", &[consensus.allele_slot_count as i32])
            .map_err(write_error)?;
        record
            .push_info_float(b"AF", &[consensus.allele_frequency as f32])
            .map_err(write_error)?;

        let missing_gt = [
            i32::from(GenotypeAllele::UnphasedMissing),
            i32::from(GenotypeAllele::UnphasedMissing),
        ];
        let mut gts = vec![missing_gt; self.sample_name_to_column.len()];
        // Every cluster member carries the breakpoint allele
        for member in consensus.members.iter() {
            let Some(&column_index) = self.sample_name_to_column.get(&member.sample_name) else {
                continue;
            };
            gts[column_index] = [
                i32::from(GenotypeAllele::Unphased(0)),
                i32::from(GenotypeAllele::Unphased(1)),
            ];
        }
        let gts = gts.into_iter().flatten().collect::<Vec<_>>();
        record.push_format_integer(b"GT", &gts).map_err(write_error)?;

        self.writer.write(&record).map_err(write_error)?;
        self.record_count += 1;
        Ok(())
    }

    /// Close the output and move it to the final output path
    ///
    /// Returns the number of records written.
    ///
    pub fn finish(self) -> SimpleResult<usize> {
        let Self {
            writer,
            output_file,
            record_count,
            ..
        } = self;

        // Dropping the writer flushes and closes the htslib file handle
        drop(writer);

        if let Some((tmp_file, output)) = output_file {
            tmp_file.persist(&output).map_err(|e| {
                SimpleError::with(&format!("Failed to move output to '{output}'"), e.error)
            })?;
            info!("Wrote {record_count} consensus records to '{output}'");
        } else {
            info!("Wrote {record_count} consensus records to stdout");
        }
        Ok(record_count)
    }
}
