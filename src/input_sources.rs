//! Scan input variant files and extract their breakpoints
//!
//! All input headers are scanned first, to establish the shared sequence dictionary and the
//! cohort sample table before any breakpoint is extracted.
//!

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use rust_htslib::bcf::{self, Read, record::GenotypeAllele};
use simple_error::{SimpleError, SimpleResult, bail};

use crate::bcf_utils::bcf_chrom_index_map;
use crate::breakpoint::BreakPoint;
use crate::chrom_list::ChromList;
use crate::merge_context::MergeContext;
use crate::sample_table::SampleTable;
use crate::vcf_utils::{
    get_info_integer_values, get_info_string, get_sample_names, open_bcf_reader,
};

/// Sample attribution for the breakpoints of one input file
#[derive(Debug, PartialEq)]
pub enum SourceSamples {
    /// The input has no sample columns, all breakpoints are attributed to this one sample
    SitesOnly(u32),

    /// Sample index of each sample column in the input, in header order
    Genotyped(Vec<u32>),
}

pub struct InputSource {
    pub path: Utf8PathBuf,
    pub samples: SourceSamples,
}

/// Read the header of every input file, building the merge context and the sample attribution
/// of each input
///
/// Fails on the first input with a sequence dictionary which differs from the first input, or
/// with a sample name which was already registered by an earlier input.
///
pub fn scan_input_headers(
    input_paths: &[Utf8PathBuf],
) -> SimpleResult<(MergeContext, Vec<InputSource>)> {
    let mut chrom_list: Option<ChromList> = None;
    let mut samples = SampleTable::default();
    let mut sources = Vec::new();

    for path in input_paths {
        let reader = open_bcf_reader(path.as_str())?;
        let header = reader.header();

        let source_chrom_list = ChromList::from_bcf_header(header).map_err(|e| {
            SimpleError::new(format!("Invalid sequence dictionary in input '{path}': {e}"))
        })?;
        match &chrom_list {
            Some(chrom_list) => {
                if let Some(msg) = chrom_list.describe_mismatch(&source_chrom_list) {
                    bail!(
                        "Sequence dictionary of input '{path}' does not match the first input: {msg}"
                    );
                }
            }
            None => {
                chrom_list = Some(source_chrom_list);
            }
        }

        let sample_names = get_sample_names(header);
        let source_samples = if sample_names.is_empty() {
            SourceSamples::SitesOnly(samples.register(path.as_str(), path.as_str())?)
        } else {
            let sample_indexes = sample_names
                .iter()
                .map(|x| samples.register(x, path.as_str()))
                .collect::<SimpleResult<Vec<_>>>()?;
            SourceSamples::Genotyped(sample_indexes)
        };

        debug!(
            "Scanned header of input '{path}', sample count: {}",
            sample_names.len().max(1)
        );

        sources.push(InputSource {
            path: path.clone(),
            samples: source_samples,
        });
    }

    let Some(chrom_list) = chrom_list else {
        bail!("No input files specified");
    };

    info!(
        "Scanned {} input files with {} total samples over {} contigs",
        sources.len(),
        samples.len(),
        chrom_list.data.len()
    );

    Ok((
        MergeContext {
            chrom_list,
            samples,
        },
        sources,
    ))
}

/// Shift a 1-indexed position by a confidence interval, returning the resulting (start, end)
///
/// Only the first two interval values are used, and a missing value leaves that side unchanged.
///
fn apply_confidence_interval(pos: i64, ci: &[i32]) -> (i64, i64) {
    let mut start = pos;
    let mut end = pos;
    if let Some(&x) = ci.first() {
        start += x as i64;
    }
    if let Some(&x) = ci.get(1) {
        end += x as i64;
    }
    if start > end {
        std::mem::swap(&mut start, &mut end);
    }
    (start, end)
}

/// Get the breakpoint intervals represented by one variant record
///
/// # Arguments
/// * `pos` - 1-indexed record position
/// * `end` - 1-indexed inclusive record end on the reference
/// * `is_bnd` - True if the record is a breakend
/// * `cipos` - CIPOS values of the record
/// * `ciend` - CIEND values of the record
/// * `distance` - Clustering distance, records no longer than this only contribute one interval
///
fn get_breakpoint_intervals(
    pos: i64,
    end: i64,
    is_bnd: bool,
    cipos: &[i32],
    ciend: &[i32],
    distance: u32,
) -> Vec<(i64, i64)> {
    let mut intervals = vec![apply_confidence_interval(pos, cipos)];
    let ref_len = end - pos + 1;
    if !is_bnd && ref_len > distance as i64 {
        intervals.push(apply_confidence_interval(end, ciend));
    }
    intervals
}

/// True unless the genotype is a no-call or homozygous reference
///
/// A partial no-call with a reference allele, such as `0/.`, counts as called.
///
fn is_called_non_ref(alleles: &[GenotypeAllele]) -> bool {
    if alleles.iter().all(|x| x.index().is_none()) {
        return false;
    }
    !alleles.iter().all(|x| x.index() == Some(0))
}

/// Convert an interval to 32 bit coordinates, clipping the start to the first contig position
///
fn get_interval_coordinates(interval: (i64, i64)) -> Option<(i32, i32)> {
    let start = i32::try_from(interval.0.max(1)).ok()?;
    let end = i32::try_from(interval.1).ok()?;
    Some((start, end.max(start)))
}

/// Get the sample index of every sample supporting the breakpoints of this record
///
fn get_supporting_samples(
    record: &bcf::Record,
    source_samples: &SourceSamples,
) -> SimpleResult<Vec<u32>> {
    match source_samples {
        SourceSamples::SitesOnly(sample_index) => Ok(vec![*sample_index]),
        // Each sample is attributed only by its own called non-reference GT, never by file position
        SourceSamples::Genotyped(sample_indexes) => {
            // A record without GT is a no-call for every sample
            match record.format(b"GT").integer() {
                Ok(_) => {}
                Err(
                    rust_htslib::errors::Error::BcfUndefinedTag { .. }
                    | rust_htslib::errors::Error::BcfMissingTag { .. },
                ) => return Ok(Vec::new()),
                Err(e) => return Err(SimpleError::with("Error reading GT field", e)),
            }
            let genotypes = record
                .genotypes()
                .map_err(|e| SimpleError::with("Error reading GT field", e))?;
            Ok(sample_indexes
                .iter()
                .enumerate()
                .filter(|(column_index, _)| is_called_non_ref(&genotypes.get(*column_index)))
                .map(|(_, &sample_index)| sample_index)
                .collect())
        }
    }
}

/// Extract every breakpoint from one input file, in file order
///
/// Returns the number of breakpoints passed to `add_breakpoint`.
///
pub fn extract_source_breakpoints(
    context: &MergeContext,
    source: &InputSource,
    distance: u32,
    mut add_breakpoint: impl FnMut(BreakPoint) -> SimpleResult<()>,
) -> SimpleResult<usize> {
    info!("Reading breakpoints from input '{}'", source.path);

    let mut reader = open_bcf_reader(source.path.as_str())?;
    let rid_to_chrom_index = bcf_chrom_index_map(&context.chrom_list, reader.header())?;

    let mut record_count = 0;
    let mut breakpoint_count = 0;
    for record in reader.records() {
        let record = record.map_err(|e| {
            SimpleError::with(
                &format!("Failed to read record from input '{}'", source.path),
                e,
            )
        })?;
        record_count += 1;

        let record_label = || get_record_label(&record, &source.path);

        let Some(rid) = record.rid() else {
            bail!("Record has no contig: {}", record_label());
        };
        let chrom_index = match rid_to_chrom_index.get(rid as usize) {
            Some(&x) => x,
            None => bail!(
                "Contig not found in the sequence dictionary: {}",
                record_label()
            ),
        };

        let is_bnd = get_info_string(&record, b"SVTYPE")?.as_deref() == Some("BND");
        let cipos = get_info_integer_values(&record, b"CIPOS")?;
        let ciend = get_info_integer_values(&record, b"CIEND")?;
        let intervals = get_breakpoint_intervals(
            record.pos() + 1,
            record.end(),
            is_bnd,
            &cipos,
            &ciend,
            distance,
        );

        let sample_indexes = get_supporting_samples(&record, &source.samples)
            .map_err(|e| SimpleError::new(format!("{e}: {}", record_label())))?;

        for interval in intervals {
            let Some((start, end)) = get_interval_coordinates(interval) else {
                bail!(
                    "Breakpoint interval {}-{} out of range: {}",
                    interval.0,
                    interval.1,
                    record_label()
                );
            };
            for &sample_index in sample_indexes.iter() {
                add_breakpoint(BreakPoint::new(chrom_index, start, end, sample_index))?;
                breakpoint_count += 1;
            }
        }
    }

    debug!(
        "Input '{}' records: {record_count} breakpoints: {breakpoint_count}",
        source.path
    );
    Ok(breakpoint_count)
}

fn get_record_label(record: &bcf::Record, path: &Utf8Path) -> String {
    let chrom = record
        .rid()
        .and_then(|rid| record.header().rid2name(rid).ok())
        .map(|x| String::from_utf8_lossy(x).to_string())
        .unwrap_or_else(|| ".".to_string());
    format!("{chrom}:{} in input '{path}'", record.pos() + 1)
}
