//! Top-level merge pipeline
//!
//! The merge runs in three phases separated by hard barriers:
//! 1. Input headers are scanned, then breakpoints from every input are extracted into the sorter.
//! 2. The sorter is closed, fixing the global breakpoint order.
//! 3. The sorted stream is swept once to form clusters, and each cluster is written as one
//!    consensus record.
//!

use log::info;
use simple_error::{SimpleError, SimpleResult};

use crate::breakpoint::BreakPoint;
use crate::cli::Settings;
use crate::cluster_sweep::ClusterSweep;
use crate::consensus::get_consensus_record;
use crate::consensus_output::ConsensusVcfWriter;
use crate::input_sources::{extract_source_breakpoints, scan_input_headers};
use crate::run_stats::{MergeRunStats, write_merge_run_stats};
use crate::spill_sort::ExternalSorter;
use crate::vcf_utils::build_bcf_index;

pub fn run_merge(settings: &Settings) -> SimpleResult<MergeRunStats> {
    let start = std::time::Instant::now();

    let (context, sources) = scan_input_headers(&settings.input_paths)?;

    let mut sorter = ExternalSorter::<BreakPoint>::new(
        settings.max_records_in_ram,
        settings.tmp_dir.as_deref(),
    )?;
    for source in sources.iter() {
        extract_source_breakpoints(&context, source, settings.distance, |bp| sorter.add(bp))?;
    }

    let sorted_breakpoints = sorter.finish()?;
    let sort_stats = sorted_breakpoints.stats().clone();
    info!("Finished sorting {} breakpoints", sort_stats.total_records);

    let mut writer = ConsensusVcfWriter::new(
        settings.output.as_deref(),
        settings.output_type,
        &context,
    )?;

    let mut cluster_count = 0;
    let mut max_cluster_size = 0;
    for cluster in ClusterSweep::new(sorted_breakpoints, settings.distance) {
        let cluster = cluster?;
        cluster_count += 1;
        max_cluster_size = max_cluster_size.max(cluster.members().len());

        let consensus = get_consensus_record(&cluster, &context);
        writer.write(&consensus)?;
    }
    writer.finish()?;

    info!("Found {cluster_count} breakpoint clusters");

    if settings.write_index
        && let Some(output) = &settings.output
    {
        info!("Building index for output file '{output}'");
        build_bcf_index(output)
            .map_err(|e| SimpleError::with(&format!("Failed to index '{output}'"), e))?;
    }

    let run_stats = MergeRunStats {
        input_file_count: sources.len(),
        sample_count: context.samples.len(),
        breakpoint_count: sort_stats.total_records,
        spill_chunk_count: sort_stats.chunks_written,
        cluster_count,
        max_cluster_size,
        total_runtime_secs: start.elapsed().as_secs_f64(),
    };

    if let Some(stats_json) = &settings.stats_json {
        write_merge_run_stats(stats_json, &run_stats)?;
    }

    Ok(run_stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_ulps_eq;
    use camino::Utf8PathBuf;
    use clap::Parser;
    use rust_htslib::bcf::{self, Read, record::GenotypeAllele};
    use tempfile::TempDir;

    use crate::cli::validate_and_fix_settings_impl;

    const VCF_HEADER_START: &str = "\
##fileformat=VCFv4.2
##contig=<ID=chr1,length=10000>
##contig=<ID=chr2,length=10000>
##INFO=<ID=SVTYPE,Number=1,Type=String,Description=\"Type of structural variant\">
##INFO=<ID=END,Number=1,Type=Integer,Description=\"End position\">
##INFO=<ID=CIPOS,Number=2,Type=Integer,Description=\"Confidence interval around POS\">
##INFO=<ID=CIEND,Number=2,Type=Integer,Description=\"Confidence interval around END\">
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
";

    struct TestRun {
        dir: TempDir,
        dir_path: Utf8PathBuf,
    }

    impl TestRun {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let dir_path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
            Self { dir, dir_path }
        }

        /// Write a test VCF with the given sample names and data lines
        fn write_vcf(&self, filename: &str, sample_names: &[&str], lines: &[&str]) -> String {
            let mut content = VCF_HEADER_START.to_string();
            content.push_str("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO");
            if !sample_names.is_empty() {
                content.push_str("\tFORMAT");
                for sample_name in sample_names {
                    content.push('\t');
                    content.push_str(sample_name);
                }
            }
            content.push('\n');
            for line in lines {
                content.push_str(&line.replace(' ', "\t"));
                content.push('\n');
            }
            let path = self.dir_path.join(filename);
            std::fs::write(&path, content).unwrap();
            path.to_string()
        }

        fn output_path(&self) -> String {
            self.dir_path.join("merged.vcf").to_string()
        }

        fn run(&self, args: &[&str]) -> SimpleResult<MergeRunStats> {
            self.run_with_output(&self.output_path(), args)
        }

        fn run_with_output(&self, output: &str, args: &[&str]) -> SimpleResult<MergeRunStats> {
            let tmp_dir = self.dir_path.join("tmp");
            std::fs::create_dir_all(&tmp_dir).unwrap();
            let mut cmdline = vec![
                "bndmerge",
                "-o",
                output,
                "--tmp-dir",
                tmp_dir.as_str(),
            ];
            cmdline.extend_from_slice(args);
            let settings =
                validate_and_fix_settings_impl(Settings::try_parse_from(cmdline).unwrap()).unwrap();
            run_merge(&settings)
        }

        fn tmp_dir_entry_count(&self) -> usize {
            std::fs::read_dir(self.dir.path().join("tmp")).unwrap().count()
        }
    }

    struct OutputRecord {
        chrom: String,
        pos: i64,
        end: Option<i32>,
        ac: i32,
        an: i32,
        af: f32,

        /// Sample names with a non-missing genotype
        called_samples: Vec<String>,
    }

    fn read_output(path: &str) -> (Vec<String>, Vec<OutputRecord>) {
        let mut reader = bcf::Reader::from_path(path).unwrap();
        let header = reader.header().clone();
        let sample_names = header
            .samples()
            .iter()
            .map(|x| String::from_utf8_lossy(x).to_string())
            .collect::<Vec<_>>();

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.unwrap();
            let get_int = |key: &[u8]| record.info(key).integer().unwrap().map(|x| x[0]);
            let genotypes = record.genotypes().unwrap();
            let called_samples = sample_names
                .iter()
                .enumerate()
                .filter(|(i, _)| {
                    genotypes
                        .get(*i)
                        .iter()
                        .any(|x| *x != GenotypeAllele::UnphasedMissing)
                })
                .map(|(_, x)| x.clone())
                .collect();
            let chrom = header.rid2name(record.rid().unwrap()).unwrap();
            records.push(OutputRecord {
                chrom: String::from_utf8_lossy(chrom).to_string(),
                pos: record.pos() + 1,
                end: get_int(b"END"),
                ac: get_int(b"AC").unwrap(),
                an: get_int(b"AN").unwrap(),
                af: record.info(b"AF").float().unwrap().unwrap()[0],
                called_samples,
            });
        }
        (sample_names, records)
    }

    #[test]
    fn test_merge_two_samples() {
        let test_run = TestRun::new();
        let a = test_run.write_vcf(
            "a.vcf",
            &["S2"],
            &[
                "chr1 100 . N N[chr2:500[ . PASS SVTYPE=BND GT 0/1",
                "chr1 300 . N N[chr2:800[ . PASS SVTYPE=BND GT 0/0",
            ],
        );
        let b = test_run.write_vcf(
            "b.vcf",
            &["S1"],
            &[
                "chr1 100 . N N[chr2:500[ . PASS SVTYPE=BND GT 1/1",
                "chr1 102 . N N[chr2:600[ . PASS SVTYPE=BND GT 0/1",
            ],
        );

        let run_stats = test_run.run(&[&a, &b]).unwrap();
        assert_eq!(run_stats.input_file_count, 2);
        assert_eq!(run_stats.sample_count, 2);
        assert_eq!(run_stats.breakpoint_count, 3);
        assert_eq!(run_stats.cluster_count, 2);
        assert_eq!(run_stats.max_cluster_size, 2);

        let (sample_names, records) = read_output(&test_run.output_path());
        assert_eq!(sample_names, vec!["S1", "S2"]);
        assert_eq!(records.len(), 2);

        let rec = &records[0];
        assert_eq!((rec.chrom.as_str(), rec.pos, rec.end), ("chr1", 100, None));
        assert_eq!((rec.ac, rec.an), (2, 4));
        assert_ulps_eq!(rec.af, 0.5);
        assert_eq!(rec.called_samples, vec!["S1", "S2"]);

        let rec = &records[1];
        assert_eq!((rec.pos, rec.ac), (102, 1));
        assert_eq!(rec.called_samples, vec!["S1"]);
    }

    #[test]
    fn test_merge_with_distance_and_confidence_intervals() {
        let test_run = TestRun::new();
        let a = test_run.write_vcf(
            "a.vcf",
            &[],
            &["chr1 1000 . N <DEL> . PASS SVTYPE=DEL;END=2000;CIPOS=-10,10;CIEND=-20,20"],
        );
        let b = test_run.write_vcf(
            "b.vcf",
            &[],
            &["chr1 1015 . N <DEL> . PASS SVTYPE=DEL;END=1990"],
        );

        let run_stats = test_run.run(&["-d", "5", &a, &b]).unwrap();
        assert_eq!(run_stats.sample_count, 2);
        assert_eq!(run_stats.breakpoint_count, 4);

        let (sample_names, records) = read_output(&test_run.output_path());
        assert_eq!(sample_names, vec![a.clone(), b.clone()]);
        assert_eq!(records.len(), 2);

        // Start breakpoints: [990,1010] from a and [1015,1015] from b are within distance 5
        assert_eq!((records[0].pos, records[0].end), (990, Some(1015)));
        assert_eq!(records[0].ac, 2);

        // End breakpoints: [1980,2020] from a contains [1990,1990] from b
        assert_eq!((records[1].pos, records[1].end), (1980, Some(2020)));
        assert_eq!(records[1].called_samples.len(), 2);
    }

    #[test]
    fn test_merge_is_chunk_size_independent() {
        let test_run = TestRun::new();
        let lines = (0..40)
            .map(|i| {
                format!(
                    "chr{} {} . N N[chr1:1[ . PASS SVTYPE=BND GT 0/1",
                    1 + (i % 2),
                    100 + (i * 37) % 400
                )
            })
            .collect::<Vec<_>>();
        let mut sorted_lines = lines.clone();
        sorted_lines.sort_by_key(|x| {
            let fields = x.split(' ').collect::<Vec<_>>();
            (fields[0].to_string(), fields[1].parse::<i32>().unwrap())
        });
        let line_refs = sorted_lines.iter().map(|x| x.as_str()).collect::<Vec<_>>();
        let a = test_run.write_vcf("a.vcf", &["A"], &line_refs);
        let b = test_run.write_vcf("b.vcf", &["B"], &line_refs[..20]);

        let mut outputs = Vec::new();
        for max_records_in_ram in ["1", "7", "100000"] {
            let run_stats = test_run
                .run(&["-d", "10", "--max-records-in-ram", max_records_in_ram, &a, &b])
                .unwrap();
            assert_eq!(run_stats.breakpoint_count, 60);
            if max_records_in_ram == "1" {
                assert_eq!(run_stats.spill_chunk_count, 60);
            }
            let (_, records) = read_output(&test_run.output_path());
            outputs.push(
                records
                    .iter()
                    .map(|x| (x.chrom.clone(), x.pos, x.end, x.ac, x.called_samples.clone()))
                    .collect::<Vec<_>>(),
            );
            assert_eq!(test_run.tmp_dir_entry_count(), 0);
        }
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[0], outputs[2]);
    }

    #[test]
    fn test_duplicate_sample_rejected() {
        let test_run = TestRun::new();
        let line = "chr1 100 . N N[chr2:500[ . PASS SVTYPE=BND GT 0/1";
        let a = test_run.write_vcf("a.vcf", &["S1"], &[line]);
        let b = test_run.write_vcf("b.vcf", &["S1"], &[line]);

        let err = test_run.run(&[&a, &b]).unwrap_err();
        assert!(err.as_str().contains("Duplicate sample name 'S1'"));
        assert!(!std::path::Path::new(&test_run.output_path()).exists());
        assert_eq!(test_run.tmp_dir_entry_count(), 0);
    }

    #[test]
    fn test_dictionary_mismatch_rejected() {
        let test_run = TestRun::new();
        let a = test_run.write_vcf("a.vcf", &["S1"], &[]);
        let b_path = test_run.dir_path.join("b.vcf");
        std::fs::write(
            &b_path,
            "##fileformat=VCFv4.2\n##contig=<ID=chr1,length=20000>\n\
             #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n",
        )
        .unwrap();

        let err = test_run.run(&[&a, b_path.as_str()]).unwrap_err();
        assert!(err.as_str().contains("does not match"));
    }

    #[test]
    fn test_no_call_and_hom_ref_excluded() {
        let test_run = TestRun::new();
        let a = test_run.write_vcf(
            "a.vcf",
            &["S1", "S2", "S3", "S4"],
            &["chr2 100 . N N[chr1:1[ . PASS SVTYPE=BND GT ./. 0/0 0/. 1/1"],
        );

        let run_stats = test_run.run(&[&a]).unwrap();
        assert_eq!(run_stats.breakpoint_count, 2);

        let (_, records) = read_output(&test_run.output_path());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].chrom, "chr2");
        assert_eq!((records[0].ac, records[0].an), (2, 8));
        assert_eq!(records[0].called_samples, vec!["S3", "S4"]);
    }

    #[test]
    fn test_empty_input() {
        let test_run = TestRun::new();
        let a = test_run.write_vcf("a.vcf", &["S1"], &[]);
        let stats_json = test_run.dir_path.join("stats.json");

        let run_stats = test_run.run(&["--stats-json", stats_json.as_str(), &a]).unwrap();
        assert_eq!(run_stats.cluster_count, 0);
        assert!(stats_json.exists());

        let (sample_names, records) = read_output(&test_run.output_path());
        assert_eq!(sample_names, vec!["S1"]);
        assert!(records.is_empty());
    }

    #[test]
    fn test_compressed_output_with_index() {
        let test_run = TestRun::new();
        let a = test_run.write_vcf(
            "a.vcf",
            &["S1"],
            &[
                "chr1 100 . N N[chr2:500[ . PASS SVTYPE=BND GT 0/1",
                "chr2 300 . N N[chr1:800[ . PASS SVTYPE=BND GT 1/1",
            ],
        );
        let output = test_run.dir_path.join("merged.vcf.gz");

        let run_stats = test_run
            .run_with_output(output.as_str(), &["--write-index", &a])
            .unwrap();
        assert_eq!(run_stats.cluster_count, 2);
        assert!(test_run.dir_path.join("merged.vcf.gz.csi").exists());

        let (sample_names, records) = read_output(output.as_str());
        assert_eq!(sample_names, vec!["S1"]);
        let positions = records
            .iter()
            .map(|x| (x.chrom.as_str(), x.pos))
            .collect::<Vec<_>>();
        assert_eq!(positions, vec![("chr1", 100), ("chr2", 300)]);

        // No temporary output file is left next to the output
        let dir_entry_count = std::fs::read_dir(&test_run.dir_path).unwrap().count();
        assert_eq!(dir_entry_count, 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_output_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let test_run = TestRun::new();
        let a = test_run.write_vcf("a.vcf", &["S1"], &[]);
        test_run.run(&[&a]).unwrap();

        // The output gets the same mode as any other newly created file
        let reference_path = test_run.dir_path.join("reference.txt");
        std::fs::File::create(&reference_path).unwrap();
        let get_mode = |path: &str| std::fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(
            get_mode(&test_run.output_path()),
            get_mode(reference_path.as_str())
        );
    }
}
