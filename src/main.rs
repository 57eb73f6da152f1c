mod bcf_utils;
mod breakpoint;
mod chrom_list;
mod cli;
mod cluster_sweep;
mod consensus;
mod consensus_output;
mod globals;
mod input_sources;
mod logger;
mod merge_bnd;
mod merge_context;
mod os_utils;
mod run_stats;
mod sample_table;
mod spill_sort;
mod vcf_utils;

use std::{error, process};

use hhmmss::Hhmmss;
use log::{debug, info};

use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};
use crate::logger::setup_logger;
use crate::merge_bnd::run_merge;

/// Run system configuration steps prior to starting any other program logic
///
fn system_configuration_prelude() {
    if let Some(limit) = os_utils::attempt_max_open_file_limit() {
        debug!("Open file limit: {limit}");
    }
}

fn run(settings: &cli::Settings) -> Result<(), Box<dyn error::Error>> {
    info!("Starting {PROGRAM_NAME} {PROGRAM_VERSION}");
    info!(
        "cmdline: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );

    let start = std::time::Instant::now();

    system_configuration_prelude();

    let run_stats = run_merge(settings)?;
    info!(
        "Merged {} breakpoints from {} samples into {} clusters",
        run_stats.breakpoint_count, run_stats.sample_count, run_stats.cluster_count
    );

    info!(
        "{PROGRAM_NAME} completed. Total Runtime: {}",
        start.elapsed().hhmmssxxx()
    );
    Ok(())
}

fn main() {
    let settings = cli::validate_and_fix_settings(cli::parse_settings());

    if let Err(err) = setup_logger(settings.debug) {
        eprintln!("Failed to initialize logger: {err}");
        process::exit(2);
    }

    if let Err(err) = run(&settings) {
        eprintln!("{err}");
        process::exit(2);
    }
}
