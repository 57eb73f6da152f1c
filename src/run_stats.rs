//! Track stats for the whole merge run
//!

use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleError, SimpleResult};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct MergeRunStats {
    pub input_file_count: usize,
    pub sample_count: usize,

    /// Total breakpoints extracted from all inputs
    pub breakpoint_count: u64,

    /// Number of sorted chunks spilled to temporary files
    pub spill_chunk_count: usize,

    /// Number of breakpoint clusters, which is also the number of output records
    pub cluster_count: usize,

    /// Most breakpoints found in any one cluster
    pub max_cluster_size: usize,

    pub total_runtime_secs: f64,
}

/// Write run_stats structure out in json format
pub fn write_merge_run_stats(filename: &Utf8Path, run_stats: &MergeRunStats) -> SimpleResult<()> {
    info!("Writing run statistics to file: '{filename}'");

    let f = File::create(filename).map_err(|e| {
        SimpleError::with(
            &format!("Unable to create run statistics json file: '{filename}'"),
            e,
        )
    })?;

    serde_json::to_writer_pretty(&f, &run_stats).map_err(|e| {
        SimpleError::with(
            &format!("Unable to write run statistics json file: '{filename}'"),
            e,
        )
    })
}
