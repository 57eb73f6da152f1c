//! Reduce each breakpoint cluster to a single consensus record
//!

use std::collections::HashSet;

use crate::cluster_sweep::BreakPointCluster;
use crate::merge_context::MergeContext;

/// One cluster member, resolved to its sample
#[derive(Clone, Debug, PartialEq)]
pub struct ConsensusMember {
    pub sample_name: String,

    /// The member carries the breakpoint allele, which always holds for a cluster member
    pub is_present: bool,
}

#[derive(Debug)]
pub struct ConsensusRecord {
    pub chrom_index: u32,
    pub chrom_label: String,

    /// 1-indexed start of the consensus interval
    pub start: i32,

    /// 1-indexed inclusive end of the consensus interval
    pub end: i32,

    /// Count of distinct samples with at least one member in the cluster
    pub supporting_sample_count: usize,

    /// Allele slots over the whole cohort, identical for every record in a run
    pub allele_slot_count: usize,

    pub allele_frequency: f64,

    /// One entry per cluster member in cluster order
    ///
    /// A sample contributing several members appears several times, even though it only adds one
    /// to `supporting_sample_count`.
    pub members: Vec<ConsensusMember>,
}

pub fn get_consensus_record(cluster: &BreakPointCluster, context: &MergeContext) -> ConsensusRecord {
    let chrom_index = cluster.chrom_index();
    let chrom_label = context.chrom_list.data[chrom_index as usize].label.clone();

    let supporting_sample_count = cluster
        .members()
        .iter()
        .map(|x| x.sample_index)
        .collect::<HashSet<_>>()
        .len();

    let allele_slot_count = context.samples.allele_slot_count();
    let allele_frequency = if context.samples.is_empty() {
        0.0
    } else {
        supporting_sample_count as f64 / allele_slot_count as f64
    };

    let members = cluster
        .members()
        .iter()
        .map(|x| ConsensusMember {
            sample_name: context.samples.name(x.sample_index).to_string(),
            is_present: true,
        })
        .collect();

    ConsensusRecord {
        chrom_index,
        chrom_label,
        start: cluster.start(),
        end: cluster.end(),
        supporting_sample_count,
        allele_slot_count,
        allele_frequency,
        members,
    }
}
