use std::cmp::{max, min};

use crate::spill_sort::SpillRecord;

/// A single breakpoint observation extracted from one input sample
///
/// Coordinates are 1-indexed and inclusive, following the VCF input, and `end >= start` always
/// holds after confidence interval normalization.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BreakPoint {
    pub chrom_index: u32,
    pub start: i32,
    pub end: i32,
    pub sample_index: u32,
}

impl BreakPoint {
    pub fn new(chrom_index: u32, start: i32, end: i32, sample_index: u32) -> Self {
        assert!(end >= start, "Invalid breakpoint range {start}-{end}");
        Self {
            chrom_index,
            start,
            end,
            sample_index,
        }
    }

    /// Return true if the two breakpoints should be clustered together
    ///
    /// Each breakpoint range is expanded by `distance` on both sides, and the breakpoints are
    /// linked if the expanded ranges intersect or are adjacent. Breakpoints on different contigs
    /// are never linked.
    ///
    pub fn is_linked(&self, other: &BreakPoint, distance: u32) -> bool {
        if self.chrom_index != other.chrom_index {
            return false;
        }
        let max_start = max(self.start, other.start) as i64;
        let min_end = min(self.end, other.end) as i64;
        max_start <= min_end + distance as i64
    }
}

/// Spill chunk encoding: chrom_index, start, end and sample_index as big-endian 32 bit integers
///
impl SpillRecord for BreakPoint {
    type Key = (u32, i32);

    const ENCODED_LEN: usize = 16;

    fn sort_key(&self) -> Self::Key {
        (self.chrom_index, self.start)
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.chrom_index.to_be_bytes());
        buf[4..8].copy_from_slice(&self.start.to_be_bytes());
        buf[8..12].copy_from_slice(&self.end.to_be_bytes());
        buf[12..16].copy_from_slice(&self.sample_index.to_be_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            chrom_index: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            start: i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            end: i32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            sample_index: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
        }
    }
}
