//! Single pass clustering of the sorted breakpoint stream
//!
//! Clusters are grown with one breakpoint of lookahead. A candidate breakpoint joins the open
//! cluster if it is linked to any breakpoint already admitted to the cluster, otherwise it seeds
//! the next cluster. Linkage is never tested against breakpoints later in the stream, so the
//! result is forward-only chaining rather than a full transitive closure.
//!

use std::iter::Fuse;

use simple_error::SimpleResult;

use crate::breakpoint::BreakPoint;

/// A group of linked breakpoints, in sorted stream order
#[derive(Debug)]
pub struct BreakPointCluster {
    members: Vec<BreakPoint>,
}

impl BreakPointCluster {
    fn new(seed: BreakPoint) -> Self {
        Self {
            members: vec![seed],
        }
    }

    pub fn chrom_index(&self) -> u32 {
        self.members[0].chrom_index
    }

    /// Start of the seed breakpoint, which is the minimum start given sorted input
    pub fn start(&self) -> i32 {
        self.members[0].start
    }

    /// Maximum end over all members
    pub fn end(&self) -> i32 {
        self.members.iter().map(|x| x.end).max().unwrap_or(self.start())
    }

    pub fn members(&self) -> &[BreakPoint] {
        &self.members
    }

    /// True if `bp` is linked to at least one member of the cluster
    fn admits(&self, bp: &BreakPoint, distance: u32) -> bool {
        self.members.iter().any(|x| x.is_linked(bp, distance))
    }
}

/// Iterator of breakpoint clusters over a breakpoint stream sorted on (chrom_index, start)
///
/// The first error from the underlying stream is returned and ends the sweep.
///
pub struct ClusterSweep<I>
where
    I: Iterator<Item = SimpleResult<BreakPoint>>,
{
    source: Fuse<I>,
    lookahead: Option<BreakPoint>,
    distance: u32,
    is_done: bool,
}

impl<I> ClusterSweep<I>
where
    I: Iterator<Item = SimpleResult<BreakPoint>>,
{
    pub fn new(source: I, distance: u32) -> Self {
        Self {
            source: source.fuse(),
            lookahead: None,
            distance,
            is_done: false,
        }
    }

    /// Take the lookahead breakpoint if present, otherwise read the next one from the stream
    fn next_breakpoint(&mut self) -> SimpleResult<Option<BreakPoint>> {
        if let Some(bp) = self.lookahead.take() {
            return Ok(Some(bp));
        }
        self.source.next().transpose()
    }

    pub fn next_cluster(&mut self) -> SimpleResult<Option<BreakPointCluster>> {
        let Some(seed) = self.next_breakpoint()? else {
            return Ok(None);
        };

        let mut cluster = BreakPointCluster::new(seed);
        while let Some(bp) = self.next_breakpoint()? {
            if cluster.admits(&bp, self.distance) {
                cluster.members.push(bp);
            } else {
                self.lookahead = Some(bp);
                break;
            }
        }
        Ok(Some(cluster))
    }
}

impl<I> Iterator for ClusterSweep<I>
where
    I: Iterator<Item = SimpleResult<BreakPoint>>,
{
    type Item = SimpleResult<BreakPointCluster>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_done {
            return None;
        }
        let result = self.next_cluster();
        match result {
            Ok(Some(x)) => Some(Ok(x)),
            Ok(None) => {
                self.is_done = true;
                None
            }
            Err(e) => {
                self.is_done = true;
                Some(Err(e))
            }
        }
    }
}
