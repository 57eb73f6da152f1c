use crate::chrom_list::ChromList;
use crate::sample_table::SampleTable;

/// Run-wide lookup tables established by the input header scan
///
/// Both tables are frozen once the header scan completes.
///
pub struct MergeContext {
    pub chrom_list: ChromList,
    pub samples: SampleTable,
}
