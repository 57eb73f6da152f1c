use rust_htslib::bcf::header::HeaderView;
use simple_error::{SimpleResult, bail};

use crate::chrom_list::ChromList;

/// Get chrom names from bcf header and provide a map to switch the chrom indexes
/// back to those in chrom_list
///
/// Any contig in the header which is missing from chrom_list is an error.
///
pub fn bcf_chrom_index_map(chrom_list: &ChromList, header: &HeaderView) -> SimpleResult<Vec<u32>> {
    let mut rid_to_chrom_index = Vec::new();
    let chrom_count = header.contig_count();
    for rid in 0..chrom_count {
        let chrom_bytes = match header.rid2name(rid) {
            Ok(x) => x,
            Err(e) => bail!("Can't find name of contig index {rid} in header: {e}"),
        };
        let chrom_name = String::from_utf8_lossy(chrom_bytes);
        let chrom_index = match chrom_list.get_chrom_index(&chrom_name) {
            Some(x) => x as u32,
            None => bail!("Contig '{chrom_name}' not found in the sequence dictionary"),
        };
        rid_to_chrom_index.push(chrom_index);
    }
    Ok(rid_to_chrom_index)
}
