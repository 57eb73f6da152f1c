//! The sequence dictionary shared by all inputs of a merge run
//!

use std::collections::HashMap;

use rust_htslib::bcf::header::{HeaderRecord, HeaderView};
use simple_error::{SimpleResult, bail};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChromInfo {
    pub label: String,

    /// Contig length from the VCF header, or zero if the header omits it
    pub length: u64,
}

/// Ordered contig list with a reverse lookup from contig name to index
///
/// The contig index is the value stored in every breakpoint, so the list must not change once the
/// first input has established it.
///
#[derive(Clone, Debug, Default)]
pub struct ChromList {
    pub data: Vec<ChromInfo>,
    pub label_to_index: HashMap<String, usize>,
}

impl PartialEq for ChromList {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for ChromList {}

impl ChromList {
    pub fn add_chrom(&mut self, label: &str, length: u64) -> SimpleResult<()> {
        if self.label_to_index.contains_key(label) {
            bail!("Contig '{label}' is defined more than once");
        }
        self.label_to_index
            .insert(label.to_string(), self.data.len());
        self.data.push(ChromInfo {
            label: label.to_string(),
            length,
        });
        Ok(())
    }

    /// Build the contig list from the `##contig` lines of a VCF/BCF header
    ///
    /// An input without any contig lines has no usable sequence dictionary and is rejected.
    ///
    pub fn from_bcf_header(header: &HeaderView) -> SimpleResult<Self> {
        let mut chrom_list = Self::default();
        for record in header.header_records() {
            if let HeaderRecord::Contig { values, .. } = record {
                let label = match values.get("ID") {
                    Some(x) => x,
                    None => bail!("Contig header line is missing the ID field"),
                };
                let length = match values.get("length") {
                    Some(x) => match x.parse::<u64>() {
                        Ok(x) => x,
                        Err(_) => bail!("Invalid length '{x}' for contig '{label}'"),
                    },
                    None => 0,
                };
                chrom_list.add_chrom(label, length)?;
            }
        }

        if chrom_list.data.is_empty() {
            bail!("No contig lines found in header, a sequence dictionary is required");
        }
        Ok(chrom_list)
    }

    pub fn get_chrom_index(&self, label: &str) -> Option<usize> {
        self.label_to_index.get(label).copied()
    }

    /// Describe the first difference between two contig lists, for error reporting
    ///
    /// Returns None if the lists are identical
    ///
    pub fn describe_mismatch(&self, other: &Self) -> Option<String> {
        for (chrom_index, (a, b)) in self.data.iter().zip(other.data.iter()).enumerate() {
            if a != b {
                return Some(format!(
                    "contig {} is '{}' (length {}) in one dictionary and '{}' (length {}) in the other",
                    chrom_index + 1,
                    a.label,
                    a.length,
                    b.label,
                    b.length
                ));
            }
        }
        if self.data.len() != other.data.len() {
            return Some(format!(
                "dictionaries contain {} and {} contigs",
                self.data.len(),
                other.data.len()
            ));
        }
        None
    }
}
