use rust_htslib::bcf;
use rust_htslib::bcf::header::Header;
use rust_htslib::bcf::record::Numeric;
use rust_htslib::{htslib, utils};
use simple_error::{SimpleError, SimpleResult};

use crate::chrom_list::ChromList;
use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};

// Imported non-public constants from rust-htslib
pub const VECTOR_END_INTEGER: i32 = i32::MIN + 1;

/// Get a new bcf header which is actually empty so that we can set our own version number
///
pub fn get_empty_bcf_header() -> Header {
    // Give the incorrect mode to htslib to prevent it from writing the wrong VCF version number.
    // As of 202409 htslib doesn't store the mode argument so this shouldn't break the output.
    //
    let mode = c"r";
    Header {
        inner: unsafe { htslib::bcf_hdr_init(mode.as_ptr()) },
        subset: None,
    }
}

/// Builds common fields into a VCF header, upon which more app specific details can be added
///
pub fn get_basic_vcf_header(chrom_list: &ChromList, sample_names: &[&str]) -> Header {
    let mut header = get_empty_bcf_header();
    header.push_record(b"##fileformat=VCFv4.3");

    let date_string = chrono::Local::now().format("%Y%m%d").to_string();
    header.push_record(format!("##fileDate={date_string}").as_bytes());
    header.push_record(format!("##source=\"{PROGRAM_NAME} {PROGRAM_VERSION}\"").as_bytes());
    let cmdline = std::env::args().collect::<Vec<_>>().join(" ");
    header.push_record(format!("##{PROGRAM_NAME}_cmdline=\"{cmdline}\"").as_bytes());

    // Add contig records
    for chrom_info in chrom_list.data.iter() {
        let header_contig_line = if chrom_info.length > 0 {
            format!(
                "##contig=<ID={},length={}>",
                chrom_info.label, chrom_info.length
            )
        } else {
            format!("##contig=<ID={}>", chrom_info.label)
        };
        header.push_record(header_contig_line.as_bytes());
    }

    // Add sample names
    for sample_name in sample_names {
        header.push_sample(sample_name.as_bytes());
    }

    header
}

/// Get all sample names from a bcf header, in header order
///
pub fn get_sample_names(header: &bcf::header::HeaderView) -> Vec<String> {
    header
        .samples()
        .into_iter()
        .map(|x| String::from_utf8_lossy(x).to_string())
        .collect()
}

/// Open a VCF/BCF file and return its reader
///
pub fn open_bcf_reader(filename: &str) -> SimpleResult<bcf::Reader> {
    bcf::Reader::from_path(filename)
        .map_err(|e| SimpleError::with(&format!("Failed to open variant file '{filename}'"), e))
}

/// Get all non-missing values of an integer INFO field
///
/// A tag which is not defined in the header is treated the same as a tag missing from the record,
/// and returns an empty list.
///
pub fn get_info_integer_values(record: &bcf::Record, key: &[u8]) -> SimpleResult<Vec<i32>> {
    if record.header().info_type(key).is_err() {
        return Ok(Vec::new());
    }
    let values = record.info(key).integer().map_err(|e| {
        SimpleError::with(
            &format!("Error reading {} INFO field", String::from_utf8_lossy(key)),
            e,
        )
    })?;
    Ok(match values {
        Some(values) => values
            .iter()
            .copied()
            .filter(|x| !x.is_missing() && *x != VECTOR_END_INTEGER)
            .collect(),
        None => Vec::new(),
    })
}

/// Get the first value of a string INFO field, if present
///
/// A tag which is not defined in the header is treated the same as a tag missing from the record.
///
pub fn get_info_string(record: &bcf::Record, key: &[u8]) -> SimpleResult<Option<String>> {
    if record.header().info_type(key).is_err() {
        return Ok(None);
    }
    let values = record.info(key).string().map_err(|e| {
        SimpleError::with(
            &format!("Error reading {} INFO field", String::from_utf8_lossy(key)),
            e,
        )
    })?;
    Ok(values
        .and_then(|x| x.first().map(|x| String::from_utf8_lossy(x).to_string())))
}

#[derive(Debug)]
pub struct BcfBuildError {
    pub msg: String,
}

impl BcfBuildError {
    pub fn error_message(error: i32) -> &'static str {
        match error {
            -1 => "indexing failed",
            -2 => "opening @fn failed",
            -3 => "format not indexable",
            -4 => "failed to create and/or save the index",
            _ => "unknown error",
        }
    }
}

impl std::error::Error for BcfBuildError {}

impl std::fmt::Display for BcfBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BcfBuildError{{msg: {}}}", self.msg)
    }
}

/// Build a csi index for a bcf or vcf.gz file
///
/// # Arguments
/// * `bcf_path` - Path to bcf/vcf.gz file for indexing
///
pub fn build_bcf_index<P: AsRef<std::path::Path>>(bcf_path: P) -> Result<(), BcfBuildError> {
    let min_shift = 14;
    let n_threads = 1;
    let idx_path_ptr = std::ptr::null();
    let c_path = utils::path_to_cstring(&bcf_path).ok_or_else(|| BcfBuildError {
        msg: format!(
            "Failed to build bcf index. Invalid path: '{}'",
            bcf_path.as_ref().display()
        ),
    })?;
    let ret = unsafe {
        /*
         *  bcf_index_build3() - Generate and save an index to a specific file
         *  @fn:         Input VCF/BCF filename
         *  @fnidx:      Output filename, or NULL to add .csi/.tbi to @fn
         *  @min_shift:  Positive to generate CSI, or 0 to generate TBI
         *  @n_threads:  Number of VCF/BCF decoder threads
         *
         *  Returns 0 if successful, or negative if an error occurred.
         */
        htslib::bcf_index_build3(c_path.as_ptr(), idx_path_ptr, min_shift, n_threads)
    };
    match ret {
        0 => Ok(()),
        e => Err(BcfBuildError {
            msg: format!(
                "Failed to build bcf index. Error: {e:?}/{}",
                BcfBuildError::error_message(e)
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_htslib::bcf::Read;
    use std::io::Write;

    fn get_test_record_reader(
        info_header: &str,
        info: &str,
    ) -> (tempfile::NamedTempFile, bcf::Reader) {
        let mut file = tempfile::Builder::new().suffix(".vcf").tempfile().unwrap();
        writeln!(file, "##fileformat=VCFv4.2").unwrap();
        writeln!(file, "##contig=<ID=chr1,length=1000>").unwrap();
        if !info_header.is_empty() {
            writeln!(file, "{info_header}").unwrap();
        }
        writeln!(file, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO").unwrap();
        writeln!(file, "chr1\t100\t.\tN\t<BND>\t.\t.\t{info}").unwrap();
        file.flush().unwrap();
        let reader = bcf::Reader::from_path(file.path()).unwrap();
        (file, reader)
    }

    fn get_first_record(reader: &mut bcf::Reader) -> bcf::Record {
        reader.records().next().unwrap().unwrap()
    }

    #[test]
    fn test_get_info_integer_values() {
        let (_file, mut reader) = get_test_record_reader(
            r#"##INFO=<ID=CIPOS,Number=2,Type=Integer,Description="CI">"#,
            "CIPOS=-10,5",
        );
        let record = get_first_record(&mut reader);
        assert_eq!(
            get_info_integer_values(&record, b"CIPOS").unwrap(),
            vec![-10, 5]
        );
    }

    #[test]
    fn test_get_info_integer_values_missing() {
        let (_file, mut reader) = get_test_record_reader(
            r#"##INFO=<ID=CIPOS,Number=2,Type=Integer,Description="CI">"#,
            ".",
        );
        let record = get_first_record(&mut reader);
        assert!(get_info_integer_values(&record, b"CIPOS").unwrap().is_empty());
        assert!(get_info_integer_values(&record, b"CIEND").unwrap().is_empty());
    }

    #[test]
    fn test_get_info_string() {
        let (_file, mut reader) = get_test_record_reader(
            r#"##INFO=<ID=SVTYPE,Number=1,Type=String,Description="SV type">"#,
            "SVTYPE=DEL",
        );
        let record = get_first_record(&mut reader);
        assert_eq!(
            get_info_string(&record, b"SVTYPE").unwrap(),
            Some("DEL".to_string())
        );
        assert_eq!(get_info_string(&record, b"MATEID").unwrap(), None);
    }
}
