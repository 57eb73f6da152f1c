use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use simple_error::{SimpleResult, bail, map_err_with};

/// Check a required input filename
///
/// Assumes no logger has been configured yet
///
pub fn check_required_filename(filename: &Utf8Path, label: &str) -> SimpleResult<()> {
    if filename.as_str().is_empty() {
        bail!("Must specify {label} file");
    }
    if !filename.exists() {
        bail!("Can't find specified {label} file: '{filename}'");
    }
    if !filename.is_file() {
        bail!("Specified {label} file path does not appear to be a file: '{filename}'");
    }
    Ok(())
}

/// Read input paths from a list file, with one path per line
///
/// Blank lines and lines starting with '#' are skipped.
///
fn read_input_list(list_filename: &Utf8Path) -> SimpleResult<Vec<Utf8PathBuf>> {
    check_required_filename(list_filename, "input list")?;
    let content = map_err_with!(
        std::fs::read_to_string(list_filename),
        "Failed to read input list file: '{}'",
        list_filename
    )?;
    Ok(content
        .lines()
        .map(|x| x.trim())
        .filter(|x| !x.is_empty() && !x.starts_with('#'))
        .map(Utf8PathBuf::from)
        .collect())
}

/// Expand any '.list' files in the input arguments and check that every input exists
///
/// Input order is preserved, with the contents of each list file expanded in place. The same
/// input file given more than once is an error.
///
/// Assumes no logger has been configured yet
///
pub fn unroll_input_paths(inputs: &[Utf8PathBuf]) -> SimpleResult<Vec<Utf8PathBuf>> {
    let mut input_paths = Vec::new();
    for input in inputs {
        if input.as_str().ends_with(".list") {
            input_paths.extend(read_input_list(input)?);
        } else {
            input_paths.push(input.clone());
        }
    }

    if input_paths.is_empty() {
        bail!("No input variant files specified");
    }

    let mut check_paths = HashSet::new();
    for (input_index, input_path) in input_paths.iter().enumerate() {
        check_required_filename(input_path, &format!("input variant (#{})", input_index + 1))?;
        let canonical_path = map_err_with!(
            input_path.canonicalize_utf8(),
            "Failed to resolve input path: '{}'",
            input_path
        )?;
        if !check_paths.insert(canonical_path) {
            bail!("Duplicated input variant file: '{input_path}'");
        }
    }

    Ok(input_paths)
}
