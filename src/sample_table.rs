use std::collections::HashMap;

use simple_error::{SimpleResult, bail};

/// Dense sample index for every sample in the merge cohort
///
/// Samples are registered while input headers are scanned. The table is treated as frozen once
/// breakpoint extraction starts, so the index of a sample is stable for the whole run.
///
#[derive(Default)]
pub struct SampleTable {
    names: Vec<String>,

    /// Input path which registered each sample, used for duplicate error messages
    sources: Vec<String>,

    name_to_index: HashMap<String, u32>,
}

impl SampleTable {
    /// Add a new sample and return its index
    ///
    /// A sample name can only be registered once in the whole run.
    ///
    pub fn register(&mut self, name: &str, source: &str) -> SimpleResult<u32> {
        if let Some(&sample_index) = self.name_to_index.get(name) {
            bail!(
                "Duplicate sample name '{name}' in input '{source}', already registered from input '{}'",
                self.sources[sample_index as usize]
            );
        }
        let sample_index = match u32::try_from(self.names.len()) {
            Ok(x) => x,
            Err(_) => bail!("Too many input samples"),
        };
        self.names.push(name.to_string());
        self.sources.push(source.to_string());
        self.name_to_index.insert(name.to_string(), sample_index);
        Ok(sample_index)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, sample_index: u32) -> &str {
        &self.names[sample_index as usize]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Total allele slots in the cohort, assuming every sample is diploid
    pub fn allele_slot_count(&self) -> usize {
        2 * self.names.len()
    }
}
