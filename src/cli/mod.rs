mod utils;

use camino::Utf8PathBuf;
use clap::Parser;
use simple_error::{SimpleResult, bail};

use self::utils::unroll_input_paths;
use crate::consensus_output::OutputType;

/// Default number of breakpoints held in memory before sorting spills to a temporary file
pub const DEFAULT_MAX_RECORDS_IN_RAM: usize = 50_000;

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}"
)]
#[clap(rename_all = "kebab_case")]
pub struct Settings {
    /// Input structural variant files in VCF or BCF format.
    ///
    /// Any input ending in '.list' is read as a file listing one input path per line.
    ///
    #[arg(required = true, value_name = "INPUT")]
    pub inputs: Vec<Utf8PathBuf>,

    /// This value will be filled in by inputs, after expanding any list files
    #[arg(skip)]
    pub input_paths: Vec<Utf8PathBuf>,

    /// Output variant file. Output is written to stdout if not specified.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<Utf8PathBuf>,

    /// Output format. Inferred from the output filename extension if not specified.
    #[arg(short = 'O', long = "output-type", value_enum, value_name = "TYPE")]
    output_type_option: Option<OutputType>,

    /// This value will be filled in by output_type_option
    #[arg(skip)]
    pub output_type: OutputType,

    /// Maximum distance between two breakpoint intervals for the breakpoints to be clustered
    #[arg(short, long, value_name = "INT", default_value_t = 0)]
    pub distance: u32,

    /// Maximum number of breakpoints held in memory while sorting.
    ///
    /// Breakpoints beyond this count are sorted in chunks spilled to temporary files.
    ///
    #[arg(long, value_name = "INT", default_value_t = DEFAULT_MAX_RECORDS_IN_RAM)]
    pub max_records_in_ram: usize,

    /// Directory for temporary sort files. Defaults to the system temporary directory.
    #[arg(long, value_name = "DIR")]
    pub tmp_dir: Option<Utf8PathBuf>,

    /// Build a CSI index for the output file. Requires compressed file output.
    #[arg(long)]
    pub write_index: bool,

    /// Write run statistics to this file in JSON format
    #[arg(long, value_name = "FILE")]
    pub stats_json: Option<Utf8PathBuf>,

    /// Turn on extra debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Validate settings and update parameters that can't be processed by clap
///
/// Assumes no logger has been configured yet
///
pub fn validate_and_fix_settings_impl(mut settings: Settings) -> SimpleResult<Settings> {
    settings.input_paths = unroll_input_paths(&settings.inputs)?;

    if settings.max_records_in_ram == 0 {
        bail!("--max-records-in-ram argument must be greater than 0");
    }

    if let Some(tmp_dir) = &settings.tmp_dir
        && !tmp_dir.is_dir()
    {
        bail!("Temporary directory does not exist or is not a directory: '{tmp_dir}'");
    }

    if let Some(output) = &settings.output {
        if output.is_dir() {
            bail!("Output path is a directory: '{output}'");
        }
        if settings.input_paths.iter().any(|x| x == output) {
            bail!("Output path is also an input: '{output}'");
        }
    }

    settings.output_type = match (settings.output_type_option, &settings.output) {
        (Some(x), _) => x,
        (None, Some(output)) => OutputType::from_path_extension(output),
        (None, None) => OutputType::default(),
    };

    if settings.write_index {
        if settings.output.is_none() {
            bail!("--write-index can't be used when writing to stdout");
        }
        if !settings.output_type.is_compressed() {
            bail!("--write-index requires compressed VCF or BCF output");
        }
    }

    Ok(settings)
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
pub fn validate_and_fix_settings(settings: Settings) -> Settings {
    match validate_and_fix_settings_impl(settings) {
        Ok(x) => x,
        Err(msg) => {
            eprintln!("Invalid command-line setting: {msg}");
            std::process::exit(exitcode::USAGE);
        }
    }
}

pub fn parse_settings() -> Settings {
    Settings::parse()
}
