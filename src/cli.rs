use std::path::PathBuf;

use clap::Parser;

/// Identify known open-source licenses in files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Files or directories to scan (directories are walked recursively)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// License corpus root, laid out as <category>/<name>/<variant>
    #[arg(long, value_name = "DIR")]
    pub licenses: PathBuf,

    /// Also report license header matches
    #[arg(long)]
    pub headers: bool,

    /// Write machine-readable output to this file
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,

    /// Include the matched license text in the JSON output
    #[arg(long = "include_text")]
    pub include_text: bool,

    /// Number of files scanned concurrently
    #[arg(long, default_value_t = 1000)]
    pub tasks: usize,

    /// Seconds before giving up on the batch
    #[arg(long, value_name = "SECS", default_value_t = 86_400)]
    pub timeout: u64,

    /// Confidence threshold below which matches are suppressed
    #[arg(long, default_value_t = 0.8)]
    pub threshold: f64,

    /// Comma-separated classifier phases to trace (tokenize, frequency,
    /// searchset, score; * for all)
    #[arg(long = "trace_phases", default_value = "")]
    pub trace_phases: String,

    /// Comma-separated license names to trace (trailing * acts as a prefix
    /// wildcard)
    #[arg(long = "trace_licenses", default_value = "")]
    pub trace_licenses: String,

    /// Comma-separated regular expressions of paths to ignore (must match
    /// the whole path)
    #[arg(long = "ignore_paths_re", value_name = "RE", value_delimiter = ',')]
    pub ignore_paths_re: Vec<String>,
}
