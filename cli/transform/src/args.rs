//! CLI argument definitions for sf-transform.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub use sf_cli_common::LogLevel;

/// Apply scripted key/value transforms to a stream of records.
///
/// Reads NDJSON records (`{"topic", "partition", "offset", "timestamp",
/// "key", "value"}`) from stdin or `--input`, runs `keyTransform` and
/// `valueTransform` from the chosen engine over each one, and writes the
/// results as NDJSON to stdout or `--output`.
///
/// ## Examples
///
/// Append a suffix to every key with Lua:
///   sf-transform -e lua -k 'function keyTransform(k) return k .. "123" end' < in.ndjson
///
/// Transform bare JSON values with jq, dead-lettering failures:
///   sf-transform -e jq --raw -v 'def valueTransform: .seen = true;' \
///     --error-policy drop --dead-letter failed.ndjson < values.ndjson
///
/// Check scripts compile without processing any input:
///   sf-transform --config transform.json --validate
#[derive(Parser, Debug)]
#[command(name = "sf-transform")]
#[command(version, about, long_about = None)]
pub struct Cli {
    // === Transformer ===
    /// Script engine name (overrides `engine-name` from --config)
    #[arg(short = 'e', long, env = "SF_ENGINE")]
    pub engine: Option<String>,

    /// Inline source defining keyTransform
    #[arg(short = 'k', long, conflicts_with = "key_script_file")]
    pub key_script: Option<String>,

    /// File containing the source defining keyTransform
    #[arg(long)]
    pub key_script_file: Option<PathBuf>,

    /// Inline source defining valueTransform
    #[arg(short = 'v', long, conflicts_with = "value_script_file")]
    pub value_script: Option<String>,

    /// File containing the source defining valueTransform
    #[arg(long)]
    pub value_script_file: Option<PathBuf>,

    /// JSON file with `engine-name`, `key-script` and `value-script`
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    // === Input / Output ===
    /// Read records from this file instead of stdin
    #[arg(short = 'i', long)]
    pub input: Option<PathBuf>,

    /// Write records to this file instead of stdout
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Treat each input line as a bare record value rather than a record
    #[arg(long)]
    pub raw: bool,

    /// Topic assigned to records read with --raw
    #[arg(long, default_value = "stdin", requires = "raw")]
    pub topic: String,

    /// Pretty-print output records (one JSON document per record)
    #[arg(long)]
    pub pretty: bool,

    /// Stop after this many input records
    #[arg(short = 'n', long)]
    pub limit: Option<u64>,

    // === Processing ===
    /// Number of worker threads sharing the transformer (must be >= 1)
    #[arg(short = 't', long, default_value_t = default_threads(), value_parser = parse_positive_usize)]
    pub threads: usize,

    /// Records read per batch before fanning out to workers (must be >= 1)
    #[arg(long, default_value = "1024", value_parser = parse_positive_usize)]
    pub batch_size: usize,

    /// What to do with a record whose transform fails
    #[arg(long, value_enum, default_value = "fail")]
    pub error_policy: ErrorPolicy,

    /// Append failed records, with their error, to this NDJSON file
    #[arg(long)]
    pub dead_letter: Option<PathBuf>,

    // === Modes ===
    /// Configure the transformer and exit without reading input
    #[arg(long)]
    pub validate: bool,

    /// Print the available engine names and exit
    #[arg(long)]
    pub list_engines: bool,

    /// Print run statistics to stderr when done
    #[arg(long)]
    pub stats: bool,

    // === Logging ===
    /// Log level
    #[arg(short = 'l', long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,
}

/// Error handling policies for records whose transform fails.
///
/// Configuration and compilation errors always abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ErrorPolicy {
    /// Stop at the first failing record
    Fail,
    /// Skip failing records and continue
    Drop,
    /// Emit failing records unchanged and continue
    Passthrough,
}

/// One worker per available CPU.
fn default_threads() -> usize {
    num_cpus::get().max(1)
}

/// Parse a positive usize (>= 1).
fn parse_positive_usize(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if value < 1 {
        return Err(format!("{} is not in 1..", value));
    }
    Ok(value)
}
