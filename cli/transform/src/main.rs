//! sf-transform CLI
//!
//! Applies scripted key/value transforms to NDJSON records.

use clap::Parser;
use sf_cli_common::{format_bytes, format_duration, format_number, init_logging};

mod args;
mod run;

use args::Cli;

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // Logs go to stderr, so stdout is clean for records
    init_logging(args.log_level)?;

    let print_stats = args.stats;
    let Some(stats) = run::execute(args)? else {
        return Ok(());
    };

    if print_stats {
        eprintln!();
        eprintln!("Transform completed:");
        eprintln!("  Records read:    {}", format_number(stats.records_read));
        eprintln!("  Records written: {}", format_number(stats.records_written));
        eprintln!("  Records failed:  {}", format_number(stats.records_failed));
        if stats.records_dropped > 0 || stats.records_passed_through > 0 {
            eprintln!(
                "                   {} dropped, {} passed through",
                format_number(stats.records_dropped),
                format_number(stats.records_passed_through)
            );
        }
        eprintln!("  Bytes read:      {}", format_bytes(stats.bytes_read));
        eprintln!("  Duration:        {}", format_duration(stats.duration));
        if let Some(rate) = stats.throughput() {
            eprintln!(
                "  Throughput:      {} records/sec",
                format_number(rate as u64)
            );
        }
        eprintln!(
            "  Runtimes:        {} compiled in {}",
            stats.transform.runtimes_created,
            format_duration(stats.transform.compile_time)
        );
    }

    // Exit with error code if any record failed
    if stats.records_failed > 0 {
        std::process::exit(4); // Partial failure
    }

    Ok(())
}
