//! Main execution logic for sf-transform.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::json;
use sf_error::{classify_error, SfError};
use sf_script::{EngineRegistry, ScriptTransformer, TransformStatsSnapshot, TransformerConfig};
use sf_traits::Transform;
use sf_types::{Record, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, Scope};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::args::{Cli, ErrorPolicy};

/// An input record and the outcome of transforming it.
type Applied = (Record, sf_error::Result<Record>);

/// Statistics for one run over the input.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Records parsed from the input
    pub records_read: u64,

    /// Records written to the output
    pub records_written: u64,

    /// Records whose transform failed
    pub records_failed: u64,

    /// Failed records that were skipped
    pub records_dropped: u64,

    /// Failed records written unchanged
    pub records_passed_through: u64,

    /// Input bytes consumed, including line terminators
    pub bytes_read: u64,

    /// Wall-clock time spent processing input
    pub duration: Duration,

    /// Counters from the transformer itself
    pub transform: TransformStatsSnapshot,
}

impl RunStats {
    /// Records per second over the whole run.
    pub fn throughput(&self) -> Option<f64> {
        let secs = self.duration.as_secs_f64();
        (secs > 0.0 && self.records_read > 0).then(|| self.records_read as f64 / secs)
    }
}

/// Execute with the provided arguments.
///
/// Returns `None` for modes that do not process input (`--list-engines`,
/// `--validate`).
pub fn execute(args: Cli) -> Result<Option<RunStats>> {
    if args.list_engines {
        let mut output = open_output(args.output.as_deref())?;
        for name in EngineRegistry::builtin().names() {
            writeln!(output, "{name}")?;
        }
        output.flush()?;
        return Ok(None);
    }

    let config = build_config(&args)?;
    let engine = config.engine_name.clone();
    let transformer = ScriptTransformer::from_config(config)
        .with_context(|| format!("failed to configure '{engine}' transformer"))?;
    info!(engine = %engine, "Transformer configured");

    if args.validate {
        eprintln!("Configuration OK (engine: {engine})");
        return Ok(None);
    }

    let input = open_input(args.input.as_deref())?;
    let mut sinks = Sinks {
        output: open_output(args.output.as_deref())?,
        dead_letter: args
            .dead_letter
            .as_deref()
            .map(open_dead_letter)
            .transpose()?,
        raw: args.raw,
        pretty: args.pretty,
    };

    let started = Instant::now();
    let mut stats = if args.threads == 1 {
        process(&args, input, &mut sinks, |batch| {
            Ok(batch
                .into_iter()
                .map(|record| {
                    let result = transformer.apply(&record);
                    (record, result)
                })
                .collect())
        })?
    } else {
        thread::scope(|scope| {
            let pool = WorkerPool::spawn(scope, &transformer, args.threads);
            process(&args, input, &mut sinks, |batch| pool.apply(batch))
        })?
    };
    sinks.flush()?;

    stats.duration = started.elapsed();
    stats.transform = transformer.stats();
    info!(
        records = stats.records_read,
        failed = stats.records_failed,
        elapsed_ms = stats.duration.as_millis() as u64,
        "Run complete"
    );

    Ok(Some(stats))
}

/// Builds the transformer configuration from `--config` and the script flags.
///
/// Flags take precedence over the config file.
fn build_config(args: &Cli) -> Result<TransformerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let mut document: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(&text)
                    .with_context(|| format!("invalid config file {}", path.display()))?;
            if let Some(engine) = &args.engine {
                document.insert("engine-name".to_string(), engine.clone().into());
            }
            serde_json::from_value(serde_json::Value::Object(document))
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => match &args.engine {
            Some(engine) => TransformerConfig::new(engine),
            None => bail!("--engine is required unless --config is given"),
        },
    };

    if let Some(script) = read_script(args.key_script.as_deref(), args.key_script_file.as_deref())? {
        config.key_script = Some(script);
    }
    if let Some(script) =
        read_script(args.value_script.as_deref(), args.value_script_file.as_deref())?
    {
        config.value_script = Some(script);
    }

    debug!(
        engine = %config.engine_name,
        key_script = config.key_script.is_some(),
        value_script = config.value_script.is_some(),
        "Built transformer config"
    );
    Ok(config)
}

fn read_script(inline: Option<&str>, file: Option<&Path>) -> Result<Option<String>> {
    match (inline, file) {
        (Some(source), _) => Ok(Some(source.to_string())),
        (None, Some(path)) => fs::read_to_string(path)
            .map(Some)
            .with_context(|| format!("failed to read script file {}", path.display())),
        (None, None) => Ok(None),
    }
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    Ok(match path {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    })
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    })
}

fn open_dead_letter(path: &Path) -> Result<Box<dyn Write>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open dead-letter file {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

/// Parses one input line into a record. `index` is the zero-based position
/// of the record in the input.
fn parse_record(line: &str, index: u64, args: &Cli) -> Result<Record> {
    if args.raw {
        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("record {index}: invalid JSON value"))?;
        Ok(Record::new(args.topic.as_str(), Value::Null, value).with_offset(index as i64))
    } else {
        serde_json::from_str(line).with_context(|| format!("record {index}: invalid record"))
    }
}

/// Where transformed and failed records are written.
struct Sinks {
    output: Box<dyn Write>,
    dead_letter: Option<Box<dyn Write>>,
    raw: bool,
    pretty: bool,
}

impl Sinks {
    fn write_record(&mut self, record: &Record) -> Result<()> {
        let text = match (self.raw, self.pretty) {
            (true, false) => serde_json::to_string(record.value()),
            (true, true) => serde_json::to_string_pretty(record.value()),
            (false, false) => serde_json::to_string(record),
            (false, true) => serde_json::to_string_pretty(record),
        }?;
        writeln!(self.output, "{text}").context("failed to write output")
    }

    fn write_dead_letter(&mut self, record: &Record, error: &SfError) -> Result<()> {
        let Some(dead_letter) = self.dead_letter.as_mut() else {
            return Ok(());
        };
        let entry = json!({
            "error": error.to_string(),
            "scope": classify_error(error).to_string(),
            "record": record,
        });
        writeln!(dead_letter, "{entry}").context("failed to write dead-letter record")
    }

    fn flush(&mut self) -> Result<()> {
        self.output.flush().context("failed to flush output")?;
        if let Some(dead_letter) = self.dead_letter.as_mut() {
            dead_letter.flush().context("failed to flush dead-letter file")?;
        }
        Ok(())
    }
}

/// Reads the input in batches, transforms each batch with `apply_batch` and
/// writes the results in input order.
fn process<F>(
    args: &Cli,
    input: Box<dyn BufRead>,
    sinks: &mut Sinks,
    mut apply_batch: F,
) -> Result<RunStats>
where
    F: FnMut(Vec<Record>) -> Result<Vec<Applied>>,
{
    let mut stats = RunStats::default();
    let mut lines = input.lines();
    let limit = args.limit.unwrap_or(u64::MAX);

    loop {
        let mut batch = Vec::with_capacity(args.batch_size);
        while batch.len() < args.batch_size && stats.records_read < limit {
            let Some(line) = lines.next() else {
                break;
            };
            let line = line.context("failed to read input")?;
            stats.bytes_read += line.len() as u64 + 1;
            if line.trim().is_empty() {
                continue;
            }
            batch.push(parse_record(&line, stats.records_read, args)?);
            stats.records_read += 1;
        }

        if batch.is_empty() {
            break;
        }

        for (record, result) in apply_batch(batch)? {
            match result {
                Ok(output) => {
                    sinks.write_record(&output)?;
                    stats.records_written += 1;
                }
                Err(error) => handle_failure(args.error_policy, record, error, sinks, &mut stats)?,
            }
        }
    }

    Ok(stats)
}

fn handle_failure(
    policy: ErrorPolicy,
    record: Record,
    error: SfError,
    sinks: &mut Sinks,
    stats: &mut RunStats,
) -> Result<()> {
    stats.records_failed += 1;
    sinks.write_dead_letter(&record, &error)?;

    if !error.is_record_scoped() {
        return Err(anyhow::Error::new(error).context("transformer failed"));
    }

    match policy {
        ErrorPolicy::Fail => Err(anyhow::Error::new(error)
            .context(format!("transform failed for record {}", record.id()))),
        ErrorPolicy::Drop => {
            warn!(record = %record.id(), error = %error, "Transform failed, dropping record");
            stats.records_dropped += 1;
            Ok(())
        }
        ErrorPolicy::Passthrough => {
            warn!(record = %record.id(), error = %error, "Transform failed, passing record through");
            sinks.write_record(&record)?;
            stats.records_written += 1;
            stats.records_passed_through += 1;
            Ok(())
        }
    }
}

/// Long-lived worker threads sharing one transformer, so that each thread
/// compiles its scripts once for the whole run.
struct WorkerPool {
    jobs: Vec<Sender<(usize, Vec<Record>)>>,
    results: Receiver<(usize, Vec<Applied>)>,
}

impl WorkerPool {
    fn spawn<'scope, 'env>(
        scope: &'scope Scope<'scope, 'env>,
        transformer: &'env ScriptTransformer,
        threads: usize,
    ) -> Self {
        let (result_tx, results) = mpsc::channel();
        let jobs = (0..threads)
            .map(|worker| {
                let (job_tx, job_rx) = mpsc::channel::<(usize, Vec<Record>)>();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    debug!(worker, "Worker started");
                    for (chunk, records) in job_rx {
                        let applied = records
                            .into_iter()
                            .map(|record| {
                                let result = transformer.apply(&record);
                                (record, result)
                            })
                            .collect();
                        if result_tx.send((chunk, applied)).is_err() {
                            break;
                        }
                    }
                });
                job_tx
            })
            .collect();

        Self { jobs, results }
    }

    /// Splits the batch across the workers and reassembles it in order.
    fn apply(&self, mut batch: Vec<Record>) -> Result<Vec<Applied>> {
        let chunk_size = batch.len().div_ceil(self.jobs.len());
        let mut sent = 0;
        while !batch.is_empty() {
            let rest = batch.split_off(chunk_size.min(batch.len()));
            self.jobs[sent]
                .send((sent, batch))
                .map_err(|_| anyhow!("worker {sent} exited unexpectedly"))?;
            batch = rest;
            sent += 1;
        }

        let mut chunks = Vec::with_capacity(sent);
        for _ in 0..sent {
            chunks.push(
                self.results
                    .recv()
                    .map_err(|_| anyhow!("worker exited unexpectedly"))?,
            );
        }
        chunks.sort_unstable_by_key(|(chunk, _)| *chunk);
        Ok(chunks.into_iter().flat_map(|(_, applied)| applied).collect())
    }
}
