//! PayGuard batch runner
//!
//! ```bash
//! # Triage a JSONL file of incidents and archive every decision
//! payguard-runner run --input incidents.jsonl
//!
//! # Replayable demo batch of 200 synthetic incidents, no archive writes
//! payguard-runner run --demo 200 --seed 42 --no-persist
//!
//! # Historical summary of the archive
//! payguard-runner summary
//!
//! # Terminals with more than one incident in a file
//! payguard-runner repeats --input incidents.jsonl
//! ```

mod demo;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use payguard_engine::metrics::repeat_subjects;
use payguard_engine::{
    ArchiveWriter, Classifier, ConfigOverrides, ErrorCodeClassifier, ExecutionMode, LogArchive,
    PipelineOrchestrator, PreClassified, RawIncident, TriageConfig,
};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Payment-terminal incident triage", long_about = None)]
struct Cli {
    /// TOML configuration file (values are then overridden by PAYGUARD_* env vars)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Triage a batch of incidents
    Run(RunArgs),
    /// Print aggregate statistics over the whole archive
    Summary {
        /// Archive path (overrides config)
        #[arg(long)]
        archive: Option<PathBuf>,
    },
    /// List terminals that appear more than once in an input file
    Repeats {
        #[arg(long)]
        input: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSONL (or JSON array) file of incident rows
    #[arg(long, required_unless_present = "demo", conflicts_with = "demo")]
    input: Option<PathBuf>,

    /// Generate N synthetic incidents instead of reading a file
    #[arg(long)]
    demo: Option<usize>,

    /// ML confidence threshold for automation
    #[arg(long)]
    threshold: Option<f64>,

    /// Base seed for outcome draws (and demo data)
    #[arg(long)]
    seed: Option<u64>,

    /// Live mode: fresh entropy for outcome draws and demo data
    #[arg(long, default_value_t = false)]
    live: bool,

    /// Archive path (overrides config)
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Do not write to the archive
    #[arg(long, default_value_t = false)]
    no_persist: bool,

    /// Write full resolution records as JSONL
    #[arg(long)]
    output: Option<PathBuf>,

    /// Parallel incident workers
    #[arg(long)]
    workers: Option<usize>,
}

fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<TriageConfig> {
    let mut config = match path {
        Some(path) => TriageConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => TriageConfig::default(),
    };
    config
        .apply_env()
        .context("applying PAYGUARD_* environment")?;
    config.apply_overrides(overrides);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Read rows from a JSONL file, or a JSON array when the file starts with `[`
fn read_rows(path: &Path) -> Result<Vec<RawIncident>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(&content)
            .with_context(|| format!("parsing JSON array in {}", path.display()));
    }

    let mut rows = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row: RawIncident = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid JSON", path.display(), idx + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

fn write_records<T: serde::Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let file =
        std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

async fn run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let overrides = ConfigOverrides {
        confidence_threshold: args.threshold,
        execution_mode: args.live.then_some(ExecutionMode::Live),
        outcome_seed: args.seed,
        archive_path: args.archive.clone(),
        max_parallel_workers: args.workers,
    };
    let config = load_config(config_path, &overrides)?;
    info!(config = %config.summary(), "Configuration loaded");

    let rows = match (&args.input, args.demo) {
        (Some(path), _) => read_rows(path)?,
        (None, Some(n)) => {
            let seed = match config.execution_mode {
                ExecutionMode::Live => None,
                ExecutionMode::Stable => Some(config.outcome_seed.unwrap_or(demo::DEFAULT_DEMO_SEED)),
            };
            info!(rows = n, ?seed, "Generating demo incidents");
            demo::generate(n, seed)
        }
        (None, None) => anyhow::bail!("either --input or --demo is required"),
    };

    let engine = PipelineOrchestrator::new(config.clone())?;
    let classifier: Arc<dyn Classifier> =
        Arc::new(PreClassified::with_fallback(Arc::new(ErrorCodeClassifier)));

    let archive = if args.no_persist {
        None
    } else {
        Some(ArchiveWriter::spawn(LogArchive::new(&config.archive_path)))
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight incidents");
            ctrl_c.cancel();
        }
    });

    let report = engine
        .run_batch(rows, classifier, archive.clone(), cancel)
        .await;

    if let Some(handle) = archive {
        let totals = handle.shutdown().await?;
        info!(
            appended = totals.appended,
            failed = totals.failed,
            path = %config.archive_path.display(),
            "Archive updated"
        );
    }

    for row_error in &report.row_errors {
        warn!(%row_error, "Row skipped");
    }
    for failure in &report.persistence.failures {
        warn!(subject_id = %failure.subject_id, error = %failure.error, "Record not archived");
    }

    if let Some(path) = &args.output {
        write_records(path, &report.records)?;
        info!(path = %path.display(), records = report.records.len(), "Records written");
    }

    let metrics = report.metrics(config.manual_baseline_minutes);
    println!("{}", metrics.format_report());
    if report.cancelled {
        println!(
            "Batch cancelled: {} of {} rows processed.",
            report.records.len() + report.row_errors.len(),
            report.total_rows
        );
    }
    Ok(())
}

fn summary(config_path: Option<&Path>, archive: Option<PathBuf>) -> Result<()> {
    let config = load_config(
        config_path,
        &ConfigOverrides {
            archive_path: archive,
            ..Default::default()
        },
    )?;
    let archive = LogArchive::new(&config.archive_path);
    let summary = archive
        .summary()
        .with_context(|| format!("reading archive {}", config.archive_path.display()))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn repeats(input: &Path) -> Result<()> {
    let rows = read_rows(input)?;
    let ids: Vec<String> = rows.iter().filter_map(RawIncident::subject_hint).collect();
    let repeats = repeat_subjects(ids.iter().map(String::as_str));

    if repeats.is_empty() {
        println!("No repeat terminals in {} rows.", rows.len());
        return Ok(());
    }
    println!("| Terminal | Incidents |\n|----------|-----------|");
    for repeat in &repeats {
        println!("| {} | {} |", repeat.subject_id, repeat.count);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run(args) => run(config_path, args).await,
        Command::Summary { archive } => summary(config_path, archive),
        Command::Repeats { input } => repeats(&input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "payguard-runner",
            "run",
            "--demo",
            "50",
            "--seed",
            "9",
            "--threshold",
            "0.7",
            "--no-persist",
        ])
        .unwrap();
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.demo, Some(50));
                assert_eq!(args.seed, Some(9));
                assert_eq!(args.threshold, Some(0.7));
                assert!(args.no_persist);
                assert!(!args.live);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_requires_input_or_demo() {
        assert!(Cli::try_parse_from(["payguard-runner", "run"]).is_err());
        assert!(Cli::try_parse_from([
            "payguard-runner",
            "run",
            "--input",
            "a.jsonl",
            "--demo",
            "3"
        ])
        .is_err());
    }

    #[test]
    fn test_read_rows_jsonl_and_array() {
        let dir = TempDir::new().unwrap();
        let row = r#"{"atm_id":"ATM-1","location":"Pune Market","hour_of_day":1,"transaction_volume":2,"avg_amount":3,"downtime_minutes":4,"complaint_count":5,"error_code":"E001"}"#;

        let jsonl = dir.path().join("rows.jsonl");
        std::fs::write(&jsonl, format!("{row}\n\n{row}\n")).unwrap();
        assert_eq!(read_rows(&jsonl).unwrap().len(), 2);

        let array = dir.path().join("rows.json");
        std::fs::write(&array, format!("[{row},{row},{row}]")).unwrap();
        assert_eq!(read_rows(&array).unwrap().len(), 3);

        let broken = dir.path().join("broken.jsonl");
        std::fs::write(&broken, format!("{row}\n{{oops\n")).unwrap();
        let err = read_rows(&broken).unwrap_err();
        assert!(format!("{err:#}").contains(":2: invalid JSON"));
    }

    #[test]
    fn test_write_records_creates_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/records.jsonl");
        write_records(&path, &[serde_json::json!({"a": 1}), serde_json::json!({"a": 2})]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
