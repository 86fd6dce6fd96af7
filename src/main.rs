use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use cost_attribution::config::{init_config, Config};
use cost_attribution::display::DisplayManager;
use cost_attribution::logging::init_logging;
use cost_attribution::reports::ReportWriter;
use cost_attribution::{
    get_periods, CollectedData, CostReportAnalyzer, ProcessedReport, TargetMonth,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "cost-attribution")]
#[command(about = "Attribute cloud costs to cost centers across comparison periods")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the reporting periods for a date
    Periods {
        /// Reference instant (RFC 3339 or YYYY-MM-DD), defaults to now
        #[arg(long)]
        at: Option<String>,
        /// Backfill target year
        #[arg(long, requires = "month")]
        year: Option<i32>,
        /// Backfill target month (1-12)
        #[arg(long, requires = "year")]
        month: Option<u32>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Process one collected document
    Report {
        /// Collected data document (JSON)
        #[arg(long)]
        input: PathBuf,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
        /// Write summary and export files
        #[arg(long)]
        write: bool,
        /// Output directory, overrides the configured one
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Process many collected documents concurrently
    Batch {
        /// Glob pattern matching collected data documents
        #[arg(long)]
        inputs: String,
        /// Output directory, overrides the configured one
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let json = match &cli.command {
        Commands::Periods { json, .. } | Commands::Report { json, .. } => *json,
        Commands::Batch { .. } => false,
    };

    let config = match init_config() {
        Ok(config) => config,
        Err(e) => handle_error(e, json),
    };
    let _guard = init_logging(config);

    let result = match cli.command {
        Commands::Periods { at, year, month, json } => run_periods(config, at, year, month, json),
        Commands::Report { input, json, write, output } => {
            run_report(config, &input, json, write, output)
        }
        Commands::Batch { inputs, output } => run_batch(config, &inputs, output).await,
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => handle_error(e, json),
    }
}

fn parse_reference(at: Option<&str>) -> Result<DateTime<Utc>> {
    let Some(at) = at else {
        return Ok(Utc::now());
    };
    if let Ok(instant) = DateTime::parse_from_rfc3339(at) {
        return Ok(instant.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(at, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use RFC 3339 or YYYY-MM-DD", at))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid date '{}'", at))?;
    Ok(midnight.and_utc())
}

fn run_periods(
    config: &Config,
    at: Option<String>,
    year: Option<i32>,
    month: Option<u32>,
    json: bool,
) -> Result<()> {
    let now = parse_reference(at.as_deref())?;
    let target = match (year, month) {
        (Some(year), Some(month)) => Some(TargetMonth { year, month }),
        _ => None,
    };
    let periods = get_periods(now, target)?;
    DisplayManager::new(config.output.json_pretty).display_periods(&periods, json)
}

fn run_report(
    config: &Config,
    input: &Path,
    json: bool,
    write: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let data = CollectedData::from_path(input)?;
    let analyzer = CostReportAnalyzer::new(config.engine_options());
    let reports = analyzer.process(&data)?;

    let summaries: Vec<_> = reports.iter().map(|r| &r.summary).collect();
    DisplayManager::new(config.output.json_pretty).display_summaries(&summaries, json)?;

    if write {
        let directory = output.unwrap_or_else(|| config.output.directory.clone());
        let writer = ReportWriter::new(directory, config.output.json_pretty);
        let written = writer.write_all(&reports)?;
        if !json {
            for path in written {
                eprintln!("wrote {}", path.display());
            }
        }
    }
    Ok(())
}

async fn run_batch(config: &Config, pattern: &str, output: Option<PathBuf>) -> Result<()> {
    let inputs: Vec<PathBuf> = glob::glob(pattern)
        .with_context(|| format!("Invalid input pattern: {}", pattern))?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    if inputs.is_empty() {
        bail!("No input documents match '{}'", pattern);
    }
    info!(inputs = inputs.len(), "Processing collected documents");

    let analyzer = Arc::new(CostReportAnalyzer::new(config.engine_options()));
    let directory = output.unwrap_or_else(|| config.output.directory.clone());
    let writer = Arc::new(ReportWriter::new(directory, config.output.json_pretty));

    let tasks = inputs.iter().cloned().map(|path| {
        let analyzer = Arc::clone(&analyzer);
        tokio::task::spawn_blocking(move || -> Result<Vec<ProcessedReport>> {
            let data = CollectedData::from_path(&path)?;
            analyzer.process(&data)
        })
    });
    let processed: Vec<Result<Vec<ProcessedReport>>> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.context("Processing task aborted").and_then(|result| result))
        .collect();

    // Each period directory gets exactly one writer
    let writes = claim_periods(&inputs, processed).into_iter().map(|claimed| {
        let writer = Arc::clone(&writer);
        tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
            writer.write_all(&claimed?)
        })
    });
    let results = futures::future::join_all(writes).await;

    let mut failed = 0;
    for (path, result) in inputs.iter().zip(results) {
        match result {
            Ok(Ok(written)) => {
                println!("ok      {} ({} files)", path.display(), written.len());
            }
            Ok(Err(e)) => {
                failed += 1;
                error!(input = %path.display(), error = %e, "Failed to process document");
                println!("failed  {}: {:#}", path.display(), e);
            }
            Err(e) => {
                failed += 1;
                error!(input = %path.display(), error = %e, "Writing task aborted");
                println!("failed  {}: {}", path.display(), e);
            }
        }
    }

    println!("{} succeeded, {} failed", inputs.len() - failed, failed);
    if failed > 0 {
        bail!("{} of {} documents failed", failed, inputs.len());
    }
    Ok(())
}

/// Assign every period label to the first document, in input order, that produces it.
///
/// A later document producing an already claimed period fails as a whole, so no two
/// documents ever write the same `<dir>/<period>/` files.
fn claim_periods(
    inputs: &[PathBuf],
    processed: Vec<Result<Vec<ProcessedReport>>>,
) -> Vec<Result<Vec<ProcessedReport>>> {
    let mut owners: HashMap<String, &Path> = HashMap::new();
    inputs
        .iter()
        .zip(processed)
        .map(|(path, result)| -> Result<Vec<ProcessedReport>> {
            let reports = result?;
            let conflict = reports.iter().find_map(|report| {
                owners
                    .get(&report.summary.period)
                    .map(|owner| (report.summary.period.as_str(), *owner))
            });
            if let Some((period, owner)) = conflict {
                bail!("Period {} is already produced by {}", period, owner.display());
            }
            for report in &reports {
                owners.insert(report.summary.period.clone(), path.as_path());
            }
            Ok(reports)
        })
        .collect()
}

fn handle_error(e: anyhow::Error, json: bool) -> ! {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
    } else {
        eprintln!("Error: {:#}", e);
    }
    process::exit(1);
}
