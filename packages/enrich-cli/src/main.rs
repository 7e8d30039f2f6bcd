//! Command line entry point for the enrichment pipeline.
//!
//! Writes JSON to stdout and logs to stderr, so output can be piped.

mod config;
mod input;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use enrichment::{
    Classifier, DedupIndex, JsonlRecordLog, JsonlSeenStore, Normalizer, Orchestrator, Pipeline,
    RecordLog, Row, RunSummary, SeenStore,
};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "enrich")]
#[command(about = "Normalize, dedup and enrich scraped job postings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over a JSON-lines file of scraped records
    Run {
        #[arg(long, short)]
        input: PathBuf,
        /// Directory holding postings.jsonl and seen.jsonl (default: OUTPUT_DIR)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Record postings without calling the extraction backend
        #[arg(long)]
        no_extract: bool,
        /// Extraction calls in flight (default: EXTRACTION_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print the record log as flat report rows
    Export {
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Use human-readable column titles
        #[arg(long)]
        titles: bool,
    },

    /// Count index entries and records by status
    Stats {
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct Stats {
    index_entries: usize,
    records: usize,
    by_status: BTreeMap<String, usize>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,enrichment=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            input,
            output_dir,
            no_extract,
            concurrency,
        } => {
            let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
            run(&config, &input, &output_dir, no_extract, concurrency).await
        }
        Commands::Export { output_dir, titles } => {
            let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
            export(&output_dir, titles)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stats { output_dir } => {
            let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
            stats(&output_dir)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(
    config: &Config,
    input: &Path,
    output_dir: &Path,
    no_extract: bool,
    concurrency: Option<usize>,
) -> Result<ExitCode> {
    let mut pipeline_config = config.pipeline_config();
    if let Some(concurrency) = concurrency {
        pipeline_config = pipeline_config.with_concurrency(concurrency);
    }
    if no_extract {
        pipeline_config = pipeline_config.without_extraction();
    }

    let model = match config.language_model() {
        Ok(model) => model,
        Err(e) => return not_started(e),
    };
    tracing::info!(languages = ?model.languages(), "Language model loaded");
    let classifier = Classifier::new(Arc::new(model)).with_config(config.classifier_config());

    let mut pipeline = Pipeline::new(Normalizer::new(), classifier, pipeline_config);
    if pipeline.config().extract {
        if let Some(backend) = config.backend()? {
            pipeline =
                pipeline.with_orchestrator(Orchestrator::new(backend, config.extraction_config()));
        }
    }

    let mut index = match DedupIndex::load(Box::new(JsonlSeenStore::in_dir(output_dir)))
        .context("Failed to load dedup index")
    {
        Ok(index) => index,
        Err(e) => return not_started(e),
    };
    let mut log = JsonlRecordLog::in_dir(output_dir);

    let off_target = Cell::new(0usize);
    let records = input::read_records(input)?.filter(|record| match record {
        Ok(raw) if !config.search.accepts_position(raw.position.as_deref()) => {
            off_target.set(off_target.get() + 1);
            false
        }
        _ => true,
    });

    let outcome = pipeline.run_records(records, &mut index, &mut log).await;
    if off_target.get() > 0 {
        tracing::info!(
            skipped = off_target.get(),
            "Skipped records found under positions outside the search"
        );
    }

    let (summary, code) = match outcome {
        Ok(result) => (result.summary(), ExitCode::SUCCESS),
        Err(aborted) => {
            tracing::error!(error = %aborted.cause, "Run aborted");
            let mut summary = aborted.partial.summary();
            summary.error = Some(aborted.cause.to_string());
            (summary, ExitCode::FAILURE)
        }
    };

    print_json(&summary)?;
    Ok(code)
}

/// Report a run that could not start with an empty summary.
fn not_started(error: anyhow::Error) -> Result<ExitCode> {
    let message = format!("{:#}", error);
    tracing::error!(error = %message, "Run could not start");
    print_json(&RunSummary::not_started(message))?;
    Ok(ExitCode::FAILURE)
}

fn export(output_dir: &Path, titles: bool) -> Result<()> {
    let postings = JsonlRecordLog::in_dir(output_dir)
        .load_all()
        .context("Failed to read record log")?;

    let rows: Vec<Row> = postings
        .iter()
        .map(|p| if titles { p.to_titled_row() } else { p.to_row() })
        .collect();

    print_json(&rows)
}

fn stats(output_dir: &Path) -> Result<()> {
    let index_entries = JsonlSeenStore::in_dir(output_dir)
        .load()
        .context("Failed to read dedup index")?
        .len();
    let postings = JsonlRecordLog::in_dir(output_dir)
        .load_all()
        .context("Failed to read record log")?;

    let mut by_status = BTreeMap::new();
    for posting in &postings {
        *by_status.entry(posting.status.to_string()).or_insert(0) += 1;
    }

    print_json(&Stats {
        index_entries,
        records: postings.len(),
        by_status,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_language_model_fails_before_reading() {
        let dir = std::env::temp_dir().join(format!("enrich-cli-run-{}", std::process::id()));
        let config = Config::from_lookup(|name| match name {
            "LANGUAGE_MODEL_PATH" => Some(dir.join("missing.txt").display().to_string()),
            _ => None,
        })
        .unwrap();

        let code = run(&config, &dir.join("input.jsonl"), &dir, true, None)
            .await
            .unwrap();

        assert_eq!(code, ExitCode::FAILURE);
        assert!(!dir.join("seen.jsonl").exists());
    }
}
