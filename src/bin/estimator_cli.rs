use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::{SeedableRng, rngs::StdRng};
use rusty_estimator::{
    config::{self, Config},
    estimate::{
        EstimateOutcome, EstimateRequest, EstimationService, render_table, to_json, to_xlsx,
    },
    knowledge_base::{FakeDataGenerator, IndexSetup, IssueTally, KnowledgeBaseLoader},
    logging,
    rates::{RateTable, rate_source_from_config},
    storage::store_from_config,
};

#[derive(Parser)]
#[command(
    name = "estimator-cli",
    about = "Project estimation and knowledge-base tooling"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Estimate a project from a PDF or extracted text.
    Estimate {
        /// PDF to store and analyze.
        #[arg(long, conflicts_with = "text")]
        pdf: Option<PathBuf>,
        /// Plain-text file used as the document text.
        #[arg(long)]
        text: Option<PathBuf>,
        /// Free-form requirements.
        #[arg(long)]
        requirements: Option<String>,
        /// Write the tasks to this workbook.
        #[arg(long)]
        xlsx: Option<PathBuf>,
        /// Write the tasks to this JSON file.
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Load every knowledge-base file into the search index.
    BuildKb {
        /// Delete and create the index first.
        #[arg(long)]
        recreate_index: bool,
        /// JSON index definition used with --recreate-index.
        #[arg(long, requires = "recreate_index")]
        schema: Option<PathBuf>,
    },
    /// Generate synthetic task workbooks.
    FakeData {
        /// Number of workbooks.
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Tasks per workbook.
        #[arg(long, default_value_t = 10)]
        records: usize,
        #[arg(long, default_value = "export/fake data")]
        output_dir: PathBuf,
        /// Seed for reproducible output.
        #[arg(long)]
        seed: Option<u64>,
        /// Also store the workbooks in the knowledge-base container.
        #[arg(long)]
        upload: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(logging::Console::Stderr);
    match cli.command {
        Command::Estimate {
            pdf,
            text,
            requirements,
            xlsx,
            json,
        } => estimate(pdf, text, requirements, xlsx, json).await,
        Command::BuildKb {
            recreate_index,
            schema,
        } => build_kb(recreate_index, schema).await,
        Command::FakeData {
            count,
            records,
            output_dir,
            seed,
            upload,
        } => fake_data(count, records, &output_dir, seed, upload).await,
    }
}

fn load_config() -> Result<&'static Config> {
    config::init_config().context("Failed to load configuration")
}

async fn estimate(
    pdf: Option<PathBuf>,
    text: Option<PathBuf>,
    requirements: Option<String>,
    xlsx: Option<PathBuf>,
    json: Option<PathBuf>,
) -> Result<()> {
    let requirements = requirements.filter(|value| !value.trim().is_empty());
    if pdf.is_none() && text.is_none() && requirements.is_none() {
        bail!("Provide --pdf, --text, or --requirements");
    }

    let service = EstimationService::from_config(load_config()?)
        .context("Failed to build estimation pipeline")?;

    let document_text = match (pdf, text) {
        (Some(path), _) => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("document.pdf")
                .to_string();
            let document = service.ingest_document(&name, bytes).await?;
            println!("Stored {name} at {}", document.url);
            Some(document.text)
        }
        (None, Some(path)) => Some(
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        (None, None) => None,
    };

    let outcome = service
        .estimate(EstimateRequest {
            document_text,
            requirements,
        })
        .await?;

    match outcome {
        EstimateOutcome::Estimated(result) => {
            println!("Query: {}", result.query);
            println!("Grounded on {} historical tasks", result.hits.len());
            println!();
            println!("{}", render_table(&result.report.tasks));
            println!(
                "Total: {} days, {:.2}",
                result.report.total_days, result.report.total_price
            );
            if let Some(declared) = &result.report.declared_summary {
                println!("Model {}: {declared}", result.report.summary_field);
            }
            for issue in &result.report.issues {
                println!(
                    "warning: task {} {}: {}",
                    issue.task_index + 1,
                    issue.field,
                    issue.message
                );
            }
            if let Some(path) = xlsx {
                let bytes = to_xlsx(&result.report.tasks)?;
                write_file(&path, &bytes)?;
            }
            if let Some(path) = json {
                let body = to_json(&result.report.tasks)?;
                write_file(&path, body.as_bytes())?;
            }
        }
        EstimateOutcome::NoMatches { query, message }
        | EstimateOutcome::NoTasks { query, message, .. } => {
            println!("Query: {query}");
            println!("{message}");
        }
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn build_kb(recreate_index: bool, schema: Option<PathBuf>) -> Result<()> {
    let loader = KnowledgeBaseLoader::from_config(load_config()?)?;
    let setup = if recreate_index {
        IndexSetup::Recreate { schema }
    } else {
        IndexSetup::Keep
    };
    let report = loader.run(setup).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.upload.failed > 0 {
        bail!("{} documents were rejected by the index", report.upload.failed);
    }
    Ok(())
}

async fn fake_data(
    count: usize,
    records: usize,
    output_dir: &Path,
    seed: Option<u64>,
    upload: bool,
) -> Result<()> {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let (rates, store) = if upload {
        let config = load_config()?;
        let rates = rate_source_from_config(config).fetch_rates().await;
        let store = store_from_config(config, &config.knowledge_base_container)?;
        (rates, Some(store))
    } else {
        (RateTable::sample(), None)
    };

    let mut tally = IssueTally::new();
    let paths = FakeDataGenerator::new(rng, &rates)
        .write_files(count, records, output_dir, store.as_deref(), &mut tally)
        .await?;

    for path in &paths {
        println!("Fake data project created at: {}", path.display());
    }
    println!("Issue frequency:");
    for (issue, count) in tally.iter() {
        println!("  {issue}: {count}");
    }
    Ok(())
}
