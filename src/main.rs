use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use slopstopper::analyze::{Orchestrator, SelectionPolicy};
use slopstopper::compare::Comparator;
use slopstopper::config::{
    Config, DEFAULT_DB_PATH, MODEL_DEFAULT, MODEL_JUDGE, MODEL_PREVIEW,
};
use slopstopper::database::Database;
use slopstopper::ingest::ingest_file;
use slopstopper::provider::GeminiClient;
use slopstopper::AppError;

#[derive(Parser)]
#[command(name = "slopstopper", version, about = "Watch-history content audit pipeline")]
struct Cli {
    /// Path to the record store
    #[arg(long, global = true, default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a watch-history JSON export into the record store
    Ingest {
        /// Path to the exported watch-history.json
        file: PathBuf,
    },
    /// Analyze pending records with the provider
    Analyze(AnalyzeArgs),
    /// Run one record through two models and ask a judge which is better
    Compare(CompareArgs),
    /// Reset ANALYZED or ERROR records back to PENDING
    Requeue {
        /// Record ids to reset
        #[arg(long, required = true, value_delimiter = ',')]
        ids: Vec<String>,
    },
    /// Show per-status record counts
    Status,
}

#[derive(Args)]
#[command(group(
    clap::ArgGroup::new("selection")
        .required(true)
        .args(["ids", "limit", "all"])
))]
struct AnalyzeArgs {
    /// Analyze these specific record ids
    #[arg(long, value_delimiter = ',')]
    ids: Option<Vec<String>>,

    /// Analyze the N most recently watched pending records
    #[arg(long)]
    limit: Option<i64>,

    /// Analyze every pending record
    #[arg(long)]
    all: bool,

    /// Concurrent provider requests (capped at 20)
    #[arg(long, default_value_t = 5)]
    workers: usize,

    /// Model to analyze with
    #[arg(long, default_value = MODEL_DEFAULT)]
    model: String,
}

#[derive(Args)]
struct CompareArgs {
    /// Record id to compare on
    id: String,

    #[arg(long, default_value = MODEL_DEFAULT)]
    model_a: String,

    #[arg(long, default_value = MODEL_PREVIEW)]
    model_b: String,

    #[arg(long, default_value = MODEL_JUDGE)]
    judge_model: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    if let Some(parent) = cli.db.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    match cli.command {
        Command::Ingest { file } => {
            let db = Database::new(&cli.db)?;
            let report = ingest_file(&db, &file)?;
            println!(
                "Ingested {}: {} inserted, {} updated, {} skipped",
                file.display(),
                report.inserted,
                report.updated,
                report.skipped
            );
            print_status(&db)?;
        }
        Command::Analyze(args) => {
            // Preconditions fail here, before anything is claimed
            let config = Config::load(cli.db, args.model)?;
            let db = Arc::new(Database::new(&config.db_path)?);
            let provider = Arc::new(GeminiClient::new(&config.api_key)?);

            let policy = match (args.ids, args.limit) {
                (Some(ids), _) => SelectionPolicy::Ids(ids),
                (None, Some(n)) => SelectionPolicy::Limit(n),
                (None, None) => SelectionPolicy::AllPending,
            };

            let cancel = CancellationToken::new();
            let signal_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!(
                        "Interrupt received, dropping in-flight calls; unfinished claims are swept on the next run"
                    );
                    signal_cancel.cancel();
                }
            });

            let orchestrator = Orchestrator::new(db.clone(), provider, config.model, args.workers);
            let summary = orchestrator.run(policy, cancel).await?;

            println!(
                "Batch: {} analyzed, {} errored, {} skipped",
                summary.analyzed, summary.errored, summary.skipped
            );
            println!(
                "Tokens: {} in / {} out, estimated cost ${:.6}",
                summary.input_tokens, summary.output_tokens, summary.estimated_cost
            );
            print_status(&db)?;
            // Per-record failures are recorded in the store, not fatal
        }
        Command::Compare(args) => {
            let config = Config::load(cli.db, args.model_a.clone())?;
            let db = Arc::new(Database::new(&config.db_path)?);
            let provider = Arc::new(GeminiClient::new(&config.api_key)?);

            let comparator = Comparator::new(db, provider);
            let result = comparator
                .run(&args.id, &args.model_a, &args.model_b, &args.judge_model)
                .await?;

            println!("=== Verdict A ({}) ===", result.verdict_a.model);
            println!("{:#}", result.verdict_a.payload);
            println!();
            println!("=== Verdict B ({}) ===", result.verdict_b.model);
            println!("{:#}", result.verdict_b.payload);
            println!();
            println!("=== Judge ({}) ===", result.judge_model);
            println!("{}", result.judgement);
        }
        Command::Requeue { ids } => {
            let db = Database::new(&cli.db)?;
            let count = db.requeue(&ids)?;
            println!("Requeued {} of {} records", count, ids.len());
            print_status(&db)?;
        }
        Command::Status => {
            let db = Database::new(&cli.db)?;
            print_status(&db)?;
        }
    }

    Ok(())
}

fn print_status(db: &Database) -> Result<(), AppError> {
    let counts = db.status_counts()?;
    if counts.is_empty() {
        println!("Store is empty");
        return Ok(());
    }
    println!("Store:");
    for (status, count) in counts {
        println!("  {:<12} {}", status, count);
    }
    Ok(())
}
