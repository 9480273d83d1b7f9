use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tally_core::FieldKind;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Reconcile extracted bookkeeping fields and track their confidence")]
#[command(version)]
struct Cli {
    /// Feedback database (defaults to the platform data directory)
    #[arg(long, global = true, env = "TALLY_FEEDBACK_DB")]
    feedback_db: Option<PathBuf>,

    /// Engine configuration (TOML)
    #[arg(long, global = true, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile one extraction read as JSON and print the result
    #[command(after_help = "\
Examples:
  echo '{\"category\":\"餐饮\",\"amount\":\"35\"}' | tally reconcile --registry candidates.toml
  tally reconcile --registry candidates.toml --rules rules.toml --input extraction.json")]
    Reconcile {
        /// Candidate lists per field and direction
        #[arg(long)]
        registry: PathBuf,

        /// Keyword rules consulted before similarity matching
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Extraction JSON (omit to read from stdin)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Record whether a reconciled value was right
    Feedback {
        #[arg(long)]
        kind: FieldKind,

        /// Value the engine produced
        #[arg(long)]
        original: String,

        /// Value the user chose instead
        #[arg(long)]
        corrected: Option<String>,

        #[arg(long, conflicts_with = "wrong", required_unless_present = "wrong")]
        correct: bool,

        #[arg(long)]
        wrong: bool,

        /// Confidence the engine reported for the original value
        #[arg(long)]
        confidence: f32,
    },

    /// Print per-field accuracy from the feedback history
    Stats,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = commands::load_config(cli.config.as_deref())?;
    let db = cli.feedback_db;
    match cli.command {
        Commands::Reconcile { registry, rules, input } => {
            commands::reconcile(&config, commands::ReconcileArgs { registry, rules, input, feedback_db: db }).await
        }
        Commands::Feedback { kind, original, corrected, correct, wrong: _, confidence } => {
            commands::feedback(&config, db, kind, original, corrected, correct, confidence).await
        }
        Commands::Stats => commands::stats(&config, db).await,
    }
}
