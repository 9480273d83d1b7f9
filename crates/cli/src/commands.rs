use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tally_core::{FieldKind, RawExtraction, ReconciledRecord};
use tally_engine::{CandidateRegistry, EngineConfig, FeedbackStore, Reconciler};
use tally_storage::SqliteFeedbackPersistence;

pub struct ReconcileArgs {
    pub registry: PathBuf,
    pub rules: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub feedback_db: Option<PathBuf>,
}

#[derive(Serialize)]
struct ReconcileOutput<'a> {
    record: &'a ReconciledRecord,
    needs_review: Vec<FieldKind>,
}

#[derive(Serialize)]
struct StatsRow {
    field: FieldKind,
    total: usize,
    correct: usize,
    accuracy: Option<f32>,
}

pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            EngineConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

pub async fn reconcile(config: &EngineConfig, args: ReconcileArgs) -> Result<()> {
    let registry = CandidateRegistry::load(&args.registry)
        .with_context(|| format!("Failed to load candidate registry {}", args.registry.display()))?;

    let raw = read_input(args.input.as_deref())?;
    let extraction: RawExtraction = serde_json::from_str(&raw).context("Input is not a valid extraction")?;

    let feedback = open_feedback(args.feedback_db, config.feedback.capacity).await?;
    let mut reconciler = Reconciler::with_services(
        config,
        Arc::new(tally_engine::ConfidenceCache::new(&config.cache)),
        feedback,
    );
    if let Some(path) = &args.rules {
        let rules = tally_engine::load_rules(path)
            .with_context(|| format!("Failed to load keyword rules {}", path.display()))?;
        tracing::info!(rules = rules.len(), "Loaded keyword rules");
        reconciler = reconciler.with_rules(rules);
    }

    let warmed = reconciler
        .spawn_warm_up(registry.common_values())
        .await
        .context("Cache warm-up task failed")?;
    tracing::debug!(warmed, "Registry values preloaded");

    let record = reconciler.reconcile(&extraction, &registry);
    let output = ReconcileOutput {
        needs_review: reconciler.fields_needing_review(&record),
        record: &record,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub async fn feedback(
    config: &EngineConfig,
    db: Option<PathBuf>,
    kind: FieldKind,
    original: String,
    corrected: Option<String>,
    was_correct: bool,
    confidence: f32,
) -> Result<()> {
    let store = open_feedback(db, config.feedback.capacity).await?;
    let record = store.record(kind, original, corrected, was_correct, confidence);
    store.flush().await;
    tracing::info!(field = %kind, was_correct, "Feedback recorded");
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub async fn stats(config: &EngineConfig, db: Option<PathBuf>) -> Result<()> {
    let store = open_feedback(db, config.feedback.capacity).await?;
    let rows: Vec<StatsRow> = store
        .summary()
        .into_iter()
        .map(|a| StatsRow {
            field: a.field_kind,
            total: a.total,
            correct: a.correct,
            accuracy: (a.total > 0).then(|| a.rate()),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) => std::fs::read_to_string(p).with_context(|| format!("Failed to read {}", p.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn default_db_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "tally", "Tally")
        .ok_or_else(|| anyhow!("Could not determine the data directory"))?;
    Ok(dirs.data_dir().join("tally.db"))
}

async fn open_feedback(db: Option<PathBuf>, capacity: usize) -> Result<Arc<FeedbackStore>> {
    let path = match db {
        Some(p) => p,
        None => default_db_path()?,
    };
    let pool = tally_storage::create_db(&path)
        .await
        .with_context(|| format!("Failed to open feedback database {}", path.display()))?;
    let store = FeedbackStore::with_persistence(capacity, SqliteFeedbackPersistence::new(pool)).await;
    Ok(Arc::new(store))
}
