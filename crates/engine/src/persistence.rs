use std::future::Future;
use std::path::PathBuf;
use tally_core::FeedbackRecord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Feedback history is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Durable home for the feedback history.
///
/// The store hands over whole snapshots; implementations replace what they
/// held before.
pub trait FeedbackPersistence: Send + Sync + 'static {
    fn load(&self) -> impl Future<Output = Result<Vec<FeedbackRecord>, PersistenceError>> + Send;

    fn save(
        &self,
        records: Vec<FeedbackRecord>,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// Feedback history kept as a JSON array in a single file.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FeedbackPersistence for JsonFilePersistence {
    async fn load(&self) -> Result<Vec<FeedbackRecord>, PersistenceError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, records: Vec<FeedbackRecord>) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec(&records)?;
        // Write-then-rename so a crash never leaves a truncated file behind.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
