use tally_core::FeedbackRecord;
use tally_engine::{FeedbackPersistence, PersistenceError};

use crate::db::{self, DbPool, StorageError};

/// Key under which the feedback history is stored as one JSON array.
pub const FEEDBACK_KEY: &str = "feedback_history";

/// Keeps the feedback history in the `kv_store` table.
#[derive(Debug, Clone)]
pub struct SqliteFeedbackPersistence {
    pool: DbPool,
    key: String,
}

impl SqliteFeedbackPersistence {
    pub fn new(pool: DbPool) -> Self {
        Self::with_key(pool, FEEDBACK_KEY)
    }

    pub fn with_key(pool: DbPool, key: impl Into<String>) -> Self {
        Self { pool, key: key.into() }
    }
}

impl From<StorageError> for PersistenceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Json(e) => PersistenceError::Json(e),
            StorageError::Database(e) => PersistenceError::Backend(e.to_string()),
        }
    }
}

impl FeedbackPersistence for SqliteFeedbackPersistence {
    async fn load(&self) -> Result<Vec<FeedbackRecord>, PersistenceError> {
        let records: Option<Vec<FeedbackRecord>> = db::get_json(&self.pool, &self.key).await?;
        Ok(records.unwrap_or_default())
    }

    async fn save(&self, records: Vec<FeedbackRecord>) -> Result<(), PersistenceError> {
        db::put_json(&self.pool, &self.key, &records).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::FieldKind;
    use tally_engine::FeedbackStore;

    #[tokio::test]
    async fn empty_database_loads_no_history() {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::create_db(&dir.path().join("tally.db")).await.unwrap();
        let p = SqliteFeedbackPersistence::new(pool);
        assert!(p.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_round_trips_through_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::create_db(&dir.path().join("tally.db")).await.unwrap();

        let store = FeedbackStore::with_persistence(100, SqliteFeedbackPersistence::new(pool.clone())).await;
        store.record(FieldKind::Category, "餐饮", Some("餐饮美食".into()), false, 0.6);
        store.record(FieldKind::Account, "支付宝", None, true, 0.6);
        store.flush().await;

        let reloaded = FeedbackStore::with_persistence(100, SqliteFeedbackPersistence::new(pool)).await;
        assert_eq!(reloaded.records(), store.records());
        assert_eq!(reloaded.accuracy_rate(FieldKind::Account), 1.0);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::create_db(&dir.path().join("tally.db")).await.unwrap();
        let a = SqliteFeedbackPersistence::with_key(pool.clone(), "a");
        let b = SqliteFeedbackPersistence::with_key(pool, "b");

        a.save(vec![FeedbackRecord::new(FieldKind::Notes, "无", None, true, 0.3)])
            .await
            .unwrap();
        assert_eq!(a.load().await.unwrap().len(), 1);
        assert!(b.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_history_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::create_db(&dir.path().join("tally.db")).await.unwrap();
        db::put_value(&pool, FEEDBACK_KEY, "not json").await.unwrap();
        let err = SqliteFeedbackPersistence::new(pool).load().await.unwrap_err();
        assert!(matches!(err, PersistenceError::Json(_)));
    }
}
