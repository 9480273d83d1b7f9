pub mod db;
pub mod feedback;

pub use db::{create_db, get_json, get_value, put_json, put_value, DbPool, StorageError};
pub use feedback::{SqliteFeedbackPersistence, FEEDBACK_KEY};
