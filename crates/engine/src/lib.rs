pub mod cache;
pub mod confidence;
pub mod config;
pub mod dates;
pub mod feedback;
pub mod fingerprint;
pub mod persistence;
pub mod reconcile;
pub mod registry;

pub use cache::{spawn_sweeper, CacheConfig, CacheKey, CacheStatistics, CleanupReport, ConfidenceCache};
pub use confidence::{ConfidenceConfig, ConfidenceModel};
pub use config::{load_rules, ConfigError, DefaultLabels, EngineConfig, FeedbackConfig};
pub use dates::{DateConfig, DateNormalizer, DateSource, NormalizedDate};
pub use feedback::{FeedbackStore, DEFAULT_FEEDBACK_CAPACITY};
pub use fingerprint::context_fingerprint;
pub use persistence::{FeedbackPersistence, JsonFilePersistence, PersistenceError};
pub use reconcile::Reconciler;
pub use registry::{CandidateProvider, CandidateRegistry, DirectionalList};
