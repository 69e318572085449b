use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};

/// Progress marker of an in-progress collection run. At most one exists.
///
/// `run_fingerprint` identifies the run's window and target set; a run only
/// resumes from a checkpoint carrying its own fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CollectionCheckpoint {
    pub run_id: String,
    pub run_fingerprint: String,
    pub last_pool_id: String,
    pub last_position: i64,
    pub started_at: DateTime<Utc>,
}
