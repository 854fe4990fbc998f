use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::{Duration, PrimitiveDateTime};

use crate::model::submission::RecordedAnswer;

/// Locally cached in-progress state. The sole resume mechanism: if the
/// browser session dies, a fresh runtime reseeds itself from this shape.
/// No schema versioning beyond shape compatibility with the current build;
/// an unreadable snapshot is discarded, never migrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeSnapshot {
    pub quiz_id: String,
    pub submission_id: String,
    pub answers: BTreeMap<String, RecordedAnswer>,
    pub current_index: usize,
    pub remaining_seconds: Option<i64>,
    pub written_at: PrimitiveDateTime,
}

impl ResumeSnapshot {
    /// A zero TTL disables expiry.
    pub(crate) fn is_stale(&self, now: PrimitiveDateTime, ttl_minutes: u64) -> bool {
        if ttl_minutes == 0 {
            return false;
        }
        now - self.written_at > Duration::minutes(ttl_minutes as i64)
    }
}
