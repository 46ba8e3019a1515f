//! Query access to the append-only post history

use crate::db::Database;
use crate::error::Result;
use crate::types::{HistoryAction, HistoryEntry};

/// Read-side service over the audit log. Writing happens inside the
/// post service as part of each operation; this never mutates.
#[derive(Clone)]
pub struct HistoryService {
    db: Database,
}

impl HistoryService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Full history for one post, newest first. Works for deleted
    /// posts too, since history outlives the post row.
    pub async fn for_post(&self, post_id: &str) -> Result<Vec<HistoryEntry>> {
        self.db.history_for_post(post_id).await
    }

    /// Most recent activity across all posts, newest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        self.db.recent_history(limit).await
    }

    /// Recent entries filtered to one action kind
    pub async fn recent_with_action(
        &self,
        action: HistoryAction,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let entries = self.db.recent_history(limit * 4).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.action == action)
            .take(limit)
            .collect())
    }
}
