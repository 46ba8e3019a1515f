//! Database operations for the publishing engine
//!
//! The Post aggregate (targets, media, per-platform overrides) lives in
//! a single row with JSON columns so a publish run's outcome is written
//! atomically. History is append-only.

use std::path::Path;

use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::types::{
    HistoryAction, HistoryEntry, JobStatus, Post, PostStatus, QueueStatus, ScheduledJob,
};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // mode=rwc creates the database file if it doesn't exist
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    /// Insert a new post aggregate
    pub async fn create_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, workspace_id, content, media_items, platform_content,
                               targets, status, scheduled_at, published_at, job_id,
                               last_error, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.workspace_id)
        .bind(&post.content)
        .bind(encode_json(&post.media_items)?)
        .bind(encode_json(&post.platform_content)?)
        .bind(encode_json(&post.targets)?)
        .bind(post.status.as_str())
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .bind(&post.job_id)
        .bind(&post.last_error)
        .bind(&post.created_by)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Rewrite the whole aggregate in one statement
    pub async fn update_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE posts SET content = ?, media_items = ?, platform_content = ?,
                             targets = ?, status = ?, scheduled_at = ?, published_at = ?,
                             job_id = ?, last_error = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&post.content)
        .bind(encode_json(&post.media_items)?)
        .bind(encode_json(&post.platform_content)?)
        .bind(encode_json(&post.targets)?)
        .bind(post.status.as_str())
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .bind(&post.job_id)
        .bind(&post.last_error)
        .bind(post.updated_at)
        .bind(&post.id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get a post by ID
    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, workspace_id, content, media_items, platform_content, targets,
                   status, scheduled_at, published_at, job_id, last_error, created_by,
                   created_at, updated_at
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(decode_post).transpose()
    }

    /// Delete the post row. History rows survive (append-only contract).
    pub async fn delete_post(&self, post_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// List posts for a workspace, newest first.
    ///
    /// Without a channel filter SQLite does the paging. `channel_id`
    /// filtering (and its paging) happens over the decoded targets
    /// since targets are embedded JSON, not rows.
    pub async fn list_posts(
        &self,
        workspace_id: &str,
        status: Option<PostStatus>,
        channel_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>> {
        let mut sql = String::from(
            "SELECT id, workspace_id, content, media_items, platform_content, targets, \
             status, scheduled_at, published_at, job_id, last_error, created_by, \
             created_at, updated_at \
             FROM posts WHERE workspace_id = ?",
        );
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");
        if channel_id.is_none() {
            sql.push_str(" LIMIT ? OFFSET ?");
        }

        let mut query = sqlx::query(&sql).bind(workspace_id);
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        if channel_id.is_none() {
            query = query.bind(limit as i64).bind(offset as i64);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            posts.push(decode_post(row)?);
        }

        if let Some(chan) = channel_id {
            posts = posts
                .into_iter()
                .filter(|p| p.targets.iter().any(|t| t.channel_id == chan))
                .skip(offset)
                .take(limit)
                .collect();
        }

        Ok(posts)
    }

    /// Posts scheduled to fire within [from, to], soonest first
    pub async fn scheduled_posts(
        &self,
        workspace_id: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, workspace_id, content, media_items, platform_content, targets,
                   status, scheduled_at, published_at, job_id, last_error, created_by,
                   created_at, updated_at
            FROM posts
            WHERE workspace_id = ? AND status = 'scheduled'
              AND scheduled_at >= ? AND scheduled_at <= ?
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(workspace_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(decode_post).collect()
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Append one audit record. History rows are never updated.
    pub async fn append_history(&self, entry: &HistoryEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_history (post_id, action, previous_status, new_status,
                                      channel_id, performed_by, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.post_id)
        .bind(entry.action.as_str())
        .bind(entry.previous_status.map(|s| s.as_str()))
        .bind(entry.new_status.map(|s| s.as_str()))
        .bind(&entry.channel_id)
        .bind(&entry.performed_by)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// History for one post, newest first
    pub async fn history_for_post(&self, post_id: &str) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, action, previous_status, new_status, channel_id,
                   performed_by, details, created_at
            FROM post_history WHERE post_id = ?
            ORDER BY id DESC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(decode_history).collect()
    }

    /// Most recent history across all posts, newest first
    pub async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, action, previous_status, new_status, channel_id,
                   performed_by, details, created_at
            FROM post_history
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(decode_history).collect()
    }

    // ------------------------------------------------------------------
    // Rate-limit windows
    // ------------------------------------------------------------------

    /// Request count for a scope's window
    pub async fn window_count(&self, scope: &str, window_start: i64) -> Result<u32> {
        let row = sqlx::query_as::<_, (Option<i64>,)>(
            r#"
            SELECT request_count FROM rate_limits
            WHERE scope = ? AND window_start = ?
            "#,
        )
        .bind(scope)
        .bind(window_start)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.and_then(|r| r.0).unwrap_or(0) as u32)
    }

    /// Increment a scope's window counter; the upsert serializes
    /// concurrent increments on the same key
    pub async fn increment_window(&self, scope: &str, window_start: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rate_limits (scope, window_start, request_count)
            VALUES (?, ?, 1)
            ON CONFLICT(scope, window_start)
            DO UPDATE SET request_count = request_count + 1
            "#,
        )
        .bind(scope)
        .bind(window_start)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Drop windows that ended before the cutoff
    pub async fn delete_windows_before(&self, cutoff_window: i64) -> Result<()> {
        sqlx::query("DELETE FROM rate_limits WHERE window_start < ?")
            .bind(cutoff_window)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Scheduled jobs
    // ------------------------------------------------------------------

    pub async fn insert_job(&self, job: &ScheduledJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_jobs (job_id, post_id, fire_at, status, attempts_made,
                                        max_attempts, last_error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.post_id)
        .bind(job.fire_at)
        .bind(job.status.as_str())
        .bind(job.attempts_made)
        .bind(job.max_attempts)
        .bind(&job.last_error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<ScheduledJob>> {
        let row = sqlx::query(
            r#"
            SELECT job_id, post_id, fire_at, status, attempts_made, max_attempts,
                   last_error, created_at, updated_at
            FROM scheduled_jobs WHERE job_id = ?
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(decode_job).transpose()
    }

    pub async fn set_job_state(
        &self,
        job_id: &str,
        status: JobStatus,
        attempts_made: u32,
        last_error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_jobs
            SET status = ?, attempts_made = ?, last_error = ?, updated_at = ?
            WHERE job_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(attempts_made)
        .bind(last_error)
        .bind(chrono::Utc::now().timestamp())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Remove a job row. Returns whether a row was actually deleted,
    /// which the scheduler uses to make cancellation a no-op for jobs
    /// that already fired.
    pub async fn delete_job(&self, job_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scheduled_jobs WHERE job_id = ? AND status = 'delayed'")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// All jobs still waiting to fire (for restore after restart)
    pub async fn delayed_jobs(&self) -> Result<Vec<ScheduledJob>> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, post_id, fire_at, status, attempts_made, max_attempts,
                   last_error, created_at, updated_at
            FROM scheduled_jobs WHERE status = 'delayed'
            ORDER BY fire_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(decode_job).collect()
    }

    /// Queue depth counters for operational visibility
    pub async fn queue_status(&self, now: i64) -> Result<QueueStatus> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT status, COUNT(*) AS n,
                   SUM(CASE WHEN fire_at <= ? THEN 1 ELSE 0 END) AS due
            FROM scheduled_jobs
            GROUP BY status
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut status = QueueStatus::default();
        for (state, count, due) in rows {
            match state.as_str() {
                // Due-but-not-yet-running jobs count as waiting
                "delayed" => {
                    status.waiting = due as u64;
                    status.delayed = (count - due).max(0) as u64;
                }
                "active" => status.active = count as u64,
                "completed" => status.completed = count as u64,
                "failed" => status.failed = count as u64,
                _ => {}
            }
        }

        Ok(status)
    }
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| DbError::CorruptRow(format!("failed to encode JSON column: {}", e)).into())
}

fn decode_post(row: sqlx::sqlite::SqliteRow) -> Result<Post> {
    let status_str: String = row.get("status");
    let status = PostStatus::parse(&status_str)
        .ok_or_else(|| DbError::CorruptRow(format!("unknown post status: {}", status_str)))?;

    let media_items: String = row.get("media_items");
    let platform_content: String = row.get("platform_content");
    let targets: String = row.get("targets");

    Ok(Post {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        content: row.get("content"),
        media_items: serde_json::from_str(&media_items)
            .map_err(|e| DbError::CorruptRow(format!("media_items: {}", e)))?,
        platform_content: serde_json::from_str(&platform_content)
            .map_err(|e| DbError::CorruptRow(format!("platform_content: {}", e)))?,
        targets: serde_json::from_str(&targets)
            .map_err(|e| DbError::CorruptRow(format!("targets: {}", e)))?,
        status,
        scheduled_at: row.get("scheduled_at"),
        published_at: row.get("published_at"),
        job_id: row.get("job_id"),
        last_error: row.get("last_error"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn decode_history(row: sqlx::sqlite::SqliteRow) -> Result<HistoryEntry> {
    let action_str: String = row.get("action");
    let action = HistoryAction::parse(&action_str)
        .ok_or_else(|| DbError::CorruptRow(format!("unknown history action: {}", action_str)))?;

    let previous: Option<String> = row.get("previous_status");
    let new: Option<String> = row.get("new_status");

    Ok(HistoryEntry {
        id: Some(row.get("id")),
        post_id: row.get("post_id"),
        action,
        previous_status: previous.as_deref().and_then(PostStatus::parse),
        new_status: new.as_deref().and_then(PostStatus::parse),
        channel_id: row.get("channel_id"),
        performed_by: row.get("performed_by"),
        details: row.get("details"),
        created_at: row.get("created_at"),
    })
}

fn decode_job(row: sqlx::sqlite::SqliteRow) -> Result<ScheduledJob> {
    let status_str: String = row.get("status");
    let status = JobStatus::parse(&status_str)
        .ok_or_else(|| DbError::CorruptRow(format!("unknown job status: {}", status_str)))?;

    Ok(ScheduledJob {
        job_id: row.get("job_id"),
        post_id: row.get("post_id"),
        fire_at: row.get("fire_at"),
        status,
        attempts_made: row.get::<i64, _>("attempts_made") as u32,
        max_attempts: row.get::<i64, _>("max_attempts") as u32,
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
