//! Durable delayed-job scheduler
//!
//! Jobs are rows first, timers second: every scheduled publish is
//! persisted in `scheduled_jobs` before a timer task exists, and the
//! timer re-reads its row when it fires, so a cancel from another
//! process (which deletes the row) wins even if the in-memory timer is
//! already gone. Within one process, cancellation and firing serialize
//! on the handle table: once a timer marks itself started, cancel is a
//! no-op; until then, cancel aborts the timer before it can run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::db::Database;
use crate::error::{Result, SyndicateError};
use crate::types::{JobStatus, QueueStatus, ScheduledJob};

/// The work a fired job performs. Implemented by the post service;
/// the indirection keeps the scheduler free of publishing knowledge.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, post_id: &str) -> Result<()>;
}

struct JobHandle {
    task: tokio::task::JoinHandle<()>,
    /// Set under the table lock when the timer fires; a started job can
    /// no longer be cancelled
    started: bool,
}

pub struct PostScheduler {
    db: Database,
    config: SchedulerConfig,
    runner: OnceLock<Arc<dyn JobRunner>>,
    handles: Mutex<HashMap<String, JobHandle>>,
}

impl PostScheduler {
    pub fn new(db: Database, config: SchedulerConfig) -> Arc<Self> {
        Arc::new(Self {
            db,
            config,
            runner: OnceLock::new(),
            handles: Mutex::new(HashMap::new()),
        })
    }

    /// Wire in the runner. Must happen before any job fires; later
    /// calls are ignored.
    pub fn set_runner(&self, runner: Arc<dyn JobRunner>) {
        let _ = self.runner.set(runner);
    }

    /// Persist a delayed job and arm its timer. Returns the job id the
    /// caller stores on the post.
    pub async fn schedule(self: &Arc<Self>, post_id: &str, fire_at: i64, now: i64) -> Result<String> {
        if fire_at <= now {
            return Err(SyndicateError::Validation(format!(
                "scheduled time {} is not in the future",
                fire_at
            )));
        }

        let job = ScheduledJob {
            job_id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            fire_at,
            status: JobStatus::Delayed,
            attempts_made: 0,
            max_attempts: self.config.job_max_attempts,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_job(&job).await?;

        self.arm_timer(&job);
        info!(job_id = %job.job_id, post_id = %post_id, fire_at, "Job scheduled");
        Ok(job.job_id)
    }

    /// Cancel a delayed job.
    ///
    /// Returns `true` if the job was cancelled, `false` if it had
    /// already started firing or no longer exists (both are no-ops, not
    /// errors). After `Ok(true)` the job will never run.
    pub async fn cancel(&self, job_id: &str) -> Result<bool> {
        // Abort the in-process timer first, under the table lock, so it
        // cannot mark itself started concurrently
        {
            let mut handles = self.lock_handles();
            match handles.get(job_id) {
                Some(handle) if handle.started => return Ok(false),
                Some(_) => {
                    let handle = handles.remove(job_id).map(|h| h.task);
                    if let Some(task) = handle {
                        task.abort();
                    }
                }
                None => {}
            }
        }

        // Remove the durable row; only delayed rows are deletable, so a
        // job that fired in another process reports false here too
        let removed = self.db.delete_job(job_id).await?;
        if removed {
            info!(job_id = %job_id, "Job cancelled");
        } else {
            debug!(job_id = %job_id, "Cancel was a no-op");
        }
        Ok(removed)
    }

    /// Re-arm timers for all delayed jobs after a restart. Jobs whose
    /// fire time already passed fire immediately.
    pub async fn restore(self: &Arc<Self>) -> Result<usize> {
        let jobs = self.db.delayed_jobs().await?;
        let count = jobs.len();
        for job in &jobs {
            self.arm_timer(job);
        }
        if count > 0 {
            info!(count, "Restored delayed jobs");
        }
        Ok(count)
    }

    /// Queue depth snapshot
    pub async fn queue_status(&self, now: i64) -> Result<QueueStatus> {
        self.db.queue_status(now).await
    }

    fn arm_timer(self: &Arc<Self>, job: &ScheduledJob) {
        let scheduler = Arc::clone(self);
        let job_id = job.job_id.clone();
        let post_id = job.post_id.clone();
        let fire_at = job.fire_at;

        // Hold the table lock across spawn and insert: an already-due
        // timer serializes on this lock before it looks itself up, so
        // it can never observe its own entry missing
        let mut handles = self.lock_handles();
        let task = tokio::spawn({
            let job_id = job_id.clone();
            async move {
                let delay = (fire_at - chrono::Utc::now().timestamp()).max(0);
                tokio::time::sleep(Duration::from_secs(delay as u64)).await;

                // Transition to started under the lock; if cancel got
                // there first our entry is gone and we stop
                {
                    let mut handles = scheduler.lock_handles();
                    match handles.get_mut(&job_id) {
                        Some(handle) => handle.started = true,
                        None => return,
                    }
                }

                scheduler.fire(&job_id, &post_id).await;

                scheduler.lock_handles().remove(&job_id);
            }
        });

        handles.insert(
            job_id,
            JobHandle {
                task,
                started: false,
            },
        );
    }

    /// Run a fired job with retries. The durable row is the source of
    /// truth: a row deleted by another process means the job was
    /// cancelled and nothing runs.
    async fn fire(&self, job_id: &str, post_id: &str) {
        let job = match self.db.get_job(job_id).await {
            Ok(Some(job)) if job.status == JobStatus::Delayed => job,
            Ok(_) => {
                debug!(job_id = %job_id, "Job row gone or not delayed, skipping");
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to load job row");
                return;
            }
        };

        let runner = match self.runner.get() {
            Some(runner) => Arc::clone(runner),
            None => {
                error!(job_id = %job_id, "No job runner wired, marking job failed");
                let _ = self
                    .db
                    .set_job_state(job_id, JobStatus::Failed, 0, Some("no job runner"))
                    .await;
                return;
            }
        };

        if let Err(e) = self.db.set_job_state(job_id, JobStatus::Active, 0, None).await {
            error!(job_id = %job_id, error = %e, "Failed to mark job active");
            return;
        }

        let max_attempts = job.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match runner.run_job(post_id).await {
                Ok(()) => {
                    let _ = self
                        .db
                        .set_job_state(job_id, JobStatus::Completed, attempt, None)
                        .await;
                    info!(job_id = %job_id, post_id = %post_id, attempt, "Job completed");
                    return;
                }
                Err(e) => {
                    let message = e.to_string();
                    // Deterministic rejections never succeed on retry
                    let terminal = matches!(
                        e,
                        SyndicateError::Validation(_)
                            | SyndicateError::Conflict(_)
                            | SyndicateError::NotFound(_)
                            | SyndicateError::UnsupportedPlatform(_)
                    );

                    if terminal || attempt == max_attempts {
                        let _ = self
                            .db
                            .set_job_state(job_id, JobStatus::Failed, attempt, Some(&message))
                            .await;
                        error!(job_id = %job_id, post_id = %post_id, attempt, error = %message, "Job failed");
                        return;
                    }

                    let _ = self
                        .db
                        .set_job_state(job_id, JobStatus::Active, attempt, Some(&message))
                        .await;
                    let backoff = self.backoff_delay(attempt);
                    warn!(
                        job_id = %job_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %message,
                        "Job attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Exponential backoff with jitter: base * 2^(attempt-1) plus up to
    /// 250ms of noise to spread retries out
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.job_backoff_base_secs;
        let secs = base.saturating_mul(1u64 << (attempt - 1).min(16));
        let jitter_ms = rand::thread_rng().gen_range(0..=250);
        Duration::from_secs(secs) + Duration::from_millis(jitter_ms)
    }

    fn lock_handles(&self) -> std::sync::MutexGuard<'_, HashMap<String, JobHandle>> {
        match self.handles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    async fn setup_test_db() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&db_path.to_string_lossy()).await.unwrap();
        (temp_dir, db)
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            publish_timeout_secs: 5,
            job_max_attempts: 3,
            // No real backoff so retry tests stay fast
            job_backoff_base_secs: 0,
        }
    }

    /// Runner that counts invocations and fails a configurable number
    /// of times before succeeding
    struct CountingRunner {
        calls: AtomicU32,
        fail_first: u32,
        error: fn(String) -> SyndicateError,
    }

    impl CountingRunner {
        fn succeeding() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail_first: 0,
                error: SyndicateError::Scheduler,
            })
        }

        fn failing_first(n: u32) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail_first: n,
                error: SyndicateError::Scheduler,
            })
        }

        fn always_rejecting() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail_first: u32::MAX,
                error: SyndicateError::Validation,
            })
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobRunner for CountingRunner {
        async fn run_job(&self, _post_id: &str) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err((self.error)("induced failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    async fn wait_for_status(db: &Database, job_id: &str, status: JobStatus) -> ScheduledJob {
        for _ in 0..100 {
            if let Some(job) = db.get_job(job_id).await.unwrap() {
                if job.status == status {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job {} never reached {:?}", job_id, status);
    }

    #[tokio::test]
    async fn test_schedule_rejects_past_time() {
        let (_temp, db) = setup_test_db().await;
        let scheduler = PostScheduler::new(db, fast_config());
        let now = chrono::Utc::now().timestamp();

        let err = scheduler.schedule("post-1", now, now).await.unwrap_err();
        assert!(matches!(err, SyndicateError::Validation(_)));

        let err = scheduler.schedule("post-1", now - 60, now).await.unwrap_err();
        assert!(matches!(err, SyndicateError::Validation(_)));
    }

    #[tokio::test]
    async fn test_job_fires_and_completes() {
        let (_temp, db) = setup_test_db().await;
        let scheduler = PostScheduler::new(db.clone(), fast_config());
        let runner = CountingRunner::succeeding();
        scheduler.set_runner(runner.clone());

        let now = chrono::Utc::now().timestamp();
        let job_id = scheduler.schedule("post-1", now + 1, now).await.unwrap();

        let job = wait_for_status(&db, &job_id, JobStatus::Completed).await;
        assert_eq!(job.attempts_made, 1);
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_job_retries_then_succeeds() {
        let (_temp, db) = setup_test_db().await;
        let scheduler = PostScheduler::new(db.clone(), fast_config());
        let runner = CountingRunner::failing_first(2);
        scheduler.set_runner(runner.clone());

        let now = chrono::Utc::now().timestamp();
        let job_id = scheduler.schedule("post-1", now + 1, now).await.unwrap();

        let job = wait_for_status(&db, &job_id, JobStatus::Completed).await;
        assert_eq!(job.attempts_made, 3);
        assert_eq!(runner.call_count(), 3);
    }

    #[tokio::test]
    async fn test_job_fails_after_max_attempts() {
        let (_temp, db) = setup_test_db().await;
        let scheduler = PostScheduler::new(db.clone(), fast_config());
        let runner = CountingRunner::failing_first(u32::MAX);
        scheduler.set_runner(runner.clone());

        let now = chrono::Utc::now().timestamp();
        let job_id = scheduler.schedule("post-1", now + 1, now).await.unwrap();

        let job = wait_for_status(&db, &job_id, JobStatus::Failed).await;
        assert_eq!(job.attempts_made, 3);
        assert_eq!(runner.call_count(), 3);
        assert!(job.last_error.as_deref().unwrap().contains("induced failure"));
    }

    #[tokio::test]
    async fn test_validation_error_is_terminal() {
        let (_temp, db) = setup_test_db().await;
        let scheduler = PostScheduler::new(db.clone(), fast_config());
        let runner = CountingRunner::always_rejecting();
        scheduler.set_runner(runner.clone());

        let now = chrono::Utc::now().timestamp();
        let job_id = scheduler.schedule("post-1", now + 1, now).await.unwrap();

        let job = wait_for_status(&db, &job_id, JobStatus::Failed).await;
        // No retries for deterministic rejections
        assert_eq!(job.attempts_made, 1);
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_fire() {
        let (_temp, db) = setup_test_db().await;
        let scheduler = PostScheduler::new(db.clone(), fast_config());
        let runner = CountingRunner::succeeding();
        scheduler.set_runner(runner.clone());

        let now = chrono::Utc::now().timestamp();
        let job_id = scheduler.schedule("post-1", now + 60, now).await.unwrap();

        assert!(scheduler.cancel(&job_id).await.unwrap());
        assert!(db.get_job(&job_id).await.unwrap().is_none());

        // Give any stray timer a chance to misbehave
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_after_fire_is_noop() {
        let (_temp, db) = setup_test_db().await;
        let scheduler = PostScheduler::new(db.clone(), fast_config());
        let runner = CountingRunner::succeeding();
        scheduler.set_runner(runner.clone());

        let now = chrono::Utc::now().timestamp();
        let job_id = scheduler.schedule("post-1", now + 1, now).await.unwrap();
        wait_for_status(&db, &job_id, JobStatus::Completed).await;

        assert!(!scheduler.cancel(&job_id).await.unwrap());
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_unknown_job_is_noop() {
        let (_temp, db) = setup_test_db().await;
        let scheduler = PostScheduler::new(db, fast_config());
        assert!(!scheduler.cancel("no-such-job").await.unwrap());
    }

    #[tokio::test]
    async fn test_row_deleted_elsewhere_suppresses_fire() {
        let (_temp, db) = setup_test_db().await;
        let scheduler = PostScheduler::new(db.clone(), fast_config());
        let runner = CountingRunner::succeeding();
        scheduler.set_runner(runner.clone());

        let now = chrono::Utc::now().timestamp();
        let job_id = scheduler.schedule("post-1", now + 1, now).await.unwrap();

        // Another process cancels by deleting the row out from under
        // the in-memory timer
        sqlx::query("DELETE FROM scheduled_jobs WHERE job_id = ?")
            .bind(&job_id)
            .execute(db.pool())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_restore_rearms_delayed_jobs() {
        let (_temp, db) = setup_test_db().await;
        let now = chrono::Utc::now().timestamp();

        // Row left behind by a previous process, already due
        let job = ScheduledJob {
            job_id: "job-restored".to_string(),
            post_id: "post-1".to_string(),
            fire_at: now - 5,
            status: JobStatus::Delayed,
            attempts_made: 0,
            max_attempts: 3,
            last_error: None,
            created_at: now - 100,
            updated_at: now - 100,
        };
        db.insert_job(&job).await.unwrap();

        let scheduler = PostScheduler::new(db.clone(), fast_config());
        let runner = CountingRunner::succeeding();
        scheduler.set_runner(runner.clone());

        let restored = scheduler.restore().await.unwrap();
        assert_eq!(restored, 1);

        wait_for_status(&db, "job-restored", JobStatus::Completed).await;
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overdue_jobs_fire_even_with_zero_delay() {
        let (_temp, db) = setup_test_db().await;
        let now = chrono::Utc::now().timestamp();

        // A batch of already-due rows: their timers run immediately on
        // other workers, racing the arming path
        for i in 0..20 {
            let job = ScheduledJob {
                job_id: format!("job-{}", i),
                post_id: format!("post-{}", i),
                fire_at: now - 1,
                status: JobStatus::Delayed,
                attempts_made: 0,
                max_attempts: 3,
                last_error: None,
                created_at: now - 100,
                updated_at: now - 100,
            };
            db.insert_job(&job).await.unwrap();
        }

        let scheduler = PostScheduler::new(db.clone(), fast_config());
        let runner = CountingRunner::succeeding();
        scheduler.set_runner(runner.clone());

        assert_eq!(scheduler.restore().await.unwrap(), 20);

        for i in 0..20 {
            wait_for_status(&db, &format!("job-{}", i), JobStatus::Completed).await;
        }
        assert_eq!(runner.call_count(), 20);
    }
}
