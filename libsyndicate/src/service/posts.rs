//! Post lifecycle and publish orchestration
//!
//! `PostService` owns the post state machine: drafts are created and
//! edited, scheduled through the job scheduler, and published by
//! fanning out to each target sequentially. A per-post async lock
//! serializes publish runs so a post can never be double-sent, and the
//! rate limiter is consulted before and charged after each confirmed
//! platform call.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::channels::ChannelDirectory;
use crate::db::Database;
use crate::error::{PublishError, Result, SyndicateError};
use crate::publishers::PublisherRegistry;
use crate::rate_limiter::{RateLimiter, ScopeUsage};
use crate::scheduler::{JobRunner, PostScheduler};
use crate::types::{
    HistoryAction, HistoryEntry, MediaItem, Platform, PlatformContent, Post, PostStatus,
    QueueStatus, Target, TargetStatus,
};

use super::events::{Event, EventBus};

/// One requested (channel, platform) pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub channel_id: String,
    pub platform: Platform,
}

impl TargetSpec {
    pub fn new(channel_id: impl Into<String>, platform: Platform) -> Self {
        Self {
            channel_id: channel_id.into(),
            platform,
        }
    }
}

/// Input for creating a post. A future `scheduled_at` creates the post
/// already scheduled, with its delayed job armed.
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub workspace_id: String,
    pub content: Option<String>,
    pub media_items: Vec<MediaItem>,
    pub platform_content: BTreeMap<Platform, PlatformContent>,
    pub targets: Vec<TargetSpec>,
    pub scheduled_at: Option<i64>,
    pub created_by: Option<String>,
}

/// Partial update of an editable post. `content` distinguishes
/// "leave as is" (None) from "clear it" (Some(None)).
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub content: Option<Option<String>>,
    pub media_items: Option<Vec<MediaItem>>,
    pub platform_content: Option<BTreeMap<Platform, PlatformContent>>,
    pub targets: Option<Vec<TargetSpec>>,
    pub performed_by: Option<String>,
}

impl PostUpdate {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.media_items.is_none()
            && self.platform_content.is_none()
            && self.targets.is_none()
    }
}

pub struct PostService {
    db: Database,
    registry: Arc<PublisherRegistry>,
    channels: Arc<dyn ChannelDirectory>,
    rate_limiter: Arc<RateLimiter>,
    scheduler: Arc<PostScheduler>,
    event_bus: EventBus,
    publish_timeout: Duration,
    /// Per-post publish locks; entry lives for the post's lifetime
    publish_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PostService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        registry: Arc<PublisherRegistry>,
        channels: Arc<dyn ChannelDirectory>,
        rate_limiter: Arc<RateLimiter>,
        scheduler: Arc<PostScheduler>,
        event_bus: EventBus,
        publish_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            registry,
            channels,
            rate_limiter,
            scheduler,
            event_bus,
            publish_timeout,
            publish_locks: Mutex::new(HashMap::new()),
        })
    }

    // ------------------------------------------------------------------
    // Draft lifecycle
    // ------------------------------------------------------------------

    /// Create a post. Starts as a draft, or scheduled when a future
    /// timestamp is supplied; all validation happens before any row is
    /// written.
    pub async fn create_post(&self, input: NewPost) -> Result<Post> {
        if input.workspace_id.is_empty() {
            return Err(SyndicateError::Validation(
                "workspace_id cannot be empty".to_string(),
            ));
        }
        if input.targets.is_empty() {
            return Err(SyndicateError::Validation(
                "post must have at least one target".to_string(),
            ));
        }

        let now = chrono::Utc::now().timestamp();
        if let Some(fire_at) = input.scheduled_at {
            if fire_at <= now {
                return Err(SyndicateError::Validation(format!(
                    "scheduled time {} is not in the future",
                    fire_at
                )));
            }
        }

        check_unique_channels(&input.targets)?;
        let pairs = to_pairs(&input.targets);
        self.channels
            .validate_targets(&input.workspace_id, &pairs)
            .await?;

        let mut post = Post::new(&input.workspace_id);
        post.content = input.content;
        post.media_items = input.media_items;
        post.platform_content = input.platform_content;
        post.targets = input
            .targets
            .iter()
            .map(|t| Target::new(&t.channel_id, t.platform))
            .collect();
        post.created_by = input.created_by.clone();

        self.validate_content(&post)?;

        self.db.create_post(&post).await?;
        self.db
            .append_history(
                &HistoryEntry::new(&post.id, HistoryAction::Created)
                    .performed_by_opt(input.created_by),
            )
            .await?;

        if let Some(fire_at) = input.scheduled_at {
            let job_id = self.scheduler.schedule(&post.id, fire_at, now).await?;
            post.status = PostStatus::Scheduled;
            post.scheduled_at = Some(fire_at);
            post.job_id = Some(job_id);
            self.db.update_post(&post).await?;
            self.db
                .append_history(
                    &HistoryEntry::new(&post.id, HistoryAction::Scheduled)
                        .transition(PostStatus::Draft, PostStatus::Scheduled)
                        .details(format!("fire_at={}", fire_at)),
                )
                .await?;
        }

        info!(post_id = %post.id, workspace = %post.workspace_id, status = %post.status, "Post created");
        Ok(post)
    }

    /// Apply a partial update to an editable post.
    ///
    /// Posts that are publishing or have reached a published state are
    /// immutable; the update is rejected with `Conflict` and nothing
    /// changes.
    pub async fn update_post(&self, post_id: &str, update: PostUpdate) -> Result<Post> {
        let mut post = self.require_post(post_id).await?;

        match post.status {
            PostStatus::Draft | PostStatus::Scheduled | PostStatus::Failed => {}
            PostStatus::Publishing => {
                return Err(SyndicateError::Conflict(
                    "post is currently publishing".to_string(),
                ));
            }
            PostStatus::Published | PostStatus::PartiallyPublished => {
                return Err(SyndicateError::Conflict(
                    "cannot edit a published post".to_string(),
                ));
            }
        }

        if update.is_empty() {
            return Ok(post);
        }

        if let Some(content) = update.content {
            post.content = content;
        }
        if let Some(media_items) = update.media_items {
            post.media_items = media_items;
        }
        if let Some(platform_content) = update.platform_content {
            post.platform_content = platform_content;
        }
        if let Some(targets) = update.targets {
            if targets.is_empty() {
                return Err(SyndicateError::Validation(
                    "post must have at least one target".to_string(),
                ));
            }
            check_unique_channels(&targets)?;
            let pairs = to_pairs(&targets);
            self.channels
                .validate_targets(&post.workspace_id, &pairs)
                .await?;
            post.targets = targets
                .iter()
                .map(|t| Target::new(&t.channel_id, t.platform))
                .collect();
        }

        self.validate_content(&post)?;

        post.updated_at = chrono::Utc::now().timestamp();
        self.db.update_post(&post).await?;
        self.db
            .append_history(
                &HistoryEntry::new(post_id, HistoryAction::Updated)
                    .performed_by_opt(update.performed_by),
            )
            .await?;

        debug!(post_id = %post_id, "Post updated");
        Ok(post)
    }

    /// Delete a post. Cancels a pending schedule first; history rows
    /// for the post are kept. Posts that are publishing or have reached
    /// a published state cannot be deleted.
    pub async fn delete_post(&self, post_id: &str, performed_by: Option<String>) -> Result<()> {
        let post = self.require_post(post_id).await?;

        match post.status {
            PostStatus::Draft | PostStatus::Scheduled | PostStatus::Failed => {}
            PostStatus::Publishing => {
                return Err(SyndicateError::Conflict(
                    "post is currently publishing".to_string(),
                ));
            }
            PostStatus::Published | PostStatus::PartiallyPublished => {
                return Err(SyndicateError::Conflict(
                    "cannot delete a published post".to_string(),
                ));
            }
        }

        if let Some(job_id) = &post.job_id {
            self.scheduler.cancel(job_id).await?;
        }

        self.db
            .append_history(
                &HistoryEntry::new(post_id, HistoryAction::Deleted).performed_by_opt(performed_by),
            )
            .await?;
        self.db.delete_post(post_id).await?;

        info!(post_id = %post_id, "Post deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Schedule a post for future publication. Re-scheduling an
    /// already-scheduled post replaces its job.
    pub async fn schedule_post(&self, post_id: &str, fire_at: i64) -> Result<Post> {
        let mut post = self.require_post(post_id).await?;
        let now = chrono::Utc::now().timestamp();

        match post.status {
            PostStatus::Draft | PostStatus::Scheduled | PostStatus::Failed => {}
            PostStatus::Publishing => {
                return Err(SyndicateError::Conflict(
                    "post is currently publishing".to_string(),
                ));
            }
            PostStatus::Published | PostStatus::PartiallyPublished => {
                return Err(SyndicateError::Conflict(
                    "post is already published".to_string(),
                ));
            }
        }

        if fire_at <= now {
            return Err(SyndicateError::Validation(format!(
                "scheduled time {} is not in the future",
                fire_at
            )));
        }

        if post.targets.is_empty() {
            return Err(SyndicateError::Validation(
                "cannot schedule a post with no targets".to_string(),
            ));
        }

        // Replace any existing job
        if let Some(old_job) = &post.job_id {
            self.scheduler.cancel(old_job).await?;
        }

        let job_id = self.scheduler.schedule(post_id, fire_at, now).await?;

        let previous = post.status;
        post.status = PostStatus::Scheduled;
        post.scheduled_at = Some(fire_at);
        post.job_id = Some(job_id);
        post.updated_at = now;
        self.db.update_post(&post).await?;
        self.db
            .append_history(
                &HistoryEntry::new(post_id, HistoryAction::Scheduled)
                    .transition(previous, PostStatus::Scheduled)
                    .details(format!("fire_at={}", fire_at)),
            )
            .await?;

        info!(post_id = %post_id, fire_at, "Post scheduled");
        Ok(post)
    }

    /// Cancel a post's schedule, returning it to draft.
    ///
    /// If the job already started firing the cancel is refused with
    /// `Conflict`; the publish run will settle the post's state.
    pub async fn cancel_schedule(&self, post_id: &str) -> Result<Post> {
        let mut post = self.require_post(post_id).await?;

        if post.status != PostStatus::Scheduled {
            return Err(SyndicateError::Conflict(format!(
                "post is {}, not scheduled",
                post.status
            )));
        }

        let job_id = post.job_id.clone().ok_or_else(|| {
            SyndicateError::Scheduler(format!("scheduled post {} has no job", post_id))
        })?;

        if !self.scheduler.cancel(&job_id).await? {
            return Err(SyndicateError::Conflict(
                "scheduled job already started".to_string(),
            ));
        }

        post.status = PostStatus::Draft;
        post.scheduled_at = None;
        post.job_id = None;
        post.updated_at = chrono::Utc::now().timestamp();
        self.db.update_post(&post).await?;
        self.db
            .append_history(
                &HistoryEntry::new(post_id, HistoryAction::ScheduleCleared)
                    .transition(PostStatus::Scheduled, PostStatus::Draft),
            )
            .await?;

        info!(post_id = %post_id, "Schedule cancelled");
        Ok(post)
    }

    // ------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------

    /// Publish a post to all of its pending targets, sequentially.
    ///
    /// Per-target failures and rate-limit denials are recorded on the
    /// target and never abort the run; the post ends in the aggregate
    /// of its target outcomes. The returned error cases are the
    /// deterministic rejections: unknown post, wrong state, unsupported
    /// platform, invalid content.
    pub async fn publish_post(&self, post_id: &str) -> Result<Post> {
        let lock = self.publish_lock(post_id);
        let _guard = lock.lock().await;

        // Re-read under the lock: a concurrent publisher may have
        // finished while we waited
        let mut post = self.require_post(post_id).await?;

        match post.status {
            PostStatus::Draft | PostStatus::Scheduled | PostStatus::Failed
            | PostStatus::PartiallyPublished => {}
            PostStatus::Publishing => {
                return Err(SyndicateError::Conflict(
                    "post is already publishing".to_string(),
                ));
            }
            PostStatus::Published => {
                return Err(SyndicateError::Conflict(
                    "post is already published".to_string(),
                ));
            }
        }

        if post.targets.is_empty() {
            return Err(SyndicateError::Validation(
                "cannot publish a post with no targets".to_string(),
            ));
        }

        // Resolve every pending platform up front so an unsupported
        // platform rejects the whole run before any state change
        let pending: Vec<usize> = post
            .targets
            .iter()
            .enumerate()
            .filter(|(_, t)| t.status != TargetStatus::Published)
            .map(|(i, _)| i)
            .collect();
        let platforms: HashSet<Platform> =
            pending.iter().map(|&i| post.targets[i].platform).collect();
        for platform in &platforms {
            self.registry.resolve(*platform)?;
        }

        // Channel health is re-checked per target inside the loop so a
        // bad channel fails only its own target
        let pairs: Vec<(String, Platform)> = pending
            .iter()
            .map(|&i| {
                (
                    post.targets[i].channel_id.clone(),
                    post.targets[i].platform,
                )
            })
            .collect();
        self.validate_content(&post)?;

        // Enter publishing
        let previous = post.status;
        let now = chrono::Utc::now().timestamp();
        post.status = PostStatus::Publishing;
        post.updated_at = now;
        self.db.update_post(&post).await?;
        self.db
            .append_history(
                &HistoryEntry::new(post_id, HistoryAction::Publishing)
                    .transition(previous, PostStatus::Publishing),
            )
            .await?;
        self.event_bus.emit(Event::PublishStarted {
            post_id: post_id.to_string(),
            channels: pairs.iter().map(|(c, _)| c.clone()).collect(),
        });

        // Sequential fan-out over pending targets
        for index in pending {
            self.publish_target(&mut post, index).await?;
        }

        // Settle the aggregate
        let final_status = post.aggregate_status();
        let now = chrono::Utc::now().timestamp();
        let any_published = post
            .targets
            .iter()
            .any(|t| t.status == TargetStatus::Published);
        if any_published && post.published_at.is_none() {
            post.published_at = Some(now);
        }
        post.last_error = post
            .targets
            .iter()
            .find(|t| t.status == TargetStatus::Failed)
            .and_then(|t| t.error_message.clone());
        post.status = final_status;
        post.scheduled_at = None;
        post.job_id = None;
        post.updated_at = now;
        self.db.update_post(&post).await?;

        let final_action = match final_status {
            PostStatus::Published => HistoryAction::Published,
            _ => HistoryAction::Failed,
        };
        self.db
            .append_history(
                &HistoryEntry::new(post_id, final_action)
                    .transition(PostStatus::Publishing, final_status),
            )
            .await?;
        self.event_bus.emit(Event::PublishCompleted {
            post_id: post_id.to_string(),
            status: final_status.as_str().to_string(),
        });

        info!(post_id = %post_id, status = %final_status, "Publish run finished");
        Ok(post)
    }

    /// Publish one target: channel re-validation, rate check, token
    /// fetch, the single timeout-wrapped platform call, then
    /// record-keeping
    async fn publish_target(&self, post: &mut Post, index: usize) -> Result<()> {
        let (channel_id, platform) = {
            let target = &post.targets[index];
            (target.channel_id.clone(), target.platform)
        };
        let now = chrono::Utc::now().timestamp();

        // The channel may have vanished or disconnected since the post
        // was created; that fails this target, not its siblings
        let channel = match self.channels.channel(&post.workspace_id, &channel_id).await? {
            Some(channel) => channel,
            None => {
                let message = format!(
                    "unknown channel '{}' in workspace '{}'",
                    channel_id, post.workspace_id
                );
                return self.fail_target(post, index, platform, message).await;
            }
        };
        if !channel.connected {
            let message = format!("channel '{}' is disconnected", channel_id);
            return self.fail_target(post, index, platform, message).await;
        }
        if channel.platform != platform {
            let message = format!(
                "channel '{}' belongs to {} but target says {}",
                channel_id, channel.platform, platform
            );
            return self.fail_target(post, index, platform, message).await;
        }

        let decision = self.rate_limiter.check(platform, &channel_id, now).await?;
        if !decision.allowed {
            let retry_after_ms = decision.retry_after_ms.unwrap_or(0);
            let scope = decision.blocked_scope.unwrap_or_else(|| platform.to_string());
            let message = format!(
                "rate limited on {}: retry after {} ms",
                scope, retry_after_ms
            );
            warn!(post_id = %post.id, channel = %channel_id, %scope, retry_after_ms, "Target rate limited");

            post.targets[index].mark_failed(message.clone());
            self.db
                .append_history(
                    &HistoryEntry::new(&post.id, HistoryAction::RateLimited)
                        .channel(&channel_id)
                        .details(message),
                )
                .await?;
            self.event_bus.emit(Event::TargetRateLimited {
                post_id: post.id.clone(),
                channel_id,
                platform,
                retry_after_ms,
            });
            return Ok(());
        }

        let publisher = self.registry.resolve(platform)?;
        let token = match self.channels.access_token(&channel_id).await {
            Ok(token) => token,
            Err(e) => {
                let message = format!("could not load channel token: {}", e);
                return self.fail_target(post, index, platform, message).await;
            }
        };

        let call = publisher.publish(post, &channel, &token);
        let outcome = match tokio::time::timeout(self.publish_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout(self.publish_timeout.as_secs())),
        };

        match outcome {
            Ok(receipt) => {
                let published_at = chrono::Utc::now().timestamp();
                post.targets[index].mark_published(
                    receipt.platform_post_id.clone(),
                    receipt.url,
                    published_at,
                );
                // Quota is charged only for confirmed publishes
                self.rate_limiter
                    .record(platform, &channel_id, published_at)
                    .await?;
                self.db
                    .append_history(
                        &HistoryEntry::new(&post.id, HistoryAction::Published)
                            .channel(&channel_id)
                            .details(format!("platform_post_id={}", receipt.platform_post_id)),
                    )
                    .await?;
                self.event_bus.emit(Event::TargetPublished {
                    post_id: post.id.clone(),
                    channel_id,
                    platform,
                    platform_post_id: receipt.platform_post_id,
                });
            }
            Err(e) => {
                self.fail_target(post, index, platform, e.to_string()).await?;
            }
        }

        Ok(())
    }

    /// Mark one target failed and write the audit trail for it
    async fn fail_target(
        &self,
        post: &mut Post,
        index: usize,
        platform: Platform,
        message: String,
    ) -> Result<()> {
        let channel_id = post.targets[index].channel_id.clone();
        post.targets[index].mark_failed(message.clone());
        self.record_target_failure(post, &channel_id, platform, &message)
            .await
    }

    async fn record_target_failure(
        &self,
        post: &Post,
        channel_id: &str,
        platform: Platform,
        message: &str,
    ) -> Result<()> {
        warn!(post_id = %post.id, channel = %channel_id, error = %message, "Target failed");
        self.db
            .append_history(
                &HistoryEntry::new(&post.id, HistoryAction::Failed)
                    .channel(channel_id)
                    .details(message),
            )
            .await?;
        self.event_bus.emit(Event::TargetFailed {
            post_id: post.id.clone(),
            channel_id: channel_id.to_string(),
            platform,
            error: message.to_string(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        self.db.get_post(post_id).await
    }

    pub async fn list_posts(
        &self,
        workspace_id: &str,
        status: Option<PostStatus>,
        channel_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>> {
        self.db
            .list_posts(workspace_id, status, channel_id, limit, offset)
            .await
    }

    /// Posts scheduled to fire within [from, to], soonest first
    pub async fn scheduled_posts(
        &self,
        workspace_id: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Post>> {
        self.db.scheduled_posts(workspace_id, from, to).await
    }

    pub async fn queue_status(&self) -> Result<QueueStatus> {
        self.scheduler
            .queue_status(chrono::Utc::now().timestamp())
            .await
    }

    /// Platform-scope rate usage across all configured platforms
    pub async fn rate_limit_status(&self) -> Result<Vec<ScopeUsage>> {
        self.rate_limiter
            .all_usage(chrono::Utc::now().timestamp())
            .await
    }

    /// Validate resolved content against each targeted platform's
    /// constraints
    fn validate_content(&self, post: &Post) -> Result<()> {
        let platforms: HashSet<Platform> = post.targets.iter().map(|t| t.platform).collect();
        for platform in platforms {
            // Platforms without a registered publisher are checked at
            // publish-time resolution instead
            if let Ok(publisher) = self.registry.resolve(platform) {
                publisher.validate(post)?;
            }
        }
        Ok(())
    }

    async fn require_post(&self, post_id: &str) -> Result<Post> {
        self.db
            .get_post(post_id)
            .await?
            .ok_or_else(|| SyndicateError::NotFound(format!("post {}", post_id)))
    }

    fn publish_lock(&self, post_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.publish_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(post_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl JobRunner for PostService {
    /// A fired job runs a fresh publish. Deterministic rejections bubble
    /// up so the scheduler marks the job failed without retrying; a run
    /// where every target failed reports an error so the scheduler's
    /// backoff retries the leftovers.
    async fn run_job(&self, post_id: &str) -> Result<()> {
        let post = self.publish_post(post_id).await?;
        if post.status == PostStatus::Failed {
            return Err(SyndicateError::Scheduler(format!(
                "all targets failed for post {}",
                post_id
            )));
        }
        Ok(())
    }
}

fn check_unique_channels(targets: &[TargetSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for target in targets {
        if !seen.insert(target.channel_id.as_str()) {
            return Err(SyndicateError::Validation(format!(
                "duplicate target channel: {}",
                target.channel_id
            )));
        }
    }
    Ok(())
}

fn to_pairs(targets: &[TargetSpec]) -> Vec<(String, Platform)> {
    targets
        .iter()
        .map(|t| (t.channel_id.clone(), t.platform))
        .collect()
}

impl HistoryEntry {
    fn performed_by_opt(self, user: Option<String>) -> Self {
        match user {
            Some(user) => self.performed_by(user),
            None => self,
        }
    }
}
