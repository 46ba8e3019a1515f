//! Core types for the publishing engine

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A social platform this engine can publish to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    X,
    Mastodon,
    Instagram,
    Linkedin,
    Youtube,
    Facebook,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::X,
        Platform::Mastodon,
        Platform::Instagram,
        Platform::Linkedin,
        Platform::Youtube,
        Platform::Facebook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::X => "x",
            Platform::Mastodon => "mastodon",
            Platform::Instagram => "instagram",
            Platform::Linkedin => "linkedin",
            Platform::Youtube => "youtube",
            Platform::Facebook => "facebook",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x" | "twitter" => Ok(Platform::X),
            "mastodon" => Ok(Platform::Mastodon),
            "instagram" => Ok(Platform::Instagram),
            "linkedin" => Ok(Platform::Linkedin),
            "youtube" => Ok(Platform::Youtube),
            "facebook" => Ok(Platform::Facebook),
            _ => Err(format!("unknown platform: {}", s)),
        }
    }
}

/// Media kind attached to a post
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Gif,
    Carousel,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Image => write!(f, "image"),
            MediaType::Video => write!(f, "video"),
            MediaType::Gif => write!(f, "gif"),
            MediaType::Carousel => write!(f, "carousel"),
        }
    }
}

/// One media item, ordered within the post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
    pub url: String,
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl MediaItem {
    pub fn new(url: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            url: url.into(),
            media_type,
            thumbnail_url: None,
            alt_text: None,
            width: None,
            height: None,
        }
    }
}

/// Per-platform override of text, media and metadata.
///
/// Any field left `None` falls back to the post's defaults at publish
/// time; `metadata` carries platform-specific knobs (poll definitions,
/// privacy level, etc.) that only the matching publisher interprets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlatformContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_items: Option<Vec<MediaItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Post-level lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Publishing,
    Published,
    PartiallyPublished,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Published => "published",
            PostStatus::PartiallyPublished => "partially_published",
            PostStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PostStatus::Draft),
            "scheduled" => Some(PostStatus::Scheduled),
            "publishing" => Some(PostStatus::Publishing),
            "published" => Some(PostStatus::Published),
            "partially_published" => Some(PostStatus::PartiallyPublished),
            "failed" => Some(PostStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-target publish status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Draft,
    Published,
    Failed,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Draft => "draft",
            TargetStatus::Published => "published",
            TargetStatus::Failed => "failed",
        }
    }
}

/// One (channel, platform) publish attempt embedded within a Post.
///
/// Targets are not independently addressable rows; the Post and its
/// targets are persisted atomically as one aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Target {
    pub channel_id: String,
    pub platform: Platform,
    pub status: TargetStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_post_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Target {
    pub fn new(channel_id: impl Into<String>, platform: Platform) -> Self {
        Self {
            channel_id: channel_id.into(),
            platform,
            status: TargetStatus::Draft,
            platform_post_id: None,
            platform_post_url: None,
            published_at: None,
            error_message: None,
        }
    }

    /// Mark the target as published with the platform-assigned identity
    pub fn mark_published(&mut self, post_id: String, url: Option<String>, at: i64) {
        self.status = TargetStatus::Published;
        self.platform_post_id = Some(post_id);
        self.platform_post_url = url;
        self.published_at = Some(at);
        self.error_message = None;
    }

    /// Mark the target as failed with a human-readable reason
    pub fn mark_failed(&mut self, message: String) {
        self.status = TargetStatus::Failed;
        self.error_message = Some(message);
    }
}

/// The unit of scheduling and publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub workspace_id: String,
    pub content: Option<String>,
    #[serde(default)]
    pub media_items: Vec<MediaItem>,
    #[serde(default)]
    pub platform_content: BTreeMap<Platform, PlatformContent>,
    #[serde(default)]
    pub targets: Vec<Target>,
    pub status: PostStatus,
    pub scheduled_at: Option<i64>,
    pub published_at: Option<i64>,
    pub job_id: Option<String>,
    pub last_error: Option<String>,
    pub created_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Post {
    pub fn new(workspace_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.into(),
            content: None,
            media_items: Vec::new(),
            platform_content: BTreeMap::new(),
            targets: Vec::new(),
            status: PostStatus::Draft,
            scheduled_at: None,
            published_at: None,
            job_id: None,
            last_error: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold per-target outcomes into the aggregate status.
    ///
    /// All published -> Published; mixed -> PartiallyPublished; none
    /// published -> Failed. Only meaningful after a publish run, when
    /// every target is either Published or Failed.
    pub fn aggregate_status(&self) -> PostStatus {
        let published = self
            .targets
            .iter()
            .filter(|t| t.status == TargetStatus::Published)
            .count();
        if published == self.targets.len() && !self.targets.is_empty() {
            PostStatus::Published
        } else if published > 0 {
            PostStatus::PartiallyPublished
        } else {
            PostStatus::Failed
        }
    }

    /// Resolve the effective text for a platform (override wins)
    pub fn content_for(&self, platform: Platform) -> Option<&str> {
        self.platform_content
            .get(&platform)
            .and_then(|pc| pc.content.as_deref())
            .or(self.content.as_deref())
    }

    /// Resolve the effective media list for a platform (override wins)
    pub fn media_for(&self, platform: Platform) -> &[MediaItem] {
        self.platform_content
            .get(&platform)
            .and_then(|pc| pc.media_items.as_deref())
            .unwrap_or(&self.media_items)
    }

    /// Platform-specific metadata knobs, if any
    pub fn metadata_for(&self, platform: Platform) -> Option<&serde_json::Value> {
        self.platform_content
            .get(&platform)
            .and_then(|pc| pc.metadata.as_ref())
    }
}

/// Action recorded in the append-only history log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Updated,
    Deleted,
    Scheduled,
    ScheduleCleared,
    Publishing,
    Published,
    Failed,
    RateLimited,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Updated => "updated",
            HistoryAction::Deleted => "deleted",
            HistoryAction::Scheduled => "scheduled",
            HistoryAction::ScheduleCleared => "schedule_cleared",
            HistoryAction::Publishing => "publishing",
            HistoryAction::Published => "published",
            HistoryAction::Failed => "failed",
            HistoryAction::RateLimited => "rate_limited",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(HistoryAction::Created),
            "updated" => Some(HistoryAction::Updated),
            "deleted" => Some(HistoryAction::Deleted),
            "scheduled" => Some(HistoryAction::Scheduled),
            "schedule_cleared" => Some(HistoryAction::ScheduleCleared),
            "publishing" => Some(HistoryAction::Publishing),
            "published" => Some(HistoryAction::Published),
            "failed" => Some(HistoryAction::Failed),
            "rate_limited" => Some(HistoryAction::RateLimited),
            _ => None,
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit record, one row per state transition or per-target
/// outcome. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Option<i64>,
    pub post_id: String,
    pub action: HistoryAction,
    pub previous_status: Option<PostStatus>,
    pub new_status: Option<PostStatus>,
    pub channel_id: Option<String>,
    pub performed_by: Option<String>,
    pub details: Option<String>,
    pub created_at: i64,
}

impl HistoryEntry {
    pub fn new(post_id: impl Into<String>, action: HistoryAction) -> Self {
        Self {
            id: None,
            post_id: post_id.into(),
            action,
            previous_status: None,
            new_status: None,
            channel_id: None,
            performed_by: None,
            details: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn transition(mut self, from: PostStatus, to: PostStatus) -> Self {
        self.previous_status = Some(from);
        self.new_status = Some(to);
        self
    }

    pub fn channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn performed_by(mut self, user: impl Into<String>) -> Self {
        self.performed_by = Some(user.into());
        self
    }
}

/// Lifecycle status of a scheduled job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Delayed => "delayed",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delayed" => Some(JobStatus::Delayed),
            "active" => Some(JobStatus::Active),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A durable delayed trigger owned by the scheduler. Callers hold only
/// the opaque `job_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub job_id: String,
    pub post_id: String,
    pub fire_at: i64,
    pub status: JobStatus,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Queue depth snapshot for operational visibility
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStatus {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_new_generates_uuid() {
        let post = Post::new("ws-1");
        assert!(Uuid::parse_str(&post.id).is_ok());
        assert_eq!(post.workspace_id, "ws-1");
        assert_eq!(post.status, PostStatus::Draft);
        assert!(post.targets.is_empty());
    }

    #[test]
    fn test_post_new_unique_ids() {
        assert_ne!(Post::new("ws").id, Post::new("ws").id);
    }

    #[test]
    fn test_platform_round_trip() {
        for platform in Platform::ALL {
            let parsed: Platform = platform.as_str().parse().unwrap();
            assert_eq!(parsed, platform);
        }
    }

    #[test]
    fn test_platform_twitter_alias() {
        assert_eq!("twitter".parse::<Platform>().unwrap(), Platform::X);
    }

    #[test]
    fn test_platform_unknown() {
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_post_status_round_trip() {
        for status in [
            PostStatus::Draft,
            PostStatus::Scheduled,
            PostStatus::Publishing,
            PostStatus::Published,
            PostStatus::PartiallyPublished,
            PostStatus::Failed,
        ] {
            assert_eq!(PostStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PostStatus::parse("bogus"), None);
    }

    #[test]
    fn test_target_mark_published() {
        let mut target = Target::new("chan-7", Platform::X);
        target.mark_published("123".to_string(), Some("https://x.com/s/123".to_string()), 1000);

        assert_eq!(target.status, TargetStatus::Published);
        assert_eq!(target.platform_post_id.as_deref(), Some("123"));
        assert_eq!(target.published_at, Some(1000));
        assert!(target.error_message.is_none());
    }

    #[test]
    fn test_target_mark_failed() {
        let mut target = Target::new("chan-7", Platform::X);
        target.mark_failed("network timeout".to_string());

        assert_eq!(target.status, TargetStatus::Failed);
        assert_eq!(target.error_message.as_deref(), Some("network timeout"));
        assert!(target.platform_post_id.is_none());
    }

    #[test]
    fn test_aggregate_status_all_published() {
        let mut post = Post::new("ws");
        post.targets = vec![Target::new("a", Platform::X), Target::new("b", Platform::Mastodon)];
        for t in &mut post.targets {
            t.mark_published("id".to_string(), None, 1);
        }
        assert_eq!(post.aggregate_status(), PostStatus::Published);
    }

    #[test]
    fn test_aggregate_status_partial() {
        let mut post = Post::new("ws");
        post.targets = vec![Target::new("a", Platform::X), Target::new("b", Platform::Mastodon)];
        post.targets[0].mark_published("id".to_string(), None, 1);
        post.targets[1].mark_failed("boom".to_string());
        assert_eq!(post.aggregate_status(), PostStatus::PartiallyPublished);
    }

    #[test]
    fn test_aggregate_status_all_failed() {
        let mut post = Post::new("ws");
        post.targets = vec![Target::new("a", Platform::X)];
        post.targets[0].mark_failed("boom".to_string());
        assert_eq!(post.aggregate_status(), PostStatus::Failed);
    }

    #[test]
    fn test_content_for_uses_override() {
        let mut post = Post::new("ws");
        post.content = Some("default text".to_string());
        post.platform_content.insert(
            Platform::Instagram,
            PlatformContent {
                content: Some("insta caption".to_string()),
                ..Default::default()
            },
        );

        assert_eq!(post.content_for(Platform::Instagram), Some("insta caption"));
        assert_eq!(post.content_for(Platform::X), Some("default text"));
    }

    #[test]
    fn test_media_for_uses_override() {
        let mut post = Post::new("ws");
        post.media_items = vec![MediaItem::new("https://cdn/a.jpg", MediaType::Image)];
        post.platform_content.insert(
            Platform::Youtube,
            PlatformContent {
                media_items: Some(vec![MediaItem::new("https://cdn/v.mp4", MediaType::Video)]),
                ..Default::default()
            },
        );

        assert_eq!(post.media_for(Platform::Youtube)[0].media_type, MediaType::Video);
        assert_eq!(post.media_for(Platform::X)[0].media_type, MediaType::Image);
    }

    #[test]
    fn test_post_serialization_round_trip() {
        let mut post = Post::new("ws-9");
        post.content = Some("hello".to_string());
        post.targets.push(Target::new("chan-7", Platform::X));
        post.media_items.push(MediaItem::new("https://cdn/a.png", MediaType::Image));

        let json = serde_json::to_string(&post).unwrap();
        let back: Post = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, post.id);
        assert_eq!(back.targets, post.targets);
        assert_eq!(back.media_items, post.media_items);
    }

    #[test]
    fn test_history_entry_builder() {
        let entry = HistoryEntry::new("post-1", HistoryAction::Published)
            .transition(PostStatus::Publishing, PostStatus::Published)
            .channel("chan-7")
            .details("platform id 123");

        assert_eq!(entry.post_id, "post-1");
        assert_eq!(entry.action, HistoryAction::Published);
        assert_eq!(entry.previous_status, Some(PostStatus::Publishing));
        assert_eq!(entry.new_status, Some(PostStatus::Published));
        assert_eq!(entry.channel_id.as_deref(), Some("chan-7"));
    }

    #[test]
    fn test_history_action_round_trip() {
        for action in [
            HistoryAction::Created,
            HistoryAction::Updated,
            HistoryAction::Deleted,
            HistoryAction::Scheduled,
            HistoryAction::ScheduleCleared,
            HistoryAction::Publishing,
            HistoryAction::Published,
            HistoryAction::Failed,
            HistoryAction::RateLimited,
        ] {
            assert_eq!(HistoryAction::parse(action.as_str()), Some(action));
        }
    }

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Delayed,
            JobStatus::Active,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
    }
}
