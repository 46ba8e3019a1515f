//! Publisher abstraction and per-platform implementations
//!
//! Each platform gets one strategy that knows how to shape a post into
//! that platform's payload and validate it against the platform's
//! constraints. The actual HTTP call goes through the [`PlatformApi`]
//! trait so the engine never embeds an HTTP client; callers plug in
//! their own client (tests plug in [`mock::MockApi`]).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::channels::Channel;
use crate::config::ConstraintOverride;
use crate::error::{PublishError, Result, SyndicateError};
use crate::types::{MediaItem, MediaType, Platform, Post};

pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod mastodon;
pub mod x;
pub mod youtube;

// Mock API is available for all builds (not just tests) to support
// integration tests and embedding callers that dry-run publishes
pub mod mock;

pub use facebook::FacebookPublisher;
pub use instagram::InstagramPublisher;
pub use linkedin::LinkedinPublisher;
pub use mastodon::MastodonPublisher;
pub use x::XPublisher;
pub use youtube::YoutubePublisher;

/// The payload a strategy hands to the platform API. Already resolved:
/// overrides applied, media ordered, metadata narrowed to this
/// platform.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiPayload {
    pub account_id: String,
    pub text: Option<String>,
    pub media: Vec<MediaItem>,
    pub metadata: Option<serde_json::Value>,
}

/// What the platform gave back for a successful publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub platform_post_id: String,
    pub url: Option<String>,
}

/// The single outbound call a publish makes per target.
///
/// Implementations wrap a real HTTP client; exactly one call happens
/// per target per publish run, and the orchestrator wraps it in a
/// timeout.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn create_post(
        &self,
        platform: Platform,
        token: &SecretString,
        payload: &ApiPayload,
    ) -> std::result::Result<PublishReceipt, PublishError>;
}

/// Validation rules for one platform, overridable from config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConstraints {
    pub max_chars: Option<usize>,
    pub min_media: usize,
    pub max_media: usize,
    pub allowed_media: Vec<MediaType>,
}

impl PlatformConstraints {
    /// Published platform limits as of mid-2026
    pub fn defaults_for(platform: Platform) -> Self {
        match platform {
            Platform::X => Self {
                max_chars: Some(280),
                min_media: 0,
                max_media: 4,
                allowed_media: vec![MediaType::Image, MediaType::Video, MediaType::Gif],
            },
            Platform::Mastodon => Self {
                max_chars: Some(500),
                min_media: 0,
                max_media: 4,
                allowed_media: vec![MediaType::Image, MediaType::Video, MediaType::Gif],
            },
            Platform::Instagram => Self {
                max_chars: Some(2200),
                // Instagram has no text-only posts
                min_media: 1,
                max_media: 10,
                allowed_media: vec![MediaType::Image, MediaType::Video, MediaType::Carousel],
            },
            Platform::Linkedin => Self {
                max_chars: Some(3000),
                min_media: 0,
                max_media: 9,
                allowed_media: vec![MediaType::Image, MediaType::Video],
            },
            Platform::Youtube => Self {
                max_chars: Some(5000),
                // Exactly one video per upload
                min_media: 1,
                max_media: 1,
                allowed_media: vec![MediaType::Video],
            },
            Platform::Facebook => Self {
                max_chars: Some(63_206),
                min_media: 0,
                max_media: 10,
                allowed_media: vec![
                    MediaType::Image,
                    MediaType::Video,
                    MediaType::Gif,
                    MediaType::Carousel,
                ],
            },
        }
    }

    /// Apply a partial config override on top of the defaults
    pub fn with_override(mut self, over: &ConstraintOverride) -> Self {
        if let Some(max_chars) = over.max_chars {
            self.max_chars = Some(max_chars);
        }
        if let Some(min_media) = over.min_media {
            self.min_media = min_media;
        }
        if let Some(max_media) = over.max_media {
            self.max_media = max_media;
        }
        if let Some(allowed) = &over.allowed_media {
            self.allowed_media = allowed.clone();
        }
        self
    }

    /// Validate resolved content and media against these rules
    pub fn validate(&self, platform: Platform, content: Option<&str>, media: &[MediaItem]) -> Result<()> {
        let text_len = content.map(|c| c.chars().count()).unwrap_or(0);

        if text_len == 0 && media.is_empty() {
            return Err(SyndicateError::Validation(format!(
                "{}: post has neither text nor media",
                platform
            )));
        }

        if let Some(max) = self.max_chars {
            if text_len > max {
                return Err(SyndicateError::Validation(format!(
                    "{}: content is {} characters, limit is {}",
                    platform, text_len, max
                )));
            }
        }

        if media.len() < self.min_media {
            return Err(SyndicateError::Validation(format!(
                "{}: requires at least {} media item(s), got {}",
                platform,
                self.min_media,
                media.len()
            )));
        }

        if media.len() > self.max_media {
            return Err(SyndicateError::Validation(format!(
                "{}: allows at most {} media item(s), got {}",
                platform,
                self.max_media,
                media.len()
            )));
        }

        for item in media {
            if !self.allowed_media.contains(&item.media_type) {
                return Err(SyndicateError::Validation(format!(
                    "{}: media type {} is not supported",
                    platform, item.media_type
                )));
            }
        }

        Ok(())
    }
}

/// Strategy for publishing to one platform
#[async_trait]
pub trait Publisher: Send + Sync {
    /// The platform this strategy serves
    fn platform(&self) -> Platform;

    /// Effective constraints (defaults plus config overrides)
    fn constraints(&self) -> &PlatformConstraints;

    /// Validate the post's resolved content for this platform without
    /// touching the network
    fn validate(&self, post: &Post) -> Result<()> {
        let platform = self.platform();
        self.constraints()
            .validate(platform, post.content_for(platform), post.media_for(platform))
    }

    /// Shape the post into this platform's payload and make the single
    /// outbound call
    async fn publish(
        &self,
        post: &Post,
        channel: &Channel,
        token: &SecretString,
    ) -> std::result::Result<PublishReceipt, PublishError>;
}

/// Registry of publisher strategies, keyed by platform.
///
/// Resolution failure is `UnsupportedPlatform`, surfaced before any
/// target is attempted.
#[derive(Default)]
pub struct PublisherRegistry {
    publishers: BTreeMap<Platform, Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all six built-in strategies wired to one API
    pub fn with_builtins(
        api: Arc<dyn PlatformApi>,
        overrides: &BTreeMap<Platform, ConstraintOverride>,
    ) -> Self {
        let mut registry = Self::new();
        let constraints = |p: Platform| {
            let defaults = PlatformConstraints::defaults_for(p);
            match overrides.get(&p) {
                Some(over) => defaults.with_override(over),
                None => defaults,
            }
        };

        registry.register(Arc::new(XPublisher::new(api.clone(), constraints(Platform::X))));
        registry.register(Arc::new(MastodonPublisher::new(
            api.clone(),
            constraints(Platform::Mastodon),
        )));
        registry.register(Arc::new(InstagramPublisher::new(
            api.clone(),
            constraints(Platform::Instagram),
        )));
        registry.register(Arc::new(LinkedinPublisher::new(
            api.clone(),
            constraints(Platform::Linkedin),
        )));
        registry.register(Arc::new(YoutubePublisher::new(
            api.clone(),
            constraints(Platform::Youtube),
        )));
        registry.register(Arc::new(FacebookPublisher::new(
            api,
            constraints(Platform::Facebook),
        )));
        registry
    }

    pub fn register(&mut self, publisher: Arc<dyn Publisher>) {
        self.publishers.insert(publisher.platform(), publisher);
    }

    /// Resolve the strategy for a platform
    pub fn resolve(&self, platform: Platform) -> Result<Arc<dyn Publisher>> {
        self.publishers
            .get(&platform)
            .cloned()
            .ok_or_else(|| SyndicateError::UnsupportedPlatform(platform.to_string()))
    }

    pub fn supported_platforms(&self) -> Vec<Platform> {
        self.publishers.keys().copied().collect()
    }
}

/// Shared payload assembly used by the built-in strategies
fn base_payload(post: &Post, channel: &Channel, platform: Platform) -> ApiPayload {
    ApiPayload {
        account_id: channel.platform_account_id.clone(),
        text: post.content_for(platform).map(|s| s.to_string()),
        media: post.media_for(platform).to_vec(),
        metadata: post.metadata_for(platform).cloned(),
    }
}
