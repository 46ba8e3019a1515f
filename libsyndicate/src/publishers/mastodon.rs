//! Mastodon publisher strategy
//!
//! Metadata knobs: `visibility` (public, unlisted, private, direct)
//! and `spoiler_text` pass through to the API; visibility defaults to
//! public when absent.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::json;

use crate::channels::Channel;
use crate::error::PublishError;
use crate::types::{Platform, Post};

use super::{base_payload, PlatformApi, PlatformConstraints, Publisher, PublishReceipt};

pub struct MastodonPublisher {
    api: Arc<dyn PlatformApi>,
    constraints: PlatformConstraints,
}

impl MastodonPublisher {
    pub fn new(api: Arc<dyn PlatformApi>, constraints: PlatformConstraints) -> Self {
        Self { api, constraints }
    }
}

#[async_trait]
impl Publisher for MastodonPublisher {
    fn platform(&self) -> Platform {
        Platform::Mastodon
    }

    fn constraints(&self) -> &PlatformConstraints {
        &self.constraints
    }

    async fn publish(
        &self,
        post: &Post,
        channel: &Channel,
        token: &SecretString,
    ) -> Result<PublishReceipt, PublishError> {
        let mut payload = base_payload(post, channel, Platform::Mastodon);

        let mut metadata = payload
            .metadata
            .take()
            .unwrap_or_else(|| json!({}));
        if metadata.get("visibility").is_none() {
            if let Some(obj) = metadata.as_object_mut() {
                obj.insert("visibility".to_string(), json!("public"));
            }
        }
        payload.metadata = Some(metadata);

        self.api.create_post(Platform::Mastodon, token, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::mock::MockApi;
    use super::*;
    use crate::channels::test_channel;
    use crate::types::PlatformContent;

    #[tokio::test]
    async fn test_publish_defaults_visibility() {
        let api = Arc::new(MockApi::success());
        let publisher = MastodonPublisher::new(
            api.clone(),
            PlatformConstraints::defaults_for(Platform::Mastodon),
        );

        let mut post = Post::new("ws-1");
        post.content = Some("federated hello".to_string());
        let channel = test_channel("chan-8", "ws-1", Platform::Mastodon);
        let token = SecretString::from("tok");

        publisher.publish(&post, &channel, &token).await.unwrap();
        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test]
    async fn test_metadata_passes_through() {
        let api = Arc::new(MockApi::success());
        let publisher = MastodonPublisher::new(
            api.clone(),
            PlatformConstraints::defaults_for(Platform::Mastodon),
        );

        let mut post = Post::new("ws-1");
        post.content = Some("cw example".to_string());
        post.platform_content.insert(
            Platform::Mastodon,
            PlatformContent {
                metadata: Some(json!({"visibility": "unlisted", "spoiler_text": "politics"})),
                ..Default::default()
            },
        );

        let channel = test_channel("chan-8", "ws-1", Platform::Mastodon);
        let token = SecretString::from("tok");
        publisher.publish(&post, &channel, &token).await.unwrap();
    }

    #[test]
    fn test_validate_500_char_limit() {
        let api = Arc::new(MockApi::success());
        let publisher =
            MastodonPublisher::new(api, PlatformConstraints::defaults_for(Platform::Mastodon));

        let mut post = Post::new("ws-1");
        post.content = Some("a".repeat(501));
        assert!(publisher.validate(&post).is_err());
    }
}
