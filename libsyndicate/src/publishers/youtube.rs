//! YouTube publisher strategy
//!
//! A YouTube "post" is one video upload. The title comes from the
//! metadata `title` knob, falling back to the first line of the
//! content; the rest of the content becomes the description.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::json;

use crate::channels::Channel;
use crate::error::PublishError;
use crate::types::{MediaType, Platform, Post};

use super::{base_payload, PlatformApi, PlatformConstraints, Publisher, PublishReceipt};

pub struct YoutubePublisher {
    api: Arc<dyn PlatformApi>,
    constraints: PlatformConstraints,
}

impl YoutubePublisher {
    pub fn new(api: Arc<dyn PlatformApi>, constraints: PlatformConstraints) -> Self {
        Self { api, constraints }
    }
}

#[async_trait]
impl Publisher for YoutubePublisher {
    fn platform(&self) -> Platform {
        Platform::Youtube
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
        let mut payload = base_payload(post, channel, Platform::Youtube);

        match payload.media.first() {
            Some(item) if item.media_type == MediaType::Video => {}
            _ => {
                return Err(PublishError::Payload(
                    "youtube requires exactly one video".to_string(),
                ));
            }
        }

        let mut metadata = payload.metadata.take().unwrap_or_else(|| json!({}));
        if metadata.get("title").is_none() {
            let title = payload
                .text
                .as_deref()
                .and_then(|t| t.lines().next())
                .unwrap_or("Untitled")
                .to_string();
            if let Some(obj) = metadata.as_object_mut() {
                obj.insert("title".to_string(), json!(title));
            }
        }
        payload.metadata = Some(metadata);

        self.api.create_post(Platform::Youtube, token, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::mock::MockApi;
    use super::*;
    use crate::channels::test_channel;
    use crate::types::MediaItem;

    fn video_post(content: &str) -> Post {
        let mut post = Post::new("ws-1");
        post.content = Some(content.to_string());
        post.media_items
            .push(MediaItem::new("https://cdn/v.mp4", MediaType::Video));
        post
    }

    #[tokio::test]
    async fn test_publish_video() {
        let api = Arc::new(MockApi::success());
        let publisher = YoutubePublisher::new(
            api.clone(),
            PlatformConstraints::defaults_for(Platform::Youtube),
        );

        let post = video_post("Launch day\nFull description here");
        let channel = test_channel("chan-yt", "ws-1", Platform::Youtube);
        let token = SecretString::from("tok");

        publisher.publish(&post, &channel, &token).await.unwrap();
        assert_eq!(api.calls()[0].media_count, 1);
    }

    #[test]
    fn test_validate_rejects_no_video() {
        let api = Arc::new(MockApi::success());
        let publisher =
            YoutubePublisher::new(api, PlatformConstraints::defaults_for(Platform::Youtube));

        let mut post = Post::new("ws-1");
        post.content = Some("text only".to_string());
        assert!(publisher.validate(&post).is_err());
    }

    #[test]
    fn test_validate_rejects_two_videos() {
        let api = Arc::new(MockApi::success());
        let publisher =
            YoutubePublisher::new(api, PlatformConstraints::defaults_for(Platform::Youtube));

        let mut post = video_post("two uploads");
        post.media_items
            .push(MediaItem::new("https://cdn/v2.mp4", MediaType::Video));
        assert!(publisher.validate(&post).is_err());
    }

    #[test]
    fn test_validate_rejects_image() {
        let api = Arc::new(MockApi::success());
        let publisher =
            YoutubePublisher::new(api, PlatformConstraints::defaults_for(Platform::Youtube));

        let mut post = Post::new("ws-1");
        post.media_items
            .push(MediaItem::new("https://cdn/a.jpg", MediaType::Image));
        assert!(publisher.validate(&post).is_err());
    }

    #[tokio::test]
    async fn test_publish_wrong_media_never_calls_api() {
        let api = Arc::new(MockApi::success());
        let publisher = YoutubePublisher::new(
            api.clone(),
            PlatformConstraints::defaults_for(Platform::Youtube),
        );

        let mut post = Post::new("ws-1");
        post.content = Some("no video".to_string());
        let channel = test_channel("chan-yt", "ws-1", Platform::Youtube);
        let token = SecretString::from("tok");

        assert!(publisher.publish(&post, &channel, &token).await.is_err());
        assert_eq!(api.call_count(), 0);
    }
}
