//! Instagram publisher strategy
//!
//! Instagram has no text-only posts: every publish needs at least one
//! media item, and the caption is optional.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::channels::Channel;
use crate::error::PublishError;
use crate::types::{Platform, Post};

use super::{base_payload, PlatformApi, PlatformConstraints, Publisher, PublishReceipt};

pub struct InstagramPublisher {
    api: Arc<dyn PlatformApi>,
    constraints: PlatformConstraints,
}

impl InstagramPublisher {
    pub fn new(api: Arc<dyn PlatformApi>, constraints: PlatformConstraints) -> Self {
        Self { api, constraints }
    }
}

#[async_trait]
impl Publisher for InstagramPublisher {
    fn platform(&self) -> Platform {
        Platform::Instagram
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
        let payload = base_payload(post, channel, Platform::Instagram);

        // Validation runs before the network call, but a post mutated
        // between validate and publish must not hit the API media-less
        if payload.media.is_empty() {
            return Err(PublishError::Payload(
                "instagram requires at least one media item".to_string(),
            ));
        }

        self.api.create_post(Platform::Instagram, token, &payload).await
    }
}
