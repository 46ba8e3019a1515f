//! LinkedIn publisher strategy

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::json;

use crate::channels::Channel;
use crate::error::PublishError;
use crate::types::{Platform, Post};

use super::{base_payload, PlatformApi, PlatformConstraints, Publisher, PublishReceipt};

pub struct LinkedinPublisher {
    api: Arc<dyn PlatformApi>,
    constraints: PlatformConstraints,
}

impl LinkedinPublisher {
    pub fn new(api: Arc<dyn PlatformApi>, constraints: PlatformConstraints) -> Self {
        Self { api, constraints }
    }
}

#[async_trait]
impl Publisher for LinkedinPublisher {
    fn platform(&self) -> Platform {
        Platform::Linkedin
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
        let mut payload = base_payload(post, channel, Platform::Linkedin);

        // LinkedIn wants an explicit audience; default to public
        let mut metadata = payload.metadata.take().unwrap_or_else(|| json!({}));
        if metadata.get("visibility").is_none() {
            if let Some(obj) = metadata.as_object_mut() {
                obj.insert("visibility".to_string(), json!("PUBLIC"));
            }
        }
        payload.metadata = Some(metadata);

        self.api.create_post(Platform::Linkedin, token, &payload).await
    }
}
