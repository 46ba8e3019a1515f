//! X (formerly Twitter) publisher strategy

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::channels::Channel;
use crate::error::PublishError;
use crate::types::{Platform, Post};

use super::{base_payload, PlatformApi, PlatformConstraints, Publisher, PublishReceipt};

pub struct XPublisher {
    api: Arc<dyn PlatformApi>,
    constraints: PlatformConstraints,
}

impl XPublisher {
    pub fn new(api: Arc<dyn PlatformApi>, constraints: PlatformConstraints) -> Self {
        Self { api, constraints }
    }
}

#[async_trait]
impl Publisher for XPublisher {
    fn platform(&self) -> Platform {
        Platform::X
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
        let payload = base_payload(post, channel, Platform::X);
        self.api.create_post(Platform::X, token, &payload).await
    }
}
