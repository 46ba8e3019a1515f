//! Mock platform API for testing
//!
//! Configurable stand-in for the outbound HTTP call: simulates
//! successes, per-account failures, and latency, and records every
//! call so tests can assert on exactly what would have been sent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::sleep;

use crate::error::PublishError;
use crate::types::Platform;

use super::{ApiPayload, PlatformApi, PublishReceipt};

/// One recorded outbound call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub platform: Platform,
    pub account_id: String,
    pub token: String,
    pub text: Option<String>,
    pub media_count: usize,
}

#[derive(Default)]
struct MockState {
    calls: Vec<RecordedCall>,
    /// Accounts whose calls should fail, with the error to return
    failures: HashMap<String, PublishError>,
    /// Failure applied to every call regardless of account
    fail_all: Option<PublishError>,
}

/// Mock API for testing publisher strategies and the orchestrator
#[derive(Clone, Default)]
pub struct MockApi {
    state: Arc<Mutex<MockState>>,
    delay: Duration,
}

impl MockApi {
    /// API where every call succeeds
    pub fn success() -> Self {
        Self::default()
    }

    /// API where every call fails with the given error
    pub fn failing(error: PublishError) -> Self {
        let api = Self::default();
        api.lock().fail_all = Some(error);
        api
    }

    /// API with simulated latency on every call
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            state: Arc::default(),
            delay,
        }
    }

    /// Make calls for one platform account fail
    pub fn fail_account(&self, account_id: &str, error: PublishError) {
        self.lock().failures.insert(account_id.to_string(), error);
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Calls that targeted one account
    pub fn calls_for(&self, account_id: &str) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.account_id == account_id)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl PlatformApi for MockApi {
    async fn create_post(
        &self,
        platform: Platform,
        token: &SecretString,
        payload: &ApiPayload,
    ) -> Result<PublishReceipt, PublishError> {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let mut state = self.lock();
        state.calls.push(RecordedCall {
            platform,
            account_id: payload.account_id.clone(),
            token: token.expose_secret().to_string(),
            text: payload.text.clone(),
            media_count: payload.media.len(),
        });

        if let Some(error) = &state.fail_all {
            return Err(error.clone());
        }
        if let Some(error) = state.failures.get(&payload.account_id) {
            return Err(error.clone());
        }

        let id = format!("{}-{}", platform, uuid::Uuid::new_v4());
        Ok(PublishReceipt {
            url: Some(format!("https://{}.example/{}/{}", platform, payload.account_id, id)),
            platform_post_id: id,
        })
    }
}
