//! Rate limiting for outbound publishes
//!
//! Every publish call is governed at two scopes: the platform as a
//! whole and the individual channel. Both counters use fixed windows
//! (floor of the timestamp to the window size). A check never consumes
//! quota; the orchestrator records only after the platform confirmed
//! the publish, so denials and failed sends cost nothing.

use std::collections::BTreeMap;

use crate::config::RateLimitRule;
use crate::db::Database;
use crate::error::Result;
use crate::types::Platform;

/// Outcome of a rate-limit check. A denial is a decision, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Milliseconds until the blocking window resets, on denial
    pub retry_after_ms: Option<u64>,
    /// Unix timestamp when the blocking window resets, on denial
    pub reset_at: Option<i64>,
    /// The scope that blocked ("{platform}" or "{platform}:{channel}")
    pub blocked_scope: Option<String>,
}

impl RateLimitDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_ms: None,
            reset_at: None,
            blocked_scope: None,
        }
    }

    fn deny(scope: String, reset_at: i64, now: i64) -> Self {
        Self {
            allowed: false,
            retry_after_ms: Some(((reset_at - now).max(0) as u64) * 1000),
            reset_at: Some(reset_at),
            blocked_scope: Some(scope),
        }
    }
}

/// Current usage of one scope's window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeUsage {
    pub scope: String,
    pub used: u32,
    pub max: u32,
    pub window_secs: u64,
    pub reset_at: i64,
}

pub struct RateLimiter {
    db: Database,
    rules: BTreeMap<Platform, RateLimitRule>,
}

impl RateLimiter {
    pub fn new(db: Database, rules: BTreeMap<Platform, RateLimitRule>) -> Self {
        Self { db, rules }
    }

    /// Check whether a publish to (platform, channel) is currently
    /// allowed, without consuming any quota.
    ///
    /// The platform scope is evaluated first; if both scopes are
    /// exhausted the denial reports the platform window.
    pub async fn check(
        &self,
        platform: Platform,
        channel_id: &str,
        now: i64,
    ) -> Result<RateLimitDecision> {
        let rule = match self.rules.get(&platform) {
            Some(r) => *r,
            None => return Ok(RateLimitDecision::allow()),
        };

        let platform_scope = platform.as_str().to_string();
        let platform_window = window_start(now, rule.platform_window_secs);
        let platform_count = self.db.window_count(&platform_scope, platform_window).await?;
        if platform_count >= rule.platform_max {
            let reset_at = platform_window + rule.platform_window_secs as i64;
            return Ok(RateLimitDecision::deny(platform_scope, reset_at, now));
        }

        let channel_scope = channel_scope(platform, channel_id);
        let channel_window = window_start(now, rule.channel_window_secs);
        let channel_count = self.db.window_count(&channel_scope, channel_window).await?;
        if channel_count >= rule.channel_max {
            let reset_at = channel_window + rule.channel_window_secs as i64;
            return Ok(RateLimitDecision::deny(channel_scope, reset_at, now));
        }

        Ok(RateLimitDecision::allow())
    }

    /// Record one confirmed publish against both scopes.
    ///
    /// Only call this after the platform accepted the post; failed and
    /// denied attempts never reach here.
    pub async fn record(&self, platform: Platform, channel_id: &str, now: i64) -> Result<()> {
        let rule = match self.rules.get(&platform) {
            Some(r) => *r,
            None => return Ok(()),
        };

        self.db
            .increment_window(
                platform.as_str(),
                window_start(now, rule.platform_window_secs),
            )
            .await?;
        self.db
            .increment_window(
                &channel_scope(platform, channel_id),
                window_start(now, rule.channel_window_secs),
            )
            .await?;

        Ok(())
    }

    /// Usage snapshot for a platform's global scope
    pub async fn platform_usage(&self, platform: Platform, now: i64) -> Result<Option<ScopeUsage>> {
        let rule = match self.rules.get(&platform) {
            Some(r) => *r,
            None => return Ok(None),
        };

        let start = window_start(now, rule.platform_window_secs);
        let used = self.db.window_count(platform.as_str(), start).await?;
        Ok(Some(ScopeUsage {
            scope: platform.as_str().to_string(),
            used,
            max: rule.platform_max,
            window_secs: rule.platform_window_secs,
            reset_at: start + rule.platform_window_secs as i64,
        }))
    }

    /// Usage snapshot for one channel's scope
    pub async fn channel_usage(
        &self,
        platform: Platform,
        channel_id: &str,
        now: i64,
    ) -> Result<Option<ScopeUsage>> {
        let rule = match self.rules.get(&platform) {
            Some(r) => *r,
            None => return Ok(None),
        };

        let scope = channel_scope(platform, channel_id);
        let start = window_start(now, rule.channel_window_secs);
        let used = self.db.window_count(&scope, start).await?;
        Ok(Some(ScopeUsage {
            scope,
            used,
            max: rule.channel_max,
            window_secs: rule.channel_window_secs,
            reset_at: start + rule.channel_window_secs as i64,
        }))
    }

    /// Usage across all configured platforms
    pub async fn all_usage(&self, now: i64) -> Result<Vec<ScopeUsage>> {
        let mut usages = Vec::new();
        for platform in self.rules.keys() {
            if let Some(usage) = self.platform_usage(*platform, now).await? {
                usages.push(usage);
            }
        }
        Ok(usages)
    }

    /// Clean up windows that ended before the cutoff
    pub async fn cleanup_old_windows(&self, cutoff: i64) -> Result<()> {
        self.db.delete_windows_before(cutoff).await
    }
}

/// Window start timestamp (floor to the window size)
fn window_start(timestamp: i64, window_secs: u64) -> i64 {
    let w = window_secs.max(1) as i64;
    (timestamp / w) * w
}

fn channel_scope(platform: Platform, channel_id: &str) -> String {
    format!("{}:{}", platform.as_str(), channel_id)
}
