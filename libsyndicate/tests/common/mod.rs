//! Shared fixtures for integration tests

use std::collections::BTreeMap;
use std::sync::Arc;

use tempfile::TempDir;

use libsyndicate::channels::{Channel, MemoryChannelDirectory};
use libsyndicate::config::{Config, RateLimitRule};
use libsyndicate::publishers::mock::MockApi;
use libsyndicate::service::SyndicateService;
use libsyndicate::types::Platform;
use libsyndicate::Database;

pub struct TestEngine {
    pub _temp: TempDir,
    pub api: Arc<MockApi>,
    pub directory: Arc<MemoryChannelDirectory>,
    pub service: Arc<SyndicateService>,
}

/// Engine wired with a mock API, an in-memory channel roster for
/// workspace `ws-1`, and generous default rate limits
pub async fn engine() -> TestEngine {
    engine_with_config(test_config()).await
}

pub async fn engine_with_config(config: Config) -> TestEngine {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("test.db");
    let db = Database::new(&db_path.to_string_lossy()).await.unwrap();

    let api = Arc::new(MockApi::success());
    let directory = Arc::new(MemoryChannelDirectory::new());
    seed_channels(&directory);

    let service = Arc::new(
        SyndicateService::with_database(config, db, api.clone(), directory.clone()).unwrap(),
    );

    TestEngine {
        _temp: temp,
        api,
        directory,
        service,
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default_config();
    // Retries without real backoff keep scheduler tests fast
    config.scheduler.job_backoff_base_secs = 0;
    config.scheduler.publish_timeout_secs = 5;
    config
}

/// Config whose X limits are exhausted immediately
pub fn rate_limited_config() -> Config {
    let mut config = test_config();
    config.rate_limits.insert(
        Platform::X,
        RateLimitRule {
            platform_max: 0,
            platform_window_secs: 60,
            channel_max: 0,
            channel_window_secs: 60,
        },
    );
    config
}

pub fn channel(id: &str, platform: Platform) -> Channel {
    Channel {
        id: id.to_string(),
        workspace_id: "ws-1".to_string(),
        platform,
        platform_account_id: format!("acct-{}", id),
        display_name: None,
        connected: true,
    }
}

fn seed_channels(directory: &MemoryChannelDirectory) {
    directory.insert(channel("chan-7", Platform::X), "tok-x");
    directory.insert(channel("chan-8", Platform::Mastodon), "tok-masto");
    directory.insert(channel("chan-9", Platform::Linkedin), "tok-li");
}

/// BTreeMap helper kept for tests that build custom rule sets
pub fn rules_with(
    platform: Platform,
    rule: RateLimitRule,
) -> BTreeMap<Platform, RateLimitRule> {
    let mut rules = BTreeMap::new();
    rules.insert(platform, rule);
    rules
}
