//! Syndicate - multi-channel post publishing and scheduling engine
//!
//! This library orchestrates social posts across workspaces: drafting,
//! per-platform validation, rate-limited publishing to connected
//! channels, and durable scheduled publication with an append-only
//! audit history.

pub mod channels;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod publishers;
pub mod rate_limiter;
pub mod scheduler;
pub mod service;
pub mod timeparse;
pub mod types;

// Re-export commonly used types
pub use channels::{Channel, ChannelDirectory, StaticChannelDirectory};
pub use config::Config;
pub use db::Database;
pub use error::{Result, SyndicateError};
pub use rate_limiter::{RateLimitDecision, RateLimiter};
pub use scheduler::PostScheduler;
pub use service::SyndicateService;
pub use types::{Platform, Post, PostStatus, Target, TargetStatus};
