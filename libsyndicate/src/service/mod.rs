//! Service layer for the publishing engine
//!
//! Facade pattern: `SyndicateService` is the single entry point that
//! wires shared resources (database, scheduler, rate limiter, channel
//! directory, publisher registry) and exposes the sub-services:
//!
//! - `PostService`: post lifecycle, scheduling and publish fan-out
//! - `HistoryService`: queries over the append-only audit log
//! - `EventBus`: publish progress event distribution
//!
//! The outbound HTTP client and the channel credential source are
//! injected by the caller; the engine never embeds either.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libsyndicate::config::Config;
//! use libsyndicate::channels::StaticChannelDirectory;
//! use libsyndicate::publishers::mock::MockApi;
//! use libsyndicate::service::SyndicateService;
//!
//! # async fn example() -> libsyndicate::Result<()> {
//! let config = Config::load()?;
//! let directory = Arc::new(StaticChannelDirectory::new(config.channels.clone()));
//! let api = Arc::new(MockApi::success());
//!
//! let service = SyndicateService::new(config, api, directory).await?;
//! let queue = service.posts().queue_status().await?;
//! println!("{} job(s) waiting", queue.waiting);
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod history;
pub mod posts;

pub use events::{Event, EventBus, EventReceiver};
pub use posts::{NewPost, PostService, PostUpdate, TargetSpec};

use std::sync::Arc;
use std::time::Duration;

use crate::channels::ChannelDirectory;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::publishers::{PlatformApi, PublisherRegistry};
use crate::rate_limiter::RateLimiter;
use crate::scheduler::PostScheduler;

use self::history::HistoryService;

/// Main service facade coordinating all sub-services.
///
/// All sub-services share one database pool, one scheduler, and one
/// event bus. Dropping the facade drops the in-process job timers;
/// durable job rows survive and are re-armed by the next process via
/// `restore_jobs`.
pub struct SyndicateService {
    db: Database,
    posts: Arc<PostService>,
    history: HistoryService,
    scheduler: Arc<PostScheduler>,
    event_bus: EventBus,
}

impl SyndicateService {
    /// Build the full engine from configuration plus the two injected
    /// collaborators: the platform API client and the channel
    /// directory.
    pub async fn new(
        config: Config,
        api: Arc<dyn PlatformApi>,
        channels: Arc<dyn ChannelDirectory>,
    ) -> Result<Self> {
        let db_path = crate::config::resolve_db_path(Some(&config.database.path))?;
        let db = Database::new(&db_path.to_string_lossy()).await?;
        Self::with_database(config, db, api, channels)
    }

    /// Build against an existing database handle (tests, embedding)
    pub fn with_database(
        config: Config,
        db: Database,
        api: Arc<dyn PlatformApi>,
        channels: Arc<dyn ChannelDirectory>,
    ) -> Result<Self> {
        let event_bus = EventBus::new(100);
        let registry = Arc::new(PublisherRegistry::with_builtins(api, &config.constraints));
        let rate_limiter = Arc::new(RateLimiter::new(db.clone(), config.rate_limits.clone()));
        let scheduler = PostScheduler::new(db.clone(), config.scheduler.clone());

        let posts = PostService::new(
            db.clone(),
            registry,
            channels,
            rate_limiter,
            scheduler.clone(),
            event_bus.clone(),
            Duration::from_secs(config.scheduler.publish_timeout_secs),
        );
        scheduler.set_runner(posts.clone());

        let history = HistoryService::new(db.clone());

        Ok(Self {
            db,
            posts,
            history,
            scheduler,
            event_bus,
        })
    }

    /// Re-arm timers for delayed jobs left over from a previous
    /// process. Call once at startup; returns how many were restored.
    pub async fn restore_jobs(&self) -> Result<usize> {
        self.scheduler.restore().await
    }

    /// Access the database directly
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Post lifecycle, scheduling and publishing
    pub fn posts(&self) -> &PostService {
        &self.posts
    }

    /// Audit log queries
    pub fn history(&self) -> &HistoryService {
        &self.history
    }

    /// Subscribe to publish progress events
    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }
}
