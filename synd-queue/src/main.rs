//! synd-queue - Manage the scheduled post queue
//!
//! Unix-style tool for inspecting and managing scheduled posts.

use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use secrecy::SecretString;

use libsyndicate::channels::StaticChannelDirectory;
use libsyndicate::error::PublishError;
use libsyndicate::publishers::{ApiPayload, PlatformApi, PublishReceipt};
use libsyndicate::service::SyndicateService;
use libsyndicate::timeparse::parse_schedule;
use libsyndicate::types::{HistoryEntry, Platform, PostStatus};
use libsyndicate::{Config, Post, Result, SyndicateError};

#[derive(Parser, Debug)]
#[command(name = "synd-queue")]
#[command(version)]
#[command(about = "Manage the scheduled post queue")]
#[command(long_about = "\
synd-queue - Manage the scheduled post queue

DESCRIPTION:
    synd-queue is a Unix-style tool for managing scheduled posts in a
    Syndicate workspace. Use it to list, cancel, or reschedule posts,
    inspect the audit history, and view queue and rate limit statistics.

COMMANDS:
    list        List posts in a workspace
    cancel      Cancel a scheduled post (back to draft)
    reschedule  Move a scheduled post to a different time
    history     Show the audit history for a post, or recent activity
    stats       Show queue and rate limit statistics

USAGE EXAMPLES:
    # List scheduled posts in a workspace
    synd-queue list --workspace acme --status scheduled

    # List posts in JSON format
    synd-queue list --workspace acme --format json

    # Cancel a scheduled post
    synd-queue cancel <POST_ID>

    # Reschedule a post
    synd-queue reschedule <POST_ID> \"tomorrow 3pm\"

    # Show a post's full history
    synd-queue history <POST_ID>

    # View queue statistics
    synd-queue stats

CONFIGURATION:
    Configuration file: ~/.config/syndicate/config.toml
    Database location: ~/.local/share/syndicate/posts.db

    Override with environment variables:
        SYNDICATE_CONFIG      - Path to config file
        SYNDICATE_DB_PATH     - Path to database file
        SYNDICATE_LOG_FORMAT  - Log output format (text, json, pretty)
        SYNDICATE_LOG_LEVEL   - Log level when --verbose is not given

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Database or configuration error
    3 - Invalid input (bad post ID, time format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List posts in a workspace
    List {
        /// Workspace to list posts from
        #[arg(short, long, env = "SYNDICATE_WORKSPACE")]
        workspace: String,

        /// Filter by status (draft, scheduled, publishing, published,
        /// partially_published, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by target channel ID
        #[arg(short, long)]
        channel: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Maximum number of posts to show
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Cancel a scheduled post
    Cancel {
        /// Post ID to cancel
        post_id: String,
    },

    /// Reschedule a post
    Reschedule {
        /// Post ID to reschedule
        post_id: String,

        /// New schedule time (e.g., "tomorrow 3pm", "2h")
        time: String,
    },

    /// Show post history
    History {
        /// Post ID; omit to show recent activity across all posts
        post_id: Option<String>,

        /// Maximum number of entries to show
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show queue and rate limit statistics
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

/// Placeholder API client. Queue commands never publish, so the
/// service's outbound slot is filled with a client that refuses to.
struct OfflineApi;

#[async_trait]
impl PlatformApi for OfflineApi {
    async fn create_post(
        &self,
        _platform: Platform,
        _token: &SecretString,
        _payload: &ApiPayload,
    ) -> std::result::Result<PublishReceipt, PublishError> {
        Err(PublishError::Network(
            "synd-queue has no platform API client configured".to_string(),
        ))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libsyndicate::logging::init_from_env(cli.verbose);

    // Run the main logic and handle errors
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load configuration and wire the engine
    let config = Config::load()?;
    let directory = Arc::new(StaticChannelDirectory::new(config.channels.clone()));
    let service = SyndicateService::new(config, Arc::new(OfflineApi), directory).await?;

    // Execute command
    match cli.command {
        Commands::List {
            workspace,
            status,
            channel,
            format,
            limit,
        } => {
            cmd_list(
                &service,
                &workspace,
                status.as_deref(),
                channel.as_deref(),
                &format,
                limit,
            )
            .await?;
        }
        Commands::Cancel { post_id } => {
            cmd_cancel(&service, &post_id).await?;
        }
        Commands::Reschedule { post_id, time } => {
            cmd_reschedule(&service, &post_id, &time).await?;
        }
        Commands::History {
            post_id,
            limit,
            format,
        } => {
            cmd_history(&service, post_id.as_deref(), limit, &format).await?;
        }
        Commands::Stats { format } => {
            cmd_stats(&service, &format).await?;
        }
    }

    Ok(())
}

fn check_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(SyndicateError::Validation(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

/// List posts in a workspace
async fn cmd_list(
    service: &SyndicateService,
    workspace: &str,
    status: Option<&str>,
    channel: Option<&str>,
    format: &str,
    limit: usize,
) -> Result<()> {
    check_format(format)?;

    let status = status
        .map(|s| {
            PostStatus::parse(s).ok_or_else(|| {
                SyndicateError::Validation(format!("Invalid status '{}'", s))
            })
        })
        .transpose()?;

    let posts = service
        .posts()
        .list_posts(workspace, status, channel, limit, 0)
        .await?;

    if format == "json" {
        output_list_json(&posts);
    } else {
        output_list_text(&posts);
    }

    Ok(())
}

/// Output posts as JSON
fn output_list_json(posts: &[Post]) {
    let json: Vec<serde_json::Value> = posts
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id,
                "workspace_id": p.workspace_id,
                "content": p.content,
                "status": p.status.as_str(),
                "scheduled_at": p.scheduled_at,
                "published_at": p.published_at,
                "created_at": p.created_at,
                "targets": p.targets.iter().map(|t| {
                    serde_json::json!({
                        "channel_id": t.channel_id,
                        "platform": t.platform.as_str(),
                        "status": t.status.as_str(),
                    })
                }).collect::<Vec<_>>(),
            })
        })
        .collect();

    match serde_json::to_string_pretty(&json) {
        Ok(out) => println!("{}", out),
        Err(e) => eprintln!("Error: failed to serialize output: {}", e),
    }
}

/// Output posts as human-readable text
fn output_list_text(posts: &[Post]) {
    if posts.is_empty() {
        return;
    }

    let now = chrono::Utc::now().timestamp();

    for post in posts {
        let content_preview = truncate_content(post.content.as_deref().unwrap_or(""), 50);
        let when = match (post.status, post.scheduled_at) {
            (PostStatus::Scheduled, Some(ts)) => format_time_until(now, ts),
            _ => post.status.to_string(),
        };
        let targets: Vec<String> = post
            .targets
            .iter()
            .map(|t| format!("{}:{}", t.platform, t.channel_id))
            .collect();

        println!(
            "{} | {} | {} | {}",
            post.id,
            content_preview,
            targets.join(","),
            when
        );
    }
}

/// Truncate content to max length with ellipsis
fn truncate_content(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        content.to_string()
    } else {
        let cut: String = content.chars().take(max_len).collect();
        format!("{}...", cut)
    }
}

/// Format time until scheduled time in human-readable format
fn format_time_until(now: i64, scheduled_at: i64) -> String {
    let diff = scheduled_at - now;

    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}

/// Cancel a scheduled post
async fn cmd_cancel(service: &SyndicateService, post_id: &str) -> Result<()> {
    let post = service.posts().cancel_schedule(post_id).await?;
    println!("Cancelled {} (now {})", post.id, post.status);
    Ok(())
}

/// Reschedule a post
async fn cmd_reschedule(service: &SyndicateService, post_id: &str, time: &str) -> Result<()> {
    let fire_at = parse_schedule(time)?;
    let post = service
        .posts()
        .schedule_post(post_id, fire_at.timestamp())
        .await?;
    println!(
        "Rescheduled {} for {} ({})",
        post.id,
        fire_at.format("%Y-%m-%d %H:%M UTC"),
        format_time_until(chrono::Utc::now().timestamp(), fire_at.timestamp())
    );
    Ok(())
}

/// Show post history or recent activity
async fn cmd_history(
    service: &SyndicateService,
    post_id: Option<&str>,
    limit: usize,
    format: &str,
) -> Result<()> {
    check_format(format)?;

    let entries = match post_id {
        Some(id) => service.history().for_post(id).await?,
        None => service.history().recent(limit).await?,
    };

    if format == "json" {
        output_history_json(&entries);
    } else {
        output_history_text(&entries);
    }

    Ok(())
}

fn output_history_json(entries: &[HistoryEntry]) {
    let json: Vec<serde_json::Value> = entries
        .iter()
        .map(|e| {
            serde_json::json!({
                "post_id": e.post_id,
                "action": e.action.as_str(),
                "previous_status": e.previous_status.map(|s| s.as_str()),
                "new_status": e.new_status.map(|s| s.as_str()),
                "channel_id": e.channel_id,
                "performed_by": e.performed_by,
                "details": e.details,
                "created_at": e.created_at,
            })
        })
        .collect();

    match serde_json::to_string_pretty(&json) {
        Ok(out) => println!("{}", out),
        Err(e) => eprintln!("Error: failed to serialize output: {}", e),
    }
}

fn output_history_text(entries: &[HistoryEntry]) {
    for entry in entries {
        let when = chrono::DateTime::from_timestamp(entry.created_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| entry.created_at.to_string());

        let mut line = format!("{} | {} | {}", when, entry.post_id, entry.action);
        if let (Some(prev), Some(next)) = (entry.previous_status, entry.new_status) {
            line.push_str(&format!(" | {} -> {}", prev, next));
        }
        if let Some(ref channel) = entry.channel_id {
            line.push_str(&format!(" | {}", channel));
        }
        if let Some(ref details) = entry.details {
            line.push_str(&format!(" | {}", details));
        }
        println!("{}", line);
    }
}

/// Show queue and rate limit statistics
async fn cmd_stats(service: &SyndicateService, format: &str) -> Result<()> {
    check_format(format)?;

    let queue = service.posts().queue_status().await?;
    let usage = service.posts().rate_limit_status().await?;

    if format == "json" {
        let json = serde_json::json!({
            "queue": {
                "waiting": queue.waiting,
                "active": queue.active,
                "delayed": queue.delayed,
                "completed": queue.completed,
                "failed": queue.failed,
            },
            "rate_limits": usage.iter().map(|u| {
                serde_json::json!({
                    "scope": u.scope,
                    "used": u.used,
                    "max": u.max,
                    "window_secs": u.window_secs,
                    "reset_at": u.reset_at,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&json) {
            Ok(out) => println!("{}", out),
            Err(e) => eprintln!("Error: failed to serialize output: {}", e),
        }
    } else {
        println!("Queue:");
        println!("  waiting:   {}", queue.waiting);
        println!("  active:    {}", queue.active);
        println!("  delayed:   {}", queue.delayed);
        println!("  completed: {}", queue.completed);
        println!("  failed:    {}", queue.failed);

        if !usage.is_empty() {
            println!("Rate limits:");
            for u in &usage {
                println!("  {}: {}/{} per {}s", u.scope, u.used, u.max, u.window_secs);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_content_short() {
        assert_eq!(truncate_content("hello", 50), "hello");
    }

    #[test]
    fn test_truncate_content_long() {
        let long = "a".repeat(60);
        let out = truncate_content(&long, 50);
        assert_eq!(out.chars().count(), 53);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_format_time_until() {
        assert_eq!(format_time_until(100, 50), "overdue");
        assert_eq!(format_time_until(0, 30), "in <1 minute");
        assert_eq!(format_time_until(0, 120), "in 2 minutes");
        assert_eq!(format_time_until(0, 3600), "in 1 hour");
        assert_eq!(format_time_until(0, 2 * 86400), "in 2 days");
    }

    #[test]
    fn test_check_format() {
        assert!(check_format("text").is_ok());
        assert!(check_format("json").is_ok());
        assert!(check_format("yaml").is_err());
    }
}
