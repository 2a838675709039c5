use anyhow::{Context, Result};
use clap::Parser;
use dashfeed::aggregate::Aggregator;
use dashfeed::cache::{shutdown_schedules, FeedSet};
use dashfeed::config::Config;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dashfeed", about = "Dashboard feed cache and refresh scheduler")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "DASHFEED_CONFIG", value_name = "FILE")]
    config: PathBuf,

    /// Pull every feed once, print the aggregated feeds as JSON, and exit
    #[arg(long)]
    once: bool,

    /// Pull every feed once, print per-feed status as JSON, and exit
    #[arg(long, conflicts_with = "once")]
    status: bool,

    /// Items per feed for --once (defaults to the configured limit)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    limit: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Fail fast: nothing is constructed until every required key is present
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let client = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let feeds = FeedSet::from_config(&config, client);
    let loaded = feeds.initial_pull().await;
    tracing::info!(loaded = loaded, total = feeds.caches().len(), "Initial pull finished");

    if args.status {
        println!("{}", serde_json::to_string_pretty(&feeds.statuses())?);
        return Ok(());
    }

    if args.once {
        let limit = args
            .limit
            .map(|l| l as usize)
            .unwrap_or(config.default_limit);
        let aggregator = Aggregator::new(feeds);
        let (view, errors) = aggregator.feeds(limit).await;
        for e in &errors {
            tracing::warn!(error = %e, "Feed section unavailable");
        }
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let schedules = feeds.start_schedules(config.refresh_interval);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested, stopping refresh schedules");

    shutdown_schedules(schedules).await;
    for status in feeds.statuses() {
        tracing::info!(
            feed = %status.name,
            items = status.items,
            last_refreshed_at = ?status.last_refreshed_at,
            "Final feed state"
        );
    }

    Ok(())
}
