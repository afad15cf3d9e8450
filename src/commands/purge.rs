//! Retention purge command

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use event_engine::config;
use event_engine::config::RetentionConfig;
use event_engine::maintenance::{self, EventPurgeStage, PIPELINE_JOB};
use std::path::Path;

#[derive(Debug, Clone, Parser)]
pub struct PurgeArgs {
    /// Delete events older than this Unix millisecond timestamp
    #[arg(long, conflicts_with = "days")]
    pub cutoff: Option<i64>,

    /// Override the configured retention window (days)
    #[arg(long)]
    pub days: Option<u32>,
}

/// Execute the purge command
pub async fn execute(config_path: &Path, args: PurgeArgs) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    let store = super::open_store(&cfg).await?;
    let lock = maintenance::pipeline_lock(&store, &cfg);

    let retention = RetentionConfig {
        events_days: args.days.or(cfg.retention.events_days),
        ..cfg.retention.clone()
    };
    let stage = EventPurgeStage::new(store.clone(), &retention)?;
    let now = chrono::Utc::now();
    let cutoff = args.cutoff.unwrap_or_else(|| stage.cutoff(now));

    println!(
        "{} {}",
        "Purging events before".yellow(),
        super::format_timestamp(cutoff)
    );

    let purge = store.purge(cutoff, retention.purge_timeout());
    let deleted = lock.run_exclusive(PIPELINE_JOB, purge).await??;

    println!("{}", format!("✓ Deleted {} events", deleted).green());

    store.close().await;
    Ok(())
}
