//! Timeline buckets command

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use event_engine::authz::{AllowAll, Principal};
use event_engine::buckets::BucketGrid;
use event_engine::inventory::StaticInventory;
use event_engine::{config, EventService};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Parser)]
pub struct BucketsArgs {
    /// Endpoint id
    #[arg(short, long)]
    pub endpoint: i64,

    /// Window start in Unix milliseconds
    #[arg(long)]
    pub begin: Option<i64>,

    /// Window end in Unix milliseconds (default: now)
    #[arg(long)]
    pub end: Option<i64>,

    /// Window length in seconds when --begin is not given
    #[arg(long, default_value = "86400")]
    pub since: u64,

    /// Number of buckets
    #[arg(short, long, default_value = "60")]
    pub buckets: usize,

    /// Show event counts instead of the most severe event
    #[arg(long)]
    pub counts: bool,
}

/// Execute the buckets command
pub async fn execute(config_path: &Path, args: BucketsArgs) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    let store = super::open_store(&cfg).await?;
    let service = EventService::new(
        store.clone(),
        Arc::new(AllowAll),
        Arc::new(StaticInventory::new()),
    );
    let principal = Principal::new(0, "cli");

    let (begin, end) = super::time_window(args.begin, args.end, args.since);
    let grid = BucketGrid::new(begin, end, args.buckets)?;

    println!(
        "{}",
        format!(
            "Endpoint {} | {} buckets of {} ms",
            args.endpoint,
            grid.len(),
            grid.width()
        )
        .bold()
    );
    println!("{}", "─".repeat(60));

    if args.counts {
        let counts = service
            .event_counts(&principal, args.endpoint, begin, end, args.buckets)
            .await?;
        for (index, count) in counts.iter().enumerate() {
            println!(
                "{:<30} {:>15}",
                super::format_timestamp(grid.bucket_start(index)),
                count
            );
        }
        println!("{}", "─".repeat(60));
        println!("{:<30} {:>15}", "Total", counts.iter().sum::<u64>());
    } else {
        let severities = service
            .severity_buckets_for_endpoint(&principal, args.endpoint, begin, end, args.buckets)
            .await?;
        for (index, severity) in severities.iter().enumerate() {
            let cell = match severity {
                Some(severity) => super::colored_severity(*severity),
                None => "-".dimmed(),
            };
            println!(
                "{:<30} {:>15}",
                super::format_timestamp(grid.bucket_start(index)),
                cell
            );
        }
    }

    store.close().await;
    Ok(())
}
