//! Event query command

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use event_engine::authz::{AllowAll, Principal};
use event_engine::inventory::StaticInventory;
use event_engine::model::PageOrdering;
use event_engine::{config, EventComposite, EventCriteria, EventScope, EventService, PageControl, Severity};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Parser)]
pub struct QueryArgs {
    /// Endpoint id (repeatable)
    #[arg(short, long = "endpoint", required = true)]
    pub endpoints: Vec<i64>,

    /// Window start in Unix milliseconds
    #[arg(long)]
    pub begin: Option<i64>,

    /// Window end in Unix milliseconds (default: now)
    #[arg(long)]
    pub end: Option<i64>,

    /// Window length in seconds when --begin is not given
    #[arg(long, default_value = "86400")]
    pub since: u64,

    /// Severity filter (repeatable)
    #[arg(short, long = "severity")]
    pub severities: Vec<Severity>,

    /// Case-insensitive substring of the event detail
    #[arg(short, long)]
    pub detail: Option<String>,

    /// Case-insensitive substring of the source location
    #[arg(long)]
    pub source: Option<String>,

    /// Sort field (timestamp, severity, detail, location, endpoint_name)
    #[arg(long, default_value = "timestamp")]
    pub sort: String,

    /// Sort ascending (default: descending)
    #[arg(long)]
    pub ascending: bool,

    #[arg(long, default_value = "0")]
    pub offset: u64,

    /// Maximum number of results
    #[arg(long, default_value = "100")]
    pub limit: u64,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    pub format: String,
}

/// Execute the query command
pub async fn execute(config_path: &Path, args: QueryArgs) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    let store = super::open_store(&cfg).await?;

    // local operator access
    let service = EventService::new(
        store.clone(),
        Arc::new(AllowAll),
        Arc::new(StaticInventory::new()),
    );
    let principal = Principal::new(0, "cli");

    let (begin, end) = super::time_window(args.begin, args.end, args.since);
    let mut criteria =
        EventCriteria::new(EventScope::Endpoints(args.endpoints.clone()), begin, end)
            .with_severities(args.severities.clone());
    if let Some(detail) = &args.detail {
        criteria = criteria.with_detail(detail);
    }
    if let Some(source) = &args.source {
        criteria = criteria.with_source(source);
    }

    let ordering = if args.ascending {
        PageOrdering::Asc
    } else {
        PageOrdering::Desc
    };
    let page_control = PageControl::new(args.offset, args.limit).order_by(&args.sort, ordering);

    let page = service.find_events(&principal, criteria, page_control).await?;
    store.close().await;

    match args.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        _ => {
            if page.rows.is_empty() {
                println!("{}", "No events found matching the criteria".yellow());
                return Ok(());
            }
            display_events_text(&page.rows, page.total_rows);
        }
    }

    Ok(())
}

fn display_events_text(rows: &[EventComposite], total: u64) {
    println!(
        "{}",
        format!("Showing {} of {} events", rows.len(), total).bold()
    );
    println!();

    for event in rows {
        let endpoint = event
            .endpoint_name
            .clone()
            .unwrap_or_else(|| event.endpoint_id.to_string());

        println!(
            "{} {:<5} {} {}",
            super::format_timestamp(event.timestamp).dimmed(),
            super::colored_severity(event.severity),
            format!("[{}]", endpoint).cyan(),
            event.detail
        );
        if !event.location.is_empty() {
            println!("    {} {}", "location:".dimmed(), event.location);
        }
    }
}
