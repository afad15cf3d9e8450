//! Ingest command
//!
//! Loads a JSON document describing catalog entries and event reports:
//!
//! ```json
//! {
//!   "definitions": [{"name": "logEntry", "endpoint_type": "Linux", "namespace": "platform"}],
//!   "endpoints": [{"id": 42, "name": "web-01", "endpoint_type": "Linux", "namespace": "platform"}],
//!   "reports": [{"source": {...}, "events": [...]}]
//! }
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use event_engine::config;
use event_engine::ingest::{merge_reports, IngestReport};
use event_engine::{EventBatch, EventStore};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Parser)]
pub struct IngestArgs {
    /// Report document (JSON)
    pub file: PathBuf,

    /// Register catalog entries only, skip the reports
    #[arg(long)]
    pub catalog_only: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct IngestDocument {
    #[serde(default)]
    pub definitions: Vec<DefinitionEntry>,
    #[serde(default)]
    pub endpoints: Vec<EndpointEntry>,
    #[serde(default)]
    pub reports: Vec<IngestReport>,
}

#[derive(Debug, Deserialize)]
pub struct DefinitionEntry {
    pub name: String,
    pub endpoint_type: String,
    pub namespace: String,
}

#[derive(Debug, Deserialize)]
pub struct EndpointEntry {
    pub id: i64,
    pub name: String,
    pub endpoint_type: String,
    pub namespace: String,
}

/// Execute the ingest command
pub async fn execute(config_path: &Path, args: IngestArgs) -> Result<()> {
    let cfg = config::load_config(config_path)?;

    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let document: IngestDocument = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid report document {}", args.file.display()))?;

    let store = super::open_store(&cfg).await?;

    register_catalog(&store, &document).await?;
    println!(
        "{} {} definitions, {} endpoints",
        "Catalog:".bold(),
        document.definitions.len(),
        document.endpoints.len()
    );

    if args.catalog_only {
        store.close().await;
        return Ok(());
    }

    let report_count = document.reports.len();
    let mut batch = EventBatch::new();
    merge_reports(&mut batch, document.reports);

    let summary = store.write(&batch).await;
    info!(
        reports = report_count,
        events = summary.events_written,
        "Report document ingested"
    );

    println!();
    println!("{}", "Write Summary".bold());
    println!("{}", "─".repeat(45));
    println!("{:<30} {:>15}", "Reports", report_count);
    println!("{:<30} {:>15}", "Sources", summary.sources);
    println!("{:<30} {:>15}", "Events written", summary.events_written);
    println!("{:<30} {:>15}", "Failed sources", summary.failed_sources);

    if summary.registry_failed {
        println!("{}", "✗ Source registration failed, nothing written".red());
    } else if summary.is_complete() {
        println!("{}", "✓ All sources written".green());
    } else {
        println!(
            "{}",
            "! Some sources were skipped (unknown definition or endpoint?)".yellow()
        );
    }

    store.close().await;
    Ok(())
}

async fn register_catalog(store: &EventStore, document: &IngestDocument) -> Result<()> {
    for definition in &document.definitions {
        store
            .register_event_definition(
                &definition.name,
                &definition.endpoint_type,
                &definition.namespace,
            )
            .await
            .with_context(|| format!("Failed to register definition {}", definition.name))?;
    }

    for endpoint in &document.endpoints {
        store
            .register_endpoint(
                endpoint.id,
                &endpoint.name,
                &endpoint.endpoint_type,
                &endpoint.namespace,
            )
            .await
            .with_context(|| format!("Failed to register endpoint {}", endpoint.id))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_sections_are_optional() {
        let document: IngestDocument = serde_json::from_str(
            r#"{
                "reports": [{
                    "source": {
                        "definition": "logEntry",
                        "endpoint_type": "Linux",
                        "namespace": "platform",
                        "endpoint_id": 42
                    },
                    "events": [{"timestamp": 1000, "severity": "WARN", "detail": "disk 91%"}]
                }]
            }"#,
        )
        .unwrap();

        assert!(document.definitions.is_empty());
        assert!(document.endpoints.is_empty());
        assert_eq!(document.reports.len(), 1);
        assert_eq!(document.reports[0].source.location, "");
    }
}
