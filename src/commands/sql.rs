//! Statement rendering for a target dialect
//!
//! Prints the registry insert, the event insert and the paged query as the
//! engine would send them, with their bind values in order.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use event_engine::dialect::{adapter_for, DialectKind};
use event_engine::model::{EventRecord, PageOrdering};
use event_engine::sql::Statement;
use event_engine::store::{query, registry, writer};
use event_engine::{EventFilter, EventSourceKey, PageControl, Severity};

#[derive(Debug, Clone, Parser)]
pub struct SqlArgs {
    /// Target dialect (sqlite, postgres, oracle, h2, sqlserver)
    #[arg(short, long, default_value = "sqlite")]
    pub dialect: String,
}

/// Execute the sql command
pub fn execute(args: SqlArgs) -> Result<()> {
    let kind = DialectKind::from_name(&args.dialect)?;
    let dialect = adapter_for(kind);

    let key = EventSourceKey::new("logEntry", "Linux", "platform", 42, "/var/log/messages");
    let record = EventRecord::new(1_700_000_000_000, Severity::Error, "disk full");
    let filter = EventFilter::new(vec![42, 43], 1_699_990_000_000, 1_700_010_000_000)
        .with_severities(vec![Severity::Warn, Severity::Error])
        .with_detail("disk")
        .with_source("messages");
    let page = PageControl::new(20, 10).order_by("severity", PageOrdering::Desc);

    println!("{} {}", "Dialect:".bold(), kind.name().cyan());

    print_statement(
        "Source registration",
        &registry::source_insert(dialect.as_ref(), &key),
    );
    print_statement(
        "Event insert",
        &writer::event_insert(dialect.as_ref(), &key, &record),
    );
    print_statement(
        "Event count",
        &query::count_statement(dialect.as_ref(), &filter),
    );
    print_statement(
        "Event page",
        &query::data_statement(dialect.as_ref(), &filter, &page),
    );

    Ok(())
}

fn print_statement(title: &str, statement: &Statement) {
    println!();
    println!("{}", title.green().bold());
    println!("{}", "─".repeat(60));
    println!("{}", statement.sql);
    for (index, value) in statement.binds.iter().enumerate() {
        println!("  {:>3}: {:?}", index + 1, value);
    }
}
