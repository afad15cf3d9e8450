use anyhow::Result;
use colored::Colorize;
use event_engine::config;
use event_engine::dialect::{self, DialectKind};
use std::path::Path;
use tracing::info;

/// Execute the config show command
///
/// Displays the effective configuration after file and environment layering
pub fn show(config_path: &Path) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());
    info!(path = %config_path.display(), "Loading configuration for display");

    let cfg = config::load_config(config_path)?;

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&cfg)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
pub fn validate(config_path: &Path) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());
    info!(path = %config_path.display(), "Validating configuration file");

    let cfg = config::load_config(config_path)?;
    let dialect = dialect::resolve(cfg.database.dialect.as_deref(), &cfg.database.url)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Database: {} ({})", cfg.database.url, dialect.kind());
    println!(
        "  Retention: {} days",
        cfg.retention.events_days.unwrap_or_default()
    );
    println!(
        "  Maintenance: daily at {:02}:00, vacuum at {:02}:00",
        cfg.maintenance.run_hour, cfg.maintenance.vacuum_hour
    );
    println!(
        "  Ingest: batch {} / {} ms",
        cfg.ingest.batch_size, cfg.ingest.flush_interval_ms
    );
    println!(
        "  Metrics: {}",
        if cfg.metrics.enabled {
            cfg.metrics.listen.as_str()
        } else {
            "disabled"
        }
    );

    if dialect.kind() != DialectKind::Sqlite {
        println!(
            "{}",
            "! Only sqlite databases can be opened; other dialects are render-only".yellow()
        );
    }

    Ok(())
}
