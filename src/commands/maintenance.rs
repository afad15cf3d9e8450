//! One-shot maintenance run

use anyhow::Result;
use colored::Colorize;
use event_engine::config;
use event_engine::maintenance::{self, run_pipeline_now, PipelineReport};
use std::path::Path;

/// Execute the maintenance command
pub async fn execute(config_path: &Path) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    let store = super::open_store(&cfg).await?;

    let pipeline = maintenance::standard_pipeline(&store, &cfg)?;
    let lock = maintenance::pipeline_lock(&store, &cfg);

    println!("{}", "Running maintenance pipeline...".yellow());
    let report = run_pipeline_now(&pipeline, &lock).await?;
    display_report(&report);

    store.close().await;

    if !report.all_succeeded() {
        anyhow::bail!("{} maintenance stage(s) failed", report.failures().count());
    }
    Ok(())
}

fn display_report(report: &PipelineReport) {
    println!();
    println!("{}", "Maintenance Report".bold());
    println!("{}", "─".repeat(70));
    println!("{:<25} {:>10} {:>10}  {}", "Stage", "Affected", "Time (ms)", "Result");

    for stage in &report.stages {
        let elapsed = stage.elapsed.as_millis();
        match &stage.result {
            Ok(outcome) => println!(
                "{:<25} {:>10} {:>10}  {} {}",
                stage.kind.name(),
                outcome.affected,
                elapsed,
                "ok".green(),
                outcome.note.as_deref().unwrap_or("").dimmed()
            ),
            Err(e) => println!(
                "{:<25} {:>10} {:>10}  {} {}",
                stage.kind.name(),
                "-",
                elapsed,
                "failed".red().bold(),
                e
            ),
        }
    }

    println!("{}", "─".repeat(70));
    println!("Total time: {} ms", report.elapsed.as_millis());
}
