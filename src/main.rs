use std::path::PathBuf;

use anyhow::Context;
use hf_cohort::{CohortConfig, run_cohort};
use log::info;

#[global_allocator]
static ALLOC: snmalloc_rs::SnMalloc = snmalloc_rs::SnMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(config_path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        anyhow::bail!("Usage: hf-cohort <config.json>");
    };

    let config = CohortConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load configuration {}", config_path.display()))?;
    info!(
        "Deriving cohort over {} buckets with concurrency {}",
        config.num_buckets, config.concurrency
    );

    let summary = run_cohort(&config)
        .await
        .context("Cohort derivation failed")?;

    if let Some(output) = &summary.output {
        info!("Record log written to {}", output.display());
    }
    Ok(())
}
