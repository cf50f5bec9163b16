use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use osm_conduit::{
    config::Config,
    pipeline::{PipelineAssembler, PipelineDefinition, PipelineRuntime, TaskRegistry},
    sort::FileSpillMedium,
    tasks::{BuiltinSettings, register_builtins},
};
use spill_file_manager::{RetentionPolicy, SpillDirectory};

#[derive(Parser)]
#[command(name = "osm-conduit")]
#[command(version)]
#[command(about = "Runs streaming task pipelines over geographic datasets")]
#[command(long_about = None)]
struct Cli {
    /// Pipeline definition (TOML with one [[task]] table per task)
    pipeline: PathBuf,

    /// Configuration file path
    #[arg(short, long, default_value = "conduit.toml")]
    config: PathBuf,

    /// Log level (overrides config file)
    #[arg(short = 'v', long)]
    log_level: Option<String>,

    /// Records held in memory by sort tasks before spilling
    #[arg(short, long, value_name = "RECORDS")]
    buffer_size: Option<usize>,

    /// Directory receiving spilled sort runs
    #[arg(short, long, value_name = "DIR")]
    spill_dir: Option<PathBuf>,

    /// List the available task types and exit
    #[arg(long)]
    list_tasks: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut figment = Config::figment(&cli.config);
    if let Some(level) = &cli.log_level {
        figment = figment.merge(("logging.level", level));
    }
    if let Some(buffer_size) = cli.buffer_size {
        figment = figment.merge(("pipeline.sort_buffer_records", buffer_size));
    }
    if let Some(spill_dir) = &cli.spill_dir {
        figment = figment.merge(("spill.directory", spill_dir));
    }
    let config = Config::from_figment(figment)?;

    let log_filter = format!(
        "osm_conduit={level},spill_file_manager={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting osm-conduit v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {:?}", cli.config);

    let spill_directory = SpillDirectory::builder()
        .base_directory(&config.spill.directory)
        .retention_policy(RetentionPolicy::new().remove_after(config.spill.retention))
        .build()
        .await
        .with_context(|| format!("Cannot prepare spill directory {:?}", config.spill.directory))?;

    if config.spill.sweep_on_startup {
        match spill_directory.sweep_stale().await {
            Ok(0) => {}
            Ok(removed) => info!("Removed {} stale spill files", removed),
            Err(e) => warn!("Spill directory sweep failed: {}", e),
        }
    }

    let mut registry = TaskRegistry::new();
    register_builtins(
        &mut registry,
        &BuiltinSettings {
            sort_buffer_records: config.pipeline.sort_buffer_records,
            spill_medium: Arc::new(FileSpillMedium::new(spill_directory)),
            max_merge_fan_in: config.spill.max_merge_fan_in,
        },
    )?;

    if cli.list_tasks {
        for task_type in registry.task_types() {
            println!("{task_type}");
        }
        return Ok(());
    }

    let definition = PipelineDefinition::load(&cli.pipeline)?;
    let pipeline = PipelineAssembler::new(&registry, config.pipeline.pipe_capacity)
        .assemble(&definition.tasks)
        .with_context(|| format!("Invalid pipeline {:?}", cli.pipeline))?;
    info!("Task order: {}", pipeline.task_order().join(" -> "));

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling pipeline");
            cancel.cancel();
        }
    });

    let outcome = PipelineRuntime::new().run(pipeline).await;
    for task in &outcome.report.tasks {
        info!(
            "Task {} ({}) {} in {:.2?}",
            task.task_id, task.task_type, task.status, task.duration
        );
    }
    for pipe in &outcome.report.pipes {
        info!(
            "Pipe {} carried {} records from {} to {}",
            pipe.name, pipe.records, pipe.writer, pipe.reader
        );
    }

    match outcome.error {
        Some(e) => {
            error!("Pipeline failed: {}", e);
            Err(e.into())
        }
        None => {
            info!(
                "Pipeline {} completed in {:.2?}",
                outcome.report.execution_id, outcome.report.duration
            );
            Ok(())
        }
    }
}
