use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::errors::{PipelineError, PipelineResult};

pub mod defaults;
pub mod duration_serde;

use defaults::*;

/// Application configuration.
///
/// Values are layered: built-in defaults, then the TOML file, then
/// `CONDUIT_`-prefixed environment variables (`CONDUIT_PIPELINE__PIPE_CAPACITY`
/// sets `pipeline.pipe_capacity`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub spill: SpillConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level for the conduit crates; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Pipeline execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Records buffered in each pipe before the producer is suspended
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,
    /// Records a sort stage holds in memory before spilling a run
    #[serde(default = "default_sort_buffer_records")]
    pub sort_buffer_records: usize,
}

/// Spill storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpillConfig {
    #[serde(default = "default_spill_directory")]
    pub directory: PathBuf,
    /// Age after which spill files left behind by earlier runs are swept
    #[serde(default = "default_spill_retention", with = "duration_serde")]
    pub retention: Duration,
    #[serde(default = "default_sweep_on_startup")]
    pub sweep_on_startup: bool,
    /// Most spilled runs a sort reads at once
    #[serde(default = "default_max_merge_fan_in")]
    pub max_merge_fan_in: usize,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_pipe_capacity() -> usize {
    DEFAULT_PIPE_CAPACITY
}
fn default_sort_buffer_records() -> usize {
    DEFAULT_SORT_BUFFER_RECORDS
}
fn default_spill_directory() -> PathBuf {
    PathBuf::from(DEFAULT_SPILL_DIRECTORY)
}
fn default_spill_retention() -> Duration {
    Duration::from_secs(DEFAULT_SPILL_RETENTION_SECS)
}
fn default_sweep_on_startup() -> bool {
    DEFAULT_SWEEP_ON_STARTUP
}
fn default_max_merge_fan_in() -> usize {
    DEFAULT_MAX_MERGE_FAN_IN
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipe_capacity: default_pipe_capacity(),
            sort_buffer_records: default_sort_buffer_records(),
        }
    }
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            directory: default_spill_directory(),
            retention: default_spill_retention(),
            sweep_on_startup: default_sweep_on_startup(),
            max_merge_fan_in: default_max_merge_fan_in(),
        }
    }
}

impl Config {
    /// Layered configuration sources. A missing file contributes nothing.
    pub fn figment(config_file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR))
    }

    pub fn from_figment(figment: Figment) -> PipelineResult<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| PipelineError::config_error(e.to_string()))?;
        config.validate()?;
        debug!("Resolved configuration: {:?}", config);
        Ok(config)
    }

    pub fn load(config_file: &Path) -> PipelineResult<Self> {
        Self::from_figment(Self::figment(config_file))
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.pipeline.pipe_capacity == 0 {
            return Err(PipelineError::config_error(
                "pipeline.pipe_capacity must be at least 1",
            ));
        }
        if self.pipeline.sort_buffer_records == 0 {
            return Err(PipelineError::config_error(
                "pipeline.sort_buffer_records must be at least 1",
            ));
        }
        if self.spill.max_merge_fan_in < 2 {
            return Err(PipelineError::config_error(
                "spill.max_merge_fan_in must be at least 2",
            ));
        }
        Ok(())
    }
}
