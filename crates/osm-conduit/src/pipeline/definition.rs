//! Textual pipeline definitions.
//!
//! A definition is a TOML document with one `[[task]]` table per task, in
//! wiring order:
//!
//! ```toml
//! [[task]]
//! id = "reader"
//! type = "read-jsonl"
//! args = { file = "planet.jsonl" }
//!
//! [[task]]
//! id = "sorter"
//! type = "sort"
//! args = { type = "TypeThenId", buffer_size = 100000 }
//!
//! [[task]]
//! id = "writer"
//! type = "write-jsonl"
//! args = { file = "planet-sorted.jsonl" }
//! ```
//!
//! Ports without an explicit pipe name are connected through the default pipe
//! stack, so the three tasks above form a chain.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{PipelineError, PipelineResult};

/// One task of a pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub args: toml::Table,
    /// Pipe names for the first input ports
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Pipe names for the first output ports
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            args: toml::Table::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn input(mut self, pipe: impl Into<String>) -> Self {
        self.inputs.push(pipe.into());
        self
    }

    #[must_use]
    pub fn output(mut self, pipe: impl Into<String>) -> Self {
        self.outputs.push(pipe.into());
        self
    }
}

/// An ordered list of task specifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    #[serde(rename = "task", default)]
    pub tasks: Vec<TaskSpec>,
}

impl PipelineDefinition {
    pub fn from_toml_str(source: &str) -> PipelineResult<Self> {
        toml::from_str(source)
            .map_err(|e| PipelineError::config_error(format!("Invalid pipeline definition: {e}")))
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config_error(format!("Cannot read pipeline definition {path:?}: {e}"))
        })?;
        Self::from_toml_str(&source)
    }
}
