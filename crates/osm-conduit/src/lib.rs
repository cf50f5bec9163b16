//! # osm-conduit
//!
//! A streaming task pipeline for geographic datasets.
//!
//! Readers, sorters, tees, merges and writers are independent tasks wired at
//! runtime into a directed graph through typed, bounded pipes. Every task runs
//! on its own tokio task; a failure anywhere cancels the whole pipeline.
//! Sorting uses an external merge sort that spills sorted runs to a sandboxed
//! directory once its in-memory buffer fills up.
//!
//! ```rust,no_run
//! use osm_conduit::pipeline::{PipelineAssembler, PipelineDefinition, PipelineRuntime, TaskRegistry};
//! use osm_conduit::sort::MemorySpillMedium;
//! use osm_conduit::tasks::{BuiltinSettings, register_builtins};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = TaskRegistry::new();
//! register_builtins(
//!     &mut registry,
//!     &BuiltinSettings {
//!         sort_buffer_records: 100_000,
//!         spill_medium: Arc::new(MemorySpillMedium::new()),
//!         max_merge_fan_in: 64,
//!     },
//! )?;
//!
//! let definition = PipelineDefinition::from_toml_str(
//!     r#"
//! [[task]]
//! id = "read"
//! type = "read-jsonl"
//! args = { file = "planet.jsonl" }
//!
//! [[task]]
//! id = "sort"
//! type = "sort"
//! args = { type = "TypeThenId" }
//!
//! [[task]]
//! id = "write"
//! type = "write-jsonl"
//! args = { file = "sorted.jsonl" }
//! "#,
//! )?;
//!
//! let pipeline = PipelineAssembler::new(&registry, 1024).assemble(&definition.tasks)?;
//! let report = PipelineRuntime::new().execute(pipeline).await?;
//! println!("{} tasks completed", report.tasks.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod lock;
pub mod model;
pub mod ordering;
pub mod pipeline;
pub mod record;
pub mod sort;
pub mod tasks;

pub use errors::{PipelineError, PipelineResult};
pub use record::Record;
