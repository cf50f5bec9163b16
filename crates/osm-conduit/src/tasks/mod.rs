//! Built-in task types.
//!
//! | Type | Alias | Ports |
//! |------|-------|-------|
//! | `sort` | `s` | entity in, entity out |
//! | `sort-change` | `sc` | change in, change out |
//! | `read-jsonl` | `rj` | entity out |
//! | `write-jsonl` | `wj` | entity in |
//! | `read-change-jsonl` | `rcj` | change out |
//! | `write-change-jsonl` | `wcj` | change in |
//! | `tee` | `t` | entity in, `count` entity outs |
//! | `tee-change` | `tc` | change in, `count` change outs |
//! | `merge` | `m` | two entity ins, entity out |

use std::sync::Arc;

use crate::errors::PipelineResult;
use crate::model::orderings::{change_orderings, entity_orderings};
use crate::model::{ChangeEntity, Entity};
use crate::pipeline::registry::{TaskFactory, TaskRegistry};
use crate::sort::SpillMedium;

pub mod jsonl;
pub mod memory;
pub mod merge;
pub mod sort;
pub mod tee;

pub use jsonl::{JsonLinesReaderFactory, JsonLinesWriterFactory};
pub use memory::{CollectedRecords, CollectingSinkFactory, MemorySourceFactory};
pub use merge::MergeTaskFactory;
pub use sort::SortTaskFactory;
pub use tee::TeeTaskFactory;

/// Settings shared by the built-in factories.
#[derive(Clone)]
pub struct BuiltinSettings {
    /// Default `buffer_size` of the sort tasks
    pub sort_buffer_records: usize,
    pub spill_medium: Arc<dyn SpillMedium>,
    /// Most spilled runs a sort task merges at once
    pub max_merge_fan_in: usize,
}

/// Registers every built-in task type and its alias.
pub fn register_builtins(registry: &mut TaskRegistry, settings: &BuiltinSettings) -> PipelineResult<()> {
    register_with_alias(
        registry,
        "sort",
        "s",
        Arc::new(
            SortTaskFactory::<Entity>::new(
                entity_orderings()?,
                settings.sort_buffer_records,
                settings.spill_medium.clone(),
            )
            .with_max_merge_fan_in(settings.max_merge_fan_in),
        ),
    )?;
    register_with_alias(
        registry,
        "sort-change",
        "sc",
        Arc::new(
            SortTaskFactory::<ChangeEntity>::new(
                change_orderings()?,
                settings.sort_buffer_records,
                settings.spill_medium.clone(),
            )
            .with_max_merge_fan_in(settings.max_merge_fan_in),
        ),
    )?;

    register_with_alias(registry, "read-jsonl", "rj", Arc::new(JsonLinesReaderFactory::<Entity>::new()))?;
    register_with_alias(registry, "write-jsonl", "wj", Arc::new(JsonLinesWriterFactory::<Entity>::new()))?;
    register_with_alias(
        registry,
        "read-change-jsonl",
        "rcj",
        Arc::new(JsonLinesReaderFactory::<ChangeEntity>::new()),
    )?;
    register_with_alias(
        registry,
        "write-change-jsonl",
        "wcj",
        Arc::new(JsonLinesWriterFactory::<ChangeEntity>::new()),
    )?;

    register_with_alias(registry, "tee", "t", Arc::new(TeeTaskFactory::<Entity>::new()))?;
    register_with_alias(registry, "tee-change", "tc", Arc::new(TeeTaskFactory::<ChangeEntity>::new()))?;
    register_with_alias(registry, "merge", "m", Arc::new(MergeTaskFactory::new(entity_orderings()?)))?;
    Ok(())
}

fn register_with_alias(
    registry: &mut TaskRegistry,
    name: &str,
    alias: &str,
    factory: Arc<dyn TaskFactory>,
) -> PipelineResult<()> {
    registry.register(name, factory.clone())?;
    registry.register(alias, factory)
}
