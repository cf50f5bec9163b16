//! Sorting tasks.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::errors::{PipelineError, PipelineResult};
use crate::ordering::{OrderingRegistry, SharedOrdering};
use crate::pipeline::pipe::{PipeReceiver, PipeSender};
use crate::pipeline::registry::{TaskContext, TaskFactory};
use crate::config::defaults::DEFAULT_MAX_MERGE_FAN_IN;
use crate::pipeline::task::{Task, TaskIo, TaskPorts};
use crate::record::Record;
use crate::sort::{SortStage, SpillMedium};

pub const ARG_ORDERING_TYPE: &str = "type";
pub const ARG_BUFFER_SIZE: &str = "buffer_size";

/// Builds sort tasks for one record type.
///
/// Arguments:
/// - `type`: name of the ordering, the registry default when omitted
/// - `buffer_size`: records held in memory before a run is spilled
pub struct SortTaskFactory<T> {
    orderings: OrderingRegistry<T>,
    default_buffer_size: usize,
    max_merge_fan_in: usize,
    medium: Arc<dyn SpillMedium>,
}

impl<T: Record> SortTaskFactory<T> {
    pub fn new(orderings: OrderingRegistry<T>, default_buffer_size: usize, medium: Arc<dyn SpillMedium>) -> Self {
        Self {
            orderings,
            default_buffer_size,
            max_merge_fan_in: DEFAULT_MAX_MERGE_FAN_IN,
            medium,
        }
    }

    /// Limits how many spilled runs each sort task merges at once.
    #[must_use]
    pub fn with_max_merge_fan_in(mut self, max_merge_fan_in: usize) -> Self {
        self.max_merge_fan_in = max_merge_fan_in;
        self
    }
}

impl<T: Record> TaskFactory for SortTaskFactory<T> {
    fn create_task(&self, context: TaskContext) -> PipelineResult<Box<dyn Task>> {
        let ordering_name = context.args.string(ARG_ORDERING_TYPE)?;
        let ordering = self.orderings.resolve(ordering_name.as_deref())?;
        let buffer_size = context
            .args
            .usize_or(ARG_BUFFER_SIZE, self.default_buffer_size)?;
        if buffer_size == 0 {
            return Err(PipelineError::invalid_argument(
                &context.task_id,
                ARG_BUFFER_SIZE,
                "must be at least 1",
            ));
        }

        Ok(Box::new(SortTask {
            task_id: context.task_id,
            ordering_name: ordering_name
                .or_else(|| self.orderings.default_name().map(str::to_string))
                .unwrap_or_default(),
            ordering,
            buffer_size,
            max_merge_fan_in: self.max_merge_fan_in,
            medium: self.medium.clone(),
        }))
    }
}

struct SortTask<T> {
    task_id: String,
    ordering_name: String,
    ordering: SharedOrdering<T>,
    buffer_size: usize,
    max_merge_fan_in: usize,
    medium: Arc<dyn SpillMedium>,
}

#[async_trait]
impl<T: Record> Task for SortTask<T> {
    fn ports(&self) -> TaskPorts {
        TaskPorts::new().input::<T>().output::<T>()
    }

    async fn run(self: Box<Self>, mut io: TaskIo) -> PipelineResult<()> {
        let mut input = io.input::<T>(0)?;
        let output = io.output::<T>(0)?;
        info!(
            "Sorting with ordering {} and buffer of {} records",
            self.ordering_name, self.buffer_size
        );

        let mut stage = SortStage::new(self.ordering.clone(), self.buffer_size, self.medium.clone())
            .with_max_fan_in(self.max_merge_fan_in);
        let result = pump(&mut stage, &mut input, &output).await;
        stage.dispose().await;
        result?;

        output.close().await?;
        info!("Sort task {} complete", self.task_id);
        Ok(())
    }
}

async fn pump<T: Record>(
    stage: &mut SortStage<T>,
    input: &mut PipeReceiver<T>,
    output: &PipeSender<T>,
) -> PipelineResult<()> {
    while let Some(record) = input.recv().await? {
        stage.append(record).await?;
    }
    stage.finish().await?;

    while let Some(record) = stage.next().await? {
        output.send(record).await?;
    }
    Ok(())
}
