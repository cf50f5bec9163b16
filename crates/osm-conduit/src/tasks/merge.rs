//! Merging of already sorted streams.

use async_trait::async_trait;
use tracing::info;

use crate::errors::PipelineResult;
use crate::ordering::{OrderingRegistry, SharedOrdering};
use crate::pipeline::registry::{TaskContext, TaskFactory};
use crate::pipeline::task::{Task, TaskIo, TaskPorts};
use crate::record::Record;
use crate::sort::{MergeEngine, RunCursor};

pub const ARG_ORDERING_TYPE: &str = "type";

/// Builds merge tasks combining two inputs sorted by the same ordering.
///
/// Records comparing equal are emitted from the first input before the
/// second. The task completes once both inputs reached end-of-stream.
pub struct MergeTaskFactory<T> {
    orderings: OrderingRegistry<T>,
}

impl<T: Record> MergeTaskFactory<T> {
    pub fn new(orderings: OrderingRegistry<T>) -> Self {
        Self { orderings }
    }
}

impl<T: Record> TaskFactory for MergeTaskFactory<T> {
    fn create_task(&self, context: TaskContext) -> PipelineResult<Box<dyn Task>> {
        let ordering_name = context.args.string(ARG_ORDERING_TYPE)?;
        let ordering = self.orderings.resolve(ordering_name.as_deref())?;
        Ok(Box::new(MergeTask { ordering }))
    }
}

struct MergeTask<T> {
    ordering: SharedOrdering<T>,
}

#[async_trait]
impl<T: Record> Task for MergeTask<T> {
    fn ports(&self) -> TaskPorts {
        TaskPorts::new().inputs::<T>(2).output::<T>()
    }

    async fn run(self: Box<Self>, mut io: TaskIo) -> PipelineResult<()> {
        let inputs = io.all_inputs::<T>()?;
        let output = io.output::<T>(0)?;
        let cursors: Vec<Box<dyn RunCursor<T>>> = inputs
            .into_iter()
            .map(|input| Box::new(input) as Box<dyn RunCursor<T>>)
            .collect();

        let mut engine = MergeEngine::new(self.ordering, cursors);
        let mut records = 0u64;
        while let Some(record) = engine.next().await? {
            output.send(record).await?;
            records += 1;
        }

        output.close().await?;
        info!("Merge {} emitted {} records", io.task_id(), records);
        Ok(())
    }
}
