//! Duplicates one stream onto several outputs.

use async_trait::async_trait;
use std::marker::PhantomData;
use tracing::debug;

use crate::errors::{PipelineError, PipelineResult};
use crate::pipeline::registry::{TaskContext, TaskFactory};
use crate::pipeline::task::{Task, TaskIo, TaskPorts};
use crate::record::Record;

pub const ARG_OUTPUT_COUNT: &str = "count";
const DEFAULT_OUTPUT_COUNT: usize = 2;

/// Builds tee tasks. `count` sets the number of outputs (default 2).
pub struct TeeTaskFactory<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TeeTaskFactory<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TeeTaskFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record + Clone> TaskFactory for TeeTaskFactory<T> {
    fn create_task(&self, context: TaskContext) -> PipelineResult<Box<dyn Task>> {
        let outputs = context
            .args
            .usize_or(ARG_OUTPUT_COUNT, DEFAULT_OUTPUT_COUNT)?;
        if outputs == 0 {
            return Err(PipelineError::invalid_argument(
                &context.task_id,
                ARG_OUTPUT_COUNT,
                "must be at least 1",
            ));
        }

        Ok(Box::new(TeeTask::<T> {
            outputs,
            _marker: PhantomData,
        }))
    }
}

struct TeeTask<T> {
    outputs: usize,
    _marker: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: Record + Clone> Task for TeeTask<T> {
    fn ports(&self) -> TaskPorts {
        TaskPorts::new().input::<T>().outputs::<T>(self.outputs)
    }

    async fn run(self: Box<Self>, mut io: TaskIo) -> PipelineResult<()> {
        let mut input = io.input::<T>(0)?;
        let mut outputs = io.all_outputs::<T>()?;
        let last = outputs.pop().ok_or_else(|| {
            PipelineError::contract_violation(format!("tee {} has no outputs", io.task_id()))
        })?;

        let mut records = 0u64;
        while let Some(record) = input.recv().await? {
            for output in &outputs {
                output.send(record.clone()).await?;
            }
            last.send(record).await?;
            records += 1;
        }

        for output in outputs {
            output.close().await?;
        }
        last.close().await?;
        debug!("Tee {} copied {} records", io.task_id(), records);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::pipe::pipe;
    use crate::pipeline::registry::{PipeBindings, TaskArguments};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_every_output_sees_every_record() -> PipelineResult<()> {
        let mut values = toml::Table::new();
        values.insert(ARG_OUTPUT_COUNT.to_string(), 3i64.into());
        let context = TaskContext {
            task_id: "tee".to_string(),
            args: TaskArguments::new("tee", values),
            bindings: PipeBindings::default(),
        };
        let task = TeeTaskFactory::<String>::new().create_task(context)?;
        assert_eq!(task.ports().outputs.len(), 3);

        let cancel = CancellationToken::new();
        let (in_tx, in_rx, _) = pipe::<String>("in", 4, cancel.clone());
        let mut io = TaskIo::new("tee", cancel.clone()).with_input(in_rx);
        let mut receivers = Vec::new();
        for port in 0..3 {
            let (tx, rx, _) = pipe::<String>(format!("out-{port}"), 4, cancel.clone());
            io = io.with_output(tx);
            receivers.push(rx);
        }

        in_tx.send("a".to_string()).await?;
        in_tx.send("b".to_string()).await?;
        in_tx.close().await?;
        task.run(io).await?;

        for mut rx in receivers {
            assert_eq!(rx.recv().await?.as_deref(), Some("a"));
            assert_eq!(rx.recv().await?.as_deref(), Some("b"));
            assert_eq!(rx.recv().await?, None);
        }
        Ok(())
    }

    #[test]
    fn test_zero_outputs_rejected() {
        let mut values = toml::Table::new();
        values.insert(ARG_OUTPUT_COUNT.to_string(), 0i64.into());
        let context = TaskContext {
            task_id: "tee".to_string(),
            args: TaskArguments::new("tee", values),
            bindings: PipeBindings::default(),
        };
        assert!(TeeTaskFactory::<String>::new().create_task(context).is_err());
    }
}
