//! The task abstraction and its typed ports.

use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::errors::{PipelineError, PipelineResult};
use crate::pipeline::pipe::{PipeReceiver, PipeSender, PipeStats, pipe};
use crate::record::Record;

type AnyEnd = Box<dyn Any + Send>;

/// Runtime description of the record type carried by a port.
///
/// Besides identifying the type, it knows how to open a pipe of that type,
/// which lets the assembler wire ports without knowing their types statically.
#[derive(Clone, Copy)]
pub struct RecordType {
    id: TypeId,
    name: &'static str,
    open: fn(&str, usize, CancellationToken) -> (AnyEnd, AnyEnd, Arc<PipeStats>),
}

impl RecordType {
    pub fn of<T: Record>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            open: open_pipe::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Opens a pipe of this type, returning its type-erased ends.
    pub(crate) fn open_pipe(
        &self,
        name: &str,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (AnyEnd, AnyEnd, Arc<PipeStats>) {
        (self.open)(name, capacity, cancel)
    }
}

fn open_pipe<T: Record>(
    name: &str,
    capacity: usize,
    cancel: CancellationToken,
) -> (AnyEnd, AnyEnd, Arc<PipeStats>) {
    let (sender, receiver, stats) = pipe::<T>(name, capacity, cancel);
    (Box::new(sender), Box::new(receiver), stats)
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RecordType {}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// The input and output ports a task declares, in port order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPorts {
    pub inputs: Vec<RecordType>,
    pub outputs: Vec<RecordType>,
}

impl TaskPorts {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn input<T: Record>(mut self) -> Self {
        self.inputs.push(RecordType::of::<T>());
        self
    }

    #[must_use]
    pub fn inputs<T: Record>(mut self, count: usize) -> Self {
        self.inputs.extend(std::iter::repeat_n(RecordType::of::<T>(), count));
        self
    }

    #[must_use]
    pub fn output<T: Record>(mut self) -> Self {
        self.outputs.push(RecordType::of::<T>());
        self
    }

    #[must_use]
    pub fn outputs<T: Record>(mut self, count: usize) -> Self {
        self.outputs.extend(std::iter::repeat_n(RecordType::of::<T>(), count));
        self
    }
}

/// The pipe ends bound to a task's ports.
///
/// Each end can be taken once. Taking an end with a type other than the one
/// the port declared is a contract violation.
pub struct TaskIo {
    task_id: String,
    inputs: Vec<Option<AnyEnd>>,
    outputs: Vec<Option<AnyEnd>>,
    cancel: CancellationToken,
}

impl TaskIo {
    pub fn new(task_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            task_id: task_id.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            cancel,
        }
    }

    /// Appends a receiver as the next input port.
    #[must_use]
    pub fn with_input<T: Record>(mut self, receiver: PipeReceiver<T>) -> Self {
        self.inputs.push(Some(Box::new(receiver)));
        self
    }

    /// Appends a sender as the next output port.
    #[must_use]
    pub fn with_output<T: Record>(mut self, sender: PipeSender<T>) -> Self {
        self.outputs.push(Some(Box::new(sender)));
        self
    }

    pub(crate) fn set_input(&mut self, port: usize, end: AnyEnd) {
        if self.inputs.len() <= port {
            self.inputs.resize_with(port + 1, || None);
        }
        self.inputs[port] = Some(end);
    }

    pub(crate) fn set_output(&mut self, port: usize, end: AnyEnd) {
        if self.outputs.len() <= port {
            self.outputs.resize_with(port + 1, || None);
        }
        self.outputs[port] = Some(end);
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn input<T: Record>(&mut self, port: usize) -> PipelineResult<PipeReceiver<T>> {
        let end = take_end(&mut self.inputs, port, "input", &self.task_id)?;
        end.downcast::<PipeReceiver<T>>()
            .map(|receiver| *receiver)
            .map_err(|_| type_violation::<T>("input", port, &self.task_id))
    }

    pub fn output<T: Record>(&mut self, port: usize) -> PipelineResult<PipeSender<T>> {
        let end = take_end(&mut self.outputs, port, "output", &self.task_id)?;
        end.downcast::<PipeSender<T>>()
            .map(|sender| *sender)
            .map_err(|_| type_violation::<T>("output", port, &self.task_id))
    }

    /// Takes every input port, in port order.
    pub fn all_inputs<T: Record>(&mut self) -> PipelineResult<Vec<PipeReceiver<T>>> {
        (0..self.inputs.len()).map(|port| self.input(port)).collect()
    }

    /// Takes every output port, in port order.
    pub fn all_outputs<T: Record>(&mut self) -> PipelineResult<Vec<PipeSender<T>>> {
        (0..self.outputs.len()).map(|port| self.output(port)).collect()
    }
}

fn take_end(
    ends: &mut [Option<AnyEnd>],
    port: usize,
    kind: &str,
    task_id: &str,
) -> PipelineResult<AnyEnd> {
    ends.get_mut(port).and_then(Option::take).ok_or_else(|| {
        PipelineError::contract_violation(format!(
            "task {task_id} has no unclaimed {kind} port {port}"
        ))
    })
}

fn type_violation<T>(kind: &str, port: usize, task_id: &str) -> PipelineError {
    PipelineError::contract_violation(format!(
        "task {task_id} {kind} port {port} does not carry {}",
        std::any::type_name::<T>()
    ))
}

/// A unit of work in the task graph.
///
/// A task declares its ports once it has been constructed, then runs to
/// completion on its own tokio task. Sources close every output when they run
/// out of records; other tasks finish once every input reported end-of-stream.
#[async_trait]
pub trait Task: Send {
    fn ports(&self) -> TaskPorts;

    async fn run(self: Box<Self>, io: TaskIo) -> PipelineResult<()>;
}
