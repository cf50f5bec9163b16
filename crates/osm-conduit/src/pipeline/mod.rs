//! Task pipeline execution engine
//!
//! Construction happens in two steps. The [`TaskRegistry`] maps task type
//! names to factories; the [`PipelineAssembler`] turns an ordered list of
//! [`TaskSpec`]s into an [`AssembledPipeline`], instantiating every task and
//! wiring its ports to typed pipes. The [`PipelineRuntime`] then runs every
//! task concurrently until all of them stopped.

pub mod assembler;
pub mod definition;
pub mod pipe;
pub mod registry;
pub mod runtime;
pub mod task;

pub use assembler::{AssembledPipeline, AssembledTask, PipeInfo, PipelineAssembler};
pub use definition::{PipelineDefinition, TaskSpec};
pub use pipe::{PipeMessage, PipeReceiver, PipeSender, PipeStats, pipe};
pub use registry::{PipeBindings, TaskArguments, TaskContext, TaskFactory, TaskRegistry};
pub use runtime::{PipeReport, PipelineOutcome, PipelineReport, PipelineRuntime, TaskReport, TaskStatus};
pub use task::{RecordType, Task, TaskIo, TaskPorts};
