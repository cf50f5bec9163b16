//! Builds a runnable task graph from task specifications.
//!
//! Assembly instantiates every task, binds each declared port to a pipe and
//! validates the resulting graph. Nothing runs until every check passed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{PipelineError, PipelineResult};
use crate::pipeline::definition::TaskSpec;
use crate::pipeline::pipe::PipeStats;
use crate::pipeline::registry::{PipeBindings, TaskArguments, TaskContext, TaskRegistry};
use crate::pipeline::task::{RecordType, Task, TaskIo};

const DEFAULT_PIPE_PREFIX: &str = "#default-";

#[derive(Debug, Clone, Copy)]
struct PortRef {
    task: usize,
    port: usize,
    record_type: RecordType,
}

#[derive(Debug, Default)]
struct PipeWiring {
    writer: Option<PortRef>,
    readers: Vec<PortRef>,
}

/// A task ready to run, together with its bound pipe ends.
pub struct AssembledTask {
    pub id: String,
    pub task_type: String,
    pub task: Box<dyn Task>,
    pub io: TaskIo,
}

/// Description of one wired pipe.
#[derive(Debug, Clone)]
pub struct PipeInfo {
    pub name: String,
    pub record_type: &'static str,
    pub writer: String,
    pub reader: String,
    pub stats: Arc<PipeStats>,
}

/// A validated task graph, tasks ordered producers before consumers.
pub struct AssembledPipeline {
    tasks: Vec<AssembledTask>,
    pipes: Vec<PipeInfo>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for AssembledPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssembledPipeline")
            .field("tasks", &self.task_order())
            .field("pipes", &self.pipes)
            .finish_non_exhaustive()
    }
}

impl AssembledPipeline {
    pub fn tasks(&self) -> &[AssembledTask] {
        &self.tasks
    }

    /// Task ids in execution order.
    pub fn task_order(&self) -> Vec<&str> {
        self.tasks.iter().map(|task| task.id.as_str()).collect()
    }

    pub fn pipes(&self) -> &[PipeInfo] {
        &self.pipes
    }

    /// Token cancelling every task of this pipeline.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn into_parts(self) -> (Vec<AssembledTask>, Vec<PipeInfo>, CancellationToken) {
        (self.tasks, self.pipes, self.cancel)
    }
}

/// Resolves, instantiates and wires tasks.
pub struct PipelineAssembler<'a> {
    registry: &'a TaskRegistry,
    pipe_capacity: usize,
}

impl<'a> PipelineAssembler<'a> {
    pub fn new(registry: &'a TaskRegistry, pipe_capacity: usize) -> Self {
        Self {
            registry,
            pipe_capacity: pipe_capacity.max(1),
        }
    }

    /// Assembles `specs` into a pipeline.
    ///
    /// # Errors
    /// Returns a configuration error for unknown task types, invalid task
    /// arguments, duplicate task ids, reserved pipe names, unresolvable or
    /// conflicting pipe bindings, record type mismatches and dependency
    /// cycles.
    pub fn assemble(&self, specs: &[TaskSpec]) -> PipelineResult<AssembledPipeline> {
        let mut seen_ids = HashSet::new();
        for spec in specs {
            if !seen_ids.insert(spec.id.as_str()) {
                return Err(PipelineError::DuplicateTaskId {
                    task_id: spec.id.clone(),
                });
            }
            if let Some(name) = spec
                .inputs
                .iter()
                .chain(&spec.outputs)
                .find(|name| name.starts_with(DEFAULT_PIPE_PREFIX))
            {
                return Err(PipelineError::binding_error(format!(
                    "task {} uses pipe name {}; names starting with {} are reserved for unnamed pipes",
                    spec.id, name, DEFAULT_PIPE_PREFIX
                )));
            }
        }

        let mut tasks: Vec<Box<dyn Task>> = Vec::with_capacity(specs.len());
        let mut wiring: HashMap<String, PipeWiring> = HashMap::new();
        let mut pipe_order: Vec<String> = Vec::new();
        let mut default_stack: Vec<String> = Vec::new();
        let mut default_count = 0usize;

        for (index, spec) in specs.iter().enumerate() {
            let factory = self.registry.resolve(&spec.task_type)?;
            let task = factory.create_task(TaskContext {
                task_id: spec.id.clone(),
                args: TaskArguments::new(&spec.id, spec.args.clone()),
                bindings: PipeBindings {
                    inputs: spec.inputs.clone(),
                    outputs: spec.outputs.clone(),
                },
            })?;
            let ports = task.ports();

            if spec.inputs.len() > ports.inputs.len() {
                return Err(PipelineError::binding_error(format!(
                    "task {} names {} input pipes but has {} input ports",
                    spec.id,
                    spec.inputs.len(),
                    ports.inputs.len()
                )));
            }
            if spec.outputs.len() > ports.outputs.len() {
                return Err(PipelineError::binding_error(format!(
                    "task {} names {} output pipes but has {} output ports",
                    spec.id,
                    spec.outputs.len(),
                    ports.outputs.len()
                )));
            }

            for (port, record_type) in ports.inputs.iter().enumerate() {
                let name = match spec.inputs.get(port) {
                    Some(name) => name.clone(),
                    None => default_stack.pop().ok_or_else(|| {
                        PipelineError::binding_error(format!(
                            "no default pipe available for input port {} of task {}",
                            port, spec.id
                        ))
                    })?,
                };

                let entry = wiring.entry(name.clone()).or_insert_with(|| {
                    pipe_order.push(name.clone());
                    PipeWiring::default()
                });
                entry.readers.push(PortRef {
                    task: index,
                    port,
                    record_type: *record_type,
                });
            }

            for (port, record_type) in ports.outputs.iter().enumerate() {
                let name = match spec.outputs.get(port) {
                    Some(name) => name.clone(),
                    None => {
                        let name = format!("{DEFAULT_PIPE_PREFIX}{default_count}");
                        default_count += 1;
                        default_stack.push(name.clone());
                        name
                    }
                };

                let entry = wiring.entry(name.clone()).or_insert_with(|| {
                    pipe_order.push(name.clone());
                    PipeWiring::default()
                });
                if let Some(existing) = entry.writer {
                    return Err(PipelineError::binding_error(format!(
                        "pipe {} has two writers: {} and {}",
                        name, specs[existing.task].id, spec.id
                    )));
                }
                entry.writer = Some(PortRef {
                    task: index,
                    port,
                    record_type: *record_type,
                });
            }

            debug!(
                "Instantiated task {} ({}) with {} inputs and {} outputs",
                spec.id,
                spec.task_type,
                ports.inputs.len(),
                ports.outputs.len()
            );
            tasks.push(task);
        }

        let mut edges: Vec<(usize, usize)> = Vec::new();
        for name in &pipe_order {
            let pipe = &wiring[name];
            let writer = pipe.writer.ok_or_else(|| {
                PipelineError::binding_error(format!("pipe {name} has no writer"))
            })?;
            let reader = match pipe.readers.as_slice() {
                [reader] => *reader,
                [] => {
                    return Err(PipelineError::binding_error(format!(
                        "pipe {} written by task {} has no reader",
                        display_name(name),
                        specs[writer.task].id
                    )));
                }
                [first, second, ..] => {
                    return Err(PipelineError::binding_error(format!(
                        "pipe {name} has more than one reader: {} and {}",
                        specs[first.task].id, specs[second.task].id
                    )));
                }
            };

            if writer.record_type != reader.record_type {
                return Err(PipelineError::PipeTypeMismatch {
                    pipe: display_name(name).to_string(),
                    writer: writer.record_type.name(),
                    reader: reader.record_type.name(),
                });
            }
            edges.push((writer.task, reader.task));
        }

        let order = topological_order(specs, &edges)?;

        let cancel = CancellationToken::new();
        let mut ios: Vec<TaskIo> = specs
            .iter()
            .map(|spec| TaskIo::new(&spec.id, cancel.clone()))
            .collect();
        let mut pipes = Vec::with_capacity(pipe_order.len());

        for name in &pipe_order {
            let pipe = &wiring[name];
            let (Some(writer), [reader]) = (pipe.writer, pipe.readers.as_slice()) else {
                return Err(PipelineError::contract_violation(format!(
                    "pipe {name} lost its endpoints after validation"
                )));
            };

            let (sender, receiver, stats) =
                writer
                    .record_type
                    .open_pipe(name, self.pipe_capacity, cancel.clone());
            ios[writer.task].set_output(writer.port, sender);
            ios[reader.task].set_input(reader.port, receiver);

            pipes.push(PipeInfo {
                name: name.clone(),
                record_type: writer.record_type.name(),
                writer: specs[writer.task].id.clone(),
                reader: specs[reader.task].id.clone(),
                stats,
            });
        }

        let mut slots: Vec<Option<(Box<dyn Task>, TaskIo)>> =
            tasks.into_iter().zip(ios).map(Some).collect();
        let mut ordered = Vec::with_capacity(slots.len());
        for index in order {
            let (task, io) = slots[index].take().ok_or_else(|| {
                PipelineError::contract_violation("task scheduled twice in topological order")
            })?;
            ordered.push(AssembledTask {
                id: specs[index].id.clone(),
                task_type: specs[index].task_type.clone(),
                task,
                io,
            });
        }

        info!(
            "Assembled pipeline with {} tasks and {} pipes",
            ordered.len(),
            pipes.len()
        );

        Ok(AssembledPipeline {
            tasks: ordered,
            pipes,
            cancel,
        })
    }
}

fn display_name(name: &str) -> &str {
    if name.starts_with(DEFAULT_PIPE_PREFIX) {
        "(default)"
    } else {
        name
    }
}

/// Kahn's algorithm, preferring definition order among ready tasks.
fn topological_order(specs: &[TaskSpec], edges: &[(usize, usize)]) -> PipelineResult<Vec<usize>> {
    let mut in_degree = vec![0usize; specs.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
    for &(from, to) in edges {
        successors[from].push(to);
        in_degree[to] += 1;
    }

    let mut ready: VecDeque<usize> = (0..specs.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(specs.len());

    while let Some(index) = ready.pop_front() {
        order.push(index);
        for &next in &successors[index] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if order.len() < specs.len() {
        let tasks = (0..specs.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| specs[i].id.clone())
            .collect();
        return Err(PipelineError::CyclicGraph { tasks });
    }

    Ok(order)
}
