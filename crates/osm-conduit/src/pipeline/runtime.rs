//! Concurrent execution of an assembled task graph.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::errors::{PipelineError, PipelineResult};
use crate::pipeline::assembler::{AssembledPipeline, AssembledTask};

/// Final state of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Completed,
    Failed(String),
    Cancelled,
    Panicked(String),
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed(message) => write!(f, "failed: {message}"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
            TaskStatus::Panicked(message) => write!(f, "panicked: {message}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task_id: String,
    pub task_type: String,
    pub status: TaskStatus,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct PipeReport {
    pub name: String,
    pub record_type: &'static str,
    pub writer: String,
    pub reader: String,
    pub records: u64,
    pub end_of_stream: bool,
}

/// Per-task and per-pipe summary of one execution.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub execution_id: Uuid,
    pub duration: Duration,
    pub tasks: Vec<TaskReport>,
    pub pipes: Vec<PipeReport>,
}

impl PipelineReport {
    pub fn task(&self, task_id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|task| task.task_id == task_id)
    }

    pub fn pipe(&self, name: &str) -> Option<&PipeReport> {
        self.pipes.iter().find(|pipe| pipe.name == name)
    }

    pub fn succeeded(&self) -> bool {
        self.tasks
            .iter()
            .all(|task| task.status == TaskStatus::Completed)
    }
}

/// The report of an execution together with its root-cause error, if any.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub report: PipelineReport,
    pub error: Option<PipelineError>,
}

impl PipelineOutcome {
    pub fn into_result(self) -> PipelineResult<PipelineReport> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.report),
        }
    }
}

/// Runs every task of a pipeline on its own tokio task.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineRuntime;

impl PipelineRuntime {
    pub fn new() -> Self {
        Self
    }

    /// Executes `pipeline` and returns its report, or the root-cause error
    /// wrapped with the id of the task that raised it.
    pub async fn execute(&self, pipeline: AssembledPipeline) -> PipelineResult<PipelineReport> {
        self.run(pipeline).await.into_result()
    }

    /// Executes `pipeline` until every task has stopped.
    ///
    /// The first failing task cancels the pipeline; the remaining tasks see
    /// the cancellation at their next pipe operation. Errors that only echo
    /// another failure (cancellation, upstream failure) are never chosen as
    /// the root cause while a primary error exists.
    pub async fn run(&self, pipeline: AssembledPipeline) -> PipelineOutcome {
        let execution_id = Uuid::new_v4();
        let started = Instant::now();
        let (tasks, pipes, cancel) = pipeline.into_parts();
        info!(
            "Starting pipeline execution {} with {} tasks and {} pipes",
            execution_id,
            tasks.len(),
            pipes.len()
        );

        let mut join_set = JoinSet::new();
        let mut spawned: HashMap<tokio::task::Id, (String, String)> = HashMap::new();
        let mut order: Vec<String> = Vec::with_capacity(tasks.len());

        for AssembledTask {
            id,
            task_type,
            task,
            io,
        } in tasks
        {
            let task_cancel = cancel.clone();
            let span = info_span!("task", id = %id, task_type = %task_type);
            let handle = join_set.spawn(
                async move {
                    let task_started = Instant::now();
                    let result = task.run(io).await;
                    if let Err(e) = &result {
                        if e.is_secondary() {
                            info!("Task stopped: {}", e);
                        } else {
                            error!("Task failed: {}", e);
                        }
                        task_cancel.cancel();
                    }
                    (task_started.elapsed(), result)
                }
                .instrument(span),
            );
            spawned.insert(handle.id(), (id.clone(), task_type));
            order.push(id);
        }

        let mut reports: HashMap<String, TaskReport> = HashMap::new();
        let mut failures: Vec<PipelineError> = Vec::new();

        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((handle_id, (duration, result))) => {
                    let (task_id, task_type) = spawned.remove(&handle_id).unwrap_or_default();
                    let status = match result {
                        Ok(()) => TaskStatus::Completed,
                        Err(e) => {
                            let status = if e.is_cancellation() {
                                TaskStatus::Cancelled
                            } else {
                                TaskStatus::Failed(e.to_string())
                            };
                            failures.push(e.in_task(task_id.clone()));
                            status
                        }
                    };
                    reports.insert(
                        task_id.clone(),
                        TaskReport {
                            task_id,
                            task_type,
                            status,
                            duration,
                        },
                    );
                }
                Err(join_error) => {
                    cancel.cancel();
                    let (task_id, task_type) =
                        spawned.remove(&join_error.id()).unwrap_or_default();
                    let message = if join_error.is_panic() {
                        panic_message(join_error.into_panic())
                    } else {
                        "task aborted".to_string()
                    };
                    error!("Task {} panicked: {}", task_id, message);

                    failures.push(PipelineError::TaskPanicked {
                        task_id: task_id.clone(),
                        message: message.clone(),
                    });
                    reports.insert(
                        task_id.clone(),
                        TaskReport {
                            task_id,
                            task_type,
                            status: TaskStatus::Panicked(message),
                            duration: started.elapsed(),
                        },
                    );
                }
            }
        }

        let report = PipelineReport {
            execution_id,
            duration: started.elapsed(),
            tasks: order
                .iter()
                .filter_map(|task_id| reports.remove(task_id))
                .collect(),
            pipes: pipes
                .iter()
                .map(|pipe| PipeReport {
                    name: pipe.name.clone(),
                    record_type: pipe.record_type,
                    writer: pipe.writer.clone(),
                    reader: pipe.reader.clone(),
                    records: pipe.stats.records(),
                    end_of_stream: pipe.stats.end_of_stream(),
                })
                .collect(),
        };

        let error = root_cause(failures);
        match &error {
            None => info!(
                "Pipeline execution {} completed in {:?}",
                execution_id, report.duration
            ),
            Some(e) if e.is_cancellation() => warn!("Pipeline execution {} cancelled", execution_id),
            Some(e) => error!("Pipeline execution {} failed: {}", execution_id, e),
        }

        PipelineOutcome { report, error }
    }
}

/// Picks the error that caused the others: a primary failure if there is one,
/// then an upstream failure, then plain cancellation.
fn root_cause(failures: Vec<PipelineError>) -> Option<PipelineError> {
    if failures.is_empty() {
        return None;
    }

    let index = failures
        .iter()
        .position(|e| !e.is_secondary())
        .or_else(|| failures.iter().position(|e| !e.is_cancellation()));
    match index {
        Some(index) => failures.into_iter().nth(index),
        None => Some(PipelineError::Cancelled),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_prefers_primary_errors() {
        let failures = vec![
            PipelineError::Cancelled.in_task("sink"),
            PipelineError::UpstreamFailed {
                pipe: "raw".to_string(),
            }
            .in_task("sorter"),
            PipelineError::from(std::io::Error::other("truncated")).in_task("reader"),
        ];

        let err = root_cause(failures).expect("a root cause");
        assert!(matches!(err, PipelineError::TaskFailed { ref task_id, .. } if task_id == "reader"));
    }

    #[test]
    fn test_root_cause_of_pure_cancellation() {
        let failures = vec![
            PipelineError::Cancelled.in_task("a"),
            PipelineError::Cancelled.in_task("b"),
        ];

        let err = root_cause(failures);
        assert!(matches!(err, Some(PipelineError::Cancelled)));
        assert!(root_cause(Vec::new()).is_none());
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(42)), "unknown panic");
    }
}
