//! JSON-lines dataset readers and writers.
//!
//! One record per line. Blank lines are skipped when reading.

use async_trait::async_trait;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, warn};

use crate::errors::{PipelineError, PipelineResult};
use crate::lock::DatasetLock;
use crate::pipeline::pipe::PipeReceiver;
use crate::pipeline::registry::{TaskContext, TaskFactory};
use crate::pipeline::task::{Task, TaskIo, TaskPorts};
use crate::record::Record;

pub const ARG_FILE: &str = "file";
pub const ARG_LOCK: &str = "lock";

/// Builds readers producing records of type `T` from a JSON-lines file.
///
/// Arguments:
/// - `file`: dataset path (required)
/// - `lock`: hold an exclusive dataset lock while reading (default `false`)
pub struct JsonLinesReaderFactory<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonLinesReaderFactory<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonLinesReaderFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> TaskFactory for JsonLinesReaderFactory<T> {
    fn create_task(&self, context: TaskContext) -> PipelineResult<Box<dyn Task>> {
        Ok(Box::new(JsonLinesReader::<T> {
            task_id: context.task_id.clone(),
            path: context.args.required_path(ARG_FILE)?,
            lock: context.args.bool_or(ARG_LOCK, false)?,
            _marker: PhantomData,
        }))
    }
}

struct JsonLinesReader<T> {
    task_id: String,
    path: PathBuf,
    lock: bool,
    _marker: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: Record> Task for JsonLinesReader<T> {
    fn ports(&self) -> TaskPorts {
        TaskPorts::new().output::<T>()
    }

    async fn run(self: Box<Self>, mut io: TaskIo) -> PipelineResult<()> {
        let output = io.output::<T>(0)?;
        let _lock = if self.lock {
            Some(DatasetLock::acquire(&self.path, &self.task_id).await?)
        } else {
            None
        };

        let file = tokio::fs::File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut line_number = 0u64;
        let mut records = 0u64;

        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            let record: T = serde_json::from_str(&line).map_err(|e| {
                debug!("Rejected line {} of {:?}", line_number, self.path);
                PipelineError::Serialization(e)
            })?;
            output.send(record).await?;
            records += 1;
        }

        output.close().await?;
        info!("Read {} records from {:?}", records, self.path);
        Ok(())
    }
}

/// Builds writers storing records of type `T` as a JSON-lines file.
///
/// Arguments:
/// - `file`: destination path (required, replaced if present)
///
/// Records go to `<file>.tmp` first. The destination is only replaced once
/// end-of-stream arrives, so a failed pipeline leaves it untouched.
pub struct JsonLinesWriterFactory<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonLinesWriterFactory<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonLinesWriterFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> TaskFactory for JsonLinesWriterFactory<T> {
    fn create_task(&self, context: TaskContext) -> PipelineResult<Box<dyn Task>> {
        Ok(Box::new(JsonLinesWriter::<T> {
            path: context.args.required_path(ARG_FILE)?,
            _marker: PhantomData,
        }))
    }
}

struct JsonLinesWriter<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: Record> Task for JsonLinesWriter<T> {
    fn ports(&self) -> TaskPorts {
        TaskPorts::new().input::<T>()
    }

    async fn run(self: Box<Self>, mut io: TaskIo) -> PipelineResult<()> {
        let mut input = io.input::<T>(0)?;
        let staging = staging_path(&self.path);

        let written = async {
            let records = write_records(&mut input, &staging).await?;
            tokio::fs::rename(&staging, &self.path).await?;
            Ok::<u64, PipelineError>(records)
        }
        .await;

        match written {
            Ok(records) => {
                info!("Wrote {} records to {:?}", records, self.path);
                Ok(())
            }
            Err(e) => {
                match tokio::fs::remove_file(&staging).await {
                    Ok(()) => debug!("Discarded partial output {:?}", staging),
                    Err(remove_error) if remove_error.kind() == std::io::ErrorKind::NotFound => {}
                    Err(remove_error) => warn!("Failed to remove partial output {:?}: {}", staging, remove_error),
                }
                Err(e)
            }
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}

async fn write_records<T: Record>(input: &mut PipeReceiver<T>, path: &Path) -> PipelineResult<u64> {
    let file = tokio::fs::File::create(path).await?;
    let mut writer = BufWriter::new(file);
    let mut records = 0u64;

    while let Some(record) = input.recv().await? {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        records += 1;
    }

    writer.flush().await?;
    Ok(records)
}
