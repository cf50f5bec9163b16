//! Bounded single-producer single-consumer pipes between tasks.
//!
//! A pipe carries records followed by exactly one end-of-stream token. A
//! reader that sees the channel close without that token reports
//! [`PipelineError::UpstreamFailed`], so a failed producer never looks like a
//! short but complete stream. Both ends observe the pipeline cancellation
//! token while blocked.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::{PipelineError, PipelineResult};

/// A message travelling through a pipe.
#[derive(Debug)]
pub enum PipeMessage<T> {
    Record(T),
    EndOfStream,
}

/// Counters shared by both ends of a pipe.
#[derive(Debug, Default)]
pub struct PipeStats {
    records: AtomicU64,
    end_of_stream: AtomicBool,
}

impl PipeStats {
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// Whether the writer closed the pipe cleanly.
    pub fn end_of_stream(&self) -> bool {
        self.end_of_stream.load(Ordering::Acquire)
    }
}

/// Creates a pipe holding up to `capacity` in-flight messages.
pub fn pipe<T>(
    name: impl Into<String>,
    capacity: usize,
    cancel: CancellationToken,
) -> (PipeSender<T>, PipeReceiver<T>, Arc<PipeStats>) {
    let name: Arc<str> = Arc::from(name.into());
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(PipeStats::default());

    let sender = PipeSender {
        name: name.clone(),
        tx,
        cancel: cancel.clone(),
        stats: stats.clone(),
    };
    let receiver = PipeReceiver {
        name,
        rx,
        cancel,
        finished: false,
    };
    (sender, receiver, stats)
}

/// The writing end of a pipe.
#[derive(Debug)]
pub struct PipeSender<T> {
    name: Arc<str>,
    tx: mpsc::Sender<PipeMessage<T>>,
    cancel: CancellationToken,
    stats: Arc<PipeStats>,
}

impl<T: Send> PipeSender<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends a record, waiting while the pipe is full.
    ///
    /// # Errors
    /// Returns [`PipelineError::Cancelled`] if the pipeline is cancelled or the
    /// reader has gone away.
    pub async fn send(&self, record: T) -> PipelineResult<()> {
        self.deliver(PipeMessage::Record(record)).await?;
        self.stats.records.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Sends end-of-stream. Consuming the sender guarantees the token is sent
    /// at most once.
    pub async fn close(self) -> PipelineResult<()> {
        self.deliver(PipeMessage::EndOfStream).await?;
        self.stats.end_of_stream.store(true, Ordering::Release);
        tracing::trace!("Pipe {} closed after {} records", self.name, self.stats.records());
        Ok(())
    }

    async fn deliver(&self, message: PipeMessage<T>) -> PipelineResult<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled),
            sent = self.tx.send(message) => sent.map_err(|_| PipelineError::Cancelled),
        }
    }
}

/// The reading end of a pipe.
#[derive(Debug)]
pub struct PipeReceiver<T> {
    name: Arc<str>,
    rx: mpsc::Receiver<PipeMessage<T>>,
    cancel: CancellationToken,
    finished: bool,
}

impl<T: Send> PipeReceiver<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receives the next record, or `None` once end-of-stream was seen.
    ///
    /// # Errors
    /// - [`PipelineError::Cancelled`] if the pipeline is cancelled
    /// - [`PipelineError::UpstreamFailed`] if the writer went away without
    ///   closing the pipe
    pub async fn recv(&mut self) -> PipelineResult<Option<T>> {
        if self.finished {
            return Ok(None);
        }

        let message = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
            message = self.rx.recv() => message,
        };

        match message {
            Some(PipeMessage::Record(record)) => Ok(Some(record)),
            Some(PipeMessage::EndOfStream) => {
                self.finished = true;
                Ok(None)
            }
            None => Err(PipelineError::UpstreamFailed {
                pipe: self.name.to_string(),
            }),
        }
    }
}
