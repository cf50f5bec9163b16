use async_trait::async_trait;
use osm_conduit::errors::PipelineResult;
use osm_conduit::ordering::SharedOrdering;
use osm_conduit::sort::spill::{RunReader, RunWriter};
use osm_conduit::sort::{MemorySpillMedium, SortStage, SortState, SpillMedium};
use proptest::prelude::*;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

/// Records are (key, arrival index); the ordering only looks at the key.
type Keyed = (u8, usize);

fn by_key() -> SharedOrdering<Keyed> {
    Arc::new(|a: &Keyed, b: &Keyed| a.0.cmp(&b.0))
}

fn external_sort(keys: &[u8], buffer_size: usize) -> PipelineResult<(Vec<Keyed>, usize)> {
    tokio_test::block_on(async {
        let medium = Arc::new(MemorySpillMedium::new());
        let mut stage = SortStage::new(by_key(), buffer_size, medium.clone());
        for (index, key) in keys.iter().enumerate() {
            stage.append((*key, index)).await?;
        }

        let mut sorted = Vec::with_capacity(keys.len());
        while let Some(record) = stage.next().await? {
            sorted.push(record);
        }
        assert_eq!(stage.state(), SortState::Done);

        let spilled = stage.spilled_runs();
        stage.dispose().await;
        assert_eq!(medium.run_count(), 0);
        Ok((sorted, spilled))
    })
}

/// Memory medium remembering the most runs ever open for reading at once.
#[derive(Default)]
struct OpenRunTracker {
    inner: MemorySpillMedium,
    open: Arc<AtomicUsize>,
    peak: AtomicUsize,
}

struct TrackedReader {
    inner: RunReader,
    open: Arc<AtomicUsize>,
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncBufRead for TrackedReader {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().inner).poll_fill_buf(cx)
    }

    fn consume(mut self: Pin<&mut Self>, amt: usize) {
        Pin::new(&mut self.inner).consume(amt)
    }
}

#[async_trait]
impl SpillMedium for OpenRunTracker {
    async fn create_run(&self, run_id: &str) -> PipelineResult<Box<dyn RunWriter>> {
        self.inner.create_run(run_id).await
    }

    async fn read_run(&self, run_id: &str) -> PipelineResult<RunReader> {
        let inner = self.inner.read_run(run_id).await?;
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(TrackedReader {
            inner,
            open: self.open.clone(),
        }))
    }

    async fn dispose_run(&self, run_id: &str) -> PipelineResult<()> {
        self.inner.dispose_run(run_id).await
    }
}

/// Sorts with a bounded merge fan-in, returning the output and the most runs
/// that were open at once.
fn fan_in_sort(keys: &[u8], buffer_size: usize, max_fan_in: usize) -> PipelineResult<(Vec<Keyed>, usize)> {
    tokio_test::block_on(async {
        let medium = Arc::new(OpenRunTracker::default());
        let mut stage = SortStage::new(by_key(), buffer_size, medium.clone()).with_max_fan_in(max_fan_in);
        for (index, key) in keys.iter().enumerate() {
            stage.append((*key, index)).await?;
        }

        let mut sorted = Vec::with_capacity(keys.len());
        while let Some(record) = stage.next().await? {
            sorted.push(record);
        }
        stage.dispose().await;
        assert_eq!(medium.inner.run_count(), 0);
        assert_eq!(medium.open.load(Ordering::SeqCst), 0);
        Ok((sorted, medium.peak.load(Ordering::SeqCst)))
    })
}

fn stable_reference(keys: &[u8]) -> Vec<Keyed> {
    let mut expected: Vec<Keyed> = keys.iter().copied().zip(0..).collect();
    expected.sort_by_key(|record| record.0);
    expected
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sort_is_a_stable_ordered_permutation(
        keys in prop::collection::vec(0u8..8, 0..200),
        buffer_size in 1usize..40,
    ) {
        let (sorted, spilled) = external_sort(&keys, buffer_size).unwrap();

        prop_assert_eq!(sorted, stable_reference(&keys));
        prop_assert_eq!(spilled, keys.len() / buffer_size);
    }

    #[test]
    fn bounded_fan_in_limits_open_runs(
        keys in prop::collection::vec(0u8..8, 0..150),
        buffer_size in 1usize..6,
        max_fan_in in 2usize..6,
    ) {
        let (sorted, peak) = fan_in_sort(&keys, buffer_size, max_fan_in).unwrap();

        prop_assert_eq!(sorted, stable_reference(&keys));
        prop_assert!(peak <= max_fan_in, "{} runs open with a fan-in of {}", peak, max_fan_in);
    }

    #[test]
    fn output_independent_of_buffer_size(keys in prop::collection::vec(any::<u8>(), 1..120)) {
        let len = keys.len();
        let (unbuffered, _) = external_sort(&keys, len + 1).unwrap();

        for buffer_size in [1, len.saturating_sub(1).max(1), len, len * 3] {
            let (sorted, _) = external_sort(&keys, buffer_size).unwrap();
            prop_assert_eq!(&sorted, &unbuffered);
        }
    }
}
