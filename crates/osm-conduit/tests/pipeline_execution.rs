mod common;

use common::{
    CountingMedium, DelayedSourceFactory, FailingSourceFactory, ascending_orderings, integer_registry,
    memory_medium,
};
use osm_conduit::errors::PipelineError;
use osm_conduit::pipeline::{PipelineAssembler, PipelineRuntime, TaskSpec, TaskStatus};
use osm_conduit::sort::{FileSpillMedium, SpillMedium};
use osm_conduit::tasks::{CollectingSinkFactory, MergeTaskFactory, SortTaskFactory, TeeTaskFactory};
use rstest::rstest;
use spill_file_manager::SpillDirectory;
use std::sync::Arc;
use std::time::Duration;

fn sort_chain(buffer_size: i64) -> Vec<TaskSpec> {
    vec![
        TaskSpec::new("source", "source"),
        TaskSpec::new("sort", "sort").arg("buffer_size", buffer_size),
        TaskSpec::new("sink", "collect"),
    ]
}

/// Spill files on disk, ignoring the namespace lock file.
fn file_count(path: &std::path::Path) -> usize {
    std::fs::read_dir(path)
        .unwrap()
        .filter(|entry| !entry.as_ref().unwrap().file_name().to_string_lossy().starts_with('.'))
        .count()
}

#[tokio::test]
async fn test_sort_without_spill() {
    let medium = Arc::new(CountingMedium::new(memory_medium()));
    let (registry, collected) = integer_registry(vec![5, 3, 4, 1, 2], medium.clone());

    let pipeline = PipelineAssembler::new(&registry, 16)
        .assemble(&sort_chain(100))
        .unwrap();
    assert_eq!(pipeline.task_order(), vec!["source", "sort", "sink"]);

    let report = PipelineRuntime::new().execute(pipeline).await.unwrap();

    assert_eq!(collected.records(), vec![1, 2, 3, 4, 5]);
    assert!(collected.completed());
    assert_eq!(medium.writes(), 0);
    assert!(report.succeeded());
    assert_eq!(report.tasks.len(), 3);
    assert!(report.pipes.iter().all(|pipe| pipe.records == 5 && pipe.end_of_stream));
}

#[tokio::test]
async fn test_sort_with_two_spills() {
    let medium = Arc::new(CountingMedium::new(memory_medium()));
    let (registry, collected) = integer_registry(vec![5, 3, 4, 1, 2], medium.clone());

    let pipeline = PipelineAssembler::new(&registry, 16)
        .assemble(&sort_chain(2))
        .unwrap();
    PipelineRuntime::new().execute(pipeline).await.unwrap();

    assert_eq!(collected.records(), vec![1, 2, 3, 4, 5]);
    assert_eq!(medium.writes(), 2);
}

#[rstest]
#[case::one_record_runs(1)]
#[case::below_input_size(3)]
#[case::equal_to_input_size(7)]
#[case::above_input_size(8)]
#[case::far_above_input_size(1000)]
#[tokio::test]
async fn test_output_independent_of_buffer_size(#[case] buffer_size: i64) {
    let (registry, collected) = integer_registry(vec![9, -1, 4, 4, 0, 12, 3], memory_medium());

    let pipeline = PipelineAssembler::new(&registry, 2)
        .assemble(&sort_chain(buffer_size))
        .unwrap();
    PipelineRuntime::new().execute(pipeline).await.unwrap();

    assert_eq!(collected.records(), vec![-1, 0, 3, 4, 4, 9, 12]);
}

#[tokio::test]
async fn test_source_failure_reaches_sink() {
    let (mut registry, collected) = integer_registry(Vec::new(), memory_medium());
    registry
        .register(
            "failing-source",
            Arc::new(FailingSourceFactory {
                records: vec![5, 3],
                gate: None,
            }),
        )
        .unwrap();

    let specs = vec![
        TaskSpec::new("source", "failing-source"),
        TaskSpec::new("sink", "collect"),
    ];
    let pipeline = PipelineAssembler::new(&registry, 16).assemble(&specs).unwrap();
    let outcome = PipelineRuntime::new().run(pipeline).await;

    assert!(!collected.completed());
    assert!(collected.failure().is_some());
    assert!(collected.records().len() <= 2);

    let error = outcome.error.unwrap();
    assert!(matches!(
        error,
        PipelineError::TaskFailed { ref task_id, ref source }
            if task_id == "source" && matches!(**source, PipelineError::Io(_))
    ));
    assert!(matches!(
        outcome.report.task("source").unwrap().status,
        TaskStatus::Failed(_)
    ));
    assert_ne!(outcome.report.task("sink").unwrap().status, TaskStatus::Completed);
    assert!(!outcome.report.succeeded());
}

#[tokio::test]
async fn test_sort_never_emits_a_truncated_stream() {
    let (mut registry, collected) = integer_registry(Vec::new(), memory_medium());
    registry
        .register(
            "failing-source",
            Arc::new(FailingSourceFactory {
                records: vec![5, 3, 4],
                gate: None,
            }),
        )
        .unwrap();

    let specs = vec![
        TaskSpec::new("source", "failing-source"),
        TaskSpec::new("sort", "sort"),
        TaskSpec::new("sink", "collect"),
    ];
    let pipeline = PipelineAssembler::new(&registry, 16).assemble(&specs).unwrap();
    let error = PipelineRuntime::new().execute(pipeline).await.unwrap_err();

    assert!(matches!(error, PipelineError::TaskFailed { ref task_id, .. } if task_id == "source"));
    assert!(collected.records().is_empty());
    assert!(!collected.completed());
}

#[tokio::test]
async fn test_spill_files_removed_after_success() {
    let temp_dir = tempfile::tempdir().unwrap();
    let directory = SpillDirectory::builder()
        .base_directory(temp_dir.path())
        .build()
        .await
        .unwrap();
    let medium = Arc::new(CountingMedium::new(Arc::new(FileSpillMedium::new(directory.clone()))));
    let (registry, collected) = integer_registry(vec![8, 6, 7, 5, 3, 0, 9], medium.clone());

    let pipeline = PipelineAssembler::new(&registry, 4)
        .assemble(&sort_chain(2))
        .unwrap();
    PipelineRuntime::new().execute(pipeline).await.unwrap();

    assert_eq!(collected.records(), vec![0, 3, 5, 6, 7, 8, 9]);
    assert_eq!(medium.writes(), 3);
    assert_eq!(file_count(directory.base_directory()), 0);
}

#[tokio::test]
async fn test_many_spilled_runs_merge_within_fan_in() {
    let temp_dir = tempfile::tempdir().unwrap();
    let directory = SpillDirectory::builder()
        .base_directory(temp_dir.path())
        .build()
        .await
        .unwrap();
    let medium = Arc::new(CountingMedium::new(Arc::new(FileSpillMedium::new(directory.clone()))));
    let (mut registry, collected) = integer_registry((0..2200).rev().collect(), medium.clone());
    registry
        .register(
            "narrow-sort",
            Arc::new(SortTaskFactory::new(ascending_orderings(), 1, medium.clone()).with_max_merge_fan_in(8)),
        )
        .unwrap();

    let specs = vec![
        TaskSpec::new("source", "source"),
        TaskSpec::new("sort", "narrow-sort"),
        TaskSpec::new("sink", "collect"),
    ];
    let pipeline = PipelineAssembler::new(&registry, 16).assemble(&specs).unwrap();
    PipelineRuntime::new().execute(pipeline).await.unwrap();

    assert_eq!(collected.records(), (0..2200).collect::<Vec<i64>>());
    assert!(medium.writes() > 2200);
    assert_eq!(file_count(directory.base_directory()), 0);
}

#[tokio::test]
async fn test_spill_files_removed_after_failure() {
    let temp_dir = tempfile::tempdir().unwrap();
    let directory = SpillDirectory::builder()
        .base_directory(temp_dir.path())
        .build()
        .await
        .unwrap();
    let medium = Arc::new(CountingMedium::new(Arc::new(FileSpillMedium::new(directory.clone()))));
    let shared: Arc<dyn SpillMedium> = medium.clone();
    let (mut registry, collected) = integer_registry(Vec::new(), shared);
    registry
        .register(
            "failing-source",
            Arc::new(FailingSourceFactory {
                records: vec![5, 3, 4, 1, 2],
                gate: Some((medium.clone(), 2)),
            }),
        )
        .unwrap();

    let specs = vec![
        TaskSpec::new("source", "failing-source"),
        TaskSpec::new("sort", "sort").arg("buffer_size", 2),
        TaskSpec::new("sink", "collect"),
    ];
    let pipeline = PipelineAssembler::new(&registry, 16).assemble(&specs).unwrap();
    let outcome = PipelineRuntime::new().run(pipeline).await;

    assert!(outcome.error.is_some());
    assert_eq!(medium.writes(), 2);
    assert_eq!(file_count(directory.base_directory()), 0);
    assert!(collected.records().is_empty());
}

#[tokio::test]
async fn test_merge_waits_for_every_input() {
    let (mut registry, collected) = integer_registry(vec![1, 4, 6], memory_medium());
    registry
        .register(
            "late-source",
            Arc::new(DelayedSourceFactory {
                records: vec![2, 3, 5],
                delay: Duration::from_millis(50),
            }),
        )
        .unwrap();
    registry
        .register("merge", Arc::new(MergeTaskFactory::new(ascending_orderings())))
        .unwrap();

    let specs = vec![
        TaskSpec::new("early", "source").output("early"),
        TaskSpec::new("late", "late-source").output("late"),
        TaskSpec::new("merge", "merge").input("early").input("late"),
        TaskSpec::new("sink", "collect"),
    ];
    let pipeline = PipelineAssembler::new(&registry, 16).assemble(&specs).unwrap();
    let report = PipelineRuntime::new().execute(pipeline).await.unwrap();

    assert_eq!(collected.records(), vec![1, 2, 3, 4, 5, 6]);
    assert!(report.task("merge").unwrap().duration >= Duration::from_millis(40));
}

#[tokio::test]
async fn test_tee_feeds_named_branches() {
    let (mut registry, sorted) = integer_registry(vec![3, 1, 2], memory_medium());
    let raw_sink = CollectingSinkFactory::<i64>::new();
    let raw = raw_sink.collected();
    registry.register("collect-raw", Arc::new(raw_sink)).unwrap();
    registry
        .register("tee", Arc::new(TeeTaskFactory::<i64>::new()))
        .unwrap();

    let specs = vec![
        TaskSpec::new("source", "source"),
        TaskSpec::new("tee", "tee").output("to-sort").output("to-raw"),
        TaskSpec::new("raw", "collect-raw").input("to-raw"),
        TaskSpec::new("sort", "sort").input("to-sort"),
        TaskSpec::new("sorted", "collect"),
    ];
    let pipeline = PipelineAssembler::new(&registry, 16).assemble(&specs).unwrap();
    let report = PipelineRuntime::new().execute(pipeline).await.unwrap();

    assert_eq!(raw.records(), vec![3, 1, 2]);
    assert_eq!(sorted.records(), vec![1, 2, 3]);
    assert_eq!(report.pipe("to-raw").unwrap().reader, "raw");
    assert_eq!(report.pipe("to-sort").unwrap().records, 3);
}

#[tokio::test]
async fn test_cancellation_stops_every_task() {
    let (mut registry, collected) = integer_registry(Vec::new(), memory_medium());
    registry
        .register(
            "late-source",
            Arc::new(DelayedSourceFactory {
                records: vec![1, 2, 3],
                delay: Duration::from_secs(30),
            }),
        )
        .unwrap();

    let specs = vec![
        TaskSpec::new("source", "late-source"),
        TaskSpec::new("sink", "collect"),
    ];
    let pipeline = PipelineAssembler::new(&registry, 16).assemble(&specs).unwrap();
    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let outcome = tokio::time::timeout(Duration::from_secs(5), PipelineRuntime::new().run(pipeline))
        .await
        .unwrap();

    assert!(matches!(outcome.error, Some(ref e) if e.is_cancellation()));
    assert_eq!(outcome.report.task("sink").unwrap().status, TaskStatus::Cancelled);
    assert!(collected.records().is_empty());
}
