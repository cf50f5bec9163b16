mod common;

use common::{integer_registry, memory_medium};
use osm_conduit::errors::PipelineError;
use osm_conduit::pipeline::{PipelineAssembler, PipelineDefinition, TaskRegistry, TaskSpec};
use osm_conduit::tasks::{BuiltinSettings, CollectingSinkFactory, register_builtins};
use std::sync::Arc;

fn registry() -> TaskRegistry {
    let (mut registry, _) = integer_registry(vec![1, 2, 3], memory_medium());
    registry
        .register("collect-text", Arc::new(CollectingSinkFactory::<String>::new()))
        .unwrap();
    registry
}

fn assemble(specs: &[TaskSpec]) -> Result<Vec<String>, PipelineError> {
    let registry = registry();
    PipelineAssembler::new(&registry, 8)
        .assemble(specs)
        .map(|pipeline| pipeline.task_order().into_iter().map(str::to_string).collect())
}

#[test]
fn test_rejects_two_writers() {
    let err = assemble(&[
        TaskSpec::new("a", "source").output("shared"),
        TaskSpec::new("b", "source").output("shared"),
        TaskSpec::new("sink", "collect").input("shared"),
    ])
    .unwrap_err();

    assert!(matches!(err, PipelineError::PipeBinding { ref message } if message.contains("two writers")));
    assert!(err.is_configuration());
}

#[test]
fn test_rejects_pipe_without_reader() {
    let err = assemble(&[TaskSpec::new("source", "source")]).unwrap_err();
    assert!(matches!(err, PipelineError::PipeBinding { ref message } if message.contains("no reader")));

    let err = assemble(&[
        TaskSpec::new("source", "source").output("orphan"),
        TaskSpec::new("other", "source"),
        TaskSpec::new("sink", "collect"),
    ])
    .unwrap_err();
    assert!(matches!(err, PipelineError::PipeBinding { ref message } if message.contains("orphan")));
}

#[test]
fn test_rejects_two_readers() {
    let err = assemble(&[
        TaskSpec::new("source", "source").output("raw"),
        TaskSpec::new("first", "collect").input("raw"),
        TaskSpec::new("second", "collect").input("raw"),
    ])
    .unwrap_err();

    assert!(matches!(err, PipelineError::PipeBinding { ref message } if message.contains("more than one reader")));
}

#[test]
fn test_rejects_record_type_mismatch() {
    let err = assemble(&[
        TaskSpec::new("source", "source"),
        TaskSpec::new("sink", "collect-text"),
    ])
    .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::PipeTypeMismatch { ref writer, ref reader, .. }
            if *writer == "i64" && reader.contains("String")
    ));
}

#[test]
fn test_rejects_unresolved_reference() {
    let err = assemble(&[TaskSpec::new("sink", "collect").input("missing")]).unwrap_err();
    assert!(matches!(err, PipelineError::PipeBinding { ref message } if message.contains("no writer")));
}

#[test]
fn test_rejects_missing_default_pipe() {
    let err = assemble(&[TaskSpec::new("sink", "collect")]).unwrap_err();
    assert!(matches!(err, PipelineError::PipeBinding { ref message } if message.contains("no default pipe")));
}

#[test]
fn test_rejects_extra_bindings() {
    let err = assemble(&[
        TaskSpec::new("source", "source").output("a").output("b"),
        TaskSpec::new("sink", "collect").input("a"),
    ])
    .unwrap_err();
    assert!(matches!(err, PipelineError::PipeBinding { .. }));
}

#[test]
fn test_rejects_duplicate_task_ids() {
    let err = assemble(&[
        TaskSpec::new("dup", "source"),
        TaskSpec::new("dup", "collect"),
    ])
    .unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateTaskId { ref task_id } if task_id == "dup"));
}

#[test]
fn test_rejects_reserved_pipe_names() {
    let err = assemble(&[
        TaskSpec::new("a", "source"),
        TaskSpec::new("b", "source").output("#default-0"),
        TaskSpec::new("sink", "collect").input("#default-0"),
    ])
    .unwrap_err();

    assert!(matches!(err, PipelineError::PipeBinding { ref message } if message.contains("reserved")));
    assert!(!err.to_string().contains("two writers"));
}

#[test]
fn test_rejects_cycles() {
    let err = assemble(&[
        TaskSpec::new("left", "sort").input("back").output("forth"),
        TaskSpec::new("right", "sort").input("forth").output("back"),
    ])
    .unwrap_err();

    let PipelineError::CyclicGraph { tasks } = err else {
        panic!("expected a cycle, got {err:?}");
    };
    assert_eq!(tasks.len(), 2);
}

#[test]
fn test_rejects_unknown_task_type() {
    let err = assemble(&[TaskSpec::new("x", "frobnicate")]).unwrap_err();
    assert!(matches!(err, PipelineError::UnknownTaskType { ref name } if name == "frobnicate"));
}

#[test]
fn test_forward_references_are_ordered() {
    let order = assemble(&[
        TaskSpec::new("sink", "collect").input("sorted"),
        TaskSpec::new("sort", "sort").input("raw").output("sorted"),
        TaskSpec::new("source", "source").output("raw"),
    ])
    .unwrap();

    assert_eq!(order, vec!["source", "sort", "sink"]);
}

#[test]
fn test_builtin_definition_assembles() {
    let mut registry = TaskRegistry::new();
    register_builtins(
        &mut registry,
        &BuiltinSettings {
            sort_buffer_records: 10,
            spill_medium: memory_medium(),
            max_merge_fan_in: 8,
        },
    )
    .unwrap();

    let definition = PipelineDefinition::from_toml_str(
        r#"
[[task]]
id = "read"
type = "rj"
args = { file = "planet.jsonl" }

[[task]]
id = "tee"
type = "tee"
outputs = ["left", "right"]

[[task]]
id = "sort-left"
type = "s"
args = { type = "TypeThenIdThenVersion" }
inputs = ["left"]
outputs = ["sorted-left"]

[[task]]
id = "sort-right"
type = "sort"
inputs = ["right"]
outputs = ["sorted-right"]

[[task]]
id = "merge"
type = "merge"
inputs = ["sorted-left", "sorted-right"]

[[task]]
id = "write"
type = "write-jsonl"
args = { file = "out.jsonl" }
"#,
    )
    .unwrap();

    let pipeline = PipelineAssembler::new(&registry, 8)
        .assemble(&definition.tasks)
        .unwrap();
    assert_eq!(pipeline.pipes().len(), 6);
    assert_eq!(pipeline.task_order().first().copied(), Some("read"));
    assert_eq!(pipeline.task_order().last().copied(), Some("write"));

    let mismatch = PipelineDefinition::from_toml_str(
        r#"
[[task]]
id = "read"
type = "read-change-jsonl"
args = { file = "changes.jsonl" }

[[task]]
id = "write"
type = "write-jsonl"
args = { file = "out.jsonl" }
"#,
    )
    .unwrap();
    let err = PipelineAssembler::new(&registry, 8)
        .assemble(&mismatch.tasks)
        .unwrap_err();
    assert!(matches!(err, PipelineError::PipeTypeMismatch { .. }));
}
