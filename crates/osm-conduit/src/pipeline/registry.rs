//! Task factories and the registry resolving task types to them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{PipelineError, PipelineResult};
use crate::pipeline::task::Task;

/// Typed arguments of one task, as written in the pipeline definition.
///
/// Values may be given natively (`buffer_size = 5000`) or as strings
/// (`buffer_size = "5000"`); both are accepted wherever a number or boolean
/// is expected.
#[derive(Debug, Clone, Default)]
pub struct TaskArguments {
    task_id: String,
    values: toml::Table,
}

impl TaskArguments {
    pub fn new(task_id: impl Into<String>, values: toml::Table) -> Self {
        Self {
            task_id: task_id.into(),
            values,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn string(&self, name: &str) -> PipelineResult<Option<String>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(toml::Value::String(value)) => Ok(Some(value.clone())),
            Some(other) => Err(self.invalid(name, format!("expected a string, found {other}"))),
        }
    }

    pub fn string_or(&self, name: &str, default: &str) -> PipelineResult<String> {
        Ok(self.string(name)?.unwrap_or_else(|| default.to_string()))
    }

    pub fn required_path(&self, name: &str) -> PipelineResult<PathBuf> {
        self.string(name)?
            .map(PathBuf::from)
            .ok_or_else(|| self.invalid(name, "argument is required"))
    }

    pub fn usize_or(&self, name: &str, default: usize) -> PipelineResult<usize> {
        match self.values.get(name) {
            None => Ok(default),
            Some(toml::Value::Integer(value)) => usize::try_from(*value)
                .map_err(|_| self.invalid(name, format!("{value} is not a valid count"))),
            Some(toml::Value::String(value)) => value
                .trim()
                .parse()
                .map_err(|_| self.invalid(name, format!("'{value}' is not a valid count"))),
            Some(other) => Err(self.invalid(name, format!("expected an integer, found {other}"))),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> PipelineResult<bool> {
        match self.values.get(name) {
            None => Ok(default),
            Some(toml::Value::Boolean(value)) => Ok(*value),
            Some(toml::Value::String(value)) => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Ok(true),
                "false" | "no" => Ok(false),
                _ => Err(self.invalid(name, format!("'{value}' is not a boolean"))),
            },
            Some(other) => Err(self.invalid(name, format!("expected a boolean, found {other}"))),
        }
    }

    fn invalid(&self, name: &str, message: impl Into<String>) -> PipelineError {
        PipelineError::invalid_argument(&self.task_id, name, message)
    }
}

/// Pipe names given explicitly for a task's ports, in port order.
///
/// Ports beyond these lists are wired through the default pipe stack.
#[derive(Debug, Clone, Default)]
pub struct PipeBindings {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Everything a factory needs to build one task.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: String,
    pub args: TaskArguments,
    pub bindings: PipeBindings,
}

/// Builds tasks of one task type.
pub trait TaskFactory: Send + Sync {
    fn create_task(&self, context: TaskContext) -> PipelineResult<Box<dyn Task>>;
}

/// Maps task type names to factories.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    factories: HashMap<String, Arc<dyn TaskFactory>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`. The same factory may be registered
    /// under several names.
    ///
    /// # Errors
    /// Returns [`PipelineError::DuplicateTaskType`] if `name` is taken.
    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn TaskFactory>) -> PipelineResult<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(PipelineError::DuplicateTaskType { name });
        }

        debug!("Registered task type {}", name);
        self.factories.insert(name, factory);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> PipelineResult<Arc<dyn TaskFactory>> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownTaskType {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered task types in lexical order.
    pub fn task_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::task::{TaskIo, TaskPorts};
    use async_trait::async_trait;

    struct Idle;

    #[async_trait]
    impl Task for Idle {
        fn ports(&self) -> TaskPorts {
            TaskPorts::new()
        }

        async fn run(self: Box<Self>, _io: TaskIo) -> PipelineResult<()> {
            Ok(())
        }
    }

    struct IdleFactory;

    impl TaskFactory for IdleFactory {
        fn create_task(&self, _context: TaskContext) -> PipelineResult<Box<dyn Task>> {
            Ok(Box::new(Idle))
        }
    }

    fn args(source: &str) -> TaskArguments {
        let values: toml::Table = toml::from_str(source).expect("valid test arguments");
        TaskArguments::new("t1", values)
    }

    #[test]
    fn test_duplicate_registration_fails() -> PipelineResult<()> {
        let mut registry = TaskRegistry::new();
        registry.register("idle", Arc::new(IdleFactory))?;

        let err = registry.register("idle", Arc::new(IdleFactory)).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateTaskType { ref name } if name == "idle"));
        Ok(())
    }

    #[test]
    fn test_same_factory_under_two_names() -> PipelineResult<()> {
        let factory: Arc<dyn TaskFactory> = Arc::new(IdleFactory);
        let mut registry = TaskRegistry::new();
        registry.register("idle", factory.clone())?;
        registry.register("i", factory.clone())?;

        assert!(Arc::ptr_eq(&registry.resolve("idle")?, &registry.resolve("i")?));
        assert_eq!(registry.task_types(), vec!["i", "idle"]);
        Ok(())
    }

    #[test]
    fn test_unknown_type() {
        let registry = TaskRegistry::new();
        assert!(matches!(
            registry.resolve("missing"),
            Err(PipelineError::UnknownTaskType { .. })
        ));
    }

    #[test]
    fn test_argument_parsing() -> PipelineResult<()> {
        let args = args(
            r#"
buffer_size = 10
count = "3"
lock = "true"
file = "/data/planet.jsonl"
"#,
        );

        assert_eq!(args.usize_or("buffer_size", 1)?, 10);
        assert_eq!(args.usize_or("count", 2)?, 3);
        assert_eq!(args.usize_or("absent", 2)?, 2);
        assert!(args.bool_or("lock", false)?);
        assert_eq!(args.required_path("file")?, PathBuf::from("/data/planet.jsonl"));
        assert_eq!(args.string_or("type", "TypeThenId")?, "TypeThenId");
        Ok(())
    }

    #[test]
    fn test_argument_errors() {
        let args = args("buffer_size = -4\nlock = 3\n");

        assert!(matches!(
            args.usize_or("buffer_size", 1),
            Err(PipelineError::InvalidArgument { ref argument, .. }) if argument == "buffer_size"
        ));
        assert!(args.bool_or("lock", false).is_err());
        assert!(args.required_path("file").is_err());
    }
}
