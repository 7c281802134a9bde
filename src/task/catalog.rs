//! Task Catalog
//!
//! Name to constructor registry. Names are matched case-insensitively.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::exec::{ExecMoveTask, ExecTask};
use super::fs::{CopyTask, DeleteTask, MoveTask, ValidFilePathTask};
use super::log::LogTask;
use super::{DelayTask, Task, TaskError};

/// Builds a task from its substituted argument and delay budget
pub type TaskFactory = Arc<dyn Fn(&str, u64) -> Result<Box<dyn Task>, TaskError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct TaskCatalog {
    factories: HashMap<String, TaskFactory>,
}

impl fmt::Debug for TaskCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCatalog")
            .field("kinds", &self.names())
            .finish()
    }
}

impl TaskCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in task kind
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.register("LOG", |arg: &str, delay: u64| {
            Ok(Box::new(LogTask::new(arg, delay)) as Box<dyn Task>)
        });
        catalog.register("MOVE", |arg: &str, _delay: u64| {
            Ok(Box::new(MoveTask::into_dir(required("MOVE", arg)?)) as Box<dyn Task>)
        });
        catalog.register("MOVERENAME", |arg: &str, _delay: u64| {
            Ok(Box::new(MoveTask::to_path(required("MOVERENAME", arg)?)) as Box<dyn Task>)
        });
        catalog.register("COPY", |arg: &str, _delay: u64| {
            Ok(Box::new(CopyTask::into_dir(required("COPY", arg)?)) as Box<dyn Task>)
        });
        catalog.register("COPYRENAME", |arg: &str, _delay: u64| {
            Ok(Box::new(CopyTask::to_path(required("COPYRENAME", arg)?)) as Box<dyn Task>)
        });
        catalog.register("DELETE", |_arg: &str, _delay: u64| {
            Ok(Box::new(DeleteTask) as Box<dyn Task>)
        });
        catalog.register("VALIDFILEPATH", |arg: &str, _delay: u64| {
            Ok(Box::new(ValidFilePathTask::new(required("VALIDFILEPATH", arg)?)) as Box<dyn Task>)
        });
        catalog.register("EXEC", |arg: &str, delay: u64| {
            Ok(Box::new(ExecTask::new(required("EXEC", arg)?, delay)) as Box<dyn Task>)
        });
        catalog.register("EXECMOVE", |arg: &str, delay: u64| {
            Ok(Box::new(ExecMoveTask::new(required("EXECMOVE", arg)?, delay)) as Box<dyn Task>)
        });
        catalog.register("DELAY", |_arg: &str, delay: u64| {
            Ok(Box::new(DelayTask::new(delay)) as Box<dyn Task>)
        });
        catalog
    }

    /// Register or replace a task kind
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&str, u64) -> Result<Box<dyn Task>, TaskError> + Send + Sync + 'static,
    {
        self.factories
            .insert(name.to_ascii_uppercase(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_uppercase())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a single-use task
    pub fn create(
        &self,
        task_type: &str,
        argument: &str,
        delay: u64,
    ) -> Result<Box<dyn Task>, TaskError> {
        let factory = self
            .factories
            .get(&task_type.trim().to_ascii_uppercase())
            .ok_or_else(|| TaskError::UnknownTask(task_type.to_string()))?;
        factory(argument, delay)
    }
}

fn required<'a>(task: &str, argument: &'a str) -> Result<&'a str, TaskError> {
    let trimmed = argument.trim();
    if trimmed.is_empty() {
        return Err(TaskError::InvalidArgument {
            task: task.to_string(),
            reason: "argument must not be empty".to_string(),
        });
    }
    Ok(trimmed)
}
