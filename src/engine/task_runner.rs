//! # Task Runner
//!
//! Runs an ordered list of named sync steps against a shared, mutable
//! context. The first failing step stops the run and its error is wrapped
//! with the step name.
//!
//! Steps are registered as closures returning a boxed future, which keeps the
//! runner independent of the resource kind it drives:
//!
//! ```rust,ignore
//! let mut runner = TaskRunner::new("backend");
//! runner.add_task("SyncMethods", |ctx| sync_methods(ctx).boxed());
//! runner.run(&mut ctx).await?;
//! ```

use crate::engine::SyncError;
use futures::future::BoxFuture;
use std::fmt;
use tracing::{debug, warn};

type Step<'a, C> =
    Box<dyn for<'c> FnOnce(&'c mut C) -> BoxFuture<'c, Result<(), SyncError>> + Send + 'a>;

/// Ordered list of named steps sharing a context of type `C`
pub struct TaskRunner<'a, C> {
    name: String,
    tasks: Vec<(String, Step<'a, C>)>,
}

impl<C> fmt::Debug for TaskRunner<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("name", &self.name)
            .field("tasks", &self.task_names())
            .finish()
    }
}

impl<C> TaskRunner<'_, C> {
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl<'a, C: Send> TaskRunner<'a, C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    /// Append a step. Steps run in registration order.
    pub fn add_task<F>(&mut self, name: impl Into<String>, step: F) -> &mut Self
    where
        F: for<'c> FnOnce(&'c mut C) -> BoxFuture<'c, Result<(), SyncError>> + Send + 'a,
    {
        self.tasks.push((name.into(), Box::new(step)));
        self
    }

    /// Run every step in order, stopping at the first failure
    ///
    /// An empty runner succeeds immediately.
    pub async fn run(self, ctx: &mut C) -> Result<(), SyncError> {
        let runner = self.name;
        for (task, step) in self.tasks {
            debug!(runner = %runner, task = %task, "running task");
            if let Err(source) = step(ctx).await {
                warn!(runner = %runner, task = %task, error = %source, "task failed");
                return Err(SyncError::Task {
                    task,
                    source: Box::new(source),
                });
            }
        }
        Ok(())
    }
}
