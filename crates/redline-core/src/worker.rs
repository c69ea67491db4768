//! Worker trait and capability routing
//!
//! A worker declares the task types it accepts; the registry keeps the
//! declared sets disjoint so routing is unambiguous.

use crate::context::AnalysisContext;
use crate::error::{RegistryError, WorkerError};
use async_trait::async_trait;
use redline_kernel::TaskType;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A pipeline stage implementation
#[async_trait]
pub trait Worker: Send + Sync {
    /// Worker name, recorded in events and context errors
    fn name(&self) -> &str;

    /// Task types this worker accepts
    fn supported_tasks(&self) -> &[TaskType];

    /// Whether this worker accepts `task_type`
    fn supports(&self, task_type: TaskType) -> bool {
        self.supported_tasks().contains(&task_type)
    }

    /// Transform the context
    ///
    /// Partial failures belong in `context.errors`; an `Err` means the whole
    /// task failed and the returned context is discarded.
    async fn process(&self, context: AnalysisContext) -> Result<AnalysisContext, WorkerError>;
}

/// Worker built from an async closure
pub struct FnWorker<F> {
    name: String,
    tasks: Vec<TaskType>,
    f: F,
}

impl<F> FnWorker<F> {
    /// Create a worker named `name` accepting `tasks`
    pub fn new(name: impl Into<String>, tasks: impl IntoIterator<Item = TaskType>, f: F) -> Self {
        Self {
            name: name.into(),
            tasks: tasks.into_iter().collect(),
            f,
        }
    }
}

impl<F> fmt::Debug for FnWorker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWorker")
            .field("name", &self.name)
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Worker for FnWorker<F>
where
    F: Fn(AnalysisContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<AnalysisContext, WorkerError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_tasks(&self) -> &[TaskType] {
        &self.tasks
    }

    async fn process(&self, context: AnalysisContext) -> Result<AnalysisContext, WorkerError> {
        (self.f)(context).await
    }
}

/// Registered workers in registration order
#[derive(Default)]
pub struct WorkerRegistry {
    workers: Vec<Arc<dyn Worker>>,
}

impl WorkerRegistry {
    /// Create an empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker
    ///
    /// # Errors
    /// - [`RegistryError::DuplicateName`] if the name is taken
    /// - [`RegistryError::OverlappingCapability`] if any declared task type
    ///   already belongs to another worker
    pub fn register(&mut self, worker: Arc<dyn Worker>) -> Result<(), RegistryError> {
        if self.workers.iter().any(|w| w.name() == worker.name()) {
            return Err(RegistryError::DuplicateName(worker.name().to_string()));
        }
        for &task_type in worker.supported_tasks() {
            if let Some(existing) = self.route(task_type) {
                return Err(RegistryError::OverlappingCapability {
                    worker: worker.name().to_string(),
                    existing: existing.name().to_string(),
                    task_type,
                });
            }
        }
        tracing::debug!(
            worker = worker.name(),
            tasks = ?worker.supported_tasks(),
            "Registered worker"
        );
        self.workers.push(worker);
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, worker: impl Worker + 'static) -> Result<Self, RegistryError> {
        self.register(Arc::new(worker))?;
        Ok(self)
    }

    /// First worker accepting `task_type`
    #[must_use]
    pub fn route(&self, task_type: TaskType) -> Option<Arc<dyn Worker>> {
        self.workers
            .iter()
            .find(|w| w.supports(task_type))
            .map(Arc::clone)
    }

    /// Task types no registered worker accepts
    #[must_use]
    pub fn uncovered(&self) -> Vec<TaskType> {
        TaskType::ALL
            .into_iter()
            .filter(|&t| self.route(t).is_none())
            .collect()
    }

    /// Worker names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.name()).collect()
    }

    /// Number of workers
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no worker is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("workers", &self.names())
            .finish()
    }
}
