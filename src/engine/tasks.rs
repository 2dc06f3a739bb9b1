//! Task table commands: create, read, update, duplicate, remove, export.

use std::sync::atomic::Ordering;

use crate::config::{TaskConfig, TaskOptions};
use crate::error::{Error, Result};
use crate::types::{Event, Task, TaskId, TaskRecord};

use super::Engine;

impl Engine {
    /// Add a Pending task for `url`
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] / [`Error::Config`] when the URL, proxy or timeout is invalid
    /// - [`Error::ShuttingDown`] after [`shutdown`](Engine::shutdown)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use scrape_engine::*;
    /// # async fn example(engine: Engine) -> Result<()> {
    /// let id = engine
    ///     .create_task("https://example.com", TaskOptions::default())
    ///     .await?;
    /// engine.start_task(id).await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_task(&self, url: &str, options: TaskOptions) -> Result<TaskId> {
        self.insert_task(TaskConfig::new(url, options)).await
    }

    async fn insert_task(&self, config: TaskConfig) -> Result<TaskId> {
        if !self.pool.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        config.validate()?;

        let id = TaskId(self.next_task_id.fetch_add(1, Ordering::SeqCst));
        let url = config.url.clone();
        self.tasks.write().await.insert(id, Task::new(id, config));

        tracing::debug!(task_id = id.0, url = %url, "Task created");
        self.emit_event(Event::Created { id, url });
        Ok(id)
    }

    /// Snapshot of one task
    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.tasks.read().await.get(&id).cloned()
    }

    /// Snapshot of every task, ordered by id
    pub async fn list_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    /// Replace the configuration of a task that is not active
    ///
    /// Returns false if the task is unknown, active (running or waiting for a
    /// slot) or the new configuration is invalid.
    pub async fn update_task_config(&self, id: TaskId, config: TaskConfig) -> bool {
        if let Err(e) = config.validate() {
            tracing::warn!(task_id = id.0, error = %e, "Rejected invalid task configuration");
            return false;
        }

        let active = self.pool.active_runners.lock().await;
        if active.contains_key(&id) {
            tracing::debug!(task_id = id.0, "Cannot update configuration of an active task");
            return false;
        }

        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&id) {
            Some(task) if task.status.can_start() => {
                task.config = config;
                true
            }
            _ => false,
        }
    }

    /// Create a new Pending task with a copy of another task's configuration
    pub async fn duplicate_task(&self, id: TaskId) -> Option<TaskId> {
        let config = self.tasks.read().await.get(&id)?.config.clone();
        match self.insert_task(config).await {
            Ok(new_id) => {
                tracing::debug!(task_id = id.0, new_task_id = new_id.0, "Task duplicated");
                Some(new_id)
            }
            Err(e) => {
                tracing::warn!(task_id = id.0, error = %e, "Failed to duplicate task");
                None
            }
        }
    }

    /// Delete a task, asking its runner to stop first if it is active
    ///
    /// The runner keeps its slot until it emits `Finished`. Its remaining
    /// writes to the deleted task are dropped, and once it notices the task is
    /// gone `Finished` is the only event it still publishes. Returns false if
    /// unknown.
    pub async fn remove_task(&self, id: TaskId) -> bool {
        let removed = {
            let active = self.pool.active_runners.lock().await;
            if let Some(control) = active.get(&id) {
                control.cancel.cancel();
            }
            self.tasks.write().await.remove(&id).is_some()
        };

        if removed {
            tracing::debug!(task_id = id.0, "Task removed");
            self.emit_event(Event::Removed { id });
        }
        removed
    }

    /// Export row for one task
    pub async fn record(&self, id: TaskId) -> Option<TaskRecord> {
        self.tasks.read().await.get(&id).map(TaskRecord::from)
    }

    /// Export rows for every task, ordered by id
    pub async fn records(&self) -> Vec<TaskRecord> {
        self.list_tasks().await.iter().map(TaskRecord::from).collect()
    }
}
