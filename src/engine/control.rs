//! Run control: start, stop, pause, resume, reset, restart.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::types::{Event, Status, TaskId};

use super::Engine;
use super::runner::{RunnerContext, TaskHandle, run_task, runner_signals};

impl Engine {
    /// Start a run of a task
    ///
    /// The runner is spawned immediately and waits for a free worker slot
    /// before the task enters Running; this call never blocks on the pool.
    ///
    /// Returns false if the task is unknown, already Running, already active
    /// (waiting for a slot), or the engine is shutting down.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use scrape_engine::*;
    /// # async fn example(engine: Engine, id: TaskId) {
    /// if !engine.start_task(id).await {
    ///     eprintln!("task {} was not started", id);
    /// }
    /// # }
    /// ```
    pub async fn start_task(&self, id: TaskId) -> bool {
        let mut active = self.pool.active_runners.lock().await;

        // Checked under the active lock so shutdown never misses a new runner
        if !self.pool.accepting_new.load(Ordering::SeqCst) {
            tracing::debug!(task_id = id.0, "Engine shutting down, start rejected");
            return false;
        }
        if active.contains_key(&id) {
            tracing::debug!(task_id = id.0, "Task already active, start rejected");
            return false;
        }

        let config = {
            let tasks = self.tasks.read().await;
            match tasks.get(&id) {
                Some(task) if task.status.can_start() => task.config.clone(),
                Some(_) => {
                    tracing::debug!(task_id = id.0, "Task already running, start rejected");
                    return false;
                }
                None => return false,
            }
        };

        let (control, cancel, pause_rx, finished_tx) = runner_signals();
        active.insert(id, control);
        drop(active);

        let ctx = RunnerContext {
            id,
            handle: TaskHandle::new(id, Arc::clone(&self.tasks)),
            config,
            transport: Arc::clone(&self.transport),
            retry_policy: Arc::clone(&self.retry_policy),
            event_tx: self.event_tx.clone(),
            concurrent_limit: Arc::clone(&self.pool.concurrent_limit),
            active_runners: Arc::clone(&self.pool.active_runners),
            cancel,
            pause_rx,
            finished_tx,
        };
        tokio::spawn(run_task(ctx));

        tracing::debug!(task_id = id.0, "Task submitted");
        true
    }

    /// Start every task that is not Running or active
    ///
    /// Returns the number of tasks submitted.
    pub async fn start_all(&self) -> usize {
        let ids: Vec<TaskId> = {
            let tasks = self.tasks.read().await;
            let mut ids: Vec<TaskId> = tasks
                .values()
                .filter(|t| t.status.can_start())
                .map(|t| t.id)
                .collect();
            ids.sort();
            ids
        };

        let mut started = 0;
        for id in ids {
            if self.start_task(id).await {
                started += 1;
            }
        }
        tracing::info!(started, "Started all eligible tasks");
        started
    }

    /// Ask an active runner to stop at its next checkpoint
    ///
    /// Does not wait. An in-flight request is not interrupted; the runner
    /// notices the flag once it returns. False if the task is not active.
    pub async fn stop_task(&self, id: TaskId) -> bool {
        let active = self.pool.active_runners.lock().await;
        match active.get(&id) {
            Some(control) => {
                control.cancel.cancel();
                tracing::debug!(task_id = id.0, "Stop requested");
                true
            }
            None => false,
        }
    }

    /// Ask every active runner to stop; returns how many were signalled
    pub async fn stop_all(&self) -> usize {
        let active = self.pool.active_runners.lock().await;
        for control in active.values() {
            control.cancel.cancel();
        }
        tracing::info!(count = active.len(), "Stop requested for all active tasks");
        active.len()
    }

    /// Hold an active runner at its next checkpoint
    ///
    /// Progress is kept. False if the task is not active.
    pub async fn pause_task(&self, id: TaskId) -> bool {
        self.set_paused(id, true).await
    }

    /// Release a paused runner; false if the task is not active
    pub async fn resume_task(&self, id: TaskId) -> bool {
        self.set_paused(id, false).await
    }

    async fn set_paused(&self, id: TaskId, paused: bool) -> bool {
        let active = self.pool.active_runners.lock().await;
        match active.get(&id) {
            Some(control) => {
                control.pause.send_replace(paused);
                tracing::debug!(task_id = id.0, paused, "Pause flag updated");
                true
            }
            None => false,
        }
    }

    /// Return a task to Pending, clearing progress, result and error
    ///
    /// An active runner is stopped first and this call waits until it has
    /// finished. Returns false if the task is unknown.
    pub async fn reset_task(&self, id: TaskId) -> bool {
        loop {
            let mut finished = {
                let active = self.pool.active_runners.lock().await;
                match active.get(&id) {
                    Some(control) => {
                        control.cancel.cancel();
                        control.finished.clone()
                    }
                    None => {
                        let reset = {
                            let mut tasks = self.tasks.write().await;
                            match tasks.get_mut(&id) {
                                Some(task) => task.reset(),
                                None => return false,
                            }
                        };
                        drop(active);

                        if reset {
                            tracing::debug!(task_id = id.0, "Task reset");
                            self.emit_event(Event::Status {
                                id,
                                status: Status::Pending,
                            });
                            self.emit_event(Event::Progress { id, percent: 0 });
                        }
                        return reset;
                    }
                }
            };

            tracing::debug!(task_id = id.0, "Waiting for runner to finish before reset");
            if finished.wait_for(|done| *done).await.is_err() {
                tracing::warn!(task_id = id.0, "Runner went away without finishing, reset abandoned");
                return false;
            }
            // Loop: the task may have been started again in the meantime
        }
    }

    /// Reset a task and start it again; false if either step fails
    pub async fn restart_task(&self, id: TaskId) -> bool {
        self.reset_task(id).await && self.start_task(id).await
    }

    /// Whether a runner exists for this task (waiting for a slot or running)
    pub async fn is_active(&self, id: TaskId) -> bool {
        self.pool.active_runners.lock().await.contains_key(&id)
    }

    /// Ids of all active tasks, ordered
    pub async fn active_tasks(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .pool
            .active_runners
            .lock()
            .await
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }
}
