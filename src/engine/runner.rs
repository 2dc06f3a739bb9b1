//! Task runner. Drives one run of one task from start to a terminal state.
//!
//! Phases:
//! 1. Wait for a pool slot (or a stop request)
//! 2. Enter Running
//! 3. Attempt loop with stop/pause checkpoints and backoff
//! 4. Finalize Done / Failed / Stopped
//! 5. Leave the active set and emit `Finished`

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::{Mutex, Semaphore, broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::config::TaskConfig;
use crate::error::FetchError;
use crate::fetch::Transport;
use crate::retry::{RetryDecision, RetryPolicy, wait_backoff};
use crate::types::{Event, FetchOutcome, LogLevel, Status, Task, TaskId};

use super::{RunnerControl, TaskTable};

/// Message stored when a run dies of an unexpected fault
const INTERNAL_ERROR_MESSAGE: &str = "internal error while running task";

/// Narrow write handle onto one entry of the task table
#[derive(Clone)]
pub(crate) struct TaskHandle {
    id: TaskId,
    tasks: TaskTable,
    removed: Arc<AtomicBool>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId, tasks: TaskTable) -> Self {
        Self {
            id,
            tasks,
            removed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Apply `f` to the task; `None` if it was removed
    pub(crate) async fn update<R>(&self, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
        let mut tasks = self.tasks.write().await;
        let result = tasks.get_mut(&self.id).map(f);
        if result.is_none() {
            self.removed.store(true, Ordering::SeqCst);
        }
        result
    }

    /// True once an update found the task gone from the table
    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}

/// Everything a single run needs, moved into its spawned future
pub(crate) struct RunnerContext {
    pub(crate) id: TaskId,
    pub(crate) handle: TaskHandle,
    /// Snapshot of the configuration taken at start
    pub(crate) config: TaskConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) retry_policy: Arc<RetryPolicy>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) concurrent_limit: Arc<Semaphore>,
    pub(crate) active_runners: Arc<Mutex<HashMap<TaskId, RunnerControl>>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) pause_rx: watch::Receiver<bool>,
    pub(crate) finished_tx: watch::Sender<bool>,
}

/// Signals handed to the engine's active set for a new runner, plus the
/// runner-side ends
pub(crate) fn runner_signals() -> (
    RunnerControl,
    CancellationToken,
    watch::Receiver<bool>,
    watch::Sender<bool>,
) {
    let cancel = CancellationToken::new();
    let (pause_tx, pause_rx) = watch::channel(false);
    let (finished_tx, finished_rx) = watch::channel(false);
    let control = RunnerControl {
        cancel: cancel.clone(),
        pause: pause_tx,
        finished: finished_rx,
    };
    (control, cancel, pause_rx, finished_tx)
}

/// Run one task to completion. Never panics out; always emits `Finished`.
pub(crate) async fn run_task(mut ctx: RunnerContext) {
    let id = ctx.id;

    // Phase 1: wait for a pool slot unless stopped first
    let permit = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => None,
        permit = ctx.concurrent_limit.clone().acquire_owned() => permit.ok(),
    };

    match permit {
        Some(permit) => {
            let outcome = AssertUnwindSafe(ctx.execute_run()).catch_unwind().await;
            if outcome.is_err() {
                tracing::error!(task_id = id.0, "Runner panicked, marking task failed");
                ctx.finalize_failed(INTERNAL_ERROR_MESSAGE).await;
            }
            drop(permit);
        }
        None => {
            tracing::debug!(task_id = id.0, "Stopped while waiting for a worker slot");
            ctx.handle.update(|t| t.cancel_queued()).await;
            ctx.log(LogLevel::Info, "Stopped before start".to_string());
            ctx.emit(Event::Status {
                id,
                status: Status::Stopped,
            });
        }
    }

    // Phase 5: leave the active set and announce the end of the run together.
    // Finished goes out even for a removed task so waiters are released.
    let mut active = ctx.active_runners.lock().await;
    active.remove(&id);
    ctx.event_tx.send(Event::Finished { id }).ok();
    drop(active);
    ctx.finished_tx.send_replace(true);
}

impl RunnerContext {
    /// Phases 2-4
    async fn execute_run(&mut self) {
        let run_started = Instant::now();

        match self.handle.update(|t| t.begin_run()).await {
            Some(true) => {}
            Some(false) => {
                tracing::warn!(task_id = self.id.0, "Task already running, run abandoned");
                return;
            }
            None => {
                tracing::debug!(task_id = self.id.0, "Task removed before it could start");
                return;
            }
        }

        self.emit(Event::Status {
            id: self.id,
            status: Status::Running,
        });
        self.emit(Event::Progress {
            id: self.id,
            percent: 0,
        });
        self.log(
            LogLevel::Info,
            format!("Starting {} {}", self.config.options.method, self.config.url),
        );

        let max_retries = self.config.options.max_retries;
        let total_attempts = max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            // Checkpoint: before each attempt (also the first one after a backoff)
            if !self.checkpoint().await {
                return self.finalize_stopped().await;
            }

            self.handle.update(|t| t.attempts = attempt).await;
            tracing::debug!(task_id = self.id.0, attempt, "Sending request");

            let result = self.transport.execute(&self.config, &self.cancel).await;

            let error = match result {
                Ok(mut outcome) => {
                    self.advance_progress(50).await;

                    // Checkpoint: after receiving a response
                    if !self.checkpoint().await {
                        return self.finalize_stopped().await;
                    }

                    outcome.total_ms = run_started.elapsed().as_millis() as u64;
                    self.advance_progress(90).await;
                    return self.finalize_done(outcome).await;
                }
                Err(FetchError::Cancelled) => return self.finalize_stopped().await,
                Err(error) => error,
            };

            match self.retry_policy.decide(attempt, max_retries, error.clone()) {
                RetryDecision::RetryAfter(delay) => {
                    self.log(
                        LogLevel::Warn,
                        format!(
                            "Attempt {}/{} failed: {}; retrying in {}ms",
                            attempt,
                            total_attempts,
                            error,
                            delay.as_millis()
                        ),
                    );

                    // Checkpoint: before the retry wait
                    if !self.checkpoint().await {
                        return self.finalize_stopped().await;
                    }
                    if !wait_backoff(delay, &self.cancel).await {
                        return self.finalize_stopped().await;
                    }
                }
                RetryDecision::GiveUp(error) => {
                    if attempt > 1 {
                        tracing::warn!(
                            task_id = self.id.0,
                            attempts = attempt,
                            error = %error,
                            "Task failed after all retry attempts"
                        );
                    }
                    return self.finalize_failed(&error.to_string()).await;
                }
            }
        }
    }

    /// Observe stop and pause. Returns false when the run must stop.
    ///
    /// A paused runner waits here until resumed or stopped.
    async fn checkpoint(&mut self) -> bool {
        let mut announced = false;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let paused = *self.pause_rx.borrow_and_update();
            if !paused {
                if announced {
                    self.log(LogLevel::Info, "Resumed".to_string());
                }
                return true;
            }
            if !announced {
                self.log(LogLevel::Info, "Paused".to_string());
                announced = true;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                changed = self.pause_rx.changed() => {
                    if changed.is_err() {
                        // Control side is gone; nobody can resume us
                        return !self.cancel.is_cancelled();
                    }
                }
            }
        }
    }

    async fn advance_progress(&self, percent: u8) {
        self.handle.update(|t| t.advance_progress(percent)).await;
        self.emit(Event::Progress {
            id: self.id,
            percent,
        });
    }

    async fn finalize_done(&self, outcome: FetchOutcome) {
        if self
            .handle
            .update(|t| t.finish_done(outcome.clone()))
            .await
            .is_none()
        {
            tracing::debug!(task_id = self.id.0, "Task removed during run, result dropped");
        }

        self.log(
            LogLevel::Info,
            format!(
                "Completed with status {} in {}ms",
                outcome.status_code, outcome.request_ms
            ),
        );
        self.emit(Event::Progress {
            id: self.id,
            percent: 100,
        });
        self.emit(Event::Status {
            id: self.id,
            status: Status::Done,
        });
        self.emit(Event::Result {
            id: self.id,
            outcome: Box::new(outcome),
        });
    }

    async fn finalize_failed(&self, message: &str) {
        self.handle.update(|t| t.finish_failed(message)).await;

        self.log(LogLevel::Error, format!("Failed: {}", message));
        self.emit(Event::Status {
            id: self.id,
            status: Status::Failed,
        });
        self.emit(Event::Error {
            id: self.id,
            message: message.to_string(),
        });
    }

    async fn finalize_stopped(&self) {
        self.handle.update(|t| t.finish_stopped()).await;

        self.log(LogLevel::Info, "Stopped".to_string());
        self.emit(Event::Status {
            id: self.id,
            status: Status::Stopped,
        });
    }

    /// Mirror a runner milestone to tracing and to subscribers
    fn log(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Info => tracing::info!(task_id = self.id.0, "{}", message),
            LogLevel::Warn => tracing::warn!(task_id = self.id.0, "{}", message),
            LogLevel::Error => tracing::error!(task_id = self.id.0, "{}", message),
        }
        self.emit(Event::Log {
            id: self.id,
            level,
            message,
        });
    }

    /// Publish an event unless the task has been removed
    fn emit(&self, event: Event) {
        if self.handle.is_removed() {
            return;
        }
        self.event_tx.send(event).ok();
    }
}
