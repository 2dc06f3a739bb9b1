//! Task engine: task table, bounded worker pool and event channel.
//!
//! The `Engine` struct and its methods are organized by domain:
//! - [`tasks`] - Task table commands (create, update, duplicate, remove, export)
//! - [`control`] - Run control (start, stop, pause, resume, reset, restart)
//! - [`lifecycle`] - Shutdown with drain
//! - [`runner`] - The per-run attempt loop

mod control;
mod lifecycle;
mod runner;
mod tasks;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64};

use tokio::sync::{Mutex, RwLock, Semaphore, broadcast, watch};
use tokio_stream::Stream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::fetch::{HttpTransport, Transport};
use crate::retry::RetryPolicy;
use crate::types::{Event, Task, TaskId};

/// Task table shared between the engine and its runners
pub(crate) type TaskTable = Arc<RwLock<HashMap<TaskId, Task>>>;

/// Control signals of one active runner, held in the active set
pub(crate) struct RunnerControl {
    /// Cooperative stop flag
    pub(crate) cancel: CancellationToken,
    /// Pause gate (true = paused)
    pub(crate) pause: watch::Sender<bool>,
    /// Flips to true once the runner has emitted `Finished`
    pub(crate) finished: watch::Receiver<bool>,
}

/// Worker pool state
#[derive(Clone)]
pub(crate) struct PoolState {
    /// Semaphore bounding the number of Running tasks (max_concurrent_tasks)
    pub(crate) concurrent_limit: Arc<Semaphore>,
    /// Active set: runners from successful start until `Finished`
    pub(crate) active_runners: Arc<Mutex<HashMap<TaskId, RunnerControl>>>,
    /// Cleared by shutdown; no new runs are admitted afterwards
    pub(crate) accepting_new: Arc<AtomicBool>,
}

/// Concurrent URL-fetch task engine (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Engine {
    /// Engine configuration
    pub(crate) config: Arc<EngineConfig>,
    /// Task table, keyed by id
    pub(crate) tasks: TaskTable,
    /// Worker pool and active set
    pub(crate) pool: PoolState,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Executes fetch attempts
    pub(crate) transport: Arc<dyn Transport>,
    /// Retry/backoff decisions shared by all runners
    pub(crate) retry_policy: Arc<RetryPolicy>,
    /// Next task id
    pub(crate) next_task_id: Arc<AtomicI64>,
}

impl Engine {
    /// Create an engine that fetches over HTTP with reqwest
    pub fn new(config: EngineConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config.default_user_agent.clone()));
        Self::with_transport(config, transport)
    }

    /// Create an engine with a custom [`Transport`]
    pub fn with_transport(config: EngineConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(config.event_buffer);

        let pool = PoolState {
            concurrent_limit: Arc::new(Semaphore::new(config.max_concurrent_tasks)),
            active_runners: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        tracing::info!(
            max_concurrent_tasks = config.max_concurrent_tasks,
            event_buffer = config.event_buffer,
            "Engine initialized"
        );

        Ok(Self {
            retry_policy: Arc::new(RetryPolicy::new(config.retry.clone())),
            config: Arc::new(config),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            pool,
            event_tx,
            transport,
            next_task_id: Arc::new(AtomicI64::new(1)),
        })
    }

    /// Subscribe to engine events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls behind by more than `event_buffer` events
    /// receives `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use scrape_engine::{Engine, EngineConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let engine = Engine::new(EngineConfig::default())?;
    ///
    ///     let mut events = engine.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             println!("{:?}", event);
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Events as a [`Stream`], for adapters that forward to a presentation layer
    ///
    /// Lagged gaps are skipped with a warning instead of ending the stream.
    pub fn event_stream(&self) -> impl Stream<Item = Event> + Send + 'static {
        use tokio_stream::StreamExt;

        BroadcastStream::new(self.event_tx.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event stream lagged, events dropped");
                None
            }
        })
    }

    /// Get the engine configuration
    pub fn get_config(&self) -> Arc<EngineConfig> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
