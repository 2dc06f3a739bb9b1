//! Shared test helpers: a scripted transport and engine constructors.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::{EngineConfig, RetryConfig, TaskConfig};
use crate::engine::Engine;
use crate::error::FetchError;
use crate::fetch::Transport;
use crate::types::{Event, FetchOutcome, Status, TaskId};

/// Backoff base used by test engines
pub(crate) const TEST_BASE_DELAY: Duration = Duration::from_millis(50);

/// One scripted reply
#[derive(Clone, Debug)]
pub(crate) enum Step {
    Reply(Result<FetchOutcome, FetchError>),
    Panic,
}

/// Fake transport replaying a script, recording every call
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    /// Used once the script runs out
    fallback: Step,
    /// Simulated network time per call; not interruptible, like a real request
    delay: Duration,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    /// Always succeed
    pub(crate) fn ok() -> Self {
        Self::with_fallback(Step::Reply(Ok(ok_outcome("http://test.local/"))))
    }

    /// Always fail with `error`
    pub(crate) fn failing(error: FetchError) -> Self {
        Self::with_fallback(Step::Reply(Err(error)))
    }

    pub(crate) fn with_fallback(fallback: Step) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Replay `steps` in order before falling back
    pub(crate) fn scripted(mut self, steps: Vec<Step>) -> Self {
        self.script = Mutex::new(steps.into());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    /// Highest number of concurrent `execute` calls observed
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        _config: &TaskConfig,
        _cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match step {
            Step::Reply(reply) => reply,
            Step::Panic => panic!("scripted transport panic"),
        }
    }
}

/// A plausible successful outcome
pub(crate) fn ok_outcome(url: &str) -> FetchOutcome {
    FetchOutcome {
        final_url: url.to_string(),
        status_code: 200,
        title: "Test Page".to_string(),
        content_length: 42,
        request_ms: 1,
        ..Default::default()
    }
}

/// Engine wired to `transport`, with short backoff and poll intervals
pub(crate) fn create_test_engine(transport: Arc<ScriptedTransport>, max_concurrent: usize) -> Engine {
    let config = EngineConfig {
        max_concurrent_tasks: max_concurrent,
        retry: RetryConfig {
            base_delay: TEST_BASE_DELAY,
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        shutdown_poll_interval: Duration::from_millis(10),
        ..Default::default()
    };
    Engine::with_transport(config, transport).unwrap()
}

/// Collect the events of one task up to and including its `Finished`
pub(crate) async fn collect_until_finished(
    rx: &mut broadcast::Receiver<Event>,
    id: TaskId,
) -> Vec<Event> {
    let collect = async {
        let mut events = Vec::new();
        loop {
            let event = rx.recv().await.unwrap();
            if event.task_id() != Some(id) {
                continue;
            }
            let finished = matches!(event, Event::Finished { .. });
            events.push(event);
            if finished {
                return events;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("task did not finish in time")
}

/// Poll until the task reaches `status`
pub(crate) async fn wait_for_status(engine: &Engine, id: TaskId, status: Status) {
    let wait = async {
        loop {
            if engine.get_task(id).await.map(|t| t.status) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .unwrap_or_else(|_| panic!("task {} never reached {}", id, status));
}

/// Poll until the task has no runner
pub(crate) async fn wait_until_inactive(engine: &Engine, id: TaskId) {
    let wait = async {
        while engine.is_active(id).await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("runner never finished");
}
