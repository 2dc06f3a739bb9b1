//! Event waiting helpers for integration tests

use std::time::Duration;

use scrape_engine::{Engine, Event, Status, TaskId};

/// How a run ended
#[derive(Debug)]
pub enum WaitResult {
    /// Finished with the given terminal status
    Finished(Status),
    /// Timeout waiting for `Finished`
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Start a task and collect its events until `Finished`
///
/// Subscribes before starting so no event of the run is missed.
pub async fn run_and_collect(
    engine: &Engine,
    id: TaskId,
    timeout: Duration,
) -> (WaitResult, Vec<Event>) {
    let mut events = engine.subscribe();
    assert!(engine.start_task(id).await, "task {} did not start", id);

    let mut collected = Vec::new();
    let mut last_status = None;
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if event.task_id() == Some(id) => {
                    if let Event::Status { status, .. } = &event {
                        last_status = Some(*status);
                    }
                    let finished = matches!(event, Event::Finished { .. });
                    collected.push(event);
                    if finished {
                        return true;
                    }
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return false,
            }
        }
    })
    .await;

    let wait = match result {
        Ok(true) => match last_status {
            Some(status) => WaitResult::Finished(status),
            None => WaitResult::ChannelClosed,
        },
        Ok(false) => WaitResult::ChannelClosed,
        Err(_) => WaitResult::Timeout,
    };
    (wait, collected)
}

/// Assert that the task ended in `expected`
pub async fn assert_task_status(engine: &Engine, id: TaskId, expected: Status) {
    let task = engine.get_task(id).await.unwrap();
    assert_eq!(
        task.status, expected,
        "task {} has status {}, expected {} (error: {:?})",
        id, task.status, expected, task.last_error
    );
}
