use std::sync::Arc;
use std::time::{Duration, Instant};

use super::Engine;
use super::test_helpers::*;
use crate::config::{EngineConfig, RetryConfig, TaskConfig, TaskOptions};
use crate::error::{Error, FetchError};
use crate::types::{Event, LogLevel, Status, TaskId};

mod tasks;

fn retrying(max_retries: u32) -> TaskOptions {
    TaskOptions {
        max_retries,
        ..Default::default()
    }
}

/// Create and start one task, returning its id
async fn start_one(engine: &Engine, options: TaskOptions) -> TaskId {
    let id = engine
        .create_task("http://test.local/page", options)
        .await
        .unwrap();
    assert!(engine.start_task(id).await);
    id
}

fn statuses(events: &[Event]) -> Vec<Status> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Status { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

fn log_messages(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Log { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}
