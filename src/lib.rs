//! # scrape-engine
//!
//! Concurrent URL-fetch task engine for scraping front-ends.
//!
//! ## Design Philosophy
//!
//! scrape-engine is designed to be:
//! - **Library-first** - No UI; a presentation layer drives it through commands and events
//! - **Bounded** - At most `max_concurrent_tasks` fetches run at once; submission never blocks
//! - **Cooperative** - Stop and pause are observed at checkpoints, never by killing a request
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use scrape_engine::{Engine, EngineConfig, Event, TaskOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(EngineConfig::default())?;
//!
//!     // Subscribe to events
//!     let mut events = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let Event::Result { id, outcome } = event {
//!                 println!("#{}: {} {}", id, outcome.status_code, outcome.title);
//!             }
//!         }
//!     });
//!
//!     let id = engine
//!         .create_task("https://example.com", TaskOptions::default())
//!         .await?;
//!     engine.start_task(id).await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Task engine (task table, worker pool, runners)
pub mod engine;
/// Error types
pub mod error;
/// Fetch executor: transports and response inspection
pub mod fetch;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

use std::time::Duration;

// Re-export commonly used types
pub use config::{EngineConfig, RetryConfig, TaskConfig, TaskOptions};
pub use engine::Engine;
pub use error::{Error, FetchError, FetchErrorKind, Result};
pub use fetch::{HttpTransport, Transport};
pub use retry::{IsRetryable, RetryDecision, RetryPolicy};
pub use types::{
    CookieSet, Event, FetchOutcome, HttpMethod, LogLevel, RedirectHop, ShutdownSummary, Status,
    Task, TaskId, TaskRecord,
};

/// Helper function to run the engine with graceful signal handling.
///
/// Waits for a termination signal and then calls [`Engine::shutdown`] with
/// `timeout`.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use scrape_engine::{Engine, EngineConfig, run_with_shutdown};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = Engine::new(EngineConfig::default())?;
///
///     // Run with automatic signal handling
///     let summary = run_with_shutdown(engine, Duration::from_secs(5)).await?;
///     println!("{} task(s) did not stop in time", summary.left_count());
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(engine: Engine, timeout: Duration) -> Result<ShutdownSummary> {
    wait_for_signal().await;
    engine.shutdown(timeout).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
