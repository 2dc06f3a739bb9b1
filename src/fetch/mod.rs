//! Fetch executor: one HTTP attempt per call.
//!
//! - [`Transport`] is the seam the runner calls through; tests plug in fakes.
//! - [`HttpTransport`] is the reqwest-backed production implementation.
//! - [`extract`] holds the response helpers (title, header allowlist).

pub mod extract;
mod http;

pub use http::HttpTransport;

use crate::config::TaskConfig;
use crate::error::FetchError;
use crate::types::FetchOutcome;
use tokio_util::sync::CancellationToken;

/// Performs exactly one fetch attempt for a task
///
/// Implementations return classified errors as values and never touch the
/// task table. `cancel` is checked before the request goes out; an in-flight
/// request is allowed to finish or time out.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Run one attempt against `config.url`
    async fn execute(
        &self,
        config: &TaskConfig,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError>;
}
