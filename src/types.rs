//! Core types for scrape-engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::TaskConfig;

/// Unique identifier for a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for i64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// HTTP method of a task
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    #[default]
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// HEAD
    Head,
    /// PATCH
    Patch,
    /// OPTIONS
    Options,
}

impl HttpMethod {
    /// Method name as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// Task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created or reset, not running
    Pending,
    /// A runner is executing attempts
    Running,
    /// Last run succeeded
    Done,
    /// Last run exhausted its retries or hit a non-retryable error
    Failed,
    /// Last run was stopped on request
    Stopped,
}

impl Status {
    /// Done, Failed or Stopped
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Done | Status::Failed | Status::Stopped)
    }

    /// Whether a start is a valid transition from this status
    pub fn can_start(&self) -> bool {
        !matches!(self, Status::Running)
    }

    /// Lowercase name, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Done => "done",
            Status::Failed => "failed",
            Status::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque set of cookies carried by a task
///
/// The engine only renders it into a `Cookie` header and absorbs `Set-Cookie`
/// values into it; loading and saving cookie files is the caller's job.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieSet(BTreeMap<String, String>);

impl CookieSet {
    /// Empty cookie set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a cookie
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Value of a cookie
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Number of cookies
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no cookies are held
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge another set into this one, the other set winning on conflicts
    pub fn extend(&mut self, other: &CookieSet) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }

    /// Render as a `Cookie` request header value (`a=1; b=2`)
    pub fn to_header_value(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        Some(
            self.0
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Absorb one `Set-Cookie` header value
    ///
    /// Only the leading `name=value` pair is kept; attributes such as `Path` or
    /// `Expires` are ignored. Returns false when the value has no usable pair.
    pub fn absorb_set_cookie(&mut self, header: &str) -> bool {
        let pair = header.split(';').next().unwrap_or_default();
        match pair.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                self.0
                    .insert(name.trim().to_string(), value.trim().to_string());
                true
            }
            _ => false,
        }
    }

    /// Iterate over `(name, value)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One redirect hop: the status that redirected and the URL that answered with it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHop {
    /// Redirect status code (301, 302, 303, 307, 308)
    pub status: u16,
    /// URL that returned the redirect
    pub url: String,
}

/// Structured result of one successful fetch attempt
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome {
    /// URL of the final response, after redirects
    pub final_url: String,
    /// Status code of the final response
    pub status_code: u16,
    /// Allowlisted response headers (lowercase names)
    pub headers: BTreeMap<String, String>,
    /// Content-Length header, or the number of body bytes read
    pub content_length: u64,
    /// Page title, empty when absent
    pub title: String,
    /// Redirect hops in the order they were followed
    pub redirect_chain: Vec<RedirectHop>,
    /// Duration of this attempt in milliseconds
    pub request_ms: u64,
    /// Milliseconds since the runner started, set by the runner
    pub total_ms: u64,
    /// Cookies set by the responses of this attempt
    #[serde(default)]
    pub cookies_set: CookieSet,
}

/// A fetch task: configuration plus runtime state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier
    pub id: TaskId,
    /// What to fetch and how
    pub config: TaskConfig,
    /// Current status
    pub status: Status,
    /// Progress of the current or last run (0..=100)
    pub progress: u8,
    /// Outcome of the last successful run
    pub result: Option<FetchOutcome>,
    /// Error message of the last failed run
    pub last_error: Option<String>,
    /// Attempts made by the current or last run
    pub attempts: u32,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the current or last run entered Running
    pub started_at: Option<DateTime<Utc>>,
    /// When the last run finished
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a Pending task
    pub fn new(id: TaskId, config: TaskConfig) -> Self {
        Self {
            id,
            config,
            status: Status::Pending,
            progress: 0,
            result: None,
            last_error: None,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Enter Running for a new run. False if already running.
    pub fn begin_run(&mut self) -> bool {
        if !self.status.can_start() {
            return false;
        }
        self.status = Status::Running;
        self.progress = 0;
        self.result = None;
        self.last_error = None;
        self.attempts = 0;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        true
    }

    /// Raise progress; never lowers it within a run
    pub fn advance_progress(&mut self, percent: u8) {
        self.progress = self.progress.max(percent.min(100));
    }

    /// Running -> Done with the given outcome
    pub fn finish_done(&mut self, outcome: FetchOutcome) -> bool {
        if self.status != Status::Running {
            return false;
        }
        self.status = Status::Done;
        self.progress = 100;
        self.result = Some(outcome);
        self.last_error = None;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Running -> Failed with the given message
    pub fn finish_failed(&mut self, message: impl Into<String>) -> bool {
        if self.status != Status::Running {
            return false;
        }
        self.status = Status::Failed;
        self.result = None;
        self.last_error = Some(message.into());
        self.finished_at = Some(Utc::now());
        true
    }

    /// Running -> Stopped, keeping progress and attempts of the interrupted run
    pub fn finish_stopped(&mut self) {
        self.status = Status::Stopped;
        self.result = None;
        self.last_error = None;
        self.finished_at = Some(Utc::now());
    }

    /// -> Stopped for a run that was stopped before it got a pool slot
    ///
    /// The run never started, so nothing from an earlier run survives it.
    /// False while running.
    pub fn cancel_queued(&mut self) -> bool {
        if self.status == Status::Running {
            return false;
        }
        self.status = Status::Stopped;
        self.progress = 0;
        self.result = None;
        self.last_error = None;
        self.attempts = 0;
        self.started_at = None;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Clear runtime state back to Pending. False while running.
    pub fn reset(&mut self) -> bool {
        if self.status == Status::Running {
            return false;
        }
        self.status = Status::Pending;
        self.progress = 0;
        self.result = None;
        self.last_error = None;
        self.attempts = 0;
        self.started_at = None;
        self.finished_at = None;
        true
    }
}

/// Severity of a task log line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Informational milestone
    Info,
    /// Recoverable problem (an attempt failed and will be retried)
    Warn,
    /// Terminal failure
    Error,
}

/// Event emitted by the engine
///
/// Events of one task arrive in the order its runner emitted them; `Finished`
/// is always the last event of a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task added to the table
    Created {
        /// Task ID
        id: TaskId,
        /// Target URL
        url: String,
    },

    /// Task removed from the table
    Removed {
        /// Task ID
        id: TaskId,
    },

    /// Human-readable log line from a runner
    Log {
        /// Task ID
        id: TaskId,
        /// Severity
        level: LogLevel,
        /// Message text
        message: String,
    },

    /// Status transition
    Status {
        /// Task ID
        id: TaskId,
        /// New status
        status: Status,
    },

    /// Progress update (0..=100)
    Progress {
        /// Task ID
        id: TaskId,
        /// Progress percentage
        percent: u8,
    },

    /// Successful outcome of a run
    Result {
        /// Task ID
        id: TaskId,
        /// The attempt's outcome
        outcome: Box<FetchOutcome>,
    },

    /// Terminal failure of a run
    Error {
        /// Task ID
        id: TaskId,
        /// Error message
        message: String,
    },

    /// The run is over; its concurrency slot is free
    Finished {
        /// Task ID
        id: TaskId,
    },

    /// Engine shutdown completed
    Shutdown,
}

impl Event {
    /// Task this event belongs to, if any
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Event::Created { id, .. }
            | Event::Removed { id }
            | Event::Log { id, .. }
            | Event::Status { id, .. }
            | Event::Progress { id, .. }
            | Event::Result { id, .. }
            | Event::Error { id, .. }
            | Event::Finished { id } => Some(*id),
            Event::Shutdown => None,
        }
    }
}

/// Flat per-task row handed to exporters (CSV, JSON, tables)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task ID
    pub id: TaskId,
    /// Configured URL
    pub url: String,
    /// URL after redirects
    pub final_url: Option<String>,
    /// HTTP method
    pub method: HttpMethod,
    /// Task status
    pub status: Status,
    /// Final status code
    pub status_code: Option<u16>,
    /// Content length in bytes
    pub content_length: Option<u64>,
    /// Page title
    pub title: Option<String>,
    /// Duration of the successful attempt
    pub request_ms: Option<u64>,
    /// Total run duration
    pub total_ms: Option<u64>,
    /// Number of redirect hops
    pub redirect_count: usize,
    /// Allowlisted response headers
    pub headers: BTreeMap<String, String>,
    /// Error message of a failed run
    pub error: Option<String>,
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        let result = task.result.as_ref();
        Self {
            id: task.id,
            url: task.config.url.clone(),
            final_url: result.map(|r| r.final_url.clone()),
            method: task.config.options.method,
            status: task.status,
            status_code: result.map(|r| r.status_code),
            content_length: result.map(|r| r.content_length),
            title: result.map(|r| r.title.clone()),
            request_ms: result.map(|r| r.request_ms),
            total_ms: result.map(|r| r.total_ms),
            redirect_count: result.map(|r| r.redirect_chain.len()).unwrap_or(0),
            headers: result.map(|r| r.headers.clone()).unwrap_or_default(),
            error: task.last_error.clone(),
        }
    }
}

/// What happened to the active runners during shutdown
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownSummary {
    /// Runners that were asked to stop
    pub requested: Vec<TaskId>,
    /// Runners that finished within the timeout
    pub joined: Vec<TaskId>,
    /// Runners still active when the timeout expired
    pub left: Vec<TaskId>,
}

impl ShutdownSummary {
    /// Number of runners asked to stop
    pub fn requested_count(&self) -> usize {
        self.requested.len()
    }

    /// Number of runners that finished in time
    pub fn joined_count(&self) -> usize {
        self.joined.len()
    }

    /// Number of runners still active after the timeout
    pub fn left_count(&self) -> usize {
        self.left.len()
    }
}
