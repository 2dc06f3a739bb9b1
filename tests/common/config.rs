//! Engine and task constructors for integration tests

use std::time::Duration;

use scrape_engine::{Engine, EngineConfig, RetryConfig, TaskConfig, TaskOptions};

/// Engine over real HTTP with fast retries
pub fn create_http_engine(max_concurrent: usize) -> Engine {
    let config = EngineConfig {
        max_concurrent_tasks: max_concurrent,
        default_user_agent: "scrape-engine-tests".to_string(),
        retry: RetryConfig {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        shutdown_poll_interval: Duration::from_millis(10),
        ..Default::default()
    };
    Engine::new(config).unwrap()
}

/// Task options with a short timeout
pub fn quick_options(timeout: Duration) -> TaskOptions {
    TaskOptions {
        timeout,
        ..Default::default()
    }
}

/// GET config for `url`
pub fn get(url: impl Into<String>) -> TaskConfig {
    TaskConfig::new(url, TaskOptions::default())
}

/// A local port with nothing listening on it
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
