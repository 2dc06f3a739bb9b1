//! Fetch a list of URLs
//!
//! This example demonstrates the core functionality of scrape-engine:
//! - Creating an engine with a bounded worker pool
//! - Subscribing to events
//! - Creating and starting tasks
//! - Shutting down with a drain timeout
//!
//! ```bash
//! cargo run --example fetch_urls -- https://example.com https://www.rust-lang.org
//! ```

use std::time::Duration;

use scrape_engine::{Engine, EngineConfig, Event, LogLevel, TaskOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        eprintln!("usage: fetch_urls <url>...");
        return Ok(());
    }

    let config = EngineConfig {
        max_concurrent_tasks: 3,
        ..Default::default()
    };
    let engine = Engine::new(config)?;

    // Subscribe before starting so no event is missed
    let mut events = engine.subscribe();
    let total = urls.len();

    let options = TaskOptions {
        max_retries: 2,
        timeout: Duration::from_secs(15),
        ..Default::default()
    };
    let mut submitted = 0;
    for url in &urls {
        match engine.create_task(url, options.clone()).await {
            Ok(id) => {
                if engine.start_task(id).await {
                    submitted += 1;
                }
            }
            Err(e) => eprintln!("✗ {}: {}", url, e),
        }
    }

    let mut finished = 0;
    while finished < submitted {
        match events.recv().await {
            Ok(Event::Log {
                id,
                level: LogLevel::Warn,
                message,
            }) => println!("⚠ #{}: {}", id, message),
            Ok(Event::Result { id, outcome }) => println!(
                "✓ #{} {} {} ({} bytes, {} redirect(s), {}ms) {}",
                id,
                outcome.status_code,
                outcome.final_url,
                outcome.content_length,
                outcome.redirect_chain.len(),
                outcome.total_ms,
                outcome.title
            ),
            Ok(Event::Error { id, message }) => println!("✗ #{}: {}", id, message),
            Ok(Event::Finished { .. }) => finished += 1,
            Ok(_) => {}
            Err(e) => {
                eprintln!("event stream error: {}", e);
                break;
            }
        }
    }

    let records = engine.records().await;
    println!("{}", serde_json::to_string_pretty(&records)?);
    println!("{} of {} task(s) finished", finished, total);

    engine.shutdown(Duration::from_secs(5)).await?;
    Ok(())
}
