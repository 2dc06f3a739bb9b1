//! reqwest-backed [`Transport`].

use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_LENGTH, COOKIE, HeaderMap, LOCATION, SET_COOKIE};
use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::Transport;
use super::extract::{extract_title, filter_headers};
use crate::config::{TaskConfig, TaskOptions};
use crate::error::FetchError;
use crate::types::{CookieSet, FetchOutcome, RedirectHop};

/// Production transport
///
/// A client is built per attempt because proxy, timeout and user agent are
/// per-task settings. Automatic redirects are disabled: hops are followed here
/// so each one can be recorded and cookies carried across them.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    default_user_agent: String,
}

impl HttpTransport {
    /// Create a transport that sends `default_user_agent` when a task sets none
    pub fn new(default_user_agent: impl Into<String>) -> Self {
        Self {
            default_user_agent: default_user_agent.into(),
        }
    }

    fn build_client(&self, options: &TaskOptions) -> Result<reqwest::Client, FetchError> {
        let user_agent = options
            .user_agent
            .as_deref()
            .unwrap_or(&self.default_user_agent);

        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(options.timeout)
            .user_agent(user_agent);

        if let Some(proxy) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| FetchError::Other(format!("invalid proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| FetchError::Other(format!("failed to create HTTP client: {}", e)))
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        config: &TaskConfig,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let client = self.build_client(&config.options)?;
        let timeout = config.options.timeout;
        let started = Instant::now();

        // Bounds every hop plus the body read, on top of reqwest's own timeout
        match tokio::time::timeout(timeout, follow_redirects(&client, config)).await {
            Ok(Ok(mut outcome)) => {
                outcome.request_ms = started.elapsed().as_millis() as u64;
                Ok(outcome)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    }
}

/// Send the request and follow redirects manually, recording every hop
async fn follow_redirects(
    client: &reqwest::Client,
    config: &TaskConfig,
) -> Result<FetchOutcome, FetchError> {
    let options = &config.options;
    let timeout = options.timeout;

    let mut current = Url::parse(&config.url)
        .map_err(|e| FetchError::Other(format!("invalid URL '{}': {}", config.url, e)))?;
    let mut method: Method = options.method.into();
    let mut body = options.body.clone();
    let mut jar = options.cookies.clone().unwrap_or_default();
    let mut cookies_set = CookieSet::new();
    let mut chain = Vec::new();

    loop {
        let mut request = client.request(method.clone(), current.clone());
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = jar.to_header_value() {
            request = request.header(COOKIE, cookie);
        }
        if let Some(body) = &body {
            request = request.body(body.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e, timeout))?;
        let status = response.status();

        for value in response.headers().get_all(SET_COOKIE) {
            if let Ok(value) = value.to_str() {
                jar.absorb_set_cookie(value);
                cookies_set.absorb_set_cookie(value);
            }
        }

        let next = if is_followable(status) {
            redirect_target(&current, response.headers())
        } else {
            None
        };

        let Some(next) = next else {
            return read_outcome(response, chain, cookies_set, timeout).await;
        };

        if chain.len() >= options.max_redirects {
            return Err(FetchError::Protocol(format!(
                "too many redirects (limit {})",
                options.max_redirects
            )));
        }

        tracing::debug!(
            status = status.as_u16(),
            from = %current,
            to = %next,
            "following redirect"
        );
        chain.push(RedirectHop {
            status: status.as_u16(),
            url: current.to_string(),
        });

        if switches_to_get(status, &method) {
            method = Method::GET;
            body = None;
        }
        current = next;
    }
}

/// Bytes of the body kept for `<title>` extraction; the rest is only counted
const TITLE_SCAN_LIMIT: usize = 256 * 1024;

async fn read_outcome(
    mut response: reqwest::Response,
    redirect_chain: Vec<RedirectHop>,
    cookies_set: CookieSet,
    timeout: Duration,
) -> Result<FetchOutcome, FetchError> {
    let final_url = response.url().to_string();
    let status_code = response.status().as_u16();
    let headers = filter_headers(response.headers());
    let declared_length = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let mut head: Vec<u8> = Vec::new();
    let mut received: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| FetchError::from_reqwest(&e, timeout))?
    {
        received += chunk.len() as u64;
        let room = TITLE_SCAN_LIMIT.saturating_sub(head.len());
        head.extend_from_slice(&chunk[..room.min(chunk.len())]);
    }

    Ok(FetchOutcome {
        final_url,
        status_code,
        headers,
        content_length: declared_length.unwrap_or(received),
        title: extract_title(&String::from_utf8_lossy(&head)),
        redirect_chain,
        request_ms: 0,
        total_ms: 0,
        cookies_set,
    })
}

fn is_followable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// 303 always becomes GET; 301/302 do so for anything but GET/HEAD
fn switches_to_get(status: StatusCode, method: &Method) -> bool {
    match status {
        StatusCode::SEE_OTHER => *method != Method::HEAD,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => {
            *method != Method::GET && *method != Method::HEAD
        }
        _ => false,
    }
}

/// Resolve the `Location` header against the current URL
fn redirect_target(current: &Url, headers: &HeaderMap) -> Option<Url> {
    let location = headers.get(LOCATION)?.to_str().ok()?;
    match current.join(location.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        Ok(url) => {
            tracing::warn!(location = %url, "ignoring redirect to unsupported scheme");
            None
        }
        Err(e) => {
            tracing::warn!(location, error = %e, "ignoring unparseable redirect location");
            None
        }
    }
}
