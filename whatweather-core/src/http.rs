//! Single-GET fetch primitive shared by every provider client.
//!
//! Network, status and decode failures are converted into an
//! [`ErrorEnvelope`] here and never travel further as errors.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::{fmt::Debug, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::model::{ErrorEnvelope, ErrorKind};

const USER_AGENT_HEADER: &str = "User-Agent";

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Overrides the fetcher's default timeout when set.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, body: body.into() }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response body: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Timeout(_) => ErrorKind::Timeout,
            FetchError::Transport(_) => ErrorKind::Transport,
            FetchError::Status { .. } => ErrorKind::Status,
            FetchError::Decode(_) => ErrorKind::Decode,
        }
    }
}

/// Executes one outbound GET.
#[async_trait]
pub trait HttpTransport: Send + Sync + Debug {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, FetchError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
        let mut builder = self.http.get(&request.url).query(&request.query);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let res = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(e.to_string())
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        let status = res.status().as_u16();
        let body = res.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(e.to_string())
            } else {
                FetchError::Transport(format!("failed to read response body: {e}"))
            }
        })?;

        Ok(HttpResponse { status, body })
    }
}

/// Applies the identifying header and timeout, and turns failures into envelopes.
#[derive(Debug, Clone)]
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    user_agent: String,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        user_agent: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            user_agent: user_agent.into(),
            timeout,
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Fetch a body as text.
    pub async fn get_text(&self, api: &str, request: HttpRequest) -> Result<String, ErrorEnvelope> {
        self.send(api, request)
            .await
            .map_err(|err| ErrorEnvelope::from_fetch_error(api, &err))
    }

    /// Fetch and decode a JSON body.
    pub async fn get_json(&self, api: &str, request: HttpRequest) -> Result<Value, ErrorEnvelope> {
        let body = self.get_text(api, request).await?;

        serde_json::from_str(&body).map_err(|e| {
            warn!(api, error = %e, "response body is not valid JSON");
            ErrorEnvelope::from_fetch_error(api, &FetchError::Decode(e.to_string()))
        })
    }

    async fn send(&self, api: &str, request: HttpRequest) -> Result<String, FetchError> {
        let timeout = request.timeout.unwrap_or(self.timeout);
        let request = request
            .with_header(USER_AGENT_HEADER, self.user_agent.as_str())
            .with_timeout(timeout);

        debug!(api, url = %request.url, query = ?request.query, "sending request");
        let started = Instant::now();

        let res = self.transport.execute(request).await.inspect_err(|e| {
            warn!(api, error = %e, "request failed");
        })?;

        debug!(
            api,
            status = res.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "response received"
        );

        if !res.is_success() {
            warn!(api, status = res.status, "provider returned non-success status");
            return Err(FetchError::Status {
                status: res.status,
                body: truncate_body(&res.body),
            });
        }

        Ok(res.body)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}

/// In-memory transport for tests: replays scripted responses and records every call.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::{collections::VecDeque, sync::Mutex};

    #[derive(Debug, Clone)]
    pub(crate) struct RecordedCall {
        pub request: HttpRequest,
        pub at: std::time::Instant,
    }

    #[derive(Debug, Default)]
    pub(crate) struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, FetchError>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn push_ok(&self, body: &str) {
            self.push(Ok(HttpResponse::ok(body)));
        }

        pub fn push_status(&self, status: u16, body: &str) {
            self.push(Ok(HttpResponse { status, body: body.to_string() }));
        }

        pub fn push_error(&self, err: FetchError) {
            self.push(Err(err));
        }

        fn push(&self, response: Result<HttpResponse, FetchError>) {
            self.responses.lock().unwrap().push_back(response);
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
            self.calls.lock().unwrap().push(RecordedCall {
                request,
                at: std::time::Instant::now(),
            });

            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Transport("connection refused".into())))
        }
    }

    pub(crate) fn fetcher(transport: &Arc<ScriptedTransport>) -> Fetcher {
        Fetcher::new(
            transport.clone(),
            "whatweather-tests/1.0 test@example.com",
            Duration::from_secs(10),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{ScriptedTransport, fetcher};
    use super::*;

    #[tokio::test]
    async fn applies_user_agent_and_default_timeout() {
        let transport = ScriptedTransport::new();
        transport.push_ok(r#"{"ok": true}"#);

        let request = HttpRequest::get("https://example.test/a")
            .with_query("lat", 60.39)
            .with_header("user-agent", "spoofed");
        let value = fetcher(&transport).get_json("Test", request).await.expect("success");
        assert_eq!(value["ok"], true);

        let calls = transport.calls();
        let sent = &calls[0].request;
        assert_eq!(sent.header("User-Agent"), Some("whatweather-tests/1.0 test@example.com"));
        assert_eq!(sent.headers.len(), 1);
        assert_eq!(sent.timeout, Some(Duration::from_secs(10)));
        assert_eq!(sent.query_value("lat"), Some("60.39"));
    }

    #[tokio::test]
    async fn request_timeout_overrides_default() {
        let transport = ScriptedTransport::new();
        transport.push_ok("plain");

        let request =
            HttpRequest::get("https://example.test/a").with_timeout(Duration::from_secs(30));
        fetcher(&transport).get_text("Test", request).await.expect("success");

        assert_eq!(transport.calls()[0].request.timeout, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn timeout_becomes_error_envelope() {
        let transport = ScriptedTransport::new();
        transport.push_error(FetchError::Timeout("operation timed out".into()));

        let err = fetcher(&transport)
            .get_json("Nowcast 2.0", HttpRequest::get("https://example.test"))
            .await
            .unwrap_err();

        assert_eq!(err.api, "Nowcast 2.0");
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.error.contains("timed out"));
    }

    #[tokio::test]
    async fn server_error_becomes_status_envelope_with_truncated_body() {
        let transport = ScriptedTransport::new();
        transport.push_status(500, &"x".repeat(500));

        let err = fetcher(&transport)
            .get_json("Test", HttpRequest::get("https://example.test"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Status);
        assert!(err.error.starts_with("HTTP 500"));
        assert!(err.error.len() < 300);
    }

    #[tokio::test]
    async fn malformed_json_becomes_decode_envelope() {
        let transport = ScriptedTransport::new();
        transport.push_ok("{not json");

        let err = fetcher(&transport)
            .get_json("Test", HttpRequest::get("https://example.test"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Decode);
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "ø".repeat(250);
        let truncated = truncate_body(&body);
        assert_eq!(truncated.chars().count(), 203);
        assert!(truncated.ends_with("..."));
    }
}
