//! # HTTP Protocol Prober
//!
//! Detects which MCP transport a server speaks and checks its `initialize`
//! response.
//!
//! ## Probe sequence
//!
//! 1. POST `initialize` to `endpoint + path`. A 2xx answer means streamable
//!    HTTP. 401/403 means the server is there but requires authentication.
//! 2. 404/405 falls back to the legacy HTTP+SSE transport: open `GET /sse`,
//!    wait for the `endpoint` event, POST `initialize` to the announced message
//!    URL and read the response from the stream.
//!
//! Every failure is reported as a [`ValidationIssue`], never as an error.

use std::sync::LazyLock;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{header, StatusCode, Url};
use serde_json::{json, Value};
use tracing::{debug, warn, Instrument};

use crate::constants;
use crate::crd::{IssueCode, TransportProtocol, ValidationIssue};

use super::{ProbeResult, ProtocolValidator, ValidationOptions};

/// Protocol revision sent in our `initialize` request
const CLIENT_PROTOCOL_VERSION: &str = "2025-06-18";

/// Published MCP protocol revisions
const KNOWN_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18", "2025-11-25"];

const INITIALIZE_REQUEST_ID: i64 = 1;

static PROTOCOL_VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$")
        .expect("Failed to compile protocol version regex - this should never happen")
});

/// Probes MCP servers over HTTP
#[derive(Debug, Clone, Default)]
pub struct HttpProtocolValidator {
    client: reqwest::Client,
}

impl HttpProtocolValidator {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ProtocolValidator for HttpProtocolValidator {
    async fn validate(&self, endpoint: &str, options: &ValidationOptions) -> ProbeResult {
        let start = Instant::now();
        let span = tracing::span!(
            tracing::Level::DEBUG,
            "validation.probe",
            endpoint = endpoint,
            path = %options.configured_path
        );

        let probe = self.probe(endpoint, options).instrument(span);
        let mut result = match tokio::time::timeout(options.timeout, probe).await {
            Ok(result) => result,
            Err(_) => ProbeResult {
                issues: vec![ValidationIssue::error(
                    IssueCode::Timeout,
                    format!(
                        "no response within {}s; check that the server is listening on the configured port",
                        options.timeout.as_secs()
                    ),
                )],
                ..Default::default()
            },
        };
        result.duration = start.elapsed();
        result.endpoint = endpoint.to_string();
        debug!(
            success = result.success,
            detected = ?result.detected_transport,
            issues = result.issues.len(),
            duration_ms = result.duration.as_millis() as u64,
            "probe finished"
        );
        result
    }
}

impl HttpProtocolValidator {
    async fn probe(&self, endpoint: &str, options: &ValidationOptions) -> ProbeResult {
        let url = join_path(endpoint, &options.configured_path);
        let response = match self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json, text/event-stream")
            .json(&initialize_request())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return transport_failure(&e, &url),
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return ProbeResult {
                detected_transport: Some(TransportProtocol::StreamableHttp),
                requires_auth: true,
                issues: vec![ValidationIssue::error(
                    IssueCode::AuthRequired,
                    format!("{url} answered {status}; the server requires authentication"),
                )],
                ..Default::default()
            };
        }
        if status == StatusCode::NOT_FOUND || status == StatusCode::METHOD_NOT_ALLOWED {
            debug!(%status, "streamable endpoint absent, trying legacy SSE");
            return self.probe_legacy_sse(endpoint, options).await;
        }
        if !status.is_success() {
            return invalid_response(format!("{url} answered {status} to initialize"));
        }

        let is_event_stream = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));
        let message = if is_event_stream {
            // The server may keep the stream open after answering
            match read_initialize_event(response).await {
                Ok(message) => message,
                Err(e) => return transport_failure(&e, &url),
            }
        } else {
            match response.text().await {
                Ok(body) => serde_json::from_str::<Value>(&body).ok(),
                Err(e) => return transport_failure(&e, &url),
            }
        };

        let mut result = match message {
            Some(message) => evaluate_initialize(&message, &options.required_capabilities),
            None => invalid_response(format!("{url} did not return a JSON-RPC initialize response")),
        };
        result.detected_transport = Some(TransportProtocol::StreamableHttp);
        result
    }

    async fn probe_legacy_sse(&self, endpoint: &str, options: &ValidationOptions) -> ProbeResult {
        let sse_url = join_path(endpoint, constants::DEFAULT_SSE_PATH);
        let mut stream = match self
            .client
            .get(&sse_url)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return transport_failure(&e, &sse_url),
        };

        let status = stream.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return ProbeResult {
                detected_transport: Some(TransportProtocol::Sse),
                requires_auth: true,
                issues: vec![ValidationIssue::error(
                    IssueCode::AuthRequired,
                    format!("{sse_url} answered {status}; the server requires authentication"),
                )],
                ..Default::default()
            };
        }
        if !status.is_success() {
            return invalid_response(format!(
                "no MCP endpoint found at {} (streamable HTTP) or {} (SSE)",
                options.configured_path,
                constants::DEFAULT_SSE_PATH
            ));
        }

        let mut parser = SseEventParser::default();
        let mut message_url: Option<String> = None;
        loop {
            let chunk = match stream.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    return invalid_response(format!(
                        "{sse_url} closed the stream before answering initialize"
                    ))
                }
                Err(e) => return transport_failure(&e, &sse_url),
            };

            for event in parser.push(&chunk) {
                if message_url.is_none() && event.event == "endpoint" {
                    let Some(target) = resolve_message_url(&sse_url, event.data.trim()) else {
                        return invalid_response(format!(
                            "{sse_url} announced an unusable message endpoint {:?}",
                            event.data
                        ));
                    };
                    debug!(message_url = %target, "legacy SSE endpoint announced");
                    if let Err(e) = self
                        .client
                        .post(&target)
                        .json(&initialize_request())
                        .send()
                        .await
                        .and_then(|r| r.error_for_status())
                    {
                        return transport_failure(&e, &target);
                    }
                    message_url = Some(target);
                    continue;
                }

                if message_url.is_some() {
                    if let Some(message) = initialize_response(&event.data) {
                        let mut result =
                            evaluate_initialize(&message, &options.required_capabilities);
                        result.detected_transport = Some(TransportProtocol::Sse);
                        return result;
                    }
                }
            }
        }
    }
}

/// Read a streamed POST response until the initialize reply arrives
async fn read_initialize_event(
    mut response: reqwest::Response,
) -> Result<Option<Value>, reqwest::Error> {
    let mut parser = SseEventParser::default();
    while let Some(chunk) = response.chunk().await? {
        if let Some(message) = parser
            .push(&chunk)
            .iter()
            .find_map(|event| initialize_response(&event.data))
        {
            return Ok(Some(message));
        }
    }
    Ok(parser
        .finish()
        .and_then(|event| initialize_response(&event.data)))
}

fn initialize_request() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": INITIALIZE_REQUEST_ID,
        "method": "initialize",
        "params": {
            "protocolVersion": CLIENT_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": constants::CONTROLLER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            }
        }
    })
}

/// Parse `data` as the JSON-RPC response to our initialize request
fn initialize_response(data: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(data).ok()?;
    (value.get("id").and_then(Value::as_i64) == Some(INITIALIZE_REQUEST_ID)).then_some(value)
}

/// Check an `initialize` JSON-RPC response
///
/// `success` means the server produced a result object. Problems with its
/// contents are reported as issues.
pub(crate) fn evaluate_initialize(message: &Value, required_capabilities: &[String]) -> ProbeResult {
    if let Some(error) = message.get("error") {
        let detail = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return invalid_response(format!("initialize returned a JSON-RPC error: {detail}"));
    }
    let Some(result) = message.get("result").filter(|r| r.is_object()) else {
        return invalid_response("initialize response has no result object");
    };

    let mut issues = Vec::new();

    let protocol_version = result
        .get("protocolVersion")
        .and_then(Value::as_str)
        .map(str::to_string);
    match protocol_version.as_deref() {
        None => issues.push(ValidationIssue::error(
            IssueCode::InvalidProtocolVersion,
            "initialize result has no protocolVersion",
        )),
        Some(v) if !PROTOCOL_VERSION_PATTERN.is_match(v) => {
            issues.push(ValidationIssue::error(
                IssueCode::InvalidProtocolVersion,
                format!("protocolVersion {v:?} is not a YYYY-MM-DD revision"),
            ));
        }
        Some(v) if !KNOWN_PROTOCOL_VERSIONS.contains(&v) => {
            issues.push(ValidationIssue::warning(
                IssueCode::InvalidProtocolVersion,
                format!("protocolVersion {v} is not a known MCP revision"),
            ));
        }
        Some(_) => {}
    }

    if !result.get("serverInfo").is_some_and(Value::is_object) {
        issues.push(ValidationIssue::error(
            IssueCode::MissingServerInfo,
            "initialize result has no serverInfo; the server should identify itself",
        ));
    }

    let mut capabilities: Vec<String> = result
        .get("capabilities")
        .and_then(Value::as_object)
        .map(|caps| caps.keys().cloned().collect())
        .unwrap_or_default();
    capabilities.sort();

    for required in required_capabilities {
        if !capabilities.iter().any(|c| c == required) {
            issues.push(ValidationIssue::error(
                IssueCode::MissingCapability,
                format!("server does not advertise required capability {required}"),
            ));
        }
    }

    ProbeResult {
        success: true,
        protocol_version,
        capabilities,
        issues,
        ..Default::default()
    }
}

fn invalid_response(message: impl Into<String>) -> ProbeResult {
    ProbeResult {
        issues: vec![ValidationIssue::error(IssueCode::InvalidResponse, message)],
        ..Default::default()
    }
}

fn transport_failure(error: &reqwest::Error, url: &str) -> ProbeResult {
    let code = if error.is_timeout() {
        IssueCode::Timeout
    } else {
        IssueCode::ConnectionFailed
    };
    warn!(url, error = %error, code = code.as_str(), "probe request failed");
    ProbeResult {
        issues: vec![ValidationIssue::error(code, format!("{url}: {error}"))],
        ..Default::default()
    }
}

fn join_path(endpoint: &str, path: &str) -> String {
    format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// The `endpoint` event carries a path or an absolute URL
fn resolve_message_url(sse_url: &str, announced: &str) -> Option<String> {
    let base = Url::parse(sse_url).ok()?;
    base.join(announced).ok().map(String::from)
}

/// A dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct SseEvent {
    /// `message` when the stream did not name the event
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser
///
/// Buffers raw bytes and decodes whole events only, so a UTF-8 sequence split
/// across network chunks stays intact.
#[derive(Debug, Default)]
pub(crate) struct SseEventParser {
    buffer: Vec<u8>,
}

impl SseEventParser {
    /// Feed a chunk, returning every event completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        // CR never occurs inside a multi-byte sequence
        self.buffer.extend(chunk.iter().filter(|b| **b != b'\r'));
        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_event_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        events
    }

    /// Flush an event left unterminated at end of stream
    pub fn finish(&mut self) -> Option<SseEvent> {
        let block = std::mem::take(&mut self.buffer);
        parse_event_block(&String::from_utf8_lossy(&block))
    }
}

fn parse_event_block(block: &str) -> Option<SseEvent> {
    let mut event = String::new();
    let mut data: Vec<&str> = Vec::new();
    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = value.to_string(),
            "data" => data.push(value),
            _ => {}
        }
    }
    if data.is_empty() {
        return None;
    }
    Some(SseEvent {
        event: if event.is_empty() {
            "message".to_string()
        } else {
            event
        },
        data: data.join("\n"),
    })
}
