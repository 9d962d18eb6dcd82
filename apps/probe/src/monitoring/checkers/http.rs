//! HTTP checks for `api` and `url` monitors.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{HttpChecks, Timeouts};
use crate::error::CheckError;
use crate::models::monitor::Monitor;
use crate::monitoring::checker::Checker;
use crate::monitoring::criteria::{Criteria, ResponseView};
use crate::monitoring::types::{Observation, ResponseMeta};
use crate::monitoring::validation::{validate_http_method, validate_http_target};

/// Upper bound on how much body is buffered for body criteria
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Headers worth keeping on the reported result
const REPORTED_HEADERS: [&str; 8] = [
    "content-type",
    "content-length",
    "server",
    "cache-control",
    "date",
    "last-modified",
    "etag",
    "location",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Configurable method, headers and body
    Api,
    /// Plain GET of a page
    Url,
}

#[derive(Debug, Deserialize)]
struct HeaderPair {
    key: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum HeaderList {
    Map(BTreeMap<String, String>),
    Pairs(Vec<HeaderPair>),
    #[default]
    Empty,
}

impl HeaderList {
    fn into_pairs(self) -> Vec<(String, String)> {
        match self {
            HeaderList::Map(map) => map.into_iter().collect(),
            HeaderList::Pairs(pairs) => pairs.into_iter().map(|p| (p.key, p.value)).collect(),
            HeaderList::Empty => Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LegacyData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpSettings {
    url: Option<String>,
    data: Option<LegacyData>,
    method: Option<String>,
    #[serde(default)]
    headers: HeaderList,
    body: Option<Value>,
    criteria: Option<Criteria>,
}

impl HttpSettings {
    fn target(&self) -> Option<&str> {
        self.url
            .as_deref()
            .or_else(|| self.data.as_ref().and_then(|data| data.url.as_deref()))
    }
}

/// HTTP/HTTPS checker
#[derive(Clone)]
pub struct HttpChecker {
    client: reqwest::Client,
    timeout_ms: u64,
    degraded_threshold_ms: u64,
    body_excerpt_bytes: usize,
    mode: Mode,
}

impl HttpChecker {
    pub fn new(timeouts: &Timeouts, http: &HttpChecks) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeouts.http_ms))
            .user_agent(http.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            timeout_ms: timeouts.http_ms,
            degraded_threshold_ms: http.degraded_threshold_ms,
            body_excerpt_bytes: http.body_excerpt_bytes,
            mode: Mode::Api,
        })
    }

    /// Same client, restricted to plain GET requests
    pub fn as_url_checker(&self) -> Self {
        Self { mode: Mode::Url, ..self.clone() }
    }

    fn build_request(
        &self,
        settings: HttpSettings,
        url: url::Url,
    ) -> Result<reqwest::RequestBuilder, CheckError> {
        if self.mode == Mode::Url {
            return Ok(self.client.get(url));
        }

        let method = match settings.method.as_deref() {
            Some(method) => validate_http_method(method)
                .map_err(|e| CheckError::InvalidConfig(e.to_string()))?,
            None => reqwest::Method::GET,
        };

        let mut request = self.client.request(method, url);
        for (key, value) in settings.headers.into_pairs() {
            request = request.header(key, value);
        }

        request = match settings.body {
            Some(Value::String(text)) => request.body(text),
            Some(Value::Null) | None => request,
            Some(json) => request.json(&json),
        };

        Ok(request)
    }

    async fn exchange(
        &self,
        request: reqwest::RequestBuilder,
        body_limit: usize,
    ) -> Result<(u16, u64, Vec<(String, String)>, Vec<u8>), CheckError> {
        let start = Instant::now();

        let mut response =
            request.send().await.map_err(|e| CheckError::from_reqwest(e, self.timeout_ms))?;

        let latency = start.elapsed().as_millis() as u64;
        let status_code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let mut body = Vec::new();
        while body.len() < body_limit {
            match response.chunk().await {
                Ok(Some(chunk)) => body.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => return Err(CheckError::from_reqwest(e, self.timeout_ms)),
            }
        }
        body.truncate(body_limit);

        Ok((status_code, latency, headers, body))
    }
}

/// Cut `text` to at most `max_bytes` without splitting a character
fn excerpt(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, monitor: &Monitor) -> Result<Observation, CheckError> {
        let mut settings: HttpSettings = monitor.settings()?;

        let target = settings
            .target()
            .ok_or_else(|| {
                CheckError::InvalidConfig(format!("monitor {} has no url", monitor.id))
            })?;
        let url =
            validate_http_target(target).map_err(|e| CheckError::InvalidConfig(e.to_string()))?;

        let criteria = settings.criteria.take().unwrap_or_default();
        let body_limit = if criteria.needs_body() {
            MAX_BODY_BYTES
        } else {
            self.body_excerpt_bytes
        };

        debug!("HTTP check for monitor {}: {}", monitor.id, url);
        let request = self.build_request(settings, url)?;

        // reqwest enforces the same bound; this also covers slow body reads
        let bound = Duration::from_millis(self.timeout_ms);
        let (status_code, latency_ms, headers, body) =
            tokio::time::timeout(bound, self.exchange(request, body_limit))
                .await
                .map_err(|_| CheckError::Timeout(self.timeout_ms))??;

        let body = String::from_utf8_lossy(&body);
        let observation = criteria.evaluate(
            &ResponseView { status_code, latency_ms, headers: &headers, body: &body },
            self.degraded_threshold_ms,
        );

        let reported_headers = headers
            .into_iter()
            .filter(|(name, _)| REPORTED_HEADERS.contains(&name.as_str()))
            .collect();

        let body_excerpt =
            (!body.is_empty()).then(|| excerpt(&body, self.body_excerpt_bytes));

        Ok(observation.with_latency(latency_ms).with_response(ResponseMeta {
            status_code: Some(status_code),
            headers: reported_headers,
            body_excerpt,
        }))
    }
}
