//! Up/degraded criteria for HTTP monitors.
//!
//! A monitor lists expectations in two groups. Every `up` condition must
//! hold or the result is down with `criteria-not-met`. If any `degraded`
//! condition fails on an otherwise up response, the result is degraded.

use serde::{Deserialize, Serialize};

use super::types::{FailureReason, Observation};

/// What an HTTP probe saw, as far as criteria are concerned
#[derive(Debug, Clone, Copy)]
pub struct ResponseView<'a> {
    pub status_code: u16,
    pub latency_ms: u64,
    pub headers: &'a [(String, String)],
    pub body: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Condition {
    #[serde(rename_all = "camelCase")]
    StatusCode { min: u16, max: u16 },
    #[serde(rename_all = "camelCase")]
    ResponseTime { max_ms: u64 },
    BodyContains { text: String },
    BodyNotContains { text: String },
    Header { name: String, value: Option<String> },
}

impl Condition {
    pub fn holds(&self, response: &ResponseView<'_>) -> bool {
        match self {
            Condition::StatusCode { min, max } => (*min..=*max).contains(&response.status_code),
            Condition::ResponseTime { max_ms } => response.latency_ms <= *max_ms,
            Condition::BodyContains { text } => response.body.contains(text.as_str()),
            Condition::BodyNotContains { text } => !response.body.contains(text.as_str()),
            Condition::Header { name, value } => response
                .headers
                .iter()
                .filter(|(key, _)| key.eq_ignore_ascii_case(name))
                .any(|(_, actual)| value.as_ref().is_none_or(|expected| actual == expected)),
        }
    }

    /// Explain a failed condition against the observed response
    fn describe_failure(&self, response: &ResponseView<'_>) -> String {
        match self {
            Condition::StatusCode { min, max } => {
                format!("status {} outside {}..={}", response.status_code, min, max)
            }
            Condition::ResponseTime { max_ms } => {
                format!("response time {} ms above {} ms", response.latency_ms, max_ms)
            }
            Condition::BodyContains { text } => format!("body does not contain {:?}", text),
            Condition::BodyNotContains { text } => format!("body contains {:?}", text),
            Condition::Header { name, value: Some(value) } => {
                format!("header {} is not {:?}", name, value)
            }
            Condition::Header { name, value: None } => format!("header {} missing", name),
        }
    }

    /// Whether evaluating this condition needs the response body
    fn needs_body(&self) -> bool {
        matches!(self, Condition::BodyContains { .. } | Condition::BodyNotContains { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(default)]
    pub up: Vec<Condition>,
    #[serde(default)]
    pub degraded: Vec<Condition>,
}

impl Criteria {
    pub fn needs_body(&self) -> bool {
        self.up.iter().chain(&self.degraded).any(Condition::needs_body)
    }

    /// Decide the status of a completed HTTP exchange.
    ///
    /// Empty groups fall back to 2xx/3xx for `up` and to the probe-wide
    /// latency threshold for `degraded`.
    pub fn evaluate(&self, response: &ResponseView<'_>, degraded_threshold_ms: u64) -> Observation {
        let default_up = [Condition::StatusCode { min: 200, max: 399 }];
        let default_degraded = [Condition::ResponseTime { max_ms: degraded_threshold_ms }];

        let up: &[Condition] = if self.up.is_empty() { &default_up } else { &self.up };
        let degraded: &[Condition] =
            if self.degraded.is_empty() { &default_degraded } else { &self.degraded };

        if let Some(failed) = up.iter().find(|c| !c.holds(response)) {
            return Observation::down(
                FailureReason::CriteriaNotMet,
                failed.describe_failure(response),
            );
        }

        match degraded.iter().find(|c| !c.holds(response)) {
            Some(failed) => Observation::degraded(failed.describe_failure(response)),
            None => Observation::up(),
        }
    }
}
