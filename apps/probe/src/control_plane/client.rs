use std::time::Duration;

use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest_middleware::ClientWithMiddleware;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::create_reporting_client;
use crate::config;
use crate::error::ApiError;
use crate::models::monitor::{Monitor, decode_batch};
use crate::monitoring::types::CheckResult;

/// The narrow interface this worker needs from the control plane
#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync {
    /// Fetch up to `limit` monitors that are due for a check
    async fn fetch_monitors(&self, limit: Option<u32>) -> Result<Vec<Monitor>, ApiError>;

    /// Deliver one result
    async fn report(&self, result: &CheckResult) -> Result<(), ApiError>;
}

/// Control-plane client over HTTP
pub struct HttpControlPlane {
    client: reqwest::Client,
    /// Same client, with transient failures retried
    report_client: ClientWithMiddleware,
    base: Url,
}

impl HttpControlPlane {
    pub fn new(config: &config::ControlPlane, reporting: &config::Reporting) -> Result<Self> {
        let mut base = config.server_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        let mut headers = HeaderMap::new();
        let identity = [
            ("probename", config.probe_name.as_str()),
            ("probekey", config.probe_key.as_str()),
            ("clusterkey", config.cluster_key.as_str()),
            ("probeversion", env!("CARGO_PKG_VERSION")),
        ];
        for (name, value) in identity {
            let mut value = HeaderValue::from_str(value)?;
            if name != "probename" && name != "probeversion" {
                value.set_sensitive(true);
            }
            headers.insert(HeaderName::from_static(name), value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(format!("uppe-probe/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            report_client: create_reporting_client(reporting, client.clone()),
            client,
            base: Url::parse(&base)?,
        })
    }

    fn ping_url(&self, monitor_id: &str) -> Result<Url, ApiError> {
        let mut url = self.base.join("probe/ping/")?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(monitor_id);
        Ok(url)
    }
}

fn check_status(response: &reqwest::Response, path: &str) -> Result<(), ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ApiError::Status { path: path.to_string(), status: status.as_u16() })
    }
}

#[async_trait::async_trait]
impl ControlPlane for HttpControlPlane {
    async fn fetch_monitors(&self, limit: Option<u32>) -> Result<Vec<Monitor>, ApiError> {
        let url = self.base.join("probe/monitors")?;
        let mut request = self.client.get(url);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }

        let response = request.send().await?;
        check_status(&response, "probe/monitors")?;

        let payload: Value = response.json().await?;
        let monitors = decode_batch(payload)?;
        debug!("Fetched {} monitors", monitors.len());
        Ok(monitors)
    }

    async fn report(&self, result: &CheckResult) -> Result<(), ApiError> {
        let url = self.ping_url(&result.monitor_id)?;
        let response = self.report_client.post(url).json(result).send().await?;
        check_status(&response, "probe/ping")
    }
}
