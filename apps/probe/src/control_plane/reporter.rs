//! Retrying HTTP client used to post results back to the control plane.
//!
//! Transport errors, 5xx and 429 responses are retried with exponential
//! backoff; any other 4xx is returned after a single try.

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{Jitter, RetryTransientMiddleware, policies::ExponentialBackoff};

use crate::config::Reporting;

/// Wrap `base_client` so every request is retried on transient failures,
/// at most `max_attempts` tries in total.
pub fn create_reporting_client(
    config: &Reporting,
    base_client: reqwest::Client,
) -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder()
        .jitter(Jitter::Full)
        .retry_bounds(config.initial_backoff(), config.max_backoff())
        .build_with_max_retries(config.max_attempts.saturating_sub(1));

    ClientBuilder::new(base_client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporting_client(max_attempts: u32) -> ClientWithMiddleware {
        let config = Reporting { max_attempts, initial_backoff_ms: 1, max_backoff_ms: 5 };
        create_reporting_client(&config, reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let unavailable = server
            .mock("POST", "/ping")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;
        let accepted = server
            .mock("POST", "/ping")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let response = reporting_client(3)
            .post(format!("{}/ping", server.url()))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        unavailable.assert_async().await;
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mut server = mockito::Server::new_async().await;
        let unavailable = server
            .mock("POST", "/ping")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let response = reporting_client(2)
            .post(format!("{}/ping", server.url()))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 503);
        unavailable.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_error_is_sent_once() {
        let mut server = mockito::Server::new_async().await;
        let rejected = server
            .mock("POST", "/ping")
            .with_status(400)
            .expect(1)
            .create_async()
            .await;

        let response = reporting_client(5)
            .post(format!("{}/ping", server.url()))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 400);
        rejected.assert_async().await;
    }
}
