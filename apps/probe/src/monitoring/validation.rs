//! Validation for probe configuration and monitor targets.
//!
//! Monitors come from the control plane, which owns them, so private and
//! local targets are allowed here. What is checked is that the values can
//! actually be probed and that every bound stays finite.

use anyhow::{anyhow, Result};
use url::Url;

/// Validate an HTTP/HTTPS monitor target and return the parsed URL
pub fn validate_http_target(target: &str) -> Result<Url> {
    let url = Url::parse(target.trim()).map_err(|e| anyhow!("Invalid URL {:?}: {}", target, e))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("Invalid scheme for HTTP monitor: {}", other)),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(anyhow!("URL has no host: {}", target));
    }

    if let Some(port) = url.port() {
        validate_port(port)?;
    }

    Ok(url)
}

/// Validate the control-plane base URL
pub fn validate_control_plane_url(target: &str) -> Result<()> {
    validate_http_target(target).map(|_| ())
}

/// Validate a host name or address for socket checks
pub fn validate_host(host: &str) -> Result<()> {
    let host = host.trim();
    if host.is_empty() {
        return Err(anyhow!("Host must not be empty"));
    }
    if host.contains(char::is_whitespace) || host.contains('/') {
        return Err(anyhow!("Host contains invalid characters: {:?}", host));
    }
    Ok(())
}

/// Validate a Kubernetes namespace name (an RFC 1123 DNS label)
pub fn validate_namespace(namespace: &str) -> Result<()> {
    const MAX_LEN: usize = 63;

    if namespace.is_empty() || namespace.len() > MAX_LEN {
        return Err(anyhow!("Namespace must be 1-{} characters: {:?}", MAX_LEN, namespace));
    }

    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-';
    if !namespace.chars().all(allowed)
        || namespace.starts_with('-')
        || namespace.ends_with('-')
    {
        return Err(anyhow!("Invalid namespace name: {:?}", namespace));
    }

    Ok(())
}

/// Validate port is in valid range
pub fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(anyhow!("Port 0 is not valid"));
    }
    Ok(())
}

/// Validate HTTP method
pub fn validate_http_method(method: &str) -> Result<reqwest::Method> {
    match method.to_uppercase().as_str() {
        "GET" => Ok(reqwest::Method::GET),
        "POST" => Ok(reqwest::Method::POST),
        "PUT" => Ok(reqwest::Method::PUT),
        "PATCH" => Ok(reqwest::Method::PATCH),
        "DELETE" => Ok(reqwest::Method::DELETE),
        "HEAD" => Ok(reqwest::Method::HEAD),
        "OPTIONS" => Ok(reqwest::Method::OPTIONS),
        _ => Err(anyhow!("Unsupported HTTP method: {}", method)),
    }
}

/// Validate the trigger cadence and its start jitter
pub fn validate_cadence(cadence_minutes: u64, max_jitter_secs: u64) -> Result<()> {
    const MIN_CADENCE: u64 = 1;
    const MAX_CADENCE: u64 = 1440; // 24 hours

    if !(MIN_CADENCE..=MAX_CADENCE).contains(&cadence_minutes) {
        return Err(anyhow!(
            "Cadence must be between {} and {} minutes, got {}",
            MIN_CADENCE,
            MAX_CADENCE,
            cadence_minutes
        ));
    }

    if max_jitter_secs >= cadence_minutes * 60 {
        return Err(anyhow!(
            "Start jitter ({}s) must be shorter than the cadence ({} min)",
            max_jitter_secs,
            cadence_minutes
        ));
    }

    Ok(())
}

/// Validate timeout is finite and reasonable
pub fn validate_timeout_ms(timeout_ms: u64) -> Result<()> {
    const MIN_TIMEOUT: u64 = 100; // 100ms
    const MAX_TIMEOUT: u64 = 300_000; // 5 minutes

    if timeout_ms < MIN_TIMEOUT {
        return Err(anyhow!(
            "Timeout too short: {} ms (minimum: {} ms)",
            timeout_ms,
            MIN_TIMEOUT
        ));
    }

    if timeout_ms > MAX_TIMEOUT {
        return Err(anyhow!(
            "Timeout too long: {} ms (maximum: {} ms)",
            timeout_ms,
            MAX_TIMEOUT
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_http_target() {
        // Valid, including private targets owned by the control plane
        assert!(validate_http_target("https://example.com").is_ok());
        assert!(validate_http_target("http://example.com:8080").is_ok());
        assert!(validate_http_target("http://10.0.0.1/health").is_ok());

        // Invalid - wrong scheme
        assert!(validate_http_target("ftp://example.com").is_err());

        // Invalid - not a URL / port 0
        assert!(validate_http_target("example.com").is_err());
        assert!(validate_http_target("http://example.com:0").is_err());
    }

    #[test]
    fn test_validate_host() {
        assert!(validate_host("1.2.3.4").is_ok());
        assert!(validate_host("db.internal").is_ok());

        assert!(validate_host("").is_err());
        assert!(validate_host("bad host").is_err());
        assert!(validate_host("http://x").is_err());
    }

    #[test]
    fn test_validate_namespace() {
        assert!(validate_namespace("default").is_ok());
        assert!(validate_namespace("shop-eu-1").is_ok());

        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("Shop").is_err());
        assert!(validate_namespace("-shop").is_err());
        assert!(validate_namespace("a/../../x").is_err());
        assert!(validate_namespace(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_validate_http_method() {
        assert_eq!(validate_http_method("get").unwrap(), reqwest::Method::GET);
        assert_eq!(validate_http_method("PATCH").unwrap(), reqwest::Method::PATCH);
        assert!(validate_http_method("TRACE").is_err());
    }

    #[test]
    fn test_validate_cadence() {
        assert!(validate_cadence(30, 50).is_ok());
        assert!(validate_cadence(1, 59).is_ok());

        assert!(validate_cadence(0, 0).is_err()); // Too short
        assert!(validate_cadence(2000, 0).is_err()); // Too long
        assert!(validate_cadence(1, 60).is_err()); // Jitter swallows the cadence
    }

    #[test]
    fn test_validate_timeout_ms() {
        assert!(validate_timeout_ms(100).is_ok()); // Min
        assert!(validate_timeout_ms(5_000).is_ok()); // Normal
        assert!(validate_timeout_ms(300_000).is_ok()); // Max

        assert!(validate_timeout_ms(0).is_err());
        assert!(validate_timeout_ms(300_001).is_err());
    }
}
