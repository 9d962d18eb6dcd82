use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use super::checkers::{
    HttpChecker, IncomingRequestChecker, IpChecker, KubernetesChecker, ServerChecker,
};
use super::types::Observation;
use crate::config::Config;
use crate::error::CheckError;
use crate::models::monitor::{Monitor, MonitorKind};

/// Checker trait for the different monitor types
///
/// Implementations never panic on bad input: every failure is returned as
/// a [`CheckError`] and becomes a down result upstream.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Whether this checker should run for `monitor` at all.
    ///
    /// Returning false skips the monitor for this cycle without reporting.
    fn applies_to(&self, _monitor: &Monitor) -> bool {
        true
    }

    /// Perform the check
    async fn check(&self, monitor: &Monitor) -> Result<Observation, CheckError>;
}

/// Dispatch table from monitor type to checker, built once at startup
#[derive(Default, Clone)]
pub struct CheckerRegistry {
    checkers: HashMap<MonitorKind, Arc<dyn Checker>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry with every built-in checker
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = Arc::new(HttpChecker::new(&config.timeouts, &config.http)?);

        Ok(Self::new()
            .register(MonitorKind::Api, http.clone())
            .register(MonitorKind::Url, Arc::new(http.as_url_checker()))
            .register(MonitorKind::Ip, Arc::new(IpChecker::new(config.timeouts.ip_ms)))
            .register(
                MonitorKind::Server,
                Arc::new(ServerChecker::openssh(config.timeouts.server_ms)),
            )
            .register(MonitorKind::IncomingRequest, Arc::new(IncomingRequestChecker::new()))
            .register(
                MonitorKind::Kubernetes,
                Arc::new(KubernetesChecker::new(config.timeouts.kubernetes_ms)?),
            ))
    }

    /// Register (or replace) the checker for `kind`
    pub fn register(mut self, kind: MonitorKind, checker: Arc<dyn Checker>) -> Self {
        self.checkers.insert(kind, checker);
        self
    }

    pub fn get(&self, kind: &MonitorKind) -> Option<Arc<dyn Checker>> {
        self.checkers.get(kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_known_kind() {
        let registry = CheckerRegistry::from_config(&Config::default()).unwrap();

        for kind in [
            MonitorKind::Api,
            MonitorKind::Url,
            MonitorKind::Ip,
            MonitorKind::Server,
            MonitorKind::IncomingRequest,
            MonitorKind::Kubernetes,
        ] {
            assert!(registry.get(&kind).is_some(), "no checker for {kind}");
        }
        assert!(registry.get(&MonitorKind::Unknown("script".into())).is_none());
    }
}
